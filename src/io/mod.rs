//! Rule file import/export.
//!
//! Rules load from `.json` or `.xlsx` files and export to both at once.
//! JSON files may take any of these shapes:
//!
//! | Shape | Example |
//! |-------|---------|
//! | Record list | `[{"src": "HP", "dst": "生命值", "info": "", "regex": false}]` |
//! | RPG Maker actors | `[null, {"id": 1, "name": "Harold", "nickname": "Hero"}]` |
//! | Flat map | `{"HP": "生命值", "MP": "魔力"}` |

mod rule_import;
mod rule_sheet;

pub use rule_import::{export_rules, export_rules_to_json, load_rules_from_file, parse_rules_json};
pub use rule_sheet::{export_rules_to_xlsx, load_rules_from_xlsx};
