//! Well-known metadata keys and value helpers.

use serde_json::Value;

/// Schema version stamp written once at project creation.
pub const SCHEMA_VERSION: i64 = 1;

/// Key of the schema version stamp.
pub const KEY_SCHEMA_VERSION: &str = "schema_version";
/// Key of the project display name.
pub const KEY_NAME: &str = "name";
/// Key of the creation timestamp (RFC 3339).
pub const KEY_CREATED_AT: &str = "created_at";
/// Key of the last-access timestamp (RFC 3339).
pub const KEY_UPDATED_AT: &str = "updated_at";
/// Key of the project source language.
pub const KEY_SOURCE_LANGUAGE: &str = "source_language";
/// Key of the project target language.
pub const KEY_TARGET_LANGUAGE: &str = "target_language";
/// Key of the overall project status tag.
pub const KEY_PROJECT_STATUS: &str = "project_status";
/// Key of the translation progress counters.
pub const KEY_TRANSLATION_EXTRAS: &str = "translation_extras";
/// Key selecting the text preservation strategy.
pub const KEY_TEXT_PRESERVE_MODE: &str = "text_preserve_mode";

/// Metadata keys whose change affects quality rule behavior.
pub const RULE_META_KEYS: &[&str] = &[
    "glossary_enable",
    "text_preserve_enable",
    "text_preserve_mode",
    "pre_translation_replacement_enable",
    "post_translation_replacement_enable",
    "custom_prompt_zh_enable",
    "custom_prompt_en_enable",
];

/// Loose truthiness of a JSON value.
///
/// Empty strings, `0`, `null`, `false` and empty containers are false. The
/// strings `"false"` and `"0"` are false as well so that flags written by
/// spreadsheets survive.
#[must_use]
pub fn truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().is_some_and(|f| f != 0.0),
        Value::String(s) => {
            let s = s.trim();
            !(s.is_empty() || s.eq_ignore_ascii_case("false") || s == "0")
        },
        Value::Array(a) => !a.is_empty(),
        Value::Object(o) => !o.is_empty(),
    }
}
