//! Cache-coordination services.
//!
//! Each service owns one cache tier of the shared [`crate::session::ProjectSession`]
//! and keeps it consistent with the store: writes go to the store first and
//! reach the cache only after they succeed.

mod asset;
mod batch;
mod item;
mod meta;
mod project;
mod rule;
pub mod rule_merge;

pub use asset::AssetService;
pub use batch::BatchService;
pub use item::ItemService;
pub use meta::MetaService;
pub use project::ProjectManager;
pub use rule::RuleService;
