//! Data models for lgstore.
//!
//! Records of the four persisted families plus the batch request type.

mod batch;
mod item;
pub mod meta;
mod project;
mod rule;

pub use batch::BatchUpdate;
pub use item::{Item, ItemStatus, Names};
pub use project::ProjectSummary;
pub use rule::{RuleEntry, RuleType, TextPreserveMode};
