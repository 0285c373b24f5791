//! # lgstore
//!
//! Durable project state for a translation project manager.
//!
//! A project is a single `SQLite` file holding the original source assets,
//! the translatable items extracted from them, quality rules (glossary,
//! text preservation, pre/post replacement, custom prompts) and free-form
//! metadata. On top of the file sits a multi-tier in-memory cache and a
//! deterministic merge engine for rule lists arriving from several sources.
//!
//! ## Layers
//!
//! - [`storage::ProjectDatabase`]: transactional CRUD, no caching
//! - [`session::ProjectSession`]: the open handle plus every cache tier
//! - [`services`]: one service per cache tier, plus [`services::ProjectManager`]
//! - [`services::rule_merge`]: pure rule merge / deduplication
//!
//! ## Example
//!
//! ```rust,ignore
//! use lgstore::{ProjectManager, StoreConfig};
//! use lgstore::models::{Item, RuleType};
//!
//! let manager = ProjectManager::new(StoreConfig::load_default());
//! manager.create_project("demo.lg", "demo")?;
//! manager.open("demo.lg")?;
//! manager.items().replace_all_items(&mut [Item::new("hello")])?;
//! let glossary = manager.rules().get_rules_cached(RuleType::Glossary)?;
//! manager.close();
//! ```

#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]
#![warn(missing_docs)]
#![forbid(unsafe_code)]
#![cfg_attr(test, allow(clippy::unwrap_used, clippy::expect_used))]

use thiserror::Error as ThisError;

pub mod config;
pub mod io;
pub mod models;
pub mod observability;
pub mod services;
pub mod session;
pub mod storage;

pub use config::{PresetConfig, StoreConfig};
pub use models::{BatchUpdate, Item, ItemStatus, Names, RuleEntry, RuleType, TextPreserveMode};
pub use services::rule_merge::{MergeMode, MergeReport, merge};
pub use services::{
    AssetService, BatchService, ItemService, MetaService, ProjectManager, RuleService,
};
pub use session::ProjectSession;
pub use storage::ProjectDatabase;

/// Error type for lgstore operations.
///
/// # Error Variant Triggers
///
/// | Variant | Raised When |
/// |---------|-------------|
/// | `InvalidInput` | Duplicate asset path, unmergeable rule type, malformed import file |
/// | `Storage` | `SQLite`, filesystem or JSON (de)serialization failures |
/// | `ProjectNotOpen` | A write is attempted while no project is open |
/// | `Decompression` | An asset payload cannot be decompressed (internal only) |
/// | `NotFound` | Opening a project file that does not exist |
/// | `Logging` | The tracing subscriber or its log file cannot be set up |
#[derive(Debug, ThisError)]
pub enum Error {
    /// Invalid input was provided.
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// A storage operation failed.
    ///
    /// Raised when:
    /// - `SQLite` statements or transactions fail
    /// - The project file or its parent directory cannot be created
    /// - A stored JSON blob cannot be serialized or parsed
    #[error("storage operation '{operation}' failed: {cause}")]
    Storage {
        /// The operation that failed.
        operation: String,
        /// The underlying cause.
        cause: String,
    },

    /// No project is currently open.
    #[error("project not open")]
    ProjectNotOpen,

    /// An asset payload could not be decompressed.
    ///
    /// Never crosses the [`AssetService`] boundary: it is logged there and
    /// reported to callers as a missing asset.
    #[error("failed to decompress asset '{path}': {cause}")]
    Decompression {
        /// Relative path of the asset.
        path: String,
        /// The underlying cause.
        cause: String,
    },

    /// A required file does not exist.
    #[error("not found: {0}")]
    NotFound(String),

    /// Logging could not be initialized.
    ///
    /// Raised when:
    /// - A global subscriber is already installed
    /// - The log directory or log file cannot be created
    #[error("logging setup failed: {0}")]
    Logging(String),
}

/// Result type alias for lgstore operations.
pub type Result<T> = std::result::Result<T, Error>;
