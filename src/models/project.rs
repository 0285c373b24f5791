//! Project overview.

use serde::Serialize;

/// Lightweight overview of a project file, readable without opening it.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProjectSummary {
    /// Display name (file stem when never set).
    pub name: String,
    /// Source language tag.
    pub source_language: String,
    /// Target language tag.
    pub target_language: String,
    /// Creation timestamp.
    pub created_at: String,
    /// Last-access timestamp.
    pub updated_at: String,
    /// Number of stored assets.
    pub file_count: usize,
    /// Items counted towards progress.
    pub total_items: u64,
    /// Items already translated.
    pub translated_items: u64,
    /// `translated_items / total_items`, clamped to `[0, 1]`.
    pub progress: f64,
}

impl ProjectSummary {
    /// Computes the clamped progress ratio.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn ratio(translated: u64, total: u64) -> f64 {
        if total == 0 {
            return 0.0;
        }
        (translated as f64 / total as f64).min(1.0)
    }
}
