//! Configuration management.

use serde::Deserialize;
use std::path::{Path, PathBuf};

use crate::models::RuleType;
use crate::session::ASSET_DECOMPRESS_CACHE_MAX;

/// Environment variable overriding [`StoreConfig::asset_cache_capacity`].
pub const ENV_ASSET_CACHE_CAPACITY: &str = "LGSTORE_ASSET_CACHE_CAPACITY";

/// Main configuration for lgstore.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoreConfig {
    /// Number of decompressed assets kept in memory.
    pub asset_cache_capacity: usize,
    /// Rule presets applied to newly created projects.
    pub presets: PresetConfig,
}

/// Default preset files seeded into new projects.
///
/// Unset or missing files are skipped.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PresetConfig {
    /// Glossary preset (JSON).
    pub glossary: Option<PathBuf>,
    /// Text preserve preset (JSON).
    pub text_preserve: Option<PathBuf>,
    /// Pre-translation replacement preset (JSON).
    pub pre_replacement: Option<PathBuf>,
    /// Post-translation replacement preset (JSON).
    pub post_replacement: Option<PathBuf>,
    /// Chinese custom prompt (plain text).
    pub custom_prompt_zh: Option<PathBuf>,
    /// English custom prompt (plain text).
    pub custom_prompt_en: Option<PathBuf>,
}

impl PresetConfig {
    /// Returns the preset path configured for `rule_type`.
    #[must_use]
    pub fn path_for(&self, rule_type: RuleType) -> Option<&Path> {
        let path = match rule_type {
            RuleType::Glossary => &self.glossary,
            RuleType::TextPreserve => &self.text_preserve,
            RuleType::PreReplacement => &self.pre_replacement,
            RuleType::PostReplacement => &self.post_replacement,
            RuleType::CustomPromptZh => &self.custom_prompt_zh,
            RuleType::CustomPromptEn => &self.custom_prompt_en,
        };
        path.as_deref()
    }

    /// Sets the preset path for `rule_type`.
    #[must_use]
    pub fn with_preset(mut self, rule_type: RuleType, path: impl Into<PathBuf>) -> Self {
        let slot = match rule_type {
            RuleType::Glossary => &mut self.glossary,
            RuleType::TextPreserve => &mut self.text_preserve,
            RuleType::PreReplacement => &mut self.pre_replacement,
            RuleType::PostReplacement => &mut self.post_replacement,
            RuleType::CustomPromptZh => &mut self.custom_prompt_zh,
            RuleType::CustomPromptEn => &mut self.custom_prompt_en,
        };
        *slot = Some(path.into());
        self
    }
}

/// Configuration file structure (for TOML parsing).
#[derive(Debug, Deserialize, Default)]
pub struct ConfigFile {
    /// Asset cache capacity.
    pub asset_cache_capacity: Option<usize>,
    /// Preset files.
    pub presets: Option<ConfigFilePresets>,
}

/// Presets section in config file.
#[derive(Debug, Deserialize, Default)]
pub struct ConfigFilePresets {
    /// Glossary preset.
    pub glossary: Option<String>,
    /// Text preserve preset.
    pub text_preserve: Option<String>,
    /// Pre-translation replacement preset.
    pub pre_replacement: Option<String>,
    /// Post-translation replacement preset.
    pub post_replacement: Option<String>,
    /// Chinese custom prompt.
    pub custom_prompt_zh: Option<String>,
    /// English custom prompt.
    pub custom_prompt_en: Option<String>,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            asset_cache_capacity: ASSET_DECOMPRESS_CACHE_MAX,
            presets: PresetConfig::default(),
        }
    }
}

impl StoreConfig {
    /// Creates a new configuration with default values.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Loads configuration from a file path.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn load_from_file(path: &Path) -> crate::Result<Self> {
        let contents = std::fs::read_to_string(path).map_err(|e| crate::Error::Storage {
            operation: "read_config_file".to_string(),
            cause: format!("{}: {e}", path.display()),
        })?;

        let file: ConfigFile = toml::from_str(&contents)
            .map_err(|e| crate::Error::InvalidInput(format!("config file {}: {e}", path.display())))?;

        Ok(Self::from_config_file(file))
    }

    /// Loads configuration from the default location.
    ///
    /// Checks the platform config dir (`~/.config/lgstore/config.toml` on
    /// Linux) and falls back to defaults when nothing is found. Environment
    /// overrides are applied last.
    #[must_use]
    pub fn load_default() -> Self {
        let from_file = directories::BaseDirs::new()
            .map(|dirs| dirs.config_dir().join("lgstore").join("config.toml"))
            .filter(|path| path.exists())
            .and_then(|path| match Self::load_from_file(&path) {
                Ok(config) => Some(config),
                Err(e) => {
                    tracing::warn!(path = %path.display(), error = %e, "Ignoring unreadable config file");
                    None
                },
            });

        from_file.unwrap_or_default().apply_env_overrides()
    }

    /// Applies `LGSTORE_*` environment overrides.
    #[must_use]
    pub fn apply_env_overrides(mut self) -> Self {
        if let Ok(raw) = std::env::var(ENV_ASSET_CACHE_CAPACITY) {
            match raw.trim().parse::<usize>() {
                Ok(capacity) if capacity > 0 => self.asset_cache_capacity = capacity,
                _ => tracing::warn!(value = %raw, "Ignoring invalid {ENV_ASSET_CACHE_CAPACITY}"),
            }
        }
        self
    }

    /// Converts a `ConfigFile` to `StoreConfig`.
    fn from_config_file(file: ConfigFile) -> Self {
        let mut config = Self::default();

        if let Some(capacity) = file.asset_cache_capacity.filter(|c| *c > 0) {
            config.asset_cache_capacity = capacity;
        }
        if let Some(presets) = file.presets {
            let path = |p: Option<String>| p.filter(|s| !s.trim().is_empty()).map(PathBuf::from);
            config.presets = PresetConfig {
                glossary: path(presets.glossary),
                text_preserve: path(presets.text_preserve),
                pre_replacement: path(presets.pre_replacement),
                post_replacement: path(presets.post_replacement),
                custom_prompt_zh: path(presets.custom_prompt_zh),
                custom_prompt_en: path(presets.custom_prompt_en),
            };
        }

        config
    }

    /// Sets the asset cache capacity.
    #[must_use]
    pub const fn with_asset_cache_capacity(mut self, capacity: usize) -> Self {
        self.asset_cache_capacity = capacity;
        self
    }

    /// Sets the preset files.
    #[must_use]
    pub fn with_presets(mut self, presets: PresetConfig) -> Self {
        self.presets = presets;
        self
    }
}
