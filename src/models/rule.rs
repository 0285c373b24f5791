//! Quality rule types and records.

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};
use std::fmt;

/// Kind of quality rule stored in a project.
///
/// The first four are list-shaped; the custom prompts are a single text blob.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RuleType {
    /// Term → translation pairs injected into prompts.
    Glossary,
    /// Replacements applied to source text before translation.
    PreReplacement,
    /// Replacements applied to translated text.
    PostReplacement,
    /// Patterns that must survive translation untouched.
    TextPreserve,
    /// Custom prompt (Chinese).
    CustomPromptZh,
    /// Custom prompt (English).
    CustomPromptEn,
}

impl RuleType {
    /// Returns the persisted string tag.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Glossary => "GLOSSARY",
            Self::PreReplacement => "PRE_REPLACEMENT",
            Self::PostReplacement => "POST_REPLACEMENT",
            Self::TextPreserve => "TEXT_PRESERVE",
            Self::CustomPromptZh => "CUSTOM_PROMPT_ZH",
            Self::CustomPromptEn => "CUSTOM_PROMPT_EN",
        }
    }

    /// Parses a persisted tag (case-insensitive).
    #[must_use]
    pub fn parse(s: &str) -> Option<Self> {
        Self::all()
            .iter()
            .copied()
            .find(|rule_type| rule_type.as_str().eq_ignore_ascii_case(s.trim()))
    }

    /// Returns every rule type.
    #[must_use]
    pub const fn all() -> &'static [Self] {
        &[
            Self::Glossary,
            Self::PreReplacement,
            Self::PostReplacement,
            Self::TextPreserve,
            Self::CustomPromptZh,
            Self::CustomPromptEn,
        ]
    }

    /// Whether this type is stored as a single text blob rather than a list.
    #[must_use]
    pub const fn is_text(&self) -> bool {
        matches!(self, Self::CustomPromptZh | Self::CustomPromptEn)
    }

    /// Human-readable name used when reporting applied presets.
    #[must_use]
    pub const fn label(&self) -> &'static str {
        match self {
            Self::Glossary => "Glossary",
            Self::PreReplacement => "Pre-Translation Replacement",
            Self::PostReplacement => "Post-Translation Replacement",
            Self::TextPreserve => "Text Preserve",
            Self::CustomPromptZh => "Custom Prompt (ZH)",
            Self::CustomPromptEn => "Custom Prompt (EN)",
        }
    }

    /// Metadata key holding this type's enable flag, if it has one.
    #[must_use]
    pub const fn enable_key(&self) -> &'static str {
        match self {
            Self::Glossary => "glossary_enable",
            Self::PreReplacement => "pre_translation_replacement_enable",
            Self::PostReplacement => "post_translation_replacement_enable",
            Self::TextPreserve => "text_preserve_enable",
            Self::CustomPromptZh => "custom_prompt_zh_enable",
            Self::CustomPromptEn => "custom_prompt_en_enable",
        }
    }

    /// Enable flag value assumed when the project never stored one.
    #[must_use]
    pub const fn default_enabled(&self) -> bool {
        !self.is_text()
    }
}

impl fmt::Display for RuleType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// How text preservation rules are chosen for a project.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TextPreserveMode {
    /// No text is preserved.
    Off,
    /// Built-in heuristics decide what to preserve.
    #[default]
    Smart,
    /// The project's own `TEXT_PRESERVE` rules are used.
    Custom,
}

impl TextPreserveMode {
    /// Returns the persisted string tag.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Off => "off",
            Self::Smart => "smart",
            Self::Custom => "custom",
        }
    }

    /// Parses a persisted tag (case-insensitive).
    #[must_use]
    pub fn parse(s: &str) -> Option<Self> {
        [Self::Off, Self::Smart, Self::Custom]
            .into_iter()
            .find(|mode| mode.as_str().eq_ignore_ascii_case(s.trim()))
    }
}

/// One entry of a list-shaped rule type.
///
/// Deserialization is lenient: text fields accept numbers and booleans and
/// the flags accept `0`/`1` and `"true"`/`"false"`, because rule files come
/// from hand-edited JSON. Unknown fields are preserved in `extra`.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct RuleEntry {
    /// Source text or pattern.
    #[serde(default, deserialize_with = "lenient_string")]
    pub src: String,
    /// Replacement / translation.
    #[serde(default, deserialize_with = "lenient_string")]
    pub dst: String,
    /// Free-form note shown to translators.
    #[serde(default, deserialize_with = "lenient_string")]
    pub info: String,
    /// Whether `src` is a regular expression.
    #[serde(default, deserialize_with = "lenient_bool")]
    pub regex: bool,
    /// Whether matching on `src` is case-sensitive.
    #[serde(default, deserialize_with = "lenient_bool")]
    pub case_sensitive: bool,
    /// Attributes this crate does not interpret.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl RuleEntry {
    /// Creates an entry with the given source and destination.
    #[must_use]
    pub fn new(src: impl Into<String>, dst: impl Into<String>) -> Self {
        Self {
            src: src.into(),
            dst: dst.into(),
            ..Self::default()
        }
    }

    /// Sets the note.
    #[must_use]
    pub fn with_info(mut self, info: impl Into<String>) -> Self {
        self.info = info.into();
        self
    }

    /// Marks the entry as a regular expression.
    #[must_use]
    pub const fn with_regex(mut self, regex: bool) -> Self {
        self.regex = regex;
        self
    }

    /// Sets case sensitivity.
    #[must_use]
    pub const fn with_case_sensitive(mut self, case_sensitive: bool) -> Self {
        self.case_sensitive = case_sensitive;
        self
    }

    /// Returns a copy with `src`, `dst` and `info` trimmed.
    #[must_use]
    pub fn normalized(&self) -> Self {
        Self {
            src: self.src.trim().to_string(),
            dst: self.dst.trim().to_string(),
            info: self.info.trim().to_string(),
            regex: self.regex,
            case_sensitive: self.case_sensitive,
            extra: self.extra.clone(),
        }
    }
}

fn lenient_string<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Value::deserialize(deserializer)?;
    Ok(match value {
        Value::Null => String::new(),
        Value::String(s) => s,
        other => other.to_string(),
    })
}

fn lenient_bool<'de, D>(deserializer: D) -> Result<bool, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Value::deserialize(deserializer)?;
    Ok(super::meta::truthy(&value))
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_case::test_case;

    #[test_case("GLOSSARY", Some(RuleType::Glossary); "upper")]
    #[test_case("text_preserve", Some(RuleType::TextPreserve); "lower")]
    #[test_case(" CUSTOM_PROMPT_EN ", Some(RuleType::CustomPromptEn); "padded")]
    #[test_case("bogus", None; "unknown")]
    fn test_rule_type_parse(input: &str, expected: Option<RuleType>) {
        assert_eq!(RuleType::parse(input), expected);
    }

    #[test_case("smart", Some(TextPreserveMode::Smart); "stored form")]
    #[test_case("CUSTOM", Some(TextPreserveMode::Custom); "upper")]
    #[test_case(" off ", Some(TextPreserveMode::Off); "padded")]
    #[test_case("auto", None; "unknown")]
    fn test_text_preserve_mode_parse(input: &str, expected: Option<TextPreserveMode>) {
        assert_eq!(TextPreserveMode::parse(input), expected);
    }

    #[test]
    fn test_rule_type_serde_uses_tags() {
        let json = serde_json::to_string(&RuleType::PreReplacement).unwrap();
        assert_eq!(json, "\"PRE_REPLACEMENT\"");
        for rule_type in RuleType::all() {
            assert_eq!(RuleType::parse(rule_type.as_str()), Some(*rule_type));
        }
    }

    #[test]
    fn test_text_types() {
        assert!(RuleType::CustomPromptZh.is_text());
        assert!(!RuleType::Glossary.is_text());
        assert!(!RuleType::CustomPromptEn.default_enabled());
        assert!(RuleType::TextPreserve.default_enabled());
    }

    #[test]
    fn test_lenient_deserialize() {
        let entry: RuleEntry = serde_json::from_value(serde_json::json!({
            "src": 42,
            "dst": null,
            "regex": "true",
            "case_sensitive": 1,
            "group": "names"
        }))
        .unwrap();

        assert_eq!(entry.src, "42");
        assert_eq!(entry.dst, "");
        assert!(entry.regex);
        assert!(entry.case_sensitive);
        assert_eq!(entry.extra.get("group"), Some(&Value::from("names")));
    }

    #[test]
    fn test_extra_fields_roundtrip() {
        let mut entry = RuleEntry::new("HP", "生命值");
        entry.extra.insert("hits".to_string(), Value::from(3));

        let json = serde_json::to_value(&entry).unwrap();
        assert_eq!(json["hits"], Value::from(3));

        let back: RuleEntry = serde_json::from_value(json).unwrap();
        assert_eq!(back, entry);
    }

    #[test]
    fn test_normalized_trims_text() {
        let entry = RuleEntry::new("  HP ", " 生命值\n").with_info(" note ");
        let normalized = entry.normalized();
        assert_eq!(normalized.src, "HP");
        assert_eq!(normalized.dst, "生命值");
        assert_eq!(normalized.info, "note");
    }
}
