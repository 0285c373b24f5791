//! Translation items.

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};
use std::fmt;

/// Processing status of an item (and of a project as a whole).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ItemStatus {
    /// Not processed yet.
    #[default]
    None,
    /// Currently being translated.
    Processing,
    /// Translated.
    Processed,
    /// Translated in an earlier run.
    ProcessedInPast,
    /// Excluded by the user.
    Excluded,
    /// Skipped by a filter rule.
    RuleSkipped,
    /// Source text is not in the project source language.
    LanguageSkipped,
    /// Duplicate of another item.
    Duplicated,
    /// Failed after retries.
    Error,
}

impl ItemStatus {
    /// Returns the persisted string tag.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::None => "NONE",
            Self::Processing => "PROCESSING",
            Self::Processed => "PROCESSED",
            Self::ProcessedInPast => "PROCESSED_IN_PAST",
            Self::Excluded => "EXCLUDED",
            Self::RuleSkipped => "RULE_SKIPPED",
            Self::LanguageSkipped => "LANGUAGE_SKIPPED",
            Self::Duplicated => "DUPLICATED",
            Self::Error => "ERROR",
        }
    }

    /// Parses a persisted tag; unknown tags yield `None`.
    #[must_use]
    pub fn parse(s: &str) -> Option<Self> {
        let status = match s.trim().to_ascii_uppercase().as_str() {
            "NONE" => Self::None,
            "PROCESSING" => Self::Processing,
            "PROCESSED" => Self::Processed,
            "PROCESSED_IN_PAST" => Self::ProcessedInPast,
            "EXCLUDED" => Self::Excluded,
            "RULE_SKIPPED" => Self::RuleSkipped,
            "LANGUAGE_SKIPPED" => Self::LanguageSkipped,
            "DUPLICATED" => Self::Duplicated,
            "ERROR" => Self::Error,
            _ => return None,
        };
        Some(status)
    }
}

impl fmt::Display for ItemStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Speaker name(s) attached to an item.
///
/// Most formats carry one name per line; some (message JSON exports) carry
/// a list for lines spoken by several characters.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Names {
    /// A single speaker.
    One(String),
    /// Several speakers, in order.
    Many(Vec<String>),
}

impl Names {
    /// Every name, in order.
    #[must_use]
    pub fn as_slice(&self) -> &[String] {
        match self {
            Self::One(name) => std::slice::from_ref(name),
            Self::Many(names) => names,
        }
    }

    /// The first name, if any.
    #[must_use]
    pub fn first(&self) -> Option<&str> {
        self.as_slice().first().map(String::as_str)
    }
}

impl From<&str> for Names {
    fn from(name: &str) -> Self {
        Self::One(name.to_string())
    }
}

impl From<String> for Names {
    fn from(name: String) -> Self {
        Self::One(name)
    }
}

impl From<Vec<String>> for Names {
    fn from(names: Vec<String>) -> Self {
        Self::Many(names)
    }
}

/// Reads a name field without ever failing the whole item: non-string
/// list members are dropped and other scalars are stringified.
fn lenient_names<'de, D>(deserializer: D) -> Result<Option<Names>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match Value::deserialize(deserializer)? {
        Value::Null => None,
        Value::String(name) => Some(Names::One(name)),
        Value::Array(values) => Some(Names::Many(
            values
                .into_iter()
                .filter_map(|v| match v {
                    Value::String(name) => Some(name),
                    _ => None,
                })
                .collect(),
        )),
        other => Some(Names::One(other.to_string())),
    })
}

/// One translatable unit.
///
/// `id` is assigned by the store on first insert and never stored inside
/// the JSON payload. Attributes without a dedicated field live in `extra`
/// and round-trip unchanged.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Item {
    /// Store-assigned id.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<i64>,
    /// Source text.
    pub src: String,
    /// Translated text.
    pub dst: String,
    /// Speaker name(s) in the source language.
    #[serde(skip_serializing_if = "Option::is_none", deserialize_with = "lenient_names")]
    pub name_src: Option<Names>,
    /// Speaker name(s) in the target language.
    #[serde(skip_serializing_if = "Option::is_none", deserialize_with = "lenient_names")]
    pub name_dst: Option<Names>,
    /// Engine-specific payload kept for writeback.
    #[serde(skip_serializing_if = "Value::is_null")]
    pub extra_field: Value,
    /// Free-form tag.
    pub tag: String,
    /// Row index within the source file.
    pub row: i64,
    /// Source file format tag.
    pub file_type: String,
    /// Relative path of the owning asset.
    pub file_path: String,
    /// Text classification tag.
    pub text_type: String,
    /// Processing status.
    pub status: ItemStatus,
    /// Number of failed translation attempts.
    pub retry_count: u32,
    /// Attributes without a dedicated field.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Item {
    /// Creates an item with the given source text.
    #[must_use]
    pub fn new(src: impl Into<String>) -> Self {
        Self {
            src: src.into(),
            ..Self::default()
        }
    }

    /// Sets the owning asset path.
    #[must_use]
    pub fn with_file_path(mut self, path: impl Into<String>) -> Self {
        self.file_path = path.into();
        self
    }

    /// Sets the translated text.
    #[must_use]
    pub fn with_dst(mut self, dst: impl Into<String>) -> Self {
        self.dst = dst.into();
        self
    }

    /// Sets the status.
    #[must_use]
    pub const fn with_status(mut self, status: ItemStatus) -> Self {
        self.status = status;
        self
    }

    /// Serializes the payload stored in the `items.data` column (no id).
    ///
    /// # Errors
    ///
    /// Returns an error if an `extra` value cannot be serialized.
    pub fn to_payload(&self) -> serde_json::Result<String> {
        let mut value = serde_json::to_value(self)?;
        if let Value::Object(map) = &mut value {
            map.remove("id");
        }
        serde_json::to_string(&value)
    }

    /// Rebuilds an item from a stored row.
    ///
    /// # Errors
    ///
    /// Returns an error if `data` is not a JSON object of the expected shape.
    pub fn from_payload(id: i64, data: &str) -> serde_json::Result<Self> {
        let mut item: Self = serde_json::from_str(data)?;
        item.extra.remove("id");
        item.id = Some(id);
        Ok(item)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_status_roundtrip() {
        for status in [
            ItemStatus::None,
            ItemStatus::ProcessedInPast,
            ItemStatus::LanguageSkipped,
            ItemStatus::Error,
        ] {
            assert_eq!(ItemStatus::parse(status.as_str()), Some(status));
            let json = serde_json::to_value(status).unwrap();
            assert_eq!(json, Value::from(status.as_str()));
        }
        assert_eq!(ItemStatus::parse("weird"), None);
    }

    #[test]
    fn test_payload_excludes_id() {
        let mut item = Item::new("hi").with_file_path("a.txt");
        item.id = Some(9);
        let payload = item.to_payload().unwrap();
        let value: Value = serde_json::from_str(&payload).unwrap();
        assert!(value.get("id").is_none());
        assert_eq!(value["src"], "hi");
        assert_eq!(value["status"], "NONE");
    }

    #[test]
    fn test_unknown_attributes_survive() {
        let data = json!({
            "src": "こんにちは",
            "status": "PROCESSED",
            "vendor_hint": {"speaker": 3},
            "row": 12
        })
        .to_string();

        let item = Item::from_payload(4, &data).unwrap();
        assert_eq!(item.id, Some(4));
        assert_eq!(item.status, ItemStatus::Processed);
        assert_eq!(item.row, 12);
        assert_eq!(item.extra["vendor_hint"], json!({"speaker": 3}));

        let back: Value = serde_json::from_str(&item.to_payload().unwrap()).unwrap();
        assert_eq!(back["vendor_hint"], json!({"speaker": 3}));
    }

    #[test]
    fn test_speaker_lists_load_and_roundtrip() {
        let item = Item::from_payload(1, r#"{"src":"a","name_src":["Alice","Bob"],"name_dst":"Al"}"#)
            .unwrap();
        assert_eq!(
            item.name_src,
            Some(Names::Many(vec!["Alice".to_string(), "Bob".to_string()]))
        );
        assert_eq!(item.name_dst.as_ref().and_then(Names::first), Some("Al"));

        let back = Item::from_payload(1, &item.to_payload().unwrap()).unwrap();
        assert_eq!(back, item);
    }

    #[test]
    fn test_odd_name_values_do_not_fail_the_item() {
        let item =
            Item::from_payload(2, r#"{"src":"a","name_src":["Alice",7,null],"name_dst":null}"#)
                .unwrap();
        assert_eq!(item.name_src.as_ref().map(Names::as_slice), Some(&["Alice".to_string()][..]));
        assert_eq!(item.name_dst, None);
    }
}
