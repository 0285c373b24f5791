//! Rule file loading and JSON rule files.

use super::rule_sheet::{export_rules_to_xlsx, load_rules_from_xlsx};
use crate::models::RuleEntry;
use crate::models::meta::truthy;
use crate::{Error, Result};
use serde_json::{Map, Value};
use std::path::{Path, PathBuf};

/// Control codes RPG Maker expands to an actor's name.
const ACTOR_NAME_CODES: [&str; 2] = ["\\n", "\\N"];
/// Control codes RPG Maker expands to an actor's nickname.
const ACTOR_NICKNAME_CODES: [&str; 2] = ["\\nn", "\\NN"];

/// Loads rule entries from a file, dispatching on its extension.
///
/// `.json` and `.xlsx` are understood (any case); any other extension
/// yields an empty list.
///
/// # Errors
///
/// Returns [`Error::Storage`] if the file cannot be read, or
/// [`Error::InvalidInput`] if its content is malformed.
pub fn load_rules_from_file(path: &Path) -> Result<Vec<RuleEntry>> {
    let ext = path.extension().and_then(|e| e.to_str()).unwrap_or_default();
    if ext.eq_ignore_ascii_case("xlsx") {
        return load_rules_from_xlsx(path);
    }
    if !ext.eq_ignore_ascii_case("json") {
        tracing::debug!(path = %path.display(), "Unsupported rule file extension");
        return Ok(Vec::new());
    }

    let content = std::fs::read_to_string(path).map_err(|e| Error::Storage {
        operation: "read_rule_file".to_string(),
        cause: format!("{}: {e}", path.display()),
    })?;

    let rules = parse_rules_json(&content)?;
    tracing::debug!(path = %path.display(), count = rules.len(), "Loaded rule file");
    Ok(rules)
}

/// Parses rule entries from JSON text in any supported shape.
///
/// A leading UTF-8 BOM is ignored. Entries with an empty `src` are dropped
/// and every text field is trimmed.
///
/// # Errors
///
/// Returns [`Error::InvalidInput`] if `content` is not valid JSON.
pub fn parse_rules_json(content: &str) -> Result<Vec<RuleEntry>> {
    let content = content.strip_prefix('\u{feff}').unwrap_or(content);
    let value: Value = serde_json::from_str(content)
        .map_err(|e| Error::InvalidInput(format!("invalid rule JSON: {e}")))?;

    let mut rules = Vec::new();
    match value {
        Value::Array(entries) => {
            rules.extend(entries.iter().filter_map(Value::as_object).filter_map(record));
            for entry in entries.iter().filter_map(Value::as_object) {
                actor(entry, &mut rules);
            }
        },
        Value::Object(map) => {
            for (src, dst) in map {
                let src = src.trim();
                if src.is_empty() {
                    continue;
                }
                rules.push(RuleEntry::new(src, text(&dst)));
            }
        },
        _ => {},
    }
    Ok(rules)
}

/// Exports `rules` as a spreadsheet and a JSON file sharing `path_base`
/// minus its extension. Returns both paths, `.xlsx` first.
///
/// # Errors
///
/// Returns [`Error::Storage`] if either file cannot be written.
pub fn export_rules(path_base: &Path, rules: &[RuleEntry]) -> Result<Vec<PathBuf>> {
    Ok(vec![
        export_rules_to_xlsx(path_base, rules)?,
        export_rules_to_json(path_base, rules)?,
    ])
}

/// Writes `rules` as pretty JSON next to `path_base` (extension replaced
/// by `.json`) and returns the written path.
///
/// # Errors
///
/// Returns [`Error::Storage`] if the file cannot be written.
pub fn export_rules_to_json(path_base: &Path, rules: &[RuleEntry]) -> Result<PathBuf> {
    let path = path_base.with_extension("json");
    let json = serde_json::to_string_pretty(rules).map_err(|e| Error::Storage {
        operation: "serialize_rules".to_string(),
        cause: e.to_string(),
    })?;

    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent).map_err(|e| Error::Storage {
            operation: "export_rules".to_string(),
            cause: format!("{}: {e}", parent.display()),
        })?;
    }
    std::fs::write(&path, json).map_err(|e| Error::Storage {
        operation: "export_rules".to_string(),
        cause: format!("{}: {e}", path.display()),
    })?;

    tracing::info!(path = %path.display(), count = rules.len(), "Exported rules");
    Ok(path)
}

fn record(entry: &Map<String, Value>) -> Option<RuleEntry> {
    let src = text(entry.get("src")?);
    if src.is_empty() {
        return None;
    }

    let field = |key: &str| entry.get(key).map(text).unwrap_or_default();
    let flag = |key: &str| entry.get(key).is_some_and(truthy);

    Some(
        RuleEntry::new(src, field("dst"))
            .with_info(field("info"))
            .with_regex(flag("regex"))
            .with_case_sensitive(flag("case_sensitive")),
    )
}

fn actor(entry: &Map<String, Value>, rules: &mut Vec<RuleEntry>) {
    let Some(id) = entry.get("id").and_then(Value::as_i64) else {
        return;
    };
    let name = entry.get("name").map(text).unwrap_or_default();
    let nickname = entry.get("nickname").map(text).unwrap_or_default();

    if !name.is_empty() {
        for code in ACTOR_NAME_CODES {
            rules.push(RuleEntry::new(format!("{code}[{id}]"), name.clone()));
        }
    }
    // Nickname codes still translate to the actor's name.
    if !nickname.is_empty() {
        for code in ACTOR_NICKNAME_CODES {
            rules.push(RuleEntry::new(format!("{code}[{id}]"), name.clone()));
        }
    }
}

fn text(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::String(s) => s.trim().to_string(),
        other => other.to_string(),
    }
}
