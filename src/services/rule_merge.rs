//! Deduplicating merge of rule lists.
//!
//! Two entries describe the same rule when their trimmed `src` values are
//! equal after full Unicode case folding (the *fold key*), so `STRASSE`
//! and `straße` collide. Text preserve rules
//! always collapse per fold key. For the other list types a fold group only
//! stays split, by exact `src`, when every member is case-sensitive.
//!
//! Within a group the earliest entry is the base and later ones merge into
//! it. [`MergeMode::Overwrite`] is for explicit user edits and imports;
//! [`MergeMode::FillEmpty`] is for automatic write-backs and only fills
//! blanks.
//!
//! The output keeps the position of each group's first appearance.

use crate::models::{RuleEntry, RuleType};
use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use tracing::instrument;

/// How later entries are folded into the earliest one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MergeMode {
    /// Later values replace earlier ones, including with empty text.
    #[default]
    Overwrite,
    /// Only empty text fields are filled; flags never change.
    FillEmpty,
}

/// A field value reported in a [`Conflict`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum FieldValue {
    /// `dst` or `info`.
    Text(String),
    /// `regex` or `case_sensitive`.
    Flag(bool),
}

/// Two entries of one group disagreed on a field.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Conflict {
    /// Rule type being merged.
    pub rule_type: RuleType,
    /// Fold key, or `fold::src` for a case-sensitive subgroup.
    pub key: String,
    /// Field name.
    pub field: &'static str,
    /// Value held by the earlier entry.
    pub existing: FieldValue,
    /// Value carried by the later entry.
    pub incoming: FieldValue,
}

/// Counters describing what a merge did.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct MergeReport {
    /// Surviving groups with no member from the existing list.
    pub added: usize,
    /// Merges that changed the base under [`MergeMode::Overwrite`].
    pub updated: usize,
    /// Merges that filled a blank under [`MergeMode::FillEmpty`].
    pub filled: usize,
    /// Entries absorbed into an earlier one.
    pub deduped: usize,
    /// Entries dropped because `src` was empty after trimming.
    pub skipped_empty_src: usize,
    /// Field disagreements, in group order.
    pub conflicts: Vec<Conflict>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Field {
    Dst,
    Info,
    Regex,
    CaseSensitive,
}

impl Field {
    const fn name(self) -> &'static str {
        match self {
            Self::Dst => "dst",
            Self::Info => "info",
            Self::Regex => "regex",
            Self::CaseSensitive => "case_sensitive",
        }
    }

    fn value(self, entry: &RuleEntry) -> FieldValue {
        match self {
            Self::Dst => FieldValue::Text(entry.dst.clone()),
            Self::Info => FieldValue::Text(entry.info.clone()),
            Self::Regex => FieldValue::Flag(entry.regex),
            Self::CaseSensitive => FieldValue::Flag(entry.case_sensitive),
        }
    }

    fn assign(self, base: &mut RuleEntry, other: &RuleEntry) {
        match self {
            Self::Dst => base.dst.clone_from(&other.dst),
            Self::Info => base.info.clone_from(&other.info),
            Self::Regex => base.regex = other.regex,
            Self::CaseSensitive => base.case_sensitive = other.case_sensitive,
        }
    }
}

/// Fields that take part in an overwrite merge.
const fn overwrite_fields(rule_type: RuleType) -> &'static [Field] {
    match rule_type {
        RuleType::TextPreserve => &[Field::Info],
        RuleType::Glossary => &[Field::Dst, Field::Info, Field::CaseSensitive],
        _ => &[Field::Dst, Field::Regex, Field::CaseSensitive],
    }
}

/// Text fields filled and flags compared (never changed) in a fill merge.
const fn fill_fields(rule_type: RuleType) -> (&'static [Field], &'static [Field]) {
    match rule_type {
        RuleType::TextPreserve => (&[Field::Info], &[]),
        RuleType::Glossary => (&[Field::Dst, Field::Info], &[Field::CaseSensitive]),
        _ => (&[Field::Dst], &[Field::Regex, Field::CaseSensitive]),
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
enum GroupKey {
    Fold(String),
    Exact(String, String),
}

impl GroupKey {
    fn label(&self) -> String {
        match self {
            Self::Fold(fold) => fold.clone(),
            Self::Exact(fold, src) => format!("{fold}::{src}"),
        }
    }
}

struct Candidate {
    entry: RuleEntry,
    fold: String,
    order: usize,
    is_existing: bool,
}

struct Merger {
    rule_type: RuleType,
    mode: MergeMode,
    report: MergeReport,
}

impl Merger {
    /// Folds `members` (in order) into one entry.
    fn merge_group(&mut self, candidates: &[Candidate], members: &[usize], key: &str) -> RuleEntry {
        let mut base = candidates[members[0]].entry.clone();
        for &other in &members[1..] {
            self.report.deduped += 1;
            let other = &candidates[other].entry;
            match self.mode {
                MergeMode::Overwrite => {
                    if self.overwrite(&mut base, other, key) {
                        self.report.updated += 1;
                    }
                },
                MergeMode::FillEmpty => {
                    if self.fill(&mut base, other, key) {
                        self.report.filled += 1;
                    }
                },
            }
        }
        base
    }

    fn overwrite(&mut self, base: &mut RuleEntry, other: &RuleEntry, key: &str) -> bool {
        let mut changed = false;
        if !other.src.is_empty() && base.src != other.src {
            base.src.clone_from(&other.src);
            changed = true;
        }

        for &field in overwrite_fields(self.rule_type) {
            let before = field.value(base);
            let after = field.value(other);
            if before == after {
                continue;
            }
            // Filling a blank or clearing a value is not a disagreement.
            let one_side_blank = matches!(
                (&before, &after),
                (FieldValue::Text(b), FieldValue::Text(a)) if b.is_empty() || a.is_empty()
            );
            if !one_side_blank {
                self.conflict(key, field, before, after);
            }
            field.assign(base, other);
            changed = true;
        }
        changed
    }

    fn fill(&mut self, base: &mut RuleEntry, other: &RuleEntry, key: &str) -> bool {
        let (texts, flags) = fill_fields(self.rule_type);
        let mut filled = false;

        for &field in texts {
            let (FieldValue::Text(before), FieldValue::Text(after)) =
                (field.value(base), field.value(other))
            else {
                continue;
            };
            if after.is_empty() || before == after {
                continue;
            }
            if before.is_empty() {
                field.assign(base, other);
                filled = true;
            } else {
                self.conflict(key, field, FieldValue::Text(before), FieldValue::Text(after));
            }
        }

        for &field in flags {
            let before = field.value(base);
            let after = field.value(other);
            if before != after {
                self.conflict(key, field, before, after);
            }
        }
        filled
    }

    fn conflict(&mut self, key: &str, field: Field, existing: FieldValue, incoming: FieldValue) {
        self.report.conflicts.push(Conflict {
            rule_type: self.rule_type,
            key: key.to_string(),
            field: field.name(),
            existing,
            incoming,
        });
    }
}

/// Returns the fold key of a (trimmed) rule source.
#[must_use]
pub fn fold_key(src: &str) -> String {
    caseless::default_case_fold_str(src)
}

fn ingest(
    rows: &[RuleEntry],
    order_offset: usize,
    is_existing: bool,
    candidates: &mut Vec<Candidate>,
    skipped: &mut usize,
) {
    for (i, row) in rows.iter().enumerate() {
        let entry = row.normalized();
        if entry.src.is_empty() {
            *skipped += 1;
            continue;
        }
        candidates.push(Candidate {
            fold: fold_key(&entry.src),
            entry,
            order: order_offset + i,
            is_existing,
        });
    }
}

/// Groups candidate indices by `key`, in order of first appearance.
fn group_by<'a, I>(members: I, key: impl Fn(usize) -> &'a str) -> Vec<(&'a str, Vec<usize>)>
where
    I: IntoIterator<Item = usize>,
{
    let mut positions: HashMap<&str, usize> = HashMap::new();
    let mut groups: Vec<(&str, Vec<usize>)> = Vec::new();
    for idx in members {
        let k = key(idx);
        match positions.get(k) {
            Some(&pos) => groups[pos].1.push(idx),
            None => {
                positions.insert(k, groups.len());
                groups.push((k, vec![idx]));
            },
        }
    }
    groups
}

/// Merges `incoming` into `existing` for one rule type.
///
/// Entries are normalized first (text fields trimmed) and those with an
/// empty `src` are dropped. Existing entries sort before incoming ones, so
/// in [`MergeMode::Overwrite`] incoming values win.
///
/// # Errors
///
/// Returns [`Error::InvalidInput`] for text-shaped rule types, which have
/// no entries to merge.
#[instrument(
    skip(existing, incoming),
    fields(rule_type = %rule_type, existing = existing.len(), incoming = incoming.len())
)]
pub fn merge(
    rule_type: RuleType,
    existing: &[RuleEntry],
    incoming: &[RuleEntry],
    mode: MergeMode,
) -> Result<(Vec<RuleEntry>, MergeReport)> {
    if rule_type.is_text() {
        return Err(Error::InvalidInput(format!(
            "rule type {rule_type} cannot be merged"
        )));
    }

    let mut skipped = 0;
    let mut candidates = Vec::with_capacity(existing.len() + incoming.len());
    // Incoming order starts after the raw existing length so that skipped
    // existing rows never shift incoming rows in front of kept ones.
    ingest(existing, 0, true, &mut candidates, &mut skipped);
    ingest(incoming, existing.len(), false, &mut candidates, &mut skipped);

    let mut merger = Merger {
        rule_type,
        mode,
        report: MergeReport {
            skipped_empty_src: skipped,
            ..MergeReport::default()
        },
    };

    let mut existing_keys: HashSet<GroupKey> = HashSet::new();
    let mut kept: Vec<(usize, GroupKey, RuleEntry)> = Vec::new();

    let fold_groups = group_by(0..candidates.len(), |i| candidates[i].fold.as_str());
    for (fold, members) in fold_groups {
        let fold_only = rule_type == RuleType::TextPreserve
            || members.iter().any(|&i| !candidates[i].entry.case_sensitive);

        if fold_only {
            let key = GroupKey::Fold(fold.to_string());
            if members.iter().any(|&i| candidates[i].is_existing) {
                existing_keys.insert(key.clone());
            }
            let merged = merger.merge_group(&candidates, &members, &key.label());
            kept.push((candidates[members[0]].order, key, merged));
            continue;
        }

        let exact_groups = group_by(members, |i| candidates[i].entry.src.as_str());
        for (src, members) in exact_groups {
            let key = GroupKey::Exact(fold.to_string(), src.to_string());
            if members.iter().any(|&i| candidates[i].is_existing) {
                existing_keys.insert(key.clone());
            }
            let merged = merger.merge_group(&candidates, &members, &key.label());
            kept.push((candidates[members[0]].order, key, merged));
        }
    }

    kept.sort_by_key(|(order, _, _)| *order);

    let mut report = merger.report;
    report.added = kept
        .iter()
        .filter(|(_, key, _)| !existing_keys.contains(key))
        .count();

    tracing::debug!(
        kept = kept.len(),
        added = report.added,
        updated = report.updated,
        filled = report.filled,
        deduped = report.deduped,
        conflicts = report.conflicts.len(),
        "Merged rules"
    );

    let merged = kept.into_iter().map(|(_, _, entry)| entry).collect();
    Ok((merged, report))
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_case::test_case;

    fn glossary(src: &str, dst: &str) -> RuleEntry {
        RuleEntry::new(src, dst)
    }

    #[test]
    fn test_case_insensitive_collapse_overwrite() {
        let existing = vec![glossary("HP", "生命值")];
        let incoming = vec![glossary("hp", "体力")];

        let (merged, report) =
            merge(RuleType::Glossary, &existing, &incoming, MergeMode::Overwrite).unwrap();

        assert_eq!(merged, vec![glossary("hp", "体力")]);
        assert_eq!(report.added, 0);
        assert_eq!(report.updated, 1);
        assert_eq!(report.deduped, 1);
        assert_eq!(report.conflicts.len(), 1);
        assert_eq!(report.conflicts[0].key, "hp");
        assert_eq!(report.conflicts[0].field, "dst");
        assert_eq!(report.conflicts[0].existing, FieldValue::Text("生命值".into()));
        assert_eq!(report.conflicts[0].incoming, FieldValue::Text("体力".into()));
    }

    #[test]
    fn test_fill_empty_keeps_existing() {
        let existing = vec![glossary("HP", "")];
        let incoming = vec![glossary("hp", "体力"), glossary("HP", "生命")];

        let (merged, report) =
            merge(RuleType::Glossary, &existing, &incoming, MergeMode::FillEmpty).unwrap();

        assert_eq!(merged, vec![glossary("HP", "体力")]);
        assert_eq!(report.filled, 1);
        assert_eq!(report.deduped, 2);
        assert_eq!(report.conflicts.len(), 1);
        assert_eq!(report.conflicts[0].incoming, FieldValue::Text("生命".into()));
    }

    #[test]
    fn test_case_sensitive_variants_coexist() {
        let existing = vec![glossary("HP", "a").with_case_sensitive(true)];
        let incoming = vec![
            glossary("hp", "b").with_case_sensitive(true),
            glossary("HP", "c").with_case_sensitive(true),
        ];

        let (merged, report) =
            merge(RuleType::Glossary, &existing, &incoming, MergeMode::Overwrite).unwrap();

        let pairs: Vec<_> = merged.iter().map(|r| (r.src.as_str(), r.dst.as_str())).collect();
        assert_eq!(pairs, vec![("HP", "c"), ("hp", "b")]);
        assert_eq!(report.added, 1);
        assert_eq!(report.deduped, 1);
        assert_eq!(report.conflicts[0].key, "hp::HP");
    }

    #[test]
    fn test_text_preserve_ignores_case_sensitivity() {
        let existing = vec![RuleEntry::new("Tag", "").with_case_sensitive(true)];
        let incoming = vec![RuleEntry::new("TAG", "").with_case_sensitive(true)];

        let (merged, report) =
            merge(RuleType::TextPreserve, &existing, &incoming, MergeMode::Overwrite).unwrap();

        assert_eq!(merged.len(), 1);
        assert_eq!(merged[0].src, "TAG");
        assert_eq!(report.deduped, 1);
        assert!(report.conflicts.is_empty());
    }

    #[test]
    fn test_empty_src_skipped_and_order_stable() {
        let existing = vec![glossary("  ", "x"), glossary("A", "1"), glossary("B", "2")];
        let incoming = vec![glossary("C", "3"), glossary("", "y"), glossary("a", "4")];

        let (merged, report) =
            merge(RuleType::Glossary, &existing, &incoming, MergeMode::Overwrite).unwrap();

        let srcs: Vec<_> = merged.iter().map(|r| r.src.as_str()).collect();
        assert_eq!(srcs, vec!["a", "B", "C"]);
        assert_eq!(report.skipped_empty_src, 2);
        assert_eq!(report.added, 1);
    }

    #[test]
    fn test_overwrite_may_clear_text_without_conflict() {
        let existing = vec![glossary("HP", "生命值").with_info("stat")];
        let incoming = vec![glossary("HP", "")];

        let (merged, report) =
            merge(RuleType::Glossary, &existing, &incoming, MergeMode::Overwrite).unwrap();

        assert_eq!(merged[0].dst, "");
        assert_eq!(merged[0].info, "");
        assert!(report.conflicts.is_empty());
        assert_eq!(report.updated, 1);
    }

    #[test]
    fn test_fill_empty_reports_but_keeps_flags() {
        let existing = vec![RuleEntry::new("a+", "b").with_regex(true)];
        let incoming = vec![RuleEntry::new("A+", "")];

        let (merged, report) = merge(
            RuleType::PreReplacement,
            &existing,
            &incoming,
            MergeMode::FillEmpty,
        )
        .unwrap();

        assert!(merged[0].regex);
        assert_eq!(report.filled, 0);
        assert_eq!(report.conflicts.len(), 1);
        assert_eq!(report.conflicts[0].field, "regex");
    }

    #[test]
    fn test_overwrite_flag_change_is_conflict() {
        let existing = vec![RuleEntry::new("x", "y")];
        let incoming = vec![RuleEntry::new("x", "y").with_regex(true)];

        let (merged, report) = merge(
            RuleType::PostReplacement,
            &existing,
            &incoming,
            MergeMode::Overwrite,
        )
        .unwrap();

        assert!(merged[0].regex);
        assert_eq!(report.updated, 1);
        assert_eq!(report.conflicts[0].existing, FieldValue::Flag(false));
    }

    #[test_case("STRASSE", "straße" ; "sharp s")]
    #[test_case("ΣΑΣ", "σας" ; "final sigma")]
    #[test_case("FILE", "ﬁle" ; "ligature")]
    fn test_full_case_folding_collapses(existing_src: &str, incoming_src: &str) {
        let existing = vec![glossary(existing_src, "a")];
        let incoming = vec![glossary(incoming_src, "b")];

        let (merged, report) =
            merge(RuleType::Glossary, &existing, &incoming, MergeMode::Overwrite).unwrap();

        assert_eq!(merged, vec![glossary(incoming_src, "b")]);
        assert_eq!(report.deduped, 1);
        assert_eq!(report.added, 0);
        assert_eq!(fold_key(existing_src), fold_key(incoming_src));
    }

    #[test_case(RuleType::CustomPromptZh)]
    #[test_case(RuleType::CustomPromptEn)]
    fn test_text_types_rejected(rule_type: RuleType) {
        assert!(matches!(
            merge(rule_type, &[], &[], MergeMode::Overwrite),
            Err(Error::InvalidInput(_))
        ));
    }

    #[test]
    fn test_conflict_serializes_plain_values() {
        let conflict = Conflict {
            rule_type: RuleType::Glossary,
            key: "hp".into(),
            field: "case_sensitive",
            existing: FieldValue::Flag(false),
            incoming: FieldValue::Flag(true),
        };
        let json = serde_json::to_value(&conflict).unwrap();
        assert_eq!(json["rule_type"], "GLOSSARY");
        assert_eq!(json["existing"], false);
    }
}
