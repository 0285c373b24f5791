//! XLSX rule sheets.
//!
//! One rule per row in the first worksheet, five columns:
//! `src`, `dst`, `info`, `regex`, `case_sensitive`. An optional header row
//! carrying those names is skipped on import and always written on export.

use crate::models::RuleEntry;
use crate::{Error, Result};
use calamine::{Data, Reader, Xlsx, XlsxError, open_workbook};
use rust_xlsxwriter::{Format, FormatAlign, Workbook};
use std::path::{Path, PathBuf};

/// Column headers, in sheet order.
pub const HEADERS: [&str; 5] = ["src", "dst", "info", "regex", "case_sensitive"];

const COLUMN_WIDTH: f64 = 24.0;
const FONT_SIZE: f64 = 10.0;

/// Reads rule entries from the first worksheet of an `.xlsx` file.
///
/// Cells are trimmed; a flag is set only when its cell reads `true`
/// (any case). Rows with an empty `src` are dropped.
///
/// # Errors
///
/// Returns [`Error::Storage`] if the file cannot be read, or
/// [`Error::InvalidInput`] if it is not a readable workbook.
pub fn load_rules_from_xlsx(path: &Path) -> Result<Vec<RuleEntry>> {
    let mut workbook: Xlsx<_> = open_workbook(path).map_err(|e| sheet_error(path, e))?;
    let Some(range) = workbook.worksheet_range_at(0) else {
        return Ok(Vec::new());
    };
    let range = range.map_err(|e| sheet_error(path, e))?;
    let Some((last_row, _)) = range.end() else {
        return Ok(Vec::new());
    };

    let mut rules = Vec::new();
    for row in 0..=last_row {
        let [src, dst, info, regex, case_sensitive] =
            [0u32, 1, 2, 3, 4].map(|col| cell(range.get_value((row, col))));

        if src == HEADERS[0] && dst == HEADERS[1] {
            continue;
        }
        if src.is_empty() {
            continue;
        }

        rules.push(
            RuleEntry::new(src, dst)
                .with_info(info)
                .with_regex(regex.eq_ignore_ascii_case("true"))
                .with_case_sensitive(case_sensitive.eq_ignore_ascii_case("true")),
        );
    }

    tracing::debug!(path = %path.display(), count = rules.len(), "Loaded rule sheet");
    Ok(rules)
}

/// Writes `rules` to `path_base` with its extension replaced by `.xlsx`
/// and returns the written path.
///
/// # Errors
///
/// Returns [`Error::Storage`] if the workbook cannot be built or saved.
pub fn export_rules_to_xlsx(path_base: &Path, rules: &[RuleEntry]) -> Result<PathBuf> {
    let path = path_base.with_extension("xlsx");
    let mut workbook = Workbook::new();
    let format = Format::new()
        .set_font_size(FONT_SIZE)
        .set_text_wrap()
        .set_align(FormatAlign::Left)
        .set_align(FormatAlign::VerticalCenter);

    let sheet = workbook.add_worksheet();
    for (col, header) in (0u16..).zip(HEADERS) {
        sheet.set_column_width(col, COLUMN_WIDTH).map_err(write_error)?;
        sheet
            .write_string_with_format(0, col, header, &format)
            .map_err(write_error)?;
    }

    for (row, rule) in (1u32..).zip(rules) {
        sheet
            .write_string_with_format(row, 0, &rule.src, &format)
            .map_err(write_error)?
            .write_string_with_format(row, 1, &rule.dst, &format)
            .map_err(write_error)?
            .write_string_with_format(row, 2, &rule.info, &format)
            .map_err(write_error)?
            .write_boolean_with_format(row, 3, rule.regex, &format)
            .map_err(write_error)?
            .write_boolean_with_format(row, 4, rule.case_sensitive, &format)
            .map_err(write_error)?;
    }

    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent).map_err(|e| Error::Storage {
            operation: "export_rules".to_string(),
            cause: format!("{}: {e}", parent.display()),
        })?;
    }
    workbook.save(&path).map_err(|e| Error::Storage {
        operation: "export_rules".to_string(),
        cause: format!("{}: {e}", path.display()),
    })?;

    tracing::info!(path = %path.display(), count = rules.len(), "Exported rule sheet");
    Ok(path)
}

fn cell(value: Option<&Data>) -> String {
    match value {
        None | Some(Data::Empty) => String::new(),
        Some(Data::String(s)) => s.trim().to_string(),
        Some(other) => other.to_string().trim().to_string(),
    }
}

fn sheet_error(path: &Path, e: XlsxError) -> Error {
    match e {
        XlsxError::Io(e) => Error::Storage {
            operation: "read_rule_file".to_string(),
            cause: format!("{}: {e}", path.display()),
        },
        other => Error::InvalidInput(format!("invalid rule sheet {}: {other}", path.display())),
    }
}

fn write_error(e: rust_xlsxwriter::XlsxError) -> Error {
    Error::Storage {
        operation: "export_rules".to_string(),
        cause: e.to_string(),
    }
}
