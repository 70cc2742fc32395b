//! Logical document identity derived from `<first>_<last>_Stage<N>.pdf`.

use regex::Regex;
use std::sync::OnceLock;

use crate::db::{Stage, Submission};

fn stage_suffix() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?i)_Stage(\d+)\.pdf$").unwrap())
}

fn staged_name() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?i)^(.+)_Stage\d+\.pdf$").unwrap())
}

fn pdf_extension() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?i)\.pdf$").unwrap())
}

/// Strips the stage suffix. Two filenames with the same base identity are
/// versions of the same document.
pub fn base_identity(filename: &str) -> String {
    stage_suffix().replace(filename, "").into_owned()
}

/// Stage encoded in the filename, if it follows the naming contract.
pub fn stage_of(filename: &str) -> Option<Stage> {
    stage_suffix()
        .captures(filename)
        .and_then(|c| c.get(1))
        .and_then(|n| n.as_str().parse::<u32>().ok())
        .and_then(Stage::from_number)
}

/// Swaps the stage suffix, keeping the base identity.
///
/// Names that do not follow the contract are repaired instead of rejected:
/// the stage goes in front of a `.pdf` extension, or `_<Stage>.pdf` is
/// appended when there is none.
pub fn rename_for_stage(filename: &str, stage: Stage) -> String {
    if let Some(base) = staged_name().captures(filename).and_then(|c| c.get(1)) {
        return format!("{}_{}.pdf", base.as_str(), stage);
    }
    if pdf_extension().is_match(filename) {
        let replacement = format!("_{}.pdf", stage);
        return pdf_extension()
            .replace(filename, replacement.as_str())
            .into_owned();
    }
    format!("{}_{}.pdf", filename, stage)
}

/// `Mary  Jo ` -> `mary_jo`.
pub fn normalize_name(name: &str) -> String {
    name.split_whitespace()
        .collect::<Vec<_>>()
        .join("_")
        .trim_matches('_')
        .to_lowercase()
}

pub fn submission_filename(owner: &str, stage: Stage) -> String {
    format!("{}_{}.pdf", normalize_name(owner), stage)
}

/// Owner encoded in the first two segments of the base identity.
pub fn owner_from_filename(filename: &str) -> String {
    let base = base_identity(filename);
    let base = pdf_extension().replace(&base, "");
    base.split('_').take(2).collect::<Vec<_>>().join("_")
}

pub fn owner_of(record: &Submission) -> String {
    record
        .owner
        .clone()
        .filter(|o| !o.trim().is_empty())
        .unwrap_or_else(|| owner_from_filename(&record.filename))
}

/// Whether the filename suffix agrees with the record's stage.
pub fn is_consistent(record: &Submission) -> bool {
    stage_of(&record.filename) == Some(record.stage)
}
