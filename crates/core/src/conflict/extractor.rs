//! Conflict signal extraction.
//!
//! Two inputs produce a [`ConflictSignal`]:
//!
//! - **Trial-merge path** ([`extract_from_unresolved`]): the gateway reports
//!   which files were left unresolved and we scan their contents. This is
//!   the normalized, high-fidelity path.
//! - **Comparison path** ([`extract_from_comparison`]): raw text of a
//!   three-way merge preview (`git merge-tree <base> <ours> <theirs>`),
//!   scraped for conflict markers and `changed in both` sections. Format
//!   drift across VCS versions is expected here, so extraction never fails:
//!   anything the strict parser rejects becomes a zero signal.

use std::collections::BTreeSet;
use std::sync::OnceLock;

use regex_lite::Regex;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::errors::ExtractError;

const START_MARKER: &str = "<<<<<<<";
const END_MARKER: &str = ">>>>>>>";

/// Section headers of a merge preview that list files changed on both sides.
const BOTH_SIDES_HEADERS: [&str; 2] = ["changed in both", "added in both"];

// ---------------------------------------------------------------------------
// Types
// ---------------------------------------------------------------------------

/// Structured conflict signal of one merge comparison or trial merge.
///
/// Invariant: `conflict_line_count >= conflict_block_count`, since every
/// counted block contributes at least its two delimiter lines.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConflictSignal {
    pub conflict_block_count: u32,
    pub conflict_line_count: u32,
    pub touched_file_count: u32,
}

impl ConflictSignal {
    /// The signal of a clean comparison.
    pub const CLEAN: Self = Self {
        conflict_block_count: 0,
        conflict_line_count: 0,
        touched_file_count: 0,
    };

    pub fn is_clean(&self) -> bool {
        *self == Self::CLEAN
    }

    /// Structured text describing the counts, sent to the advisory oracle.
    pub fn describe(&self) -> String {
        format!(
            "conflict_block_count: {}\nconflict_line_count: {}\ntouched_file_count: {}",
            self.conflict_block_count, self.conflict_line_count, self.touched_file_count
        )
    }
}

impl std::fmt::Display for ConflictSignal {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} blocks / {} lines / {} files",
            self.conflict_block_count, self.conflict_line_count, self.touched_file_count
        )
    }
}

/// A complete conflict region, 1-indexed and inclusive of both markers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConflictRegion {
    pub start_line: usize,
    pub end_line: usize,
}

impl ConflictRegion {
    pub fn line_count(&self) -> usize {
        self.end_line - self.start_line + 1
    }
}

/// A file the gateway reported as unresolved after a trial merge.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnresolvedFile {
    pub path: String,
    pub content: String,
}

// ---------------------------------------------------------------------------
// Region scanning
// ---------------------------------------------------------------------------

/// How conflict markers appear in the scanned text.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum MarkerForm {
    /// Working-tree file contents: markers start at column 0.
    File,
    /// Merge-preview hunks: markers may carry one diff sign (`+<<<<<<< .our`).
    Diff,
}

impl MarkerForm {
    fn starts_with(self, line: &str, marker: &str) -> bool {
        match self {
            MarkerForm::File => line.starts_with(marker),
            MarkerForm::Diff => {
                let body = match line.as_bytes().first() {
                    Some(b'+' | b' ' | b'-') => &line[1..],
                    _ => line,
                };
                line.starts_with(marker) || body.starts_with(marker)
            }
        }
    }
}

/// Find every complete `<<<<<<<` .. `>>>>>>>` region in file contents.
///
/// An unterminated region contributes nothing. A start marker inside an open
/// region restarts it, and an end marker with no open region is ignored.
pub fn scan_conflict_regions(text: &str) -> Vec<ConflictRegion> {
    scan_regions(text, MarkerForm::File)
}

/// Like [`scan_conflict_regions`], for merge-preview text whose marker lines
/// may be prefixed with a diff sign.
pub fn scan_comparison_regions(text: &str) -> Vec<ConflictRegion> {
    scan_regions(text, MarkerForm::Diff)
}

fn scan_regions(text: &str, form: MarkerForm) -> Vec<ConflictRegion> {
    let mut regions = Vec::new();
    let mut open: Option<usize> = None;

    for (idx, line) in text.lines().enumerate() {
        let line_no = idx + 1;
        if form.starts_with(line, START_MARKER) {
            open = Some(line_no);
        } else if form.starts_with(line, END_MARKER) {
            if let Some(start_line) = open.take() {
                regions.push(ConflictRegion {
                    start_line,
                    end_line: line_no,
                });
            }
        }
    }

    if let Some(start_line) = open {
        debug!(start_line, "ignoring unterminated conflict region");
    }
    regions
}

/// Number of complete conflict regions in merge-preview `text`.
pub fn count_conflict_blocks(text: &str) -> u32 {
    saturating_u32(scan_comparison_regions(text).len())
}

/// Total lines spanned by complete conflict regions in merge-preview `text`.
pub fn conflict_line_count(text: &str) -> u32 {
    saturating_u32(
        scan_comparison_regions(text)
            .iter()
            .map(ConflictRegion::line_count)
            .sum(),
    )
}

fn saturating_u32(n: usize) -> u32 {
    u32::try_from(n).unwrap_or(u32::MAX)
}

// ---------------------------------------------------------------------------
// Trial-merge path
// ---------------------------------------------------------------------------

/// Build a signal from the files a trial merge left unresolved.
///
/// `touched_file_count` is the number of unresolved files, even those
/// without markers (e.g. modify/delete conflicts).
pub fn extract_from_unresolved(files: &[UnresolvedFile]) -> ConflictSignal {
    let mut signal = ConflictSignal {
        touched_file_count: saturating_u32(files.len()),
        ..ConflictSignal::CLEAN
    };
    for file in files {
        let regions = scan_conflict_regions(&file.content);
        let lines: usize = regions.iter().map(ConflictRegion::line_count).sum();
        signal.conflict_block_count = signal
            .conflict_block_count
            .saturating_add(saturating_u32(regions.len()));
        signal.conflict_line_count = signal
            .conflict_line_count
            .saturating_add(saturating_u32(lines));
    }
    debug!(%signal, "extracted signal from unresolved files");
    signal
}

// ---------------------------------------------------------------------------
// Comparison path
// ---------------------------------------------------------------------------

fn entry_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"^\s+(base|our|their)\s+[0-7]{6}\s+[0-9a-fA-F]+\s+(.+)$")
            .expect("entry pattern is valid")
    })
}

/// Strictly parse a merge-preview text.
///
/// Fails when a both-sides section header has no parseable entry, or when
/// the text has conflict regions but no both-sides section at all.
pub fn parse_comparison(text: &str) -> Result<ConflictSignal, ExtractError> {
    let regions = scan_comparison_regions(text);
    let mut paths = BTreeSet::new();
    let mut saw_section = false;
    let mut lines = text.lines().peekable();

    while let Some(line) = lines.next() {
        if !BOTH_SIDES_HEADERS.contains(&line.trim_end()) {
            continue;
        }
        saw_section = true;
        let mut entries = 0;
        while let Some(&next) = lines.peek() {
            let Some(caps) = entry_regex().captures(next) else {
                break;
            };
            paths.insert(caps[2].trim().to_string());
            entries += 1;
            lines.next();
        }
        if entries == 0 {
            return Err(ExtractError::MalformedComparisonText(format!(
                "section '{}' lists no files",
                line.trim_end()
            )));
        }
    }

    if regions.is_empty() {
        return Ok(ConflictSignal::CLEAN);
    }
    if !saw_section {
        return Err(ExtractError::MalformedComparisonText(format!(
            "{} conflict regions outside any both-sides section",
            regions.len()
        )));
    }

    Ok(ConflictSignal {
        conflict_block_count: saturating_u32(regions.len()),
        conflict_line_count: saturating_u32(
            regions.iter().map(ConflictRegion::line_count).sum(),
        ),
        touched_file_count: saturating_u32(paths.len()),
    })
}

/// Build a signal from merge-preview text. Never fails.
///
/// Text the strict parser rejects yields [`ConflictSignal::CLEAN`].
pub fn extract_from_comparison(text: &str) -> ConflictSignal {
    match parse_comparison(text) {
        Ok(signal) => {
            debug!(%signal, "extracted signal from comparison text");
            signal
        }
        Err(e) => {
            warn!(error = %e, "treating comparison as clean");
            ConflictSignal::CLEAN
        }
    }
}
