//! Line-based three-way merge.
//!
//! Uses the `diffy` crate to merge a base, "ours" (the simulation branch) and
//! "theirs" (the incoming branch) version of a file. Backs the in-memory
//! gateway, and resolves conflict markers one-sidedly for forced merges.

use tracing::debug;

use super::extractor::{scan_conflict_regions, ConflictRegion};
use crate::config::ResolutionPolicy;

/// The result of a three-way merge attempt.
#[derive(Debug, Clone)]
pub struct MergeResult {
    /// The merged content (contains conflict markers if `has_conflicts`).
    pub merged_content: String,
    /// Whether the merge produced conflicts.
    pub has_conflicts: bool,
    /// Locations of conflict regions within the merged content.
    pub conflict_regions: Vec<ConflictRegion>,
}

impl MergeResult {
    fn clean(content: &str) -> Self {
        Self {
            merged_content: content.to_string(),
            has_conflicts: false,
            conflict_regions: Vec::new(),
        }
    }
}

/// Stateless three-way merge engine.
pub struct Merger;

impl Merger {
    /// Merge `ours` and `theirs` against their common `base`.
    pub fn three_way_merge(base: &str, ours: &str, theirs: &str) -> MergeResult {
        // Fast paths: one side untouched, or both made the same change.
        if ours == base || ours == theirs {
            return MergeResult::clean(theirs);
        }
        if theirs == base {
            return MergeResult::clean(ours);
        }

        match diffy::merge(base, ours, theirs) {
            Ok(merged) => {
                debug!("clean three-way merge");
                MergeResult::clean(&merged)
            }
            Err(conflicted) => {
                let conflict_regions = scan_conflict_regions(&conflicted);
                debug!(regions = conflict_regions.len(), "three-way merge conflicted");
                MergeResult {
                    merged_content: conflicted,
                    has_conflicts: true,
                    conflict_regions,
                }
            }
        }
    }

    /// Merge and resolve every conflict region toward one side.
    pub fn forced_merge(base: &str, ours: &str, theirs: &str, policy: ResolutionPolicy) -> String {
        let result = Self::three_way_merge(base, ours, theirs);
        if result.has_conflicts {
            resolve_markers(&result.merged_content, policy)
        } else {
            result.merged_content
        }
    }
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum Section {
    Outside,
    Ours,
    Base,
    Theirs,
}

/// Replace each conflict region with the section `policy` prefers.
///
/// Understands both two-way (`<<<<<<<`/`=======`/`>>>>>>>`) and diff3
/// (`|||||||` base section) marker styles.
pub fn resolve_markers(content: &str, policy: ResolutionPolicy) -> String {
    let keep = match policy {
        ResolutionPolicy::PreferBase => Section::Ours,
        ResolutionPolicy::PreferIncoming => Section::Theirs,
    };

    let mut out = String::with_capacity(content.len());
    let mut section = Section::Outside;
    for line in content.split_inclusive('\n') {
        let section_before = section;
        section = match (section, line) {
            (Section::Outside, l) if l.starts_with("<<<<<<<") => Section::Ours,
            (Section::Ours, l) if l.starts_with("|||||||") => Section::Base,
            (Section::Ours | Section::Base, l) if l.starts_with("=======") => Section::Theirs,
            (Section::Theirs, l) if l.starts_with(">>>>>>>") => Section::Outside,
            (current, _) => current,
        };
        let is_marker = section != section_before;
        if !is_marker && (section == Section::Outside || section == keep) {
            out.push_str(line);
        }
    }
    out
}
