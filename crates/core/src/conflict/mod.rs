//! Conflict signal extraction and three-way merging.
//!
//! The conflict subsystem is responsible for:
//! 1. **Extraction** -- turning merge output into a [`ConflictSignal`].
//! 2. **Merging** -- line-based three-way merges with conflict markers, and
//!    one-sided marker resolution for forced merges.

pub mod extractor;
pub mod merger;

pub use extractor::{
    conflict_line_count, count_conflict_blocks, extract_from_comparison, extract_from_unresolved,
    parse_comparison, scan_comparison_regions, scan_conflict_regions, ConflictRegion,
    ConflictSignal, UnresolvedFile,
};
pub use merger::{resolve_markers, MergeResult, Merger};
