//! Line-level diff engine
//!
//! Computes a minimal line edit script between two texts (Myers) and renders
//! it as conventional unified-diff hunks. The engine is a pure function of
//! its inputs: the same pair of texts always yields the same [`DiffResult`].

use serde::{Deserialize, Serialize};
use similar::{Algorithm, ChangeTag, DiffTag, TextDiff};
use std::fmt::Write as _;
use std::ops::Range;

/// Type of change for a line
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LineChange {
    /// Line exists in both texts
    Context,
    /// Line only exists in the new text
    Added,
    /// Line only exists in the old text
    Removed,
}

impl LineChange {
    /// Unified-diff line prefix
    #[inline]
    #[must_use]
    pub const fn prefix(self) -> char {
        match self {
            Self::Context => ' ',
            Self::Added => '+',
            Self::Removed => '-',
        }
    }
}

/// A single line in a hunk
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiffLine {
    /// Change type
    pub change: LineChange,
    /// Line content without its line terminator
    pub content: String,
    /// 1-based line number in the old text
    pub old_line: Option<usize>,
    /// 1-based line number in the new text
    pub new_line: Option<usize>,
    /// Last line of its text, with no line terminator
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub missing_newline: bool,
}

/// A contiguous block of changed lines plus surrounding context
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiffHunk {
    /// Starting line in the old text (0 when the old range is empty)
    pub old_start: usize,
    /// Number of old lines covered
    pub old_len: usize,
    /// Starting line in the new text (0 when the new range is empty)
    pub new_start: usize,
    /// Number of new lines covered
    pub new_len: usize,
    /// Lines in this hunk
    pub lines: Vec<DiffLine>,
}

impl DiffHunk {
    fn new(old: Range<usize>, new: Range<usize>, lines: Vec<DiffLine>) -> Self {
        Self {
            old_start: unified_start(&old),
            old_len: old.len(),
            new_start: unified_start(&new),
            new_len: new.len(),
            lines,
        }
    }

    /// `@@ -a,b +c,d @@` header
    #[must_use]
    pub fn header(&self) -> String {
        format!(
            "@@ -{},{} +{},{} @@",
            self.old_start, self.old_len, self.new_start, self.new_len
        )
    }
}

// Unified convention: an empty range starts at the line before it
fn unified_start(range: &Range<usize>) -> usize {
    if range.is_empty() {
        range.start
    } else {
        range.start + 1
    }
}

/// Addition/deletion counts
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiffSummary {
    /// Lines added
    pub additions: usize,
    /// Lines deleted
    pub deletions: usize,
}

impl DiffSummary {
    /// Total changed lines
    #[inline]
    #[must_use]
    pub const fn total_changes(&self) -> usize {
        self.additions + self.deletions
    }
}

/// A run of consecutive added or removed lines
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChangeBlock {
    /// `Added` or `Removed`
    pub kind: LineChange,
    /// Line contents
    pub lines: Vec<String>,
}

/// Result of comparing two texts
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiffResult {
    /// Label of the old side (`---` header)
    pub old_label: String,
    /// Label of the new side (`+++` header)
    pub new_label: String,
    /// Hunks in line order
    pub hunks: Vec<DiffHunk>,
    /// Number of added lines
    pub additions: usize,
    /// Number of removed lines
    pub deletions: usize,
}

impl DiffResult {
    /// True when the texts are line-identical
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.hunks.is_empty()
    }

    /// Structured `{additions, deletions}` summary
    #[inline]
    #[must_use]
    pub fn summary(&self) -> DiffSummary {
        DiffSummary {
            additions: self.additions,
            deletions: self.deletions,
        }
    }

    /// Iterate over every line of every hunk
    pub fn lines(&self) -> impl Iterator<Item = &DiffLine> {
        self.hunks.iter().flat_map(|h| h.lines.iter())
    }

    /// Group changed lines into runs of the same kind
    #[must_use]
    pub fn changes(&self) -> Vec<ChangeBlock> {
        let mut blocks: Vec<ChangeBlock> = Vec::new();
        let mut previous = LineChange::Context;

        for line in self.lines() {
            if line.change == LineChange::Context {
                previous = LineChange::Context;
                continue;
            }
            match blocks.last_mut() {
                Some(block) if previous == line.change => block.lines.push(line.content.clone()),
                _ => blocks.push(ChangeBlock {
                    kind: line.change,
                    lines: vec![line.content.clone()],
                }),
            }
            previous = line.change;
        }

        blocks
    }

    /// Render as unified diff text
    ///
    /// Identical inputs render as an empty string. A final line without a
    /// terminator is followed by `\ No newline at end of file`.
    #[must_use]
    pub fn to_unified(&self) -> String {
        if self.is_empty() {
            return String::new();
        }

        let mut out = String::new();
        let _ = writeln!(out, "--- {}", self.old_label);
        let _ = writeln!(out, "+++ {}", self.new_label);
        for hunk in &self.hunks {
            out.push_str(&hunk.header());
            out.push('\n');
            for line in &hunk.lines {
                out.push(line.change.prefix());
                out.push_str(&line.content);
                out.push('\n');
                if line.missing_newline {
                    out.push_str("\\ No newline at end of file\n");
                }
            }
        }
        out
    }
}

/// Configuration for the diff engine
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DiffConfig {
    /// Number of unchanged lines kept around each change
    pub context_lines: usize,
}

impl Default for DiffConfig {
    fn default() -> Self {
        Self { context_lines: 3 }
    }
}

/// Myers line diff engine
#[derive(Debug, Clone, Copy, Default)]
pub struct DiffEngine {
    config: DiffConfig,
}

impl DiffEngine {
    /// Create engine with default config (3 context lines)
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Create with custom config
    #[inline]
    #[must_use]
    pub fn with_config(config: DiffConfig) -> Self {
        Self { config }
    }

    /// Compare two texts using `a` / `b` as header labels
    #[must_use]
    pub fn compare(&self, old: &str, new: &str) -> DiffResult {
        self.compare_labeled("a", old, "b", new)
    }

    /// Compare two texts with explicit header labels
    #[must_use]
    pub fn compare_labeled(
        &self,
        old_label: &str,
        old: &str,
        new_label: &str,
        new: &str,
    ) -> DiffResult {
        let diff = TextDiff::configure()
            .algorithm(Algorithm::Myers)
            .diff_lines(old, new);

        let mut hunks = Vec::new();
        let mut additions = 0;
        let mut deletions = 0;

        for group in diff.grouped_ops(self.config.context_lines) {
            if group.iter().all(|op| op.tag() == DiffTag::Equal) {
                continue;
            }
            let (Some(first), Some(last)) = (group.first(), group.last()) else {
                continue;
            };
            let old_range = first.old_range().start..last.old_range().end;
            let new_range = first.new_range().start..last.new_range().end;

            let mut lines = Vec::new();
            for op in &group {
                for change in diff.iter_changes(op) {
                    let kind = match change.tag() {
                        ChangeTag::Equal => LineChange::Context,
                        ChangeTag::Insert => {
                            additions += 1;
                            LineChange::Added
                        }
                        ChangeTag::Delete => {
                            deletions += 1;
                            LineChange::Removed
                        }
                    };
                    lines.push(DiffLine {
                        change: kind,
                        content: strip_line_ending(change.value()).to_string(),
                        old_line: change.old_index().map(|i| i + 1),
                        new_line: change.new_index().map(|i| i + 1),
                        missing_newline: change.missing_newline(),
                    });
                }
            }

            hunks.push(DiffHunk::new(old_range, new_range, lines));
        }

        DiffResult {
            old_label: old_label.to_string(),
            new_label: new_label.to_string(),
            hunks,
            additions,
            deletions,
        }
    }
}

fn strip_line_ending(line: &str) -> &str {
    let line = line.strip_suffix('\n').unwrap_or(line);
    line.strip_suffix('\r').unwrap_or(line)
}
