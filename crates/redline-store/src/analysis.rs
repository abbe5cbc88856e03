//! Persisted analysis results
//!
//! The pipeline summarizes each completed run into an [`AnalysisResult`]
//! which is attached to the version exactly once. Stage payloads are kept
//! as opaque JSON; only the counts in [`AnalysisSummary`] look inside them.

use chrono::{DateTime, Utc};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt;

/// Why a stage produced no output
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StageErrorKind {
    /// Stage reported a failure
    Failed,
    /// Stage returned output it could not stand behind
    MalformedOutput,
    /// Stage exceeded its time budget
    Timeout,
    /// Stage panicked
    Panicked,
}

impl fmt::Display for StageErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Failed => "failed",
            Self::MalformedOutput => "malformed_output",
            Self::Timeout => "timeout",
            Self::Panicked => "panicked",
        };
        f.write_str(name)
    }
}

/// Error recorded inline for one stage
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StageErrorRecord {
    /// Stage name
    pub stage: String,
    /// Failure classification
    pub kind: StageErrorKind,
    /// Human-readable message
    pub message: String,
    /// When the failure was recorded
    pub timestamp: DateTime<Utc>,
}

/// How a stage attempt ended
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StageStatus {
    /// Stage ran and produced output
    Succeeded,
    /// Output came from the transformation cache
    Cached,
    /// Stage produced no output
    Failed,
}

impl StageStatus {
    /// Output is present for this stage
    #[inline]
    #[must_use]
    pub const fn has_output(self) -> bool {
        matches!(self, Self::Succeeded | Self::Cached)
    }
}

/// Per-stage breakdown entry
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StageOutcome {
    /// Stage name
    pub stage: String,
    /// Result of the attempt
    pub status: StageStatus,
    /// Wall-clock time of the attempt
    pub duration_ms: u64,
}

/// Counts-only view of an analysis
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnalysisSummary {
    /// Stages with output (fresh or cached)
    pub stages_succeeded: usize,
    /// Stages that recorded an error
    pub stages_failed: usize,
    /// Items produced by each stage
    pub items_per_stage: BTreeMap<String, usize>,
    /// Items per `severity` value
    pub by_severity: BTreeMap<String, usize>,
    /// Items with severity `critical`
    pub critical: usize,
    /// Items with severity `high`
    pub high: usize,
    /// Items carrying a `suggested_edit`
    pub suggested_edits: usize,
    /// Any stage error was recorded
    pub has_errors: bool,
}

impl AnalysisSummary {
    /// Summarize stage outputs and outcomes
    #[must_use]
    pub fn compute(
        outputs: &IndexMap<String, Value>,
        outcomes: &[StageOutcome],
        errors: &[StageErrorRecord],
    ) -> Self {
        let mut summary = Self {
            stages_succeeded: outcomes.iter().filter(|o| o.status.has_output()).count(),
            stages_failed: outcomes
                .iter()
                .filter(|o| o.status == StageStatus::Failed)
                .count(),
            has_errors: !errors.is_empty(),
            ..Self::default()
        };

        for (stage, output) in outputs {
            let items: &[Value] = match output {
                Value::Array(items) => items,
                Value::Null => &[],
                other => std::slice::from_ref(other),
            };
            summary.items_per_stage.insert(stage.clone(), items.len());

            for item in items {
                if let Some(severity) = item.get("severity").and_then(Value::as_str) {
                    *summary
                        .by_severity
                        .entry(severity.to_ascii_lowercase())
                        .or_default() += 1;
                }
                if item.get("suggested_edit").is_some_and(|e| !e.is_null()) {
                    summary.suggested_edits += 1;
                }
            }
        }

        summary.critical = summary.by_severity.get("critical").copied().unwrap_or(0);
        summary.high = summary.by_severity.get("high").copied().unwrap_or(0);
        summary
    }

    /// Total items across stages
    #[inline]
    #[must_use]
    pub fn total_items(&self) -> usize {
        self.items_per_stage.values().sum()
    }
}

/// Summarized pipeline run attached to a version
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalysisResult {
    /// Stage outputs in execution order
    pub outputs: IndexMap<String, Value>,
    /// Per-stage breakdown
    pub outcomes: Vec<StageOutcome>,
    /// Recorded stage errors
    pub errors: Vec<StageErrorRecord>,
    /// Run start
    pub started_at: DateTime<Utc>,
    /// Run completion
    pub completed_at: DateTime<Utc>,
    /// Counts
    pub summary: AnalysisSummary,
}

impl AnalysisResult {
    /// Build result and compute its summary
    #[must_use]
    pub fn new(
        outputs: IndexMap<String, Value>,
        outcomes: Vec<StageOutcome>,
        errors: Vec<StageErrorRecord>,
        started_at: DateTime<Utc>,
        completed_at: DateTime<Utc>,
    ) -> Self {
        let summary = AnalysisSummary::compute(&outputs, &outcomes, &errors);
        Self {
            outputs,
            outcomes,
            errors,
            started_at,
            completed_at,
            summary,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn outcome(stage: &str, status: StageStatus) -> StageOutcome {
        StageOutcome {
            stage: stage.to_string(),
            status,
            duration_ms: 1,
        }
    }

    #[test]
    fn summary_counts_findings_by_severity() {
        let mut outputs = IndexMap::new();
        outputs.insert(
            "review".to_string(),
            json!([
                {"severity": "critical", "suggested_edit": "cap at 1x"},
                {"severity": "High"},
                {"severity": "high", "suggested_edit": null},
                {"note": "no severity"}
            ]),
        );
        outputs.insert("rationale".to_string(), json!({"text": "one object"}));
        outputs.insert("empty".to_string(), Value::Null);

        let outcomes = vec![
            outcome("review", StageStatus::Succeeded),
            outcome("rationale", StageStatus::Cached),
            outcome("empty", StageStatus::Succeeded),
            outcome("edit", StageStatus::Failed),
        ];
        let errors = vec![StageErrorRecord {
            stage: "edit".to_string(),
            kind: StageErrorKind::Timeout,
            message: "timed out".to_string(),
            timestamp: Utc::now(),
        }];

        let summary = AnalysisSummary::compute(&outputs, &outcomes, &errors);

        assert_eq!(summary.stages_succeeded, 3);
        assert_eq!(summary.stages_failed, 1);
        assert_eq!(summary.items_per_stage["review"], 4);
        assert_eq!(summary.items_per_stage["rationale"], 1);
        assert_eq!(summary.items_per_stage["empty"], 0);
        assert_eq!(summary.critical, 1);
        assert_eq!(summary.high, 2);
        assert_eq!(summary.suggested_edits, 1);
        assert_eq!(summary.total_items(), 5);
        assert!(summary.has_errors);
    }

    #[test]
    fn empty_run_has_empty_summary() {
        let summary = AnalysisSummary::compute(&IndexMap::new(), &[], &[]);
        assert_eq!(summary, AnalysisSummary::default());
    }

    #[test]
    fn error_kind_serializes_snake_case() {
        let json = serde_json::to_string(&StageErrorKind::MalformedOutput).unwrap();
        assert_eq!(json, "\"malformed_output\"");
    }
}
