//! Per-run analysis context
//!
//! One [`AnalysisContext`] is owned by each run. Stages read it; only the
//! orchestrator appends to it, and only in stage order.

use chrono::{DateTime, Utc};
use indexmap::IndexMap;
use redline_content::Fingerprint;
use redline_store::{
    AnalysisResult, AnalysisSummary, StageErrorKind, StageErrorRecord, StageOutcome, StageStatus,
    Version, VersionId,
};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Pipeline position
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum PipelineState {
    /// Context built, no stage attempted
    Initialized,
    /// Stage `index` (0-based) is being attempted
    Stage { index: usize, name: String },
    /// Every stage attempted
    Complete,
}

/// Outcome of attaching the analysis to the version
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", content = "message", rename_all = "snake_case")]
pub enum PersistenceStatus {
    /// Run has not reached persistence
    Pending,
    /// Result stored on the version
    Attached,
    /// Version already carried an analysis; nothing written
    AlreadyAnalyzed,
    /// Store rejected the write
    Failed(String),
}

/// Accumulated state of one pipeline run
#[derive(Debug, Clone, Serialize)]
pub struct AnalysisContext {
    version_id: VersionId,
    fingerprint: Fingerprint,
    text: String,
    state: PipelineState,
    outputs: IndexMap<String, Value>,
    outcomes: Vec<StageOutcome>,
    errors: Vec<StageErrorRecord>,
    started_at: DateTime<Utc>,
    completed_at: Option<DateTime<Utc>>,
    persistence: PersistenceStatus,
}

impl AnalysisContext {
    pub(crate) fn new(version: &Version) -> Self {
        Self {
            version_id: version.id().clone(),
            fingerprint: *version.fingerprint(),
            text: version.text().to_string(),
            state: PipelineState::Initialized,
            outputs: IndexMap::new(),
            outcomes: Vec::new(),
            errors: Vec::new(),
            started_at: Utc::now(),
            completed_at: None,
            persistence: PersistenceStatus::Pending,
        }
    }

    /// Version under analysis
    #[inline]
    #[must_use]
    pub fn version_id(&self) -> &VersionId {
        &self.version_id
    }

    /// Fingerprint of the text
    #[inline]
    #[must_use]
    pub fn fingerprint(&self) -> &Fingerprint {
        &self.fingerprint
    }

    /// Document text
    #[inline]
    #[must_use]
    pub fn text(&self) -> &str {
        &self.text
    }

    /// Current state
    #[inline]
    #[must_use]
    pub fn state(&self) -> &PipelineState {
        &self.state
    }

    /// Name of the stage being attempted
    #[must_use]
    pub fn current_stage(&self) -> Option<&str> {
        match &self.state {
            PipelineState::Stage { name, .. } => Some(name),
            _ => None,
        }
    }

    /// Check if every stage has been attempted
    #[inline]
    #[must_use]
    pub fn is_complete(&self) -> bool {
        self.state == PipelineState::Complete
    }

    /// Output of an earlier stage
    #[must_use]
    pub fn output(&self, stage: &str) -> Option<&Value> {
        self.outputs.get(stage)
    }

    /// All outputs in stage order
    #[inline]
    #[must_use]
    pub fn outputs(&self) -> &IndexMap<String, Value> {
        &self.outputs
    }

    /// Per-stage outcomes in stage order
    #[inline]
    #[must_use]
    pub fn outcomes(&self) -> &[StageOutcome] {
        &self.outcomes
    }

    /// Outcome recorded for `stage`
    #[must_use]
    pub fn outcome(&self, stage: &str) -> Option<&StageOutcome> {
        self.outcomes.iter().find(|o| o.stage == stage)
    }

    /// Recorded stage errors
    #[inline]
    #[must_use]
    pub fn errors(&self) -> &[StageErrorRecord] {
        &self.errors
    }

    /// Check if any stage failed
    #[inline]
    #[must_use]
    pub fn has_errors(&self) -> bool {
        !self.errors.is_empty()
    }

    /// Run start
    #[inline]
    #[must_use]
    pub fn started_at(&self) -> DateTime<Utc> {
        self.started_at
    }

    /// Run completion
    #[inline]
    #[must_use]
    pub fn completed_at(&self) -> Option<DateTime<Utc>> {
        self.completed_at
    }

    /// Result of attaching the analysis
    #[inline]
    #[must_use]
    pub fn persistence(&self) -> &PersistenceStatus {
        &self.persistence
    }

    /// Counts over the current outputs
    #[must_use]
    pub fn summary(&self) -> AnalysisSummary {
        AnalysisSummary::compute(&self.outputs, &self.outcomes, &self.errors)
    }

    /// Snapshot as a persistable result
    #[must_use]
    pub fn to_result(&self) -> AnalysisResult {
        AnalysisResult::new(
            self.outputs.clone(),
            self.outcomes.clone(),
            self.errors.clone(),
            self.started_at,
            self.completed_at.unwrap_or_else(Utc::now),
        )
    }

    pub(crate) fn enter_stage(&mut self, index: usize, name: &str) {
        self.state = PipelineState::Stage {
            index,
            name: name.to_string(),
        };
    }

    pub(crate) fn record_output(
        &mut self,
        stage: &str,
        output: Value,
        status: StageStatus,
        duration_ms: u64,
    ) {
        debug_assert!(status.has_output());
        self.outputs.insert(stage.to_string(), output);
        self.outcomes.push(StageOutcome {
            stage: stage.to_string(),
            status,
            duration_ms,
        });
    }

    pub(crate) fn record_failure(
        &mut self,
        stage: &str,
        kind: StageErrorKind,
        message: String,
        duration_ms: u64,
    ) {
        self.errors.push(StageErrorRecord {
            stage: stage.to_string(),
            kind,
            message,
            timestamp: Utc::now(),
        });
        self.outcomes.push(StageOutcome {
            stage: stage.to_string(),
            status: StageStatus::Failed,
            duration_ms,
        });
    }

    pub(crate) fn complete(&mut self) {
        self.state = PipelineState::Complete;
        self.completed_at = Some(Utc::now());
    }

    pub(crate) fn set_persistence(&mut self, status: PersistenceStatus) {
        self.persistence = status;
    }
}
