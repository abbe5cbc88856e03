//! Core types for the version store
//!
//! Defines the identifiers and persisted entities:
//! - Negotiation and version identifiers
//! - Provenance and status tags
//! - The negotiation and version records

use crate::analysis::{AnalysisResult, AnalysisSummary};
use crate::error::StoreError;
use chrono::{DateTime, Utc};
use redline_content::{DiffResult, DiffSummary, Fingerprint};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Maximum length of a negotiation slug
pub const MAX_ID_LEN: usize = 128;

/// Stable negotiation slug (ASCII alphanumerics, `-`, `_`)
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct NegotiationId(String);

impl NegotiationId {
    /// Validate and wrap a slug
    ///
    /// # Errors
    /// Returns `StoreError::InvalidId` for empty, overlong, or non-slug input
    pub fn parse(value: impl Into<String>) -> Result<Self, StoreError> {
        let value = value.into();
        if value.is_empty() {
            return Err(StoreError::invalid_id(value, "empty"));
        }
        if value.len() > MAX_ID_LEN {
            return Err(StoreError::invalid_id(value, "too long"));
        }
        if !value
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
        {
            return Err(StoreError::invalid_id(
                value,
                "only ASCII letters, digits, '-' and '_' are allowed",
            ));
        }
        Ok(Self(value))
    }

    /// Borrow as str
    #[inline]
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for NegotiationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for NegotiationId {
    type Err = StoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl TryFrom<String> for NegotiationId {
    type Error = StoreError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(value)
    }
}

impl From<NegotiationId> for String {
    fn from(id: NegotiationId) -> Self {
        id.0
    }
}

/// Version identifier, rendered as `<negotiation>_v<number>`
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct VersionId {
    negotiation: NegotiationId,
    number: u32,
}

impl VersionId {
    /// Create version id
    #[inline]
    #[must_use]
    pub fn new(negotiation: NegotiationId, number: u32) -> Self {
        Self {
            negotiation,
            number,
        }
    }

    /// Owning negotiation
    #[inline]
    #[must_use]
    pub fn negotiation(&self) -> &NegotiationId {
        &self.negotiation
    }

    /// Version number within the negotiation
    #[inline]
    #[must_use]
    pub fn number(&self) -> u32 {
        self.number
    }
}

impl fmt::Display for VersionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}_v{}", self.negotiation, self.number)
    }
}

impl FromStr for VersionId {
    type Err = StoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (negotiation, number) = s
            .rsplit_once("_v")
            .ok_or_else(|| StoreError::invalid_id(s, "expected '<negotiation>_v<number>'"))?;
        let number: u32 = number
            .parse()
            .map_err(|_| StoreError::invalid_id(s, "version number is not an integer"))?;
        if number == 0 {
            return Err(StoreError::invalid_id(s, "version numbers start at 1"));
        }
        Ok(Self::new(NegotiationId::parse(negotiation)?, number))
    }
}

impl TryFrom<String> for VersionId {
    type Error = StoreError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<VersionId> for String {
    fn from(id: VersionId) -> Self {
        id.to_string()
    }
}

/// Which party produced a version
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Provenance {
    /// Drafted by our side
    Internal,
    /// Received from the other side
    Counterparty,
}

impl Provenance {
    /// Wire name
    #[inline]
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Internal => "internal",
            Self::Counterparty => "counterparty",
        }
    }
}

impl fmt::Display for Provenance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Provenance {
    type Err = StoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "internal" => Ok(Self::Internal),
            "counterparty" => Ok(Self::Counterparty),
            _ => Err(StoreError::InvalidProvenance(s.to_string())),
        }
    }
}

/// Negotiation lifecycle status
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NegotiationStatus {
    /// Versions are still being exchanged
    #[default]
    Active,
    /// Negotiation concluded
    Closed,
}

/// Version entry in a negotiation record
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VersionDescriptor {
    /// Version id
    pub version_id: VersionId,
    /// Version number
    #[serde(rename = "version_number")]
    pub number: u32,
    /// Upload time
    pub uploaded_at: DateTime<Utc>,
    /// Provenance
    #[serde(rename = "uploaded_by")]
    pub provenance: Provenance,
    /// Full content fingerprint
    #[serde(rename = "file_hash")]
    pub fingerprint: Fingerprint,
    /// Free-text note
    #[serde(rename = "notes")]
    pub note: Option<String>,
}

/// Ordered history of versions of one document
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Negotiation {
    #[serde(rename = "negotiation_id")]
    id: NegotiationId,
    title: String,
    created_at: DateTime<Utc>,
    status: NegotiationStatus,
    versions: Vec<VersionDescriptor>,
}

impl Negotiation {
    pub(crate) fn new(id: NegotiationId, title: impl Into<String>) -> Self {
        Self {
            id,
            title: title.into(),
            created_at: Utc::now(),
            status: NegotiationStatus::Active,
            versions: Vec::new(),
        }
    }

    /// Negotiation id
    #[inline]
    #[must_use]
    pub fn id(&self) -> &NegotiationId {
        &self.id
    }

    /// Human-readable title
    #[inline]
    #[must_use]
    pub fn title(&self) -> &str {
        &self.title
    }

    /// Creation time
    #[inline]
    #[must_use]
    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    /// Current status
    #[inline]
    #[must_use]
    pub fn status(&self) -> NegotiationStatus {
        self.status
    }

    /// Version descriptors in number order
    #[inline]
    #[must_use]
    pub fn versions(&self) -> &[VersionDescriptor] {
        &self.versions
    }

    /// Number the next version will receive
    #[must_use]
    pub fn next_version_number(&self) -> u32 {
        self.versions.last().map_or(1, |d| d.number + 1)
    }

    /// Existing version holding this exact content
    #[must_use]
    pub fn find_by_fingerprint(&self, fingerprint: &Fingerprint) -> Option<&VersionDescriptor> {
        self.versions.iter().find(|d| &d.fingerprint == fingerprint)
    }

    pub(crate) fn push_version(&mut self, descriptor: VersionDescriptor) {
        debug_assert_eq!(descriptor.number, self.next_version_number());
        self.versions.push(descriptor);
    }

    pub(crate) fn set_status(&mut self, status: NegotiationStatus) {
        self.status = status;
    }

    /// Listing summary
    #[must_use]
    pub fn summary(&self) -> NegotiationSummary {
        NegotiationSummary {
            id: self.id.clone(),
            title: self.title.clone(),
            created_at: self.created_at,
            status: self.status,
            version_count: self.versions.len(),
        }
    }
}

/// Negotiation listing entry
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NegotiationSummary {
    /// Negotiation id
    pub id: NegotiationId,
    /// Title
    pub title: String,
    /// Creation time
    pub created_at: DateTime<Utc>,
    /// Status
    pub status: NegotiationStatus,
    /// Number of stored versions
    pub version_count: usize,
}

/// One immutable snapshot of document text
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Version {
    #[serde(rename = "version_id")]
    id: VersionId,
    negotiation_id: NegotiationId,
    #[serde(rename = "version_number")]
    number: u32,
    #[serde(rename = "contract_text")]
    text: String,
    uploaded_at: DateTime<Utc>,
    #[serde(rename = "uploaded_by")]
    provenance: Provenance,
    #[serde(rename = "file_hash")]
    fingerprint: Fingerprint,
    #[serde(rename = "notes")]
    note: Option<String>,
    analysis_result: Option<AnalysisResult>,
}

impl Version {
    pub(crate) fn new(
        negotiation_id: NegotiationId,
        number: u32,
        text: String,
        fingerprint: Fingerprint,
        provenance: Provenance,
        note: Option<String>,
    ) -> Self {
        Self {
            id: VersionId::new(negotiation_id.clone(), number),
            negotiation_id,
            number,
            text,
            uploaded_at: Utc::now(),
            provenance,
            fingerprint,
            note,
            analysis_result: None,
        }
    }

    /// Version id
    #[inline]
    #[must_use]
    pub fn id(&self) -> &VersionId {
        &self.id
    }

    /// Owning negotiation
    #[inline]
    #[must_use]
    pub fn negotiation_id(&self) -> &NegotiationId {
        &self.negotiation_id
    }

    /// Version number
    #[inline]
    #[must_use]
    pub fn number(&self) -> u32 {
        self.number
    }

    /// Full document text
    #[inline]
    #[must_use]
    pub fn text(&self) -> &str {
        &self.text
    }

    /// Upload time
    #[inline]
    #[must_use]
    pub fn uploaded_at(&self) -> DateTime<Utc> {
        self.uploaded_at
    }

    /// Provenance tag
    #[inline]
    #[must_use]
    pub fn provenance(&self) -> Provenance {
        self.provenance
    }

    /// Content fingerprint
    #[inline]
    #[must_use]
    pub fn fingerprint(&self) -> &Fingerprint {
        &self.fingerprint
    }

    /// Free-text note
    #[inline]
    #[must_use]
    pub fn note(&self) -> Option<&str> {
        self.note.as_deref()
    }

    /// Attached analysis, once the pipeline has completed
    #[inline]
    #[must_use]
    pub fn analysis(&self) -> Option<&AnalysisResult> {
        self.analysis_result.as_ref()
    }

    pub(crate) fn attach_analysis(&mut self, result: AnalysisResult) -> Result<(), StoreError> {
        if self.analysis_result.is_some() {
            return Err(StoreError::AlreadyAnalyzed(self.id.clone()));
        }
        self.analysis_result = Some(result);
        Ok(())
    }

    /// Descriptor as recorded in the negotiation
    #[must_use]
    pub fn descriptor(&self) -> VersionDescriptor {
        VersionDescriptor {
            version_id: self.id.clone(),
            number: self.number,
            uploaded_at: self.uploaded_at,
            provenance: self.provenance,
            fingerprint: self.fingerprint,
            note: self.note.clone(),
        }
    }
}

/// One row of a negotiation timeline
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimelineEntry {
    /// Version number
    pub number: u32,
    /// Version id
    pub version_id: VersionId,
    /// Provenance
    pub provenance: Provenance,
    /// Note
    pub note: Option<String>,
    /// Upload time
    pub uploaded_at: DateTime<Utc>,
    /// First 16 hex chars of the fingerprint
    pub fingerprint: String,
    /// Analysis counts, when analyzed
    pub analysis: Option<AnalysisSummary>,
}

impl From<&Version> for TimelineEntry {
    fn from(version: &Version) -> Self {
        Self {
            number: version.number,
            version_id: version.id.clone(),
            provenance: version.provenance,
            note: version.note.clone(),
            uploaded_at: version.uploaded_at,
            fingerprint: version.fingerprint.short(),
            analysis: version.analysis().map(|a| a.summary.clone()),
        }
    }
}

/// Diff between two versions of one negotiation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VersionComparison {
    /// Base version
    pub old: VersionDescriptor,
    /// Compared version
    pub new: VersionDescriptor,
    /// Structured diff
    pub diff: DiffResult,
    /// Unified diff text
    pub unified: String,
    /// `{additions, deletions}`
    pub summary: DiffSummary,
}
