//! Built-in stages
//!
//! Deterministic stages that need no external service:
//! - `clauses`: splits the document into blank-line separated clauses
//! - `keyword-flags`: flags clauses containing configured phrases

use redline_pipeline::{AnalysisContext, Stage, StageFailure, StageRegistry};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Name of the clause splitter
pub const CLAUSES: &str = "clauses";

/// Name of the keyword flagger
pub const KEYWORD_FLAGS: &str = "keyword-flags";

/// Accepted severity labels, lowest first
pub const SEVERITIES: [&str; 4] = ["low", "medium", "high", "critical"];

/// Registry holding every built-in stage
#[must_use]
pub fn builtin_registry() -> StageRegistry {
    let mut registry = StageRegistry::new();
    registry.register(ClauseStage);
    registry.register(KeywordFlagStage);
    registry
}

/// One clause of a document
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Clause {
    /// 1-based position
    pub index: usize,
    /// First line of the clause
    pub heading: String,
    /// Clause text without surrounding whitespace
    pub text: String,
    /// Byte offset of the first character
    pub char_start: usize,
    /// Byte offset one past the last character
    pub char_end: usize,
}

/// Split on blank lines
#[must_use]
pub fn split_clauses(text: &str) -> Vec<Clause> {
    let mut clauses = Vec::new();
    let mut start: Option<usize> = None;
    let mut end = 0;
    let mut offset = 0;

    for line in text.split_inclusive('\n') {
        let line_start = offset;
        offset += line.len();

        if line.trim().is_empty() {
            if let Some(s) = start.take() {
                clauses.push(clause_at(text, clauses.len() + 1, s, end));
            }
            continue;
        }
        if start.is_none() {
            start = Some(line_start + (line.len() - line.trim_start().len()));
        }
        end = line_start + line.trim_end().len();
    }
    if let Some(s) = start {
        clauses.push(clause_at(text, clauses.len() + 1, s, end));
    }
    clauses
}

fn clause_at(text: &str, index: usize, start: usize, end: usize) -> Clause {
    let body = &text[start..end];
    Clause {
        index,
        heading: body.lines().next().unwrap_or_default().trim().to_string(),
        text: body.to_string(),
        char_start: start,
        char_end: end,
    }
}

/// Splits text into clauses
#[derive(Debug, Clone, Copy, Default)]
pub struct ClauseStage;

#[async_trait::async_trait]
impl Stage for ClauseStage {
    fn name(&self) -> &str {
        CLAUSES
    }

    async fn run(&self, ctx: &AnalysisContext, _config: &Value) -> Result<Value, StageFailure> {
        serde_json::to_value(split_clauses(ctx.text()))
            .map_err(|e| StageFailure::failed(format!("failed to encode clauses: {e}")))
    }
}

/// A configured phrase found in a clause
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeywordFlag {
    /// Clause index, `None` when matched against the whole text
    pub clause: Option<usize>,
    /// Matched phrase as configured
    pub phrase: String,
    /// Configured severity
    pub severity: String,
}

/// Flags configured phrases
///
/// Reads `keywords` (`{phrase: severity}`) from the stage config. Matching
/// is case-insensitive. Uses the `clauses` output when an earlier stage
/// produced it.
#[derive(Debug, Clone, Copy, Default)]
pub struct KeywordFlagStage;

impl KeywordFlagStage {
    fn keywords(config: &Value) -> Result<Vec<(String, String)>, StageFailure> {
        let Some(keywords) = config.get("keywords") else {
            return Ok(Vec::new());
        };
        let table = keywords
            .as_object()
            .ok_or_else(|| StageFailure::failed("'keywords' must map phrases to severities"))?;

        let mut pairs = Vec::with_capacity(table.len());
        for (phrase, severity) in table {
            let severity = severity
                .as_str()
                .map(str::to_ascii_lowercase)
                .filter(|s| SEVERITIES.contains(&s.as_str()))
                .ok_or_else(|| {
                    StageFailure::failed(format!(
                        "severity for '{phrase}' must be one of {}",
                        SEVERITIES.join(", ")
                    ))
                })?;
            pairs.push((phrase.clone(), severity));
        }
        Ok(pairs)
    }

    fn clauses(ctx: &AnalysisContext) -> Result<Vec<(Option<usize>, String)>, StageFailure> {
        match ctx.output(CLAUSES) {
            Some(output) => {
                let clauses: Vec<Clause> = serde_json::from_value(output.clone()).map_err(|e| {
                    StageFailure::malformed(format!("unexpected '{CLAUSES}' output: {e}"))
                })?;
                Ok(clauses.into_iter().map(|c| (Some(c.index), c.text)).collect())
            }
            None => Ok(vec![(None, ctx.text().to_string())]),
        }
    }
}

#[async_trait::async_trait]
impl Stage for KeywordFlagStage {
    fn name(&self) -> &str {
        KEYWORD_FLAGS
    }

    async fn run(&self, ctx: &AnalysisContext, config: &Value) -> Result<Value, StageFailure> {
        let keywords = Self::keywords(config)?;
        let clauses = Self::clauses(ctx)?;

        let mut flags = Vec::new();
        for (clause, text) in &clauses {
            let haystack = text.to_lowercase();
            for (phrase, severity) in &keywords {
                if haystack.contains(&phrase.to_lowercase()) {
                    flags.push(KeywordFlag {
                        clause: *clause,
                        phrase: phrase.clone(),
                        severity: severity.clone(),
                    });
                }
            }
        }

        serde_json::to_value(flags)
            .map_err(|e| StageFailure::failed(format!("failed to encode flags: {e}")))
    }
}
