use tracing::warn;

use super::calibrate::Calibration;
use super::evidence::Evidence;
use super::report::Report;
use super::stats::BasicStats;
use super::validate::{RemediationOutcome, ValidationError};
use crate::error::PipelineError;
use crate::ingest::RawInput;
use crate::models::{Chunk, ChunkInsight, MergedInsight, Turn};

/// How the caller wants the payload read.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum InputMode {
    /// Let the classifier decide.
    #[default]
    Auto,
    /// Treat the payload as free text.
    Raw,
    /// Treat the payload as records.
    Structured,
}

/// Everything a run knows, moved from stage to stage. Each field is written
/// by one stage and left alone by the rest; `issues` and `llm_calls` only grow.
#[derive(Debug, Clone)]
pub struct AnalysisState {
    pub raw_input: RawInput,
    pub mode: InputMode,

    pub is_raw_text: Option<bool>,
    pub has_timestamps: Option<bool>,

    pub structured_data: Option<Vec<Turn>>,
    /// Set by structuring when the heuristic splitter had to be used.
    pub structuring_fallback: bool,

    pub validation_errors: Option<Vec<ValidationError>>,
    pub validated_data: Option<Vec<Turn>>,

    pub remediation: Option<RemediationOutcome>,
    pub remediated_data: Option<Vec<Turn>>,

    pub deduped_data: Option<Vec<Turn>>,
    pub chunks: Option<Vec<Chunk>>,
    pub basic_stats: Option<BasicStats>,
    pub chunk_insights: Option<Vec<ChunkInsight>>,
    pub merged_insights: Option<MergedInsight>,
    pub evidence: Option<Evidence>,
    pub calibration: Option<Calibration>,
    pub report: Option<Report>,

    pub issues: Vec<PipelineError>,
    pub llm_calls: usize,
}

impl AnalysisState {
    pub fn new(raw_input: RawInput, mode: InputMode) -> Self {
        Self {
            raw_input,
            mode,
            is_raw_text: None,
            has_timestamps: None,
            structured_data: None,
            structuring_fallback: false,
            validation_errors: None,
            validated_data: None,
            remediation: None,
            remediated_data: None,
            deduped_data: None,
            chunks: None,
            basic_stats: None,
            chunk_insights: None,
            merged_insights: None,
            evidence: None,
            calibration: None,
            report: None,
            issues: Vec::new(),
            llm_calls: 0,
        }
    }

    /// Log and keep a recoverable problem.
    pub fn with_issue(mut self, issue: PipelineError) -> Self {
        warn!("{issue}");
        self.issues.push(issue);
        self
    }

    /// The validated turn sequence: remediated when remediation ran.
    pub fn canonical_turns(&self) -> &[Turn] {
        self.remediated_data
            .as_deref()
            .or(self.validated_data.as_deref())
            .unwrap_or(&[])
    }

    /// Turns that remediation had to give up on.
    pub fn dropped_turns(&self) -> usize {
        self.remediation.as_ref().map_or(0, |r| r.dropped)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn canonical_turns_prefer_remediated() {
        let mut state = AnalysisState::new(RawInput::Text(String::new()), InputMode::Auto);
        assert!(state.canonical_turns().is_empty());
        state.validated_data = Some(vec![Turn::new("a", "one"), Turn::new("", "two")]);
        assert_eq!(state.canonical_turns().len(), 2);
        state.remediated_data = Some(vec![Turn::new("a", "one")]);
        assert_eq!(state.canonical_turns().len(), 1);
    }

    #[test]
    fn issues_accumulate() {
        let state = AnalysisState::new(RawInput::Records(vec![]), InputMode::Auto)
            .with_issue(PipelineError::StructuringFailed { reason: "x".into() })
            .with_issue(PipelineError::ClassificationAmbiguous { reason: "y".into() });
        assert_eq!(state.issues.len(), 2);
    }
}
