use serde::Serialize;
use thiserror::Error;

/// Failures the analysis pipeline can hit. Only `SchemaViolationFinal` and
/// `Cancelled` abort a run; the rest are recorded in `AnalysisState::issues`
/// and the run degrades.
#[derive(Debug, Clone, PartialEq, Error, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum PipelineError {
    #[error("input shape is ambiguous: {reason}")]
    ClassificationAmbiguous { reason: String },

    #[error("structuring fell back to the heuristic splitter: {reason}")]
    StructuringFailed { reason: String },

    #[error("{dropped} turn(s) dropped after remediation: {reason}")]
    ValidationHard { dropped: usize, reason: String },

    #[error("extraction failed for chunk {chunk_index}: {reason}")]
    ExtractionFailed { chunk_index: usize, reason: String },

    #[error("report failed final validation: {reason}")]
    SchemaViolationFinal { reason: String },

    #[error("analysis cancelled")]
    Cancelled,
}

impl PipelineError {
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            PipelineError::SchemaViolationFinal { .. } | PipelineError::Cancelled
        )
    }
}
