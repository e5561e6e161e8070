use super::state::AnalysisState;
use super::validate::has_hard_errors;

/// Pipeline stages, in the order a fully-structured run visits them.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Classify,
    Structure,
    Normalize,
    Validate,
    Remediate,
    Dedupe,
    Chunk,
    FullStats,
    TextStats,
    Extract,
    Merge,
    Evidence,
    Calibrate,
    Report,
    Finalize,
    Done,
}

/// Where to go after `stage`, given what it produced. Pure.
pub fn next_stage(stage: Stage, state: &AnalysisState) -> Stage {
    match stage {
        Stage::Classify => {
            if state.is_raw_text == Some(true) {
                Stage::Structure
            } else {
                Stage::Normalize
            }
        }
        Stage::Structure | Stage::Normalize => Stage::Validate,
        Stage::Validate => {
            let needs_fix = state
                .validation_errors
                .as_deref()
                .is_some_and(has_hard_errors);
            // Remediation runs at most once.
            if needs_fix && state.remediation.is_none() {
                Stage::Remediate
            } else {
                Stage::Dedupe
            }
        }
        Stage::Remediate => Stage::Dedupe,
        Stage::Dedupe => Stage::Chunk,
        Stage::Chunk => {
            if state.has_timestamps == Some(true) {
                Stage::FullStats
            } else {
                Stage::TextStats
            }
        }
        Stage::FullStats | Stage::TextStats => Stage::Extract,
        Stage::Extract => Stage::Merge,
        Stage::Merge => Stage::Evidence,
        Stage::Evidence => Stage::Calibrate,
        Stage::Calibrate => Stage::Report,
        Stage::Report => Stage::Finalize,
        Stage::Finalize | Stage::Done => Stage::Done,
    }
}
