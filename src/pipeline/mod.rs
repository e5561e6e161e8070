pub mod calibrate;
pub mod chunk;
pub mod dedupe;
pub mod evidence;
pub mod extract;
pub mod merge;
pub mod report;
pub mod routing;
pub mod state;
pub mod stats;
pub mod validate;

use serde_json::Value;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{debug, info};

use crate::config::PipelineSettings;
use crate::error::PipelineError;
use crate::ingest::classify::{classify, detect_timestamps};
use crate::ingest::normalize::normalize;
use crate::ingest::structure::structure;
use crate::ingest::{json, RawInput};
use crate::llm::LanguageModel;

use calibrate::CalibrationContext;
use report::Report;
use routing::{next_stage, Stage};
pub use state::{AnalysisState, InputMode};

/// Shared flag a caller can set to stop a run between stages.
#[derive(Debug, Clone, Default)]
pub struct CancelFlag(Arc<AtomicBool>);

impl CancelFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Runs conversations through the analysis pipeline with one model backend.
pub struct Analyzer {
    model: Box<dyn LanguageModel>,
    settings: PipelineSettings,
}

impl Analyzer {
    pub fn new(model: Box<dyn LanguageModel>, settings: PipelineSettings) -> Self {
        Self { model, settings }
    }

    pub fn settings(&self) -> &PipelineSettings {
        &self.settings
    }

    /// Analyze free text, skipping classification of the input shape.
    pub fn analyze_text(&self, text: &str) -> Result<Report, PipelineError> {
        into_report(self.run(RawInput::Text(text.to_string()), InputMode::Raw, None)?)
    }

    /// Analyze a list of message records.
    pub fn analyze_records(&self, records: Vec<Value>) -> Result<Report, PipelineError> {
        into_report(self.run(RawInput::Records(records), InputMode::Structured, None)?)
    }

    /// Analyze whatever was loaded, letting the classifier pick the path.
    pub fn analyze_auto(&self, input: RawInput) -> Result<Report, PipelineError> {
        into_report(self.run(input, InputMode::Auto, None)?)
    }

    /// Drive the stage graph to completion and return the full state.
    /// Only fatal errors are returned; everything else lands in `state.issues`.
    pub fn run(
        &self,
        input: RawInput,
        mode: InputMode,
        cancel: Option<&CancelFlag>,
    ) -> Result<AnalysisState, PipelineError> {
        info!("Starting analysis with model {} ({:?} mode)", self.model.name(), mode);
        let mut state = AnalysisState::new(input, mode);
        let mut stage = Stage::Classify;

        while stage != Stage::Done {
            if cancel.is_some_and(CancelFlag::is_cancelled) {
                info!("Analysis cancelled before {stage:?}");
                return Err(PipelineError::Cancelled);
            }
            debug!("Stage {stage:?}");
            state = self.step(stage, state)?;
            stage = next_stage(stage, &state);
        }

        info!(
            "Analysis finished: {} LLM call(s), {} issue(s)",
            state.llm_calls,
            state.issues.len()
        );
        Ok(state)
    }

    fn step(&self, stage: Stage, state: AnalysisState) -> Result<AnalysisState, PipelineError> {
        let state = match stage {
            Stage::Classify => self.classify(state),
            Stage::Structure => self.structure(state),
            Stage::Normalize => self.normalize(state),
            Stage::Validate => self.validate(state),
            Stage::Remediate => self.remediate(state),
            Stage::Dedupe => self.dedupe(state),
            Stage::Chunk => self.chunk(state),
            Stage::FullStats => self.stats(state, true),
            Stage::TextStats => self.stats(state, false),
            Stage::Extract => self.extract(state),
            Stage::Merge => self.merge(state),
            Stage::Evidence => self.evidence(state),
            Stage::Calibrate => self.calibrate(state),
            Stage::Report => self.report(state),
            Stage::Finalize => return self.finalize(state),
            Stage::Done => state,
        };
        Ok(state)
    }

    fn classify(&self, state: AnalysisState) -> AnalysisState {
        let (is_raw_text, has_timestamps, ambiguous) = match state.mode {
            InputMode::Auto => {
                let c = classify(&state.raw_input);
                (c.is_raw_text, c.has_timestamps, c.ambiguous)
            }
            InputMode::Raw => (true, detect_timestamps(&state.raw_input), None),
            InputMode::Structured => (false, detect_timestamps(&state.raw_input), None),
        };
        debug!("Classified input: raw_text={is_raw_text}, timestamps={has_timestamps}");

        let state = AnalysisState {
            is_raw_text: Some(is_raw_text),
            has_timestamps: Some(has_timestamps),
            ..state
        };
        match ambiguous {
            Some(reason) => state.with_issue(PipelineError::ClassificationAmbiguous { reason }),
            None => state,
        }
    }

    fn structure(&self, state: AnalysisState) -> AnalysisState {
        let text = state.raw_input.as_text();
        let outcome = structure(&text, self.model.as_ref());

        let state = AnalysisState {
            structured_data: Some(outcome.turns),
            structuring_fallback: outcome.fallback_reason.is_some(),
            llm_calls: state.llm_calls + outcome.llm_calls,
            ..state
        };
        match outcome.fallback_reason {
            Some(reason) => state.with_issue(PipelineError::StructuringFailed { reason }),
            None => state,
        }
    }

    fn normalize(&self, state: AnalysisState) -> AnalysisState {
        let (records, problem) = match &state.raw_input {
            RawInput::Records(records) => (records.clone(), None),
            RawInput::Text(text) if text.trim().is_empty() => (Vec::new(), None),
            // Structured mode forced on text: accept it if it is JSON.
            RawInput::Text(text) => match json::parse_json(text) {
                Ok(RawInput::Records(records)) => (records, None),
                _ => (
                    Vec::new(),
                    Some("structured input was requested but the payload is plain text".to_string()),
                ),
            },
        };
        let turns = normalize(&records);
        debug!("Normalized {} of {} record(s)", turns.len(), records.len());

        let state = AnalysisState {
            structured_data: Some(turns),
            ..state
        };
        match problem {
            Some(reason) => state.with_issue(PipelineError::ClassificationAmbiguous { reason }),
            None => state,
        }
    }

    fn validate(&self, state: AnalysisState) -> AnalysisState {
        let turns = state.structured_data.as_deref().unwrap_or(&[]);
        let (validated, errors) = validate::validate(turns);
        if !errors.is_empty() {
            debug!("Validation found {} problem(s)", errors.len());
        }
        AnalysisState {
            validated_data: Some(validated),
            validation_errors: Some(errors),
            ..state
        }
    }

    fn remediate(&self, state: AnalysisState) -> AnalysisState {
        let turns = state.validated_data.as_deref().unwrap_or(&[]);
        let errors = state.validation_errors.as_deref().unwrap_or(&[]);
        let mut outcome = validate::remediate(turns, errors, self.model.as_ref());
        let remediated = std::mem::take(&mut outcome.turns);

        let issue = (outcome.dropped > 0).then(|| PipelineError::ValidationHard {
            dropped: outcome.dropped,
            reason: outcome
                .failure
                .clone()
                .unwrap_or_else(|| "turns still invalid after remediation".to_string()),
        });

        let state = AnalysisState {
            llm_calls: state.llm_calls + outcome.llm_calls,
            remediated_data: Some(remediated),
            remediation: Some(outcome),
            ..state
        };
        match issue {
            Some(issue) => state.with_issue(issue),
            None => state,
        }
    }

    fn dedupe(&self, state: AnalysisState) -> AnalysisState {
        let deduped = dedupe::dedupe(state.canonical_turns());
        debug!("{} turn(s) after dedupe", deduped.len());
        AnalysisState {
            deduped_data: Some(deduped),
            ..state
        }
    }

    fn chunk(&self, state: AnalysisState) -> AnalysisState {
        let turns = state.deduped_data.as_deref().unwrap_or(&[]);
        let chunks = chunk::chunk(
            turns,
            self.settings.max_chunk_tokens,
            self.settings.tokens_per_word,
        );
        debug!("{} chunk(s)", chunks.len());
        AnalysisState {
            chunks: Some(chunks),
            ..state
        }
    }

    fn stats(&self, state: AnalysisState, with_latency: bool) -> AnalysisState {
        let turns = state.deduped_data.as_deref().unwrap_or(&[]);
        let stats = if with_latency {
            stats::compute_full_stats(turns, self.settings.max_latency_minutes)
        } else {
            stats::compute_text_stats(turns)
        };
        AnalysisState {
            basic_stats: Some(stats),
            ..state
        }
    }

    fn extract(&self, state: AnalysisState) -> AnalysisState {
        let chunks = state.chunks.as_deref().unwrap_or(&[]);
        let outcome = extract::extract_all(
            chunks,
            self.model.as_ref(),
            self.settings.max_parallel_extractions,
        );

        let mut state = AnalysisState {
            chunk_insights: Some(outcome.insights),
            llm_calls: state.llm_calls + outcome.llm_calls,
            ..state
        };
        for failure in outcome.failures {
            state = state.with_issue(failure);
        }
        state
    }

    fn merge(&self, state: AnalysisState) -> AnalysisState {
        let merged = match (&state.chunk_insights, &state.basic_stats) {
            (Some(insights), Some(stats)) => merge::merge(insights, stats),
            _ => Default::default(),
        };
        AnalysisState {
            merged_insights: Some(merged),
            ..state
        }
    }

    fn evidence(&self, state: AnalysisState) -> AnalysisState {
        let turns = state.deduped_data.as_deref().unwrap_or(&[]);
        let merged = state.merged_insights.clone().unwrap_or_default();
        let evidence = evidence::collect(turns, &merged, self.settings.max_evidence_per_dimension);
        AnalysisState {
            evidence: Some(evidence),
            ..state
        }
    }

    fn calibrate(&self, state: AnalysisState) -> AnalysisState {
        let ctx = CalibrationContext {
            structuring_fallback: state.structuring_fallback,
            dropped_turns: state.dropped_turns(),
            latency_half_life_minutes: self.settings.latency_half_life_minutes,
        };
        let calibration = match (&state.basic_stats, &state.merged_insights, &state.evidence) {
            (Some(stats), Some(merged), Some(evidence)) => {
                Some(calibrate::calibrate(stats, merged, evidence, &ctx))
            }
            _ => None,
        };
        AnalysisState {
            calibration,
            ..state
        }
    }

    fn report(&self, state: AnalysisState) -> AnalysisState {
        let report = match (
            &state.basic_stats,
            &state.merged_insights,
            &state.evidence,
            &state.calibration,
        ) {
            (Some(stats), Some(merged), Some(evidence), Some(calibration)) => Some(report::generate(
                stats,
                merged,
                evidence,
                calibration,
                &self.settings,
                &state.issues,
                state.llm_calls,
            )),
            _ => None,
        };
        AnalysisState { report, ..state }
    }

    fn finalize(&self, state: AnalysisState) -> Result<AnalysisState, PipelineError> {
        let report = state
            .report
            .clone()
            .ok_or_else(|| PipelineError::SchemaViolationFinal {
                reason: "no report was generated".to_string(),
            })?;
        let report = report::finalize(report)?;
        Ok(AnalysisState {
            report: Some(report),
            ..state
        })
    }
}

fn into_report(state: AnalysisState) -> Result<Report, PipelineError> {
    state.report.ok_or_else(|| PipelineError::SchemaViolationFinal {
        reason: "no report was generated".to_string(),
    })
}
