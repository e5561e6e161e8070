use anyhow::Result;
use serde_json::{json, Value};
use std::sync::{Arc, Mutex};

use commhealth::config::PipelineSettings;
use commhealth::error::PipelineError;
use commhealth::ingest::RawInput;
use commhealth::llm::{schema, Completion, JsonSchema, LanguageModel, OfflineModel};
use commhealth::pipeline::report::{validate_report, Report};
use commhealth::pipeline::{AnalysisState, Analyzer, CancelFlag, InputMode};

#[derive(Default, Clone)]
struct Script {
    messages: Option<Value>,
    remediation: Option<Value>,
    /// Replaces the default extraction reply when set.
    insight: Option<Value>,
    cancel_on_call: Option<CancelFlag>,
}

/// Answers by schema. Extraction echoes the last turn of the chunk as a decision.
struct Mock {
    script: Script,
    calls: Arc<Mutex<Vec<String>>>,
}

impl LanguageModel for Mock {
    fn name(&self) -> &str {
        "mock"
    }

    fn complete(&self, prompt: &str, shape: &JsonSchema) -> Result<Completion> {
        self.calls.lock().unwrap().push(shape.name.to_string());
        if let Some(flag) = &self.script.cancel_on_call {
            flag.cancel();
        }
        let json = match shape.name {
            schema::MESSAGES => self.script.messages.clone(),
            schema::REMEDIATION => self.script.remediation.clone(),
            schema::CHUNK_INSIGHT if self.script.insight.is_some() => self.script.insight.clone(),
            schema::CHUNK_INSIGHT => {
                let last = prompt.lines().last().unwrap_or_default();
                Some(json!({
                    "tone": {"positive": 2, "neutral": 1},
                    "decisions": [last],
                    "clarity_score": 7,
                    "engagement_level": 6
                }))
            }
            _ => None,
        };
        Ok(Completion {
            json,
            raw: String::new(),
        })
    }
}

fn scripted(script: Script, settings: PipelineSettings) -> (Analyzer, Arc<Mutex<Vec<String>>>) {
    let calls = Arc::new(Mutex::new(Vec::new()));
    let mock = Mock {
        script,
        calls: Arc::clone(&calls),
    };
    (Analyzer::new(Box::new(mock), settings), calls)
}

fn count(calls: &Arc<Mutex<Vec<String>>>, name: &str) -> usize {
    calls.lock().unwrap().iter().filter(|c| *c == name).count()
}

fn assert_bounded(report: &Report) {
    assert_eq!(report.dimensions.len(), 5);
    for d in report.dimensions.values() {
        assert!((0.0..=100.0).contains(&d.score), "score {} out of range", d.score);
    }
    assert!((0.0..=100.0).contains(&report.overall_health.score));
    assert!((0.0..=1.0).contains(&report.overall_health.confidence));
    assert!(validate_report(report).is_ok());
}

fn report_of(state: &AnalysisState) -> &Report {
    state.report.as_ref().expect("report")
}

#[test]
fn three_structured_turns_take_text_stats_route() {
    let (analyzer, calls) = scripted(Script::default(), PipelineSettings::default());
    let records = vec![
        json!({"speaker": "alice", "text": "Can we ship on Friday?"}),
        json!({"speaker": "bob", "text": "Yes, I will prepare the release notes."}),
        json!({"speaker": "alice", "text": "Great, thanks!"}),
    ];
    let state = analyzer
        .run(RawInput::Records(records), InputMode::Auto, None)
        .unwrap();

    assert_eq!(state.is_raw_text, Some(false));
    assert_eq!(state.has_timestamps, Some(false));
    assert!(state.remediation.is_none());
    let stats = state.basic_stats.as_ref().unwrap();
    assert_eq!(stats.turn_count, 3);
    assert_eq!(stats.speaker_count, 2);
    assert!(stats.latency.is_none());
    assert_eq!(state.llm_calls, 1);
    assert_eq!(count(&calls, schema::CHUNK_INSIGHT), 1);
    assert_eq!(count(&calls, schema::MESSAGES), 0);
    assert!(state.issues.is_empty());
    assert_bounded(report_of(&state));
}

#[test]
fn raw_text_without_markers_becomes_one_unknown_turn() {
    let analyzer = Analyzer::new(Box::new(OfflineModel), PipelineSettings::default());
    let text = "  we should probably move the launch\nthe vendor is late again  ";
    let state = analyzer
        .run(RawInput::Text(text.to_string()), InputMode::Raw, None)
        .unwrap();

    let turns = state.deduped_data.as_ref().unwrap();
    assert_eq!(turns.len(), 1);
    assert_eq!(turns[0].speaker, "unknown");
    assert_eq!(turns[0].text, text.trim());
    assert!(state.structuring_fallback);
    assert!(state
        .issues
        .iter()
        .any(|i| matches!(i, PipelineError::StructuringFailed { .. })));
    assert_bounded(report_of(&state));
}

#[test]
fn model_structuring_is_used_when_it_answers() {
    let script = Script {
        messages: Some(json!({"messages": [
            {"speaker": "Dana", "text": "Morning, status?", "timestamp": "2024-03-04T09:00:00Z"},
            {"speaker": "Eli", "text": "Blocked on QA.", "timestamp": "2024-03-04T09:20:00Z"}
        ]})),
        ..Script::default()
    };
    let (analyzer, calls) = scripted(script, PipelineSettings::default());
    let state = analyzer
        .run(
            RawInput::Text("Dana 9:00 AM: Morning, status?\nEli 9:20 AM: Blocked on QA.".into()),
            InputMode::Auto,
            None,
        )
        .unwrap();

    assert_eq!(state.is_raw_text, Some(true));
    assert!(!state.structuring_fallback);
    assert_eq!(state.structured_data.as_ref().unwrap().len(), 2);
    assert_eq!(count(&calls, schema::MESSAGES), 1);
    assert_eq!(state.llm_calls, 2);
}

#[test]
fn empty_speaker_is_remediated_with_one_call() {
    let script = Script {
        remediation: Some(json!({"turns": [
            {"index": 1, "speaker": "bob", "text": "I will review it today", "timestamp": null, "kind": "chat"}
        ]})),
        ..Script::default()
    };
    let (analyzer, calls) = scripted(script, PipelineSettings::default());
    let records = vec![
        json!({"speaker": "alice", "text": "Draft is ready"}),
        json!({"speaker": "", "text": "I will review it today"}),
        json!({"speaker": "alice", "text": "Thanks"}),
    ];
    let state = analyzer
        .run(RawInput::Records(records), InputMode::Structured, None)
        .unwrap();

    let outcome = state.remediation.as_ref().unwrap();
    assert_eq!(outcome.replaced, 1);
    assert_eq!(outcome.dropped, 0);
    assert_eq!(count(&calls, schema::REMEDIATION), 1);
    let turns = state.deduped_data.as_ref().unwrap();
    assert_eq!(turns.len(), 3);
    assert_eq!(turns[1].speaker, "bob");
    assert!(state.issues.is_empty());
}

#[test]
fn failed_remediation_drops_the_turn_and_records_it() {
    let analyzer = Analyzer::new(Box::new(OfflineModel), PipelineSettings::default());
    let records = vec![
        json!({"speaker": "alice", "text": "Draft is ready"}),
        json!({"speaker": "  ", "text": "Who wrote this?"}),
    ];
    let state = analyzer
        .run(RawInput::Records(records), InputMode::Auto, None)
        .unwrap();

    assert_eq!(state.deduped_data.as_ref().unwrap().len(), 1);
    assert_eq!(state.dropped_turns(), 1);
    assert!(state
        .issues
        .iter()
        .any(|i| matches!(i, PipelineError::ValidationHard { dropped: 1, .. })));
    assert_bounded(report_of(&state));
}

#[test]
fn fifty_turns_split_into_three_chunks_in_order() {
    let settings = PipelineSettings {
        max_chunk_tokens: 120,
        ..PipelineSettings::default()
    };
    let (analyzer, calls) = scripted(Script::default(), settings);
    let speakers = ["alice", "bob"];
    let records: Vec<Value> = (0..50)
        .map(|i| json!({"speaker": speakers[i % 2], "text": format!("Decision number {i} is final")}))
        .collect();

    let state = analyzer
        .run(RawInput::Records(records), InputMode::Auto, None)
        .unwrap();

    let chunks = state.chunks.as_ref().unwrap();
    assert_eq!(chunks.len(), 3);
    let covered: Vec<usize> = chunks.iter().flat_map(|c| c.turn_index_map.clone()).collect();
    assert_eq!(covered, (0..50).collect::<Vec<_>>());

    assert_eq!(state.chunk_insights.as_ref().unwrap().len(), 3);
    assert_eq!(count(&calls, schema::CHUNK_INSIGHT), 3);

    let merged = state.merged_insights.as_ref().unwrap();
    let last_of_each: Vec<String> = chunks
        .iter()
        .map(|c| {
            let i = *c.turn_index_map.last().unwrap();
            format!("[{i}] {}: Decision number {i} is final", speakers[i % 2])
        })
        .collect();
    assert_eq!(merged.decisions, last_of_each);
    assert_eq!(report_of(&state).metadata.chunk_count, 3);
}

#[test]
fn timestamps_route_to_latency_stats() {
    let (analyzer, _) = scripted(Script::default(), PipelineSettings::default());
    let records = vec![
        json!({"from": "alice", "body": "Can you send the deck?", "sent_at": "2024-05-01T09:00:00Z"}),
        json!({"from": "bob", "body": "Sent, let me know what you think.", "sent_at": "2024-05-01T09:30:00Z"}),
        json!({"from": "alice", "body": "Got it, thanks.", "sent_at": 1714557600}),
    ];
    let state = analyzer
        .run(RawInput::Records(records), InputMode::Auto, None)
        .unwrap();

    assert_eq!(state.has_timestamps, Some(true));
    let latency = state.basic_stats.as_ref().unwrap().latency.as_ref().unwrap();
    assert_eq!(latency.samples, 2);
    assert_eq!(latency.median_minutes, 30.0);
    assert!(report_of(&state).summary.contains("Median reply time was 30 minute(s)"));
}

#[test]
fn empty_input_still_produces_bounded_report() {
    let (analyzer, calls) = scripted(Script::default(), PipelineSettings::default());
    let state = analyzer
        .run(RawInput::Records(vec![]), InputMode::Auto, None)
        .unwrap();

    assert!(state.chunks.as_ref().unwrap().is_empty());
    assert_eq!(state.llm_calls, 0);
    assert!(calls.lock().unwrap().is_empty());
    assert!(matches!(
        state.issues.first(),
        Some(PipelineError::ClassificationAmbiguous { .. })
    ));
    let report = report_of(&state);
    assert_bounded(report);
    assert_eq!(report.statistics.conversation.turn_count, 0);
}

#[test]
fn cancellation_stops_between_stages() {
    let flag = CancelFlag::new();
    flag.cancel();
    let analyzer = Analyzer::new(Box::new(OfflineModel), PipelineSettings::default());
    let err = analyzer
        .run(RawInput::Text("alice: hi".into()), InputMode::Auto, Some(&flag))
        .unwrap_err();
    assert_eq!(err, PipelineError::Cancelled);

    let flag = CancelFlag::new();
    let script = Script {
        cancel_on_call: Some(flag.clone()),
        ..Script::default()
    };
    let (analyzer, calls) = scripted(script, PipelineSettings::default());
    let err = analyzer
        .run(RawInput::Text("alice: hi\nbob: hey".into()), InputMode::Raw, Some(&flag))
        .unwrap_err();
    assert!(err.is_fatal());
    // Structuring ran, extraction never did.
    assert_eq!(count(&calls, schema::MESSAGES), 1);
    assert_eq!(count(&calls, schema::CHUNK_INSIGHT), 0);
}

#[test]
fn offline_run_completes_with_fallbacks() {
    let analyzer = Analyzer::new(Box::new(OfflineModel), PipelineSettings::default());
    let report = analyzer
        .analyze_text("alice: are we still on for Friday?\nbob: yes, thanks for checking")
        .unwrap();

    assert_bounded(&report);
    assert_eq!(report.statistics.conversation.turn_count, 2);
    assert!(report.extracted_content.decisions.is_empty());
    assert_eq!(report.metadata.llm_calls, 2);
    let kinds: Vec<&str> = report
        .metadata
        .pipeline_issues
        .iter()
        .map(|i| match i {
            PipelineError::StructuringFailed { .. } => "structuring",
            PipelineError::ExtractionFailed { .. } => "extraction",
            _ => "other",
        })
        .collect();
    assert_eq!(kinds, vec!["structuring", "extraction"]);
}

#[test]
fn analyze_records_accepts_wrapped_fields() {
    let analyzer = Analyzer::new(Box::new(OfflineModel), PipelineSettings::default());
    let report = analyzer
        .analyze_records(vec![
            json!({"author": {"name": "Ana", "email": "ana@example.com"}, "content": "Kickoff at 10?"}),
            json!({"user": "@ben", "message": "Works for me", "channel": "slack"}),
        ])
        .unwrap();
    let speakers: Vec<&str> = report
        .statistics
        .conversation
        .speakers
        .iter()
        .map(|s| s.speaker.as_str())
        .collect();
    assert_eq!(speakers, vec!["Ana", "ben"]);
}

#[test]
fn corrupted_report_is_rejected() {
    let analyzer = Analyzer::new(Box::new(OfflineModel), PipelineSettings::default());
    let mut report = analyzer
        .analyze_records(vec![
            json!({"speaker": "a", "text": "hello there"}),
            json!({"speaker": "b", "text": "hi!"}),
        ])
        .unwrap();
    assert!(validate_report(&report).is_ok());

    report
        .dimensions
        .values_mut()
        .next()
        .unwrap()
        .score = f64::INFINITY;
    assert!(validate_report(&report).is_err());
}

#[test]
fn extreme_model_numbers_stay_bounded() {
    let script = Script {
        insight: Some(json!({
            "tone": {"positive": 1e20, "negative": -5, "neutral": 4294967295u64, "toxic": "NaN"},
            "clarity_score": 1e308,
            "engagement_level": -40
        })),
        ..Script::default()
    };
    let settings = PipelineSettings {
        max_chunk_tokens: 20,
        ..PipelineSettings::default()
    };
    let (analyzer, _) = scripted(script, settings);
    let records: Vec<Value> = (0..12)
        .map(|i| json!({"speaker": (["ana", "ben"][i % 2]), "text": format!("Status item {i} is on track")}))
        .collect();
    let state = analyzer
        .run(RawInput::Records(records), InputMode::Auto, None)
        .unwrap();

    let insights = state.chunk_insights.as_ref().unwrap();
    assert!(insights.iter().all(|i| !i.fallback));
    for ins in insights {
        assert_eq!(ins.tone.positive as usize, ins.word_count);
        assert_eq!(ins.tone.negative, 0);
        assert_eq!(ins.tone.toxic, 0);
    }
    let merged = state.merged_insights.as_ref().unwrap();
    assert_eq!(merged.clarity, Some(10.0));
    assert_eq!(merged.engagement, Some(0.0));
    assert!(merged.tone.total() as usize <= 2 * merged.total_words);
    assert_bounded(report_of(&state));
}

#[test]
fn header_only_text_is_kept_as_one_turn() {
    let analyzer = Analyzer::new(Box::new(OfflineModel), PipelineSettings::default());
    let state = analyzer
        .run(
            RawInput::Text("From: Alice <a@x.io>\nFrom: Bob <b@x.io>".into()),
            InputMode::Raw,
            None,
        )
        .unwrap();

    let structured = state.structured_data.as_ref().unwrap();
    assert_eq!(structured.len(), 1);
    assert_eq!(structured[0].speaker, "unknown");
    assert_eq!(report_of(&state).statistics.conversation.turn_count, 1);
}

#[test]
fn repeated_dedupe_is_stable_and_acknowledgments_are_not_questions() {
    let (analyzer, _) = scripted(Script::default(), PipelineSettings::default());
    let records = vec![
        json!({"speaker": "ana", "text": "Please send the numbers."}),
        json!({"speaker": "ben", "text": "Will do"}),
        json!({"speaker": "ana", "text": "Can't make it today\n --\nAna"}),
        json!({"speaker": "ben", "text": "Is fine by me"}),
    ];
    let state = analyzer
        .run(RawInput::Records(records), InputMode::Auto, None)
        .unwrap();

    let deduped = state.deduped_data.as_ref().unwrap();
    assert_eq!(deduped[2].text, "Can't make it today");
    assert_eq!(&commhealth::pipeline::dedupe::dedupe(deduped), deduped);
    assert_eq!(state.basic_stats.as_ref().unwrap().question_count, 0);
}
