use chrono::{DateTime, SecondsFormat, Utc};
use serde::Serialize;
use std::collections::{BTreeMap, HashSet};
use uuid::Uuid;

use super::calibrate::{validate_weights, Calibration, HealthLabel, Recommendation, ScoreStatistics};
use super::evidence::{Evidence, EvidenceItem, Polarity};
use super::stats::BasicStats;
use crate::config::PipelineSettings;
use crate::error::PipelineError;
use crate::models::{ActionItem, Dimension, MergedInsight, RankedItem};

pub const SCHEMA_VERSION: &str = "1.0";

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OverallHealth {
    pub score: f64,
    pub label: HealthLabel,
    pub confidence: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DimensionReport {
    pub score: f64,
    pub label: HealthLabel,
    pub description: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ExtractedContent {
    pub decisions: Vec<String>,
    pub action_items: Vec<ActionItem>,
    pub risk_flags: Vec<String>,
    pub key_topics: Vec<RankedItem>,
    pub tone_descriptors: Vec<RankedItem>,
    pub positive_examples: Vec<EvidenceItem>,
    pub areas_for_improvement: Vec<EvidenceItem>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ReportStatistics {
    #[serde(flatten)]
    pub conversation: BasicStats,
    pub score_distribution: ScoreStatistics,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Metadata {
    pub schema_version: String,
    pub run_id: String,
    pub generated_at: String,
    pub pipeline_issues: Vec<PipelineError>,
    pub llm_calls: usize,
    pub chunk_count: usize,
}

/// The final, user-facing analysis.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Report {
    pub summary: String,
    pub overall_health: OverallHealth,
    pub dimensions: BTreeMap<Dimension, DimensionReport>,
    pub extracted_content: ExtractedContent,
    pub evidence: BTreeMap<Dimension, Vec<EvidenceItem>>,
    pub recommendations: Vec<Recommendation>,
    pub statistics: ReportStatistics,
    pub metadata: Metadata,
}

fn round1(x: f64) -> f64 {
    (x * 10.0).round() / 10.0
}

fn round3(x: f64) -> f64 {
    (x * 1000.0).round() / 1000.0
}

/// Evidence of one polarity across all dimensions, one item per turn, in
/// dimension order.
fn examples(evidence: &Evidence, polarity: Polarity, limit: usize) -> Vec<EvidenceItem> {
    let mut seen = HashSet::new();
    evidence
        .items
        .values()
        .flatten()
        .filter(|e| e.polarity == polarity && seen.insert(e.turn_index))
        .take(limit)
        .cloned()
        .collect()
}

fn top<T: Clone>(items: &[T], limit: usize) -> Vec<T> {
    items.iter().take(limit).cloned().collect()
}

/// Assemble the report from finished pipeline outputs. Ranked lists and
/// examples are capped per `settings`. Metadata identity fields are left
/// blank for [`finalize`] to stamp.
pub fn generate(
    stats: &BasicStats,
    merged: &MergedInsight,
    evidence: &Evidence,
    calibration: &Calibration,
    settings: &PipelineSettings,
    issues: &[PipelineError],
    llm_calls: usize,
) -> Report {
    let dimensions = Dimension::ALL
        .iter()
        .map(|dim| {
            let score = round1(calibration.score(*dim));
            let report = DimensionReport {
                score,
                label: HealthLabel::from_score(score),
                description: dim.description().to_string(),
            };
            (*dim, report)
        })
        .collect();

    let overall_score = round1(calibration.overall_score);
    let overall_health = OverallHealth {
        score: overall_score,
        label: HealthLabel::from_score(overall_score),
        confidence: round3(calibration.confidence),
    };

    let dist = &calibration.score_statistics;
    let score_distribution = ScoreStatistics {
        mean: round1(dist.mean),
        min: round1(dist.min),
        max: round1(dist.max),
        std: round1(dist.std),
    };

    Report {
        summary: summarize(stats, merged, &overall_health),
        overall_health,
        dimensions,
        extracted_content: ExtractedContent {
            decisions: merged.decisions.clone(),
            action_items: merged.action_items.clone(),
            risk_flags: merged.risk_flags.clone(),
            key_topics: top(&merged.key_topics, settings.max_key_topics),
            tone_descriptors: top(&merged.tone_descriptors, settings.max_tone_indicators),
            positive_examples: examples(evidence, Polarity::Supporting, settings.max_extracted_items),
            areas_for_improvement: examples(evidence, Polarity::Concerning, settings.max_extracted_items),
        },
        evidence: evidence.items.clone(),
        recommendations: top(&calibration.recommendations, settings.max_recommendations),
        statistics: ReportStatistics {
            conversation: stats.clone(),
            score_distribution,
        },
        metadata: Metadata {
            schema_version: String::new(),
            run_id: String::new(),
            generated_at: String::new(),
            pipeline_issues: issues.to_vec(),
            llm_calls,
            chunk_count: merged.chunk_count,
        },
    }
}

fn summarize(stats: &BasicStats, merged: &MergedInsight, overall: &OverallHealth) -> String {
    let mut parts = vec![
        format!(
            "Analyzed {} turn(s) from {} speaker(s).",
            stats.turn_count, stats.speaker_count
        ),
        format!(
            "Overall communication health is {} ({:.1}/100).",
            overall.label.as_str(),
            overall.score
        ),
        format!("{} question(s) were asked.", stats.question_count),
    ];
    match &stats.latency {
        Some(lat) => parts.push(format!(
            "Median reply time was {:.0} minute(s).",
            lat.median_minutes
        )),
        None => parts.push("Reply times were not available.".to_string()),
    }
    parts.push(format!(
        "Found {} decision(s) and {} action item(s), {} of them unassigned.",
        merged.decisions.len(),
        merged.action_items.len(),
        merged.flags.unassigned_action_items
    ));
    parts.push(format!("{} risk(s) flagged.", merged.risk_flags.len()));
    parts.push(format!("Confidence {:.0}%.", overall.confidence * 100.0));
    parts.join(" ")
}

/// Stamp run identity onto the report and check it end to end. Any violation
/// is fatal.
pub fn finalize(mut report: Report) -> Result<Report, PipelineError> {
    report.metadata.schema_version = SCHEMA_VERSION.to_string();
    report.metadata.run_id = Uuid::new_v4().to_string();
    report.metadata.generated_at = Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true);
    validate_report(&report).map_err(|reason| PipelineError::SchemaViolationFinal { reason })?;
    Ok(report)
}

/// Every structural rule a finished report must satisfy. Reports all
/// violations at once.
pub fn validate_report(report: &Report) -> Result<(), String> {
    let mut problems = Vec::new();

    for dim in Dimension::ALL {
        match report.dimensions.get(&dim) {
            None => problems.push(format!("dimension {} is missing", dim.as_str())),
            Some(d) => check_score(dim.as_str(), d.score, d.label, &mut problems),
        }
    }
    let overall = &report.overall_health;
    check_score("overall", overall.score, overall.label, &mut problems);
    if !(overall.confidence.is_finite() && (0.0..=1.0).contains(&overall.confidence)) {
        problems.push(format!("confidence {} is outside [0,1]", overall.confidence));
    }

    if report
        .extracted_content
        .action_items
        .iter()
        .any(|a| a.task.trim().is_empty())
    {
        problems.push("an action item has an empty task".to_string());
    }

    let turn_count = report.statistics.conversation.turn_count;
    for (dim, items) in &report.evidence {
        for item in items.iter().filter(|e| e.turn_index >= turn_count) {
            problems.push(format!(
                "{} evidence points at turn {} of {}",
                dim.as_str(),
                item.turn_index,
                turn_count
            ));
        }
    }

    let meta = &report.metadata;
    if meta.schema_version != SCHEMA_VERSION {
        problems.push(format!("schema_version {:?} is not {SCHEMA_VERSION}", meta.schema_version));
    }
    if Uuid::parse_str(&meta.run_id).is_err() {
        problems.push(format!("run_id {:?} is not a UUID", meta.run_id));
    }
    if DateTime::parse_from_rfc3339(&meta.generated_at).is_err() {
        problems.push(format!("generated_at {:?} is not RFC 3339", meta.generated_at));
    }

    if let Err(e) = validate_weights() {
        problems.push(e);
    }

    if problems.is_empty() {
        Ok(())
    } else {
        Err(problems.join("; "))
    }
}

fn check_score(name: &str, score: f64, label: HealthLabel, problems: &mut Vec<String>) {
    if !(score.is_finite() && (0.0..=100.0).contains(&score)) {
        problems.push(format!("{name} score {score} is outside [0,100]"));
        return;
    }
    let expected = HealthLabel::from_score(score);
    if label != expected {
        problems.push(format!(
            "{name} label {} does not match score {score} (expected {})",
            label.as_str(),
            expected.as_str()
        ));
    }
}
