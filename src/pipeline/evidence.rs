use regex::Regex;
use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::LazyLock;

use crate::models::{truncate_chars, Dimension, MergedInsight, Turn};

/// Longest snippet kept per evidence item, in characters.
pub const MAX_SNIPPET_CHARS: usize = 200;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Polarity {
    Supporting,
    Concerning,
}

/// A quoted turn backing a dimension's score.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EvidenceItem {
    pub text: String,
    pub speaker: String,
    pub turn_index: usize,
    pub polarity: Polarity,
}

/// Number of turns matching each side of a dimension's markers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct MarkerCounts {
    pub supporting: usize,
    pub concerning: usize,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize)]
pub struct Evidence {
    pub items: BTreeMap<Dimension, Vec<EvidenceItem>>,
    pub counts: BTreeMap<Dimension, MarkerCounts>,
}

impl Evidence {
    pub fn counts_for(&self, dim: Dimension) -> MarkerCounts {
        self.counts.get(&dim).copied().unwrap_or_default()
    }

    pub fn is_empty(&self) -> bool {
        self.items.values().all(Vec::is_empty)
    }
}

struct MarkerSet {
    dimension: Dimension,
    supporting: Vec<Regex>,
    concerning: Vec<Regex>,
}

fn compile(patterns: &[&str]) -> Vec<Regex> {
    patterns
        .iter()
        .map(|p| Regex::new(&format!("(?i){p}")).expect("valid regex"))
        .collect()
}

static MARKERS: LazyLock<Vec<MarkerSet>> = LazyLock::new(|| {
    vec![
        MarkerSet {
            dimension: Dimension::Tone,
            supporting: compile(&[
                r"\b(thanks|thank you|appreciate\w*|grateful)\b",
                r"\b(great (job|work|idea)|well done|nice work|good point|happy to help)\b",
                r"\b(let's work together|team effort|i agree)\b",
            ]),
            concerning: compile(&[
                r"\b(ridiculous|stupid|useless|unacceptable|incompetent|pathetic|shut up)\b",
                r"\b(frustrat\w*|annoy\w*|angry|fed up|sick of|upset)\b",
                r"\b(hate|terrible|awful)\b",
            ]),
        },
        MarkerSet {
            dimension: Dimension::Clarity,
            supporting: compile(&[
                r"\b(to clarify|to summarize|in summary|specifically|the goal is|next steps?)\b",
                r"(?m)^\s*(\d+[.)]|[-*•])\s+\S",
                r"\b(i will|i'll|i can take|assigned to|owner is|by (monday|tuesday|wednesday|thursday|friday|eod|end of (day|week)))\b",
            ]),
            concerning: compile(&[
                r"\b(confus\w*|unclear|not sure what|what do you mean|i don't understand|lost me|which one\?)",
            ]),
        },
        MarkerSet {
            dimension: Dimension::Responsiveness,
            supporting: compile(&[
                r"\b(following up|to answer your|as you asked|in response to|replying to|just sent)\b",
                r"^\s*(done|on it|fixed|shipped)\b",
            ]),
            concerning: compile(&[
                r"\b(still waiting|any update|any news|haven't heard|no response|ping(ing)? again)\b",
                r"^\s*bump\b",
            ]),
        },
        MarkerSet {
            dimension: Dimension::Participation,
            supporting: compile(&[
                r"\b(what do you think|any thoughts|your (view|take|input)|would love to hear|does anyone (else )?have)\b",
                r"\b(let's hear from|what's your take|over to you)\b",
            ]),
            concerning: compile(&[
                r"\b(let me finish|stop interrupting|as i (already )?said|you're not listening|not your call|just do what i)\b",
            ]),
        },
        MarkerSet {
            dimension: Dimension::Engagement,
            supporting: compile(&[
                r"\?",
                r"\b(excited|love (this|that|it)|interesting|awesome|count me in)\b",
            ]),
            concerning: compile(&[
                r"^\s*(whatever|fine|k|meh)\s*[.!]?\s*$",
                r"\b(don't care|not my problem|who cares)\b",
            ]),
        },
    ]
});

/// Scan turns for marker language per dimension. Snippets keep turn order,
/// at most `max_per_dimension` each; counts cover every matching turn.
pub fn collect(turns: &[Turn], merged: &MergedInsight, max_per_dimension: usize) -> Evidence {
    let collab = literal_phrases(&merged.collaboration_indicators);
    let conflict = literal_phrases(&merged.conflict_indicators);

    let mut evidence = Evidence::default();
    for set in MARKERS.iter() {
        let mut items = Vec::new();
        let mut counts = MarkerCounts::default();

        for (i, turn) in turns.iter().enumerate() {
            let lower = turn.text.to_lowercase();
            let mut supporting = set.supporting.iter().any(|re| re.is_match(&turn.text));
            let mut concerning = set.concerning.iter().any(|re| re.is_match(&turn.text));
            if set.dimension == Dimension::Tone {
                supporting |= collab.iter().any(|p| lower.contains(p.as_str()));
                concerning |= conflict.iter().any(|p| lower.contains(p.as_str()));
            }

            if supporting {
                counts.supporting += 1;
            }
            if concerning {
                counts.concerning += 1;
            }
            let polarity = match (supporting, concerning) {
                (_, true) => Polarity::Concerning,
                (true, false) => Polarity::Supporting,
                (false, false) => continue,
            };
            if items.len() < max_per_dimension {
                items.push(EvidenceItem {
                    text: truncate_chars(turn.text.trim(), MAX_SNIPPET_CHARS),
                    speaker: turn.speaker.clone(),
                    turn_index: i,
                    polarity,
                });
            }
        }

        evidence.items.insert(set.dimension, items);
        evidence.counts.insert(set.dimension, counts);
    }
    evidence
}

/// Model-reported indicator phrases usable as literal matches.
fn literal_phrases(phrases: &[String]) -> Vec<String> {
    phrases
        .iter()
        .map(|p| p.trim().to_lowercase())
        .filter(|p| p.chars().count() >= 3)
        .collect()
}
