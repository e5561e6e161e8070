use serde::{Deserialize, Serialize};

/// Channel a turn came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum TurnKind {
    Email,
    Meeting,
    Chat,
    #[default]
    Unknown,
}

impl TurnKind {
    /// Map a free-form channel label onto a kind. Unrecognized labels are `Unknown`.
    pub fn from_label(s: &str) -> Self {
        match s.trim().to_lowercase().as_str() {
            "email" | "mail" | "e-mail" => TurnKind::Email,
            "meeting" | "call" | "transcript" | "voice" => TurnKind::Meeting,
            "chat" | "message" | "slack" | "dm" | "im" | "sms" => TurnKind::Chat,
            _ => TurnKind::Unknown,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            TurnKind::Email => "email",
            TurnKind::Meeting => "meeting",
            TurnKind::Chat => "chat",
            TurnKind::Unknown => "unknown",
        }
    }
}

/// One normalized utterance.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Turn {
    /// RFC 3339 timestamp, `None` when absent or unparseable.
    pub timestamp: Option<String>,
    pub speaker: String,
    pub text: String,
    pub kind: TurnKind,
}

impl Turn {
    pub fn new(speaker: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            timestamp: None,
            speaker: speaker.into(),
            text: text.into(),
            kind: TurnKind::Unknown,
        }
    }

    pub fn with_timestamp(mut self, ts: impl Into<String>) -> Self {
        self.timestamp = Some(ts.into());
        self
    }

    pub fn with_kind(mut self, kind: TurnKind) -> Self {
        self.kind = kind;
        self
    }

    pub fn word_count(&self) -> usize {
        word_count(&self.text)
    }
}

/// Speaker placeholder for turns whose author cannot be recovered.
pub const UNKNOWN_SPEAKER: &str = "unknown";

/// A token-bounded, contiguous run of turns plus their indices in the full sequence.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Chunk {
    pub turns: Vec<Turn>,
    pub turn_index_map: Vec<usize>,
}

impl Chunk {
    pub fn word_count(&self) -> usize {
        self.turns.iter().map(Turn::word_count).sum()
    }
}

/// The five scored communication-health axes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Dimension {
    Tone,
    Clarity,
    Responsiveness,
    Participation,
    Engagement,
}

impl Dimension {
    pub const ALL: [Dimension; 5] = [
        Dimension::Tone,
        Dimension::Clarity,
        Dimension::Responsiveness,
        Dimension::Participation,
        Dimension::Engagement,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Dimension::Tone => "tone",
            Dimension::Clarity => "clarity",
            Dimension::Responsiveness => "responsiveness",
            Dimension::Participation => "participation",
            Dimension::Engagement => "engagement",
        }
    }

    pub fn description(&self) -> &'static str {
        match self {
            Dimension::Tone => "Emotional tone and civility of the exchange",
            Dimension::Clarity => "Clarity of requests, decisions and ownership",
            Dimension::Responsiveness => "Timeliness of replies between participants",
            Dimension::Participation => "Balance of contribution across participants",
            Dimension::Engagement => "Active involvement through questions and acknowledgment",
        }
    }
}

/// Emotional tone counts reported for a chunk (or summed across chunks).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ToneCounts {
    pub positive: u32,
    pub negative: u32,
    pub neutral: u32,
    pub toxic: u32,
}

impl ToneCounts {
    pub fn total(&self) -> u32 {
        self.positive
            .saturating_add(self.negative)
            .saturating_add(self.neutral)
            .saturating_add(self.toxic)
    }

    pub fn add(&mut self, other: &ToneCounts) {
        self.positive = self.positive.saturating_add(other.positive);
        self.negative = self.negative.saturating_add(other.negative);
        self.neutral = self.neutral.saturating_add(other.neutral);
        self.toxic = self.toxic.saturating_add(other.toxic);
    }

    pub fn positive_ratio(&self) -> f64 {
        let total = self.total();
        if total == 0 {
            0.0
        } else {
            self.positive as f64 / total as f64
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActionItem {
    pub task: String,
    pub owner: Option<String>,
    pub due_date: Option<String>,
}

/// Semantic extraction for one chunk. `fallback` marks the typed-empty result
/// used when the model call failed.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChunkInsight {
    pub chunk_index: usize,
    pub word_count: usize,
    pub tone: ToneCounts,
    pub tone_descriptors: Vec<String>,
    pub decisions: Vec<String>,
    pub action_items: Vec<ActionItem>,
    pub risk_flags: Vec<String>,
    pub collaboration_indicators: Vec<String>,
    pub conflict_indicators: Vec<String>,
    pub key_topics: Vec<String>,
    /// 0-10, as rated by the model.
    pub clarity: Option<f64>,
    /// 0-10, as rated by the model.
    pub engagement: Option<f64>,
    pub fallback: bool,
}

impl ChunkInsight {
    pub fn fallback(chunk_index: usize, word_count: usize) -> Self {
        Self {
            chunk_index,
            word_count,
            tone: ToneCounts::default(),
            tone_descriptors: Vec::new(),
            decisions: Vec::new(),
            action_items: Vec::new(),
            risk_flags: Vec::new(),
            collaboration_indicators: Vec::new(),
            conflict_indicators: Vec::new(),
            key_topics: Vec::new(),
            clarity: None,
            engagement: None,
            fallback: true,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RankedItem {
    pub item: String,
    pub frequency: usize,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize)]
pub struct HealthFlags {
    pub has_unresolved_risk: bool,
    pub conflicts_detected: bool,
    pub collaboration_present: bool,
    pub positive_tone: bool,
    pub high_clarity: bool,
    pub good_engagement: bool,
    /// Few enough distinct topics that the conversation stayed on track.
    pub topic_focus: bool,
    pub unassigned_action_items: usize,
    pub fallback_chunks: usize,
}

/// All chunk insights reconciled into one result.
#[derive(Debug, Clone, PartialEq, Default, Serialize)]
pub struct MergedInsight {
    pub chunk_count: usize,
    pub total_words: usize,
    pub tone: ToneCounts,
    pub tone_descriptors: Vec<RankedItem>,
    pub key_topics: Vec<RankedItem>,
    pub decisions: Vec<String>,
    pub action_items: Vec<ActionItem>,
    pub risk_flags: Vec<String>,
    pub collaboration_indicators: Vec<String>,
    pub conflict_indicators: Vec<String>,
    pub clarity: Option<f64>,
    pub engagement: Option<f64>,
    pub flags: HealthFlags,
}

pub fn word_count(text: &str) -> usize {
    text.split_whitespace().count()
}

/// Lower-cased, whitespace-collapsed form used for equality across turns and chunks.
pub fn normalized_text(text: &str) -> String {
    text.split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase()
}

/// Truncate to at most `max_chars` characters, appending "..." when cut.
pub fn truncate_chars(text: &str, max_chars: usize) -> String {
    if text.chars().count() <= max_chars {
        return text.to_string();
    }
    let mut out: String = text.chars().take(max_chars.saturating_sub(3)).collect();
    out.push_str("...");
    out
}
