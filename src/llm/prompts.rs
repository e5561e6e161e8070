use crate::models::Turn;

/// Ask the model to split raw text into turns.
pub fn structuring(text: &str) -> String {
    format!(
        "Split the conversation below into individual messages.\n\
Rules:\n\
- One entry per distinct speaker contribution, in order.\n\
- Clean speaker names (drop trailing colons, quote markers, email addresses when a name is present).\n\
- Convert timestamps to ISO 8601 (YYYY-MM-DDTHH:MM:SS); use null when none is present.\n\
- kind is one of email, meeting, chat, unknown.\n\
- Keep message text as written; skip system lines such as \"joined the call\".\n\
\n\
Conversation:\n\
<<<\n{text}\n>>>"
    )
}

/// One turn that failed validation, with what was wrong with it.
pub struct RemediationItem<'a> {
    pub index: usize,
    pub turn: &'a Turn,
    pub problems: Vec<String>,
}

/// Ask the model to repair turns that failed validation.
pub fn remediation(items: &[RemediationItem<'_>]) -> String {
    let mut out = String::from(
        "The following conversation records failed validation. Return a corrected \
record for each one, keeping its index. Fill a missing speaker from context or use \
\"unknown\"; never invent message text.\n\n",
    );
    for item in items {
        let record = serde_json::json!({
            "index": item.index,
            "speaker": item.turn.speaker,
            "text": item.turn.text,
            "timestamp": item.turn.timestamp,
            "kind": item.turn.kind.as_str(),
        });
        out.push_str(&format!("{record}\n  problems: {}\n", item.problems.join("; ")));
    }
    out
}

/// Ask the model for a semantic read of one chunk of turns.
pub fn extraction(turns: &[Turn], turn_indices: &[usize]) -> String {
    let mut out = String::from(
        "Analyze this part of a conversation for communication health.\n\
Report:\n\
- tone: how many messages are positive, negative, neutral, toxic\n\
- tone_descriptors: short adjectives (professional, tense, supportive...)\n\
- decisions: decisions that were actually made\n\
- action_items: task, owner (null if nobody took it), due_date (null if none)\n\
- risk_flags: unresolved risks, blockers, escalations\n\
- collaboration_indicators and conflict_indicators: short phrases quoted from the text\n\
- key_topics\n\
- clarity_score and engagement_level from 0 to 10\n\
\n\
Conversation:\n",
    );
    for (turn, idx) in turns.iter().zip(turn_indices) {
        match &turn.timestamp {
            Some(ts) => out.push_str(&format!("[{idx}] {} ({ts}): {}\n", turn.speaker, turn.text)),
            None => out.push_str(&format!("[{idx}] {}: {}\n", turn.speaker, turn.text)),
        }
    }
    out
}
