//! JSON schemas sent with each model call. The schema `name` doubles as the
//! identifier backends and test doubles dispatch on.

use serde_json::json;

use super::JsonSchema;

pub const MESSAGES: &str = "messages";
pub const REMEDIATION: &str = "remediated_turns";
pub const CHUNK_INSIGHT: &str = "chunk_insight";

/// Turns recovered from raw text.
pub fn messages() -> JsonSchema {
    JsonSchema {
        name: MESSAGES,
        schema: json!({
            "type": "object",
            "properties": {
                "messages": {
                    "type": "array",
                    "items": {
                        "type": "object",
                        "properties": {
                            "timestamp": { "type": ["string", "null"] },
                            "speaker": { "type": "string" },
                            "text": { "type": "string" },
                            "kind": { "type": "string", "enum": ["email", "meeting", "chat", "unknown"] }
                        },
                        "required": ["speaker", "text"]
                    }
                }
            },
            "required": ["messages"]
        }),
    }
}

/// Corrected versions of turns that failed validation, keyed by position.
pub fn remediation() -> JsonSchema {
    JsonSchema {
        name: REMEDIATION,
        schema: json!({
            "type": "object",
            "properties": {
                "turns": {
                    "type": "array",
                    "items": {
                        "type": "object",
                        "properties": {
                            "index": { "type": "integer" },
                            "speaker": { "type": "string" },
                            "text": { "type": "string" },
                            "timestamp": { "type": ["string", "null"] },
                            "kind": { "type": "string" }
                        },
                        "required": ["index", "speaker", "text"]
                    }
                }
            },
            "required": ["turns"]
        }),
    }
}

/// Semantic read of one chunk.
pub fn chunk_insight() -> JsonSchema {
    let string_list = json!({ "type": "array", "items": { "type": "string" } });
    JsonSchema {
        name: CHUNK_INSIGHT,
        schema: json!({
            "type": "object",
            "properties": {
                "tone": {
                    "type": "object",
                    "properties": {
                        "positive": { "type": "integer", "minimum": 0 },
                        "negative": { "type": "integer", "minimum": 0 },
                        "neutral": { "type": "integer", "minimum": 0 },
                        "toxic": { "type": "integer", "minimum": 0 }
                    }
                },
                "tone_descriptors": string_list,
                "decisions": string_list,
                "action_items": {
                    "type": "array",
                    "items": {
                        "type": "object",
                        "properties": {
                            "task": { "type": "string" },
                            "owner": { "type": ["string", "null"] },
                            "due_date": { "type": ["string", "null"] }
                        },
                        "required": ["task"]
                    }
                },
                "risk_flags": string_list,
                "collaboration_indicators": string_list,
                "conflict_indicators": string_list,
                "key_topics": string_list,
                "clarity_score": { "type": "number", "minimum": 0, "maximum": 10 },
                "engagement_level": { "type": "number", "minimum": 0, "maximum": 10 }
            },
            "required": ["tone", "decisions", "action_items", "risk_flags"]
        }),
    }
}
