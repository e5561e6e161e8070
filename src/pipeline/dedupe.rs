use regex::Regex;
use std::collections::HashSet;
use std::sync::LazyLock;
use tracing::debug;

use crate::models::{normalized_text, Turn, TurnKind};

/// Lines at which quoted history begins; everything from here on is dropped.
static REPLY_HEADER: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    [
        r"(?i)^on\s.+\swrote:\s*$",
        r"(?i)^-{2,}\s*original message\s*-{2,}",
        r"(?i)^-{2,}\s*forwarded message\s*-{2,}",
        r"(?i)^begin forwarded message:?",
    ]
    .iter()
    .map(|p| Regex::new(p).expect("valid regex"))
    .collect()
});

static MOBILE_FOOTER: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)^(sent from my\b|get outlook for\b)").expect("valid regex")
});

static HEADER_LINE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)^from:\s").expect("valid regex"));

static SIGN_OFF: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)^(best|best regards|kind regards|warm regards|regards|thanks|cheers|sincerely),?$")
        .expect("valid regex")
});

static EXCESS_NEWLINES: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\n{3,}").expect("valid regex"));

/// Drop quoted lines, reply history, footers and signatures from one turn's text.
pub fn strip_boilerplate(text: &str, kind: TurnKind) -> String {
    let mut kept: Vec<&str> = Vec::new();
    let mut has_content = false;

    for line in text.lines() {
        let t = line.trim();
        if t.starts_with('>') {
            continue;
        }
        if REPLY_HEADER.iter().any(|re| re.is_match(t)) || MOBILE_FOOTER.is_match(t) {
            break;
        }
        // "-- " signature delimiter
        if t == "--" {
            break;
        }
        if has_content && HEADER_LINE.is_match(t) {
            break;
        }
        if has_content && kind == TurnKind::Email && SIGN_OFF.is_match(t) {
            break;
        }
        kept.push(line.trim_end());
        if !t.is_empty() {
            has_content = true;
        }
    }

    let joined = kept.join("\n");
    EXCESS_NEWLINES
        .replace_all(joined.trim(), "\n\n")
        .into_owned()
}

/// Strip boilerplate, then collapse repeats of an earlier turn by the same
/// speaker. Order is preserved and the first occurrence wins.
pub fn dedupe(turns: &[Turn]) -> Vec<Turn> {
    let mut seen: HashSet<(String, String)> = HashSet::new();
    let mut out = Vec::with_capacity(turns.len());

    for turn in turns {
        let text = strip_boilerplate(&turn.text, turn.kind);
        if text.is_empty() {
            debug!("Dropping turn by {}: empty after boilerplate removal", turn.speaker);
            continue;
        }
        let key = (turn.speaker.to_lowercase(), normalized_text(&text));
        if !seen.insert(key) {
            debug!("Dropping repeated turn by {}", turn.speaker);
            continue;
        }
        out.push(Turn {
            text,
            ..turn.clone()
        });
    }

    out
}
