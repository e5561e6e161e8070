use crate::models::{Chunk, Turn};

/// Rough token count for a turn: words times `tokens_per_word`, at least 1.
pub fn estimate_tokens(turn: &Turn, tokens_per_word: f64) -> usize {
    let estimate = (turn.word_count() as f64 * tokens_per_word).ceil();
    if estimate.is_finite() && estimate >= 1.0 {
        estimate as usize
    } else {
        1
    }
}

/// Greedily pack turns, in order, into chunks of at most `max_tokens`.
/// A turn that is over budget on its own gets a chunk to itself.
pub fn chunk(turns: &[Turn], max_tokens: usize, tokens_per_word: f64) -> Vec<Chunk> {
    let max_tokens = max_tokens.max(1);
    let mut chunks = Vec::new();
    let mut current = Chunk {
        turns: Vec::new(),
        turn_index_map: Vec::new(),
    };
    let mut current_tokens = 0;

    for (i, turn) in turns.iter().enumerate() {
        let tokens = estimate_tokens(turn, tokens_per_word);
        if !current.turns.is_empty() && current_tokens + tokens > max_tokens {
            chunks.push(std::mem::replace(
                &mut current,
                Chunk {
                    turns: Vec::new(),
                    turn_index_map: Vec::new(),
                },
            ));
            current_tokens = 0;
        }
        current.turns.push(turn.clone());
        current.turn_index_map.push(i);
        current_tokens += tokens;
    }

    if !current.turns.is_empty() {
        chunks.push(current);
    }
    chunks
}
