//! Token accounting and iteration budget for one request.
//!
//! Both values live exactly as long as one chat request and are dropped
//! after the reply is returned.

use tracing::debug;

use super::llm::Usage;

/// Running token total across the completion round-trips of one request.
#[derive(Debug, Clone, Default)]
pub struct UsageAccumulator {
    total: usize,
    rounds: usize,
}

impl UsageAccumulator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add one round-trip's reported usage. Never decreases the total.
    pub fn add(&mut self, usage: &Usage) {
        self.total = self.total.saturating_add(usage.total_tokens);
        self.rounds += 1;
        debug!(
            "Token usage: +{} (prompt={}, completion={}) -> {}",
            usage.total_tokens, usage.prompt_tokens, usage.completion_tokens, self.total
        );
    }

    #[inline]
    pub fn total(&self) -> usize {
        self.total
    }

    #[inline]
    pub fn rounds(&self) -> usize {
        self.rounds
    }
}

/// Completion round-trips allowed per request.
pub const DEFAULT_TURN_CEILING: usize = 3;

/// Monotonic iteration counter with a hard ceiling.
#[derive(Debug, Clone)]
pub struct TurnBudget {
    ceiling: usize,
    used: usize,
}

impl Default for TurnBudget {
    fn default() -> Self {
        Self::new(DEFAULT_TURN_CEILING)
    }
}

impl TurnBudget {
    /// Ceilings above [`DEFAULT_TURN_CEILING`] are lowered to it.
    pub fn new(ceiling: usize) -> Self {
        Self {
            ceiling: ceiling.min(DEFAULT_TURN_CEILING),
            used: 0,
        }
    }

    /// Claim one round-trip. Returns false once the ceiling is reached.
    pub fn try_begin(&mut self) -> bool {
        if self.used >= self.ceiling {
            return false;
        }
        self.used += 1;
        true
    }

    /// No further round-trip may start.
    #[inline]
    pub fn is_exhausted(&self) -> bool {
        self.used >= self.ceiling
    }

    #[inline]
    pub fn used(&self) -> usize {
        self.used
    }

    #[inline]
    pub fn ceiling(&self) -> usize {
        self.ceiling
    }
}

/// First `max_chars` characters of `text`, or `None` when it already fits.
pub fn truncate_chars(text: &str, max_chars: usize) -> Option<&str> {
    match text.char_indices().nth(max_chars) {
        Some((end, _)) => Some(&text[..end]),
        None => None,
    }
}
