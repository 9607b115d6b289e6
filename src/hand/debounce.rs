//! Temporal debouncing of the per-frame hand state.
//!
//! A raw classification must persist for a dwell time before it becomes
//! the committed state. Committed states are recorded in a fixed-length
//! history, oldest first, which downstream consumers read for edge
//! detection.

use std::collections::VecDeque;

use tracing::debug;

use crate::hand::classifier::HandState;

// ── Config ─────────────────────────────────────────────────

/// Dwell-time thresholds and history length.
#[derive(Debug, Clone)]
pub struct DebounceConfig {
    /// Dwell required to leave the `None` committed state (ms).
    pub from_none_ms: f64,
    /// Dwell required between two non-`None` states (ms).
    pub between_ms: f64,
    /// Number of committed states retained.
    pub history_len: usize,
}

impl Default for DebounceConfig {
    fn default() -> Self {
        Self {
            from_none_ms: 500.0,
            between_ms: 150.0,
            history_len: 5,
        }
    }
}

/// A proposed state and when it was first seen.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CandidateTransition {
    pub state: HandState,
    pub since_ms: f64,
}

// ── Debouncer ──────────────────────────────────────────────

pub struct TemporalDebouncer {
    pub config: DebounceConfig,
    committed: HandState,
    candidate: CandidateTransition,
    history: VecDeque<HandState>,
}

impl TemporalDebouncer {
    pub fn new(config: DebounceConfig) -> Self {
        let len = config.history_len.max(2);
        Self {
            config,
            committed: HandState::None,
            candidate: CandidateTransition {
                state: HandState::None,
                since_ms: 0.0,
            },
            history: std::iter::repeat(HandState::None).take(len).collect(),
        }
    }

    /// Feed one raw classification. Returns true when a new state commits.
    pub fn update(&mut self, raw: HandState, now_ms: f64) -> bool {
        if raw != self.candidate.state {
            self.candidate = CandidateTransition {
                state: raw,
                since_ms: now_ms,
            };
        }

        let threshold = if self.committed == HandState::None {
            self.config.from_none_ms
        } else {
            self.config.between_ms
        };

        let dwell = now_ms - self.candidate.since_ms;
        if dwell > threshold && self.candidate.state != self.committed {
            debug!(
                from = self.committed.as_str(),
                to = self.candidate.state.as_str(),
                dwell_ms = dwell,
                "hand state committed"
            );
            self.committed = self.candidate.state;
            self.history.pop_front();
            self.history.push_back(self.committed);
            return true;
        }
        false
    }

    /// The current committed state.
    pub fn committed(&self) -> HandState {
        self.committed
    }

    pub fn candidate(&self) -> CandidateTransition {
        self.candidate
    }

    /// Committed states, oldest first.
    pub fn history(&self) -> &VecDeque<HandState> {
        &self.history
    }

    /// Most recent history entry (`history[-1]`).
    pub fn last(&self) -> HandState {
        self.history.back().copied().unwrap_or_default()
    }

    /// Second most recent history entry (`history[-2]`).
    pub fn previous(&self) -> HandState {
        self.nth_back(1)
    }

    /// History entry `n` places before the newest (0 = newest).
    pub fn nth_back(&self, n: usize) -> HandState {
        self.history
            .len()
            .checked_sub(n + 1)
            .and_then(|i| self.history.get(i).copied())
            .unwrap_or_default()
    }

    /// Generate s-expression for IPC status.
    pub fn status_sexp(&self) -> String {
        format!(
            "(:committed :{} :candidate :{} :since-ms {:.0} :history {})",
            self.committed.as_str(),
            self.candidate.state.as_str(),
            self.candidate.since_ms,
            history_sexp(self.history.iter().copied()),
        )
    }
}

impl Default for TemporalDebouncer {
    fn default() -> Self {
        Self::new(DebounceConfig::default())
    }
}

/// Format a hand-state sequence as an s-expression list of keywords.
pub fn history_sexp(states: impl IntoIterator<Item = HandState>) -> String {
    let items: Vec<String> = states
        .into_iter()
        .map(|s| format!(":{}", s.as_str()))
        .collect();
    format!("({})", items.join(" "))
}

// ── Tests ──────────────────────────────────────────────────
