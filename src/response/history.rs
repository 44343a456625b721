//! Rolling window of previous exchanges.
//!
//! [`Conversation`] keeps the last *N* utterance/reply pairs so follow-up
//! questions ("and tomorrow?") have context.  The window is cleared when the
//! user has been quiet longer than `idle_reset`, which usually means a new
//! topic.

use std::collections::VecDeque;
use std::time::{Duration, Instant};

/// One utterance and the reply it received.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Exchange {
    pub utterance: String,
    pub reply: String,
}

#[derive(Debug)]
pub struct Conversation {
    exchanges: VecDeque<Exchange>,
    max_turns: usize,
    idle_reset: Duration,
    last_activity: Instant,
}

impl Conversation {
    pub fn new(max_turns: usize, idle_reset: Duration) -> Self {
        Self {
            exchanges: VecDeque::with_capacity(max_turns + 1),
            max_turns,
            idle_reset,
            last_activity: Instant::now(),
        }
    }

    /// Record a finished exchange, dropping the oldest beyond `max_turns`.
    pub fn push(&mut self, utterance: impl Into<String>, reply: impl Into<String>) {
        self.expire();
        if self.max_turns == 0 {
            return;
        }
        self.exchanges.push_back(Exchange {
            utterance: utterance.into(),
            reply: reply.into(),
        });
        while self.exchanges.len() > self.max_turns {
            self.exchanges.pop_front();
        }
        self.last_activity = Instant::now();
    }

    /// Exchanges still in the window, oldest first.
    pub fn recent(&mut self) -> Vec<Exchange> {
        self.expire();
        self.exchanges.iter().cloned().collect()
    }

    pub fn clear(&mut self) {
        self.exchanges.clear();
    }

    fn expire(&mut self) {
        if self.last_activity.elapsed() > self.idle_reset {
            self.exchanges.clear();
        }
    }
}
