//! Session state: the conversation history and cumulative usage counters.
//!
//! Messages accumulate monotonically within a session; the context
//! reducers replace content in place (editor) or rebuild the whole list
//! (summarizer) through [`Session::replace_messages`]. Usage is tracked
//! per turn; the summarizer's own calls are booked under turn 0.

use std::collections::BTreeMap;

use ax_domain::{Message, UsageMetrics};

pub struct Session {
    id: String,
    turn: u32,
    messages: Vec<Message>,
    usage_by_turn: BTreeMap<u32, UsageMetrics>,
    cumulative: UsageMetrics,
}

impl Session {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            turn: 0,
            messages: Vec::new(),
            usage_by_turn: BTreeMap::new(),
            cumulative: UsageMetrics::default(),
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    /// The current turn number; 0 until the first turn begins.
    pub fn turn(&self) -> u32 {
        self.turn
    }

    pub fn begin_turn(&mut self) -> u32 {
        self.turn += 1;
        self.turn
    }

    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    pub fn push(&mut self, message: Message) {
        self.messages.push(message);
    }

    /// Swap in a reduced history (context editing or summarization).
    pub fn replace_messages(&mut self, messages: Vec<Message>) {
        self.messages = messages;
    }

    /// Book usage under a turn (turn 0 for summarizer calls) and into the
    /// session-wide cumulative counters.
    pub fn record_usage(&mut self, turn: u32, usage: &UsageMetrics) {
        self.usage_by_turn.entry(turn).or_default().accumulate(usage);
        self.cumulative.accumulate(usage);
    }

    pub fn usage_for_turn(&self, turn: u32) -> UsageMetrics {
        self.usage_by_turn.get(&turn).copied().unwrap_or_default()
    }

    pub fn cumulative_usage(&self) -> UsageMetrics {
        self.cumulative
    }

    /// Total tokens across the whole session, the number the summarizer's
    /// trigger compares against the context window.
    pub fn cumulative_total_tokens(&self) -> usize {
        self.cumulative.total_tokens as usize
    }
}
