use bergo_llm::TokenUsage;

/// Session token accounting. The session counter tracks the latest stream's
/// usage (its prompt size approximates the live context); the total counter
/// accumulates across the whole process lifetime.
#[derive(Clone, Debug, Default)]
pub struct Stats {
    pub session: TokenUsage,
    pub total: TokenUsage,
    pub window_size: u64,
}

impl Stats {
    /// Record the usage of one completed stream.
    pub fn set_token_usage(&mut self, usage: &TokenUsage) {
        self.session = *usage;
        self.total.accumulate(usage);
    }

    pub fn add_token_usage(&mut self, usage: &TokenUsage) {
        self.session.accumulate(usage);
        self.total.accumulate(usage);
    }

    pub fn reset_session(&mut self) {
        self.session = TokenUsage::default();
    }

    /// Whether usage crossed the compaction threshold of the model's window.
    pub fn over_compact_threshold(&self, threshold: f64) -> bool {
        self.window_size != 0
            && self.session.total_tokens as f64 > self.window_size as f64 * threshold
    }
}
