//! Refresh cycle state machine and per-cycle results.
//!
//! Only one full refresh runs at a time; a timer tick arriving while a cycle
//! is in flight is skipped rather than queued.

/// Orchestrator cycle state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CycleState {
    #[default]
    Idle,
    FetchingAll,
}

impl CycleState {
    /// True if a new full refresh can be started.
    pub fn can_start_cycle(self) -> bool {
        matches!(self, CycleState::Idle)
    }

    /// State after submitting a cycle's fetch tasks.
    pub fn on_cycle_start(self) -> Self {
        CycleState::FetchingAll
    }

    /// State after every task of the cycle has reported back.
    pub fn on_cycle_done(self) -> Self {
        CycleState::Idle
    }
}

/// How one city's fetch task ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FetchOutcome {
    /// Provider data was written to the cache.
    Live,
    /// The fetch failed; generated data was written instead.
    Fallback,
    /// The city stopped being a favorite mid-flight; nothing was written.
    Discarded,
}

/// Outcome of one pass over all tracked cities.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CycleReport {
    pub live: Vec<String>,
    pub fallback: Vec<String>,
    pub discarded: Vec<String>,
}

impl CycleReport {
    pub fn record(&mut self, city: String, outcome: FetchOutcome) {
        match outcome {
            FetchOutcome::Live => self.live.push(city),
            FetchOutcome::Fallback => self.fallback.push(city),
            FetchOutcome::Discarded => self.discarded.push(city),
        }
    }

    /// At least one city was fetched live.
    ///
    /// A cycle where every city fell back is a failure even though the cache
    /// was filled: it means the provider is unreachable.
    pub fn succeeded(&self) -> bool {
        !self.live.is_empty()
    }

    /// Number of cities the cycle attempted
    pub fn attempted(&self) -> usize {
        self.live.len() + self.fallback.len() + self.discarded.len()
    }

    pub fn is_empty(&self) -> bool {
        self.attempted() == 0
    }
}
