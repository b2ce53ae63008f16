//! Decides when a render cycle is complete.

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompletionState {
    Running,
    Complete,
}

/// `Running` until the primary stream is exhausted and no enrichment task is
/// outstanding; then `Complete` for the rest of the cycle.
#[derive(Debug, Clone)]
pub struct CompletionTracker {
    state: CompletionState,
    primary_done: bool,
    outstanding: usize,
}

impl CompletionTracker {
    pub fn new() -> Self {
        Self {
            state: CompletionState::Running,
            primary_done: false,
            outstanding: 0,
        }
    }

    /// Start a new cycle.
    pub fn begin(&mut self) {
        *self = Self::new();
    }

    pub fn state(&self) -> CompletionState {
        self.state
    }

    pub fn outstanding(&self) -> usize {
        self.outstanding
    }

    pub fn is_primary_done(&self) -> bool {
        self.primary_done
    }

    pub fn primary_done(&mut self) {
        self.primary_done = true;
    }

    pub fn task_started(&mut self) {
        self.outstanding += 1;
    }

    pub fn task_settled(&mut self) {
        debug_assert!(self.outstanding > 0, "settled more tasks than were started");
        self.outstanding = self.outstanding.saturating_sub(1);
    }

    /// `true` exactly once per cycle: on the call that observes both
    /// conditions satisfied.
    pub fn try_complete(&mut self) -> bool {
        if self.state == CompletionState::Running && self.primary_done && self.outstanding == 0 {
            self.state = CompletionState::Complete;
            return true;
        }
        false
    }
}

impl Default for CompletionTracker {
    fn default() -> Self {
        Self::new()
    }
}
