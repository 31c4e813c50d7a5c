//! Per-key counter state.

/// Counter state for a single key within one fixed window.
///
/// At most one entry exists per key at any instant. An entry whose `reset_at`
/// has passed is logically expired and treated as absent, whether or not the
/// background sweep has physically removed it yet.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ThrottleEntry {
    /// Requests counted in the current window, admitted or denied
    pub count: u32,
    /// End of the current window, epoch milliseconds
    pub reset_at: u64,
}

impl ThrottleEntry {
    /// Open a fresh window ending at `reset_at`, counting its first request.
    pub fn open(reset_at: u64) -> Self {
        Self { count: 1, reset_at }
    }

    /// Whether this entry's window has passed at `now`.
    pub fn is_expired(&self, now: u64) -> bool {
        self.reset_at <= now
    }

    /// Count one more request in this window.
    pub fn record(&mut self) {
        self.count = self.count.saturating_add(1);
    }

    /// Quota left in this window under a limit of `max_requests`.
    pub fn remaining(&self, max_requests: u32) -> u32 {
        max_requests.saturating_sub(self.count)
    }
}
