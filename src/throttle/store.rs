//! The throttle store: per-key fixed-window counters.

use std::sync::Arc;

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use parking_lot::RwLock;
use serde::Serialize;
use tracing::{debug, trace};

use crate::clock::{Clock, SystemClock};
use crate::config::FloodgateConfig;
use crate::error::Result;

use super::entry::ThrottleEntry;
use super::policy::ThrottlePolicy;

/// The outcome of a throttle check.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Decision {
    /// Whether the request is admitted
    pub allowed: bool,
    /// Requests left in the current window
    pub remaining: u32,
    /// End of the current window, epoch milliseconds
    pub reset_at: u64,
}

/// Process-wide throttle state, shared by all request handlers.
///
/// The store is an explicitly constructed object rather than a module-level
/// global, so each test (or each embedding process) owns its own lifecycle.
/// It is thread-safe and cheap to share behind an [`Arc`].
pub struct ThrottleStore {
    /// Window counters indexed by caller-supplied key
    entries: DashMap<String, ThrottleEntry>,
    /// Default policy, per-route overrides, and sweep tuning
    config: RwLock<FloodgateConfig>,
    /// Time source; swapped for a manual clock in tests
    clock: Arc<dyn Clock>,
}

impl ThrottleStore {
    /// Create a store with the default configuration and the system clock.
    pub fn new() -> Self {
        Self::with_config(FloodgateConfig::default())
    }

    /// Create a store with the given configuration.
    pub fn with_config(config: FloodgateConfig) -> Self {
        Self {
            entries: DashMap::new(),
            config: RwLock::new(config),
            clock: Arc::new(SystemClock),
        }
    }

    /// Create a store with an injected time source and default configuration.
    pub fn with_clock(clock: Arc<dyn Clock>) -> Self {
        Self {
            entries: DashMap::new(),
            config: RwLock::new(FloodgateConfig::default()),
            clock,
        }
    }

    /// Replace the store's configuration.
    pub fn set_config(&self, config: FloodgateConfig) {
        let mut cfg = self.config.write();
        *cfg = config;
    }

    /// Get a copy of the current configuration.
    pub fn config(&self) -> FloodgateConfig {
        self.config.read().clone()
    }

    /// Current time in epoch milliseconds, from the store's clock.
    pub fn now_millis(&self) -> u64 {
        self.clock.now_millis()
    }

    /// Check whether a request identified by `key` is admitted under `policy`.
    ///
    /// Every call counts toward the window, including calls that end up
    /// denied. The read-modify-write is atomic per key: the map shard stays
    /// locked for the whole transaction, so concurrent callers can neither
    /// lose an increment nor both recreate an expired entry.
    ///
    /// The entry is identified by `key` alone, not by the policy. Callers
    /// checking the same key under different policies must namespace the key
    /// themselves, or use [`check_route`](Self::check_route).
    pub fn check(&self, key: &str, policy: &ThrottlePolicy) -> Result<Decision> {
        policy.validate()?;
        let now = self.clock.now_millis();

        trace!(
            key = %key,
            max_requests = policy.max_requests,
            window_ms = policy.window_ms,
            "Checking throttle"
        );

        let decision = match self.entries.entry(key.to_owned()) {
            Entry::Occupied(mut occupied) => {
                let entry = occupied.get_mut();
                if entry.is_expired(now) {
                    // Lazy expiry: a passed window is treated as absent.
                    *entry = ThrottleEntry::open(now + policy.window_ms);
                    Decision {
                        allowed: true,
                        remaining: entry.remaining(policy.max_requests),
                        reset_at: entry.reset_at,
                    }
                } else {
                    entry.record();
                    let allowed = entry.count <= policy.max_requests;
                    if !allowed {
                        debug!(
                            key = %key,
                            count = entry.count,
                            "Throttle limit exceeded"
                        );
                    }
                    Decision {
                        allowed,
                        remaining: entry.remaining(policy.max_requests),
                        reset_at: entry.reset_at,
                    }
                }
            }
            Entry::Vacant(vacant) => {
                debug!(key = %key, "Creating new throttle entry");
                let entry = vacant.insert(ThrottleEntry::open(now + policy.window_ms));
                Decision {
                    allowed: true,
                    remaining: entry.remaining(policy.max_requests),
                    reset_at: entry.reset_at,
                }
            }
        };

        Ok(decision)
    }

    /// Check `key` against the configured default policy.
    pub fn check_default(&self, key: &str) -> Result<Decision> {
        let policy = self.config.read().default_policy;
        self.check(key, &policy)
    }

    /// Check `key` against the policy configured for `route`.
    ///
    /// The entry key is namespaced as `"{route}:{key}"` so two routes with
    /// different policies never share a window for the same client.
    pub fn check_route(&self, route: &str, key: &str) -> Result<Decision> {
        let policy = self.config.read().policy_for(route);
        self.check(&format!("{}:{}", route, key), &policy)
    }

    /// Remove all entries whose window has passed.
    ///
    /// Returns the number of entries removed. Purely a housekeeping
    /// optimization: lazy expiry in [`check`](Self::check) already makes
    /// expired entries unobservable.
    pub fn sweep(&self) -> usize {
        let now = self.clock.now_millis();
        let before = self.entries.len();
        self.entries.retain(|_, entry| !entry.is_expired(now));
        let removed = before.saturating_sub(self.entries.len());

        if removed > 0 {
            debug!(
                removed = removed,
                remaining = self.entries.len(),
                "Swept expired throttle entries"
            );
        }
        removed
    }

    /// Number of physically present entries, including expired ones not yet
    /// swept.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the store holds no entries.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Drop all entries.
    ///
    /// This is primarily useful for testing.
    pub fn clear(&self) {
        self.entries.clear();
    }
}

impl Default for ThrottleStore {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;

    fn store_at(millis: u64) -> (Arc<ThrottleStore>, Arc<ManualClock>) {
        let clock = Arc::new(ManualClock::new(millis));
        let store = Arc::new(ThrottleStore::with_clock(clock.clone()));
        (store, clock)
    }

    #[test]
    fn test_first_check_admits_and_creates_entry() {
        let (store, _) = store_at(0);
        let policy = ThrottlePolicy::new(5, 1_000);

        let decision = store.check("ip:10.0.0.1", &policy).unwrap();

        assert!(decision.allowed);
        assert_eq!(decision.remaining, 4);
        assert_eq!(decision.reset_at, 1_000);
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn test_monotonic_denial_after_limit() {
        let (store, _) = store_at(0);
        let policy = ThrottlePolicy::new(3, 1_000);

        for _ in 0..3 {
            assert!(store.check("k", &policy).unwrap().allowed);
        }

        let denied = store.check("k", &policy).unwrap();
        assert!(!denied.allowed);
        assert_eq!(denied.remaining, 0);
    }

    #[test]
    fn test_remaining_is_exact_within_window() {
        let (store, _) = store_at(0);
        let policy = ThrottlePolicy::new(5, 1_000);

        for k in 1..=5u32 {
            let decision = store.check("k", &policy).unwrap();
            assert_eq!(decision.remaining, 5 - k);
        }
    }

    #[test]
    fn test_window_reset_behaves_like_fresh_key() {
        let (store, clock) = store_at(0);
        let policy = ThrottlePolicy::new(3, 1_000);

        for _ in 0..4 {
            store.check("k", &policy).unwrap();
        }
        assert!(!store.check("k", &policy).unwrap().allowed);

        clock.advance(1_000);
        let decision = store.check("k", &policy).unwrap();
        assert!(decision.allowed);
        assert_eq!(decision.remaining, 2);
        assert_eq!(decision.reset_at, 2_000);
    }

    #[test]
    fn test_keys_are_isolated() {
        let (store, _) = store_at(0);
        let policy = ThrottlePolicy::new(2, 1_000);

        store.check("a", &policy).unwrap();
        store.check("a", &policy).unwrap();
        assert!(!store.check("a", &policy).unwrap().allowed);

        let decision = store.check("b", &policy).unwrap();
        assert!(decision.allowed);
        assert_eq!(decision.remaining, 1);
    }

    #[test]
    fn test_denied_calls_still_count() {
        let (store, clock) = store_at(0);
        let policy = ThrottlePolicy::new(1, 1_000);

        assert!(store.check("k", &policy).unwrap().allowed);
        assert!(!store.check("k", &policy).unwrap().allowed);
        assert!(!store.check("k", &policy).unwrap().allowed);

        // Denials do not extend the window; it still resets on schedule.
        clock.advance(1_000);
        assert!(store.check("k", &policy).unwrap().allowed);
    }

    #[test]
    fn test_expiry_identical_with_or_without_sweep() {
        let policy = ThrottlePolicy::new(3, 1_000);

        let (swept, swept_clock) = store_at(0);
        let (lazy, lazy_clock) = store_at(0);

        for _ in 0..3 {
            swept.check("k", &policy).unwrap();
            lazy.check("k", &policy).unwrap();
        }

        swept_clock.advance(1_500);
        lazy_clock.advance(1_500);

        assert_eq!(swept.sweep(), 1);
        assert_eq!(swept.len(), 0);
        assert_eq!(lazy.len(), 1);

        let a = swept.check("k", &policy).unwrap();
        let b = lazy.check("k", &policy).unwrap();
        assert_eq!(a, b);
        assert!(a.allowed);
        assert_eq!(a.remaining, 2);
    }

    #[test]
    fn test_documented_timeline_scenario() {
        let (store, clock) = store_at(0);
        let policy = ThrottlePolicy::new(3, 1_000);
        let key = "ip:1.2.3.4";

        let expected_remaining = [2, 1, 0];
        for (at, remaining) in [0u64, 100, 200].iter().zip(expected_remaining) {
            clock.set(*at);
            let decision = store.check(key, &policy).unwrap();
            assert!(decision.allowed);
            assert_eq!(decision.remaining, remaining);
        }

        clock.set(300);
        let denied = store.check(key, &policy).unwrap();
        assert!(!denied.allowed);
        assert_eq!(denied.remaining, 0);
        assert_eq!(denied.reset_at, 1_000);

        clock.set(1_050);
        let fresh = store.check(key, &policy).unwrap();
        assert!(fresh.allowed);
        assert_eq!(fresh.remaining, 2);
        assert_eq!(fresh.reset_at, 2_050);
    }

    #[test]
    fn test_concurrent_checks_admit_exactly_the_limit() {
        let (store, _) = store_at(0);
        let policy = ThrottlePolicy::new(10, 60_000);

        let handles: Vec<_> = (0..50)
            .map(|_| {
                let store = store.clone();
                std::thread::spawn(move || store.check("shared", &policy).unwrap().allowed)
            })
            .collect();

        let admitted = handles
            .into_iter()
            .map(|h| h.join().unwrap())
            .filter(|allowed| *allowed)
            .count();

        assert_eq!(admitted, 10);
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn test_invalid_policy_is_rejected() {
        let (store, _) = store_at(0);

        assert!(store.check("k", &ThrottlePolicy::new(0, 1_000)).is_err());
        assert!(store.check("k", &ThrottlePolicy::new(10, 0)).is_err());
        // A rejected check must not create state.
        assert_eq!(store.len(), 0);
    }

    #[test]
    fn test_check_default_uses_configured_policy() {
        let (store, _) = store_at(0);

        let decision = store.check_default("k").unwrap();
        assert!(decision.allowed);
        assert_eq!(decision.remaining, 99);
    }

    #[test]
    fn test_check_route_namespaces_keys() {
        let (store, _) = store_at(0);
        let mut config = FloodgateConfig::default();
        config
            .routes
            .insert("upload".to_string(), ThrottlePolicy::new(1, 60_000));
        store.set_config(config);

        assert!(store.check_route("upload", "ip:1.1.1.1").unwrap().allowed);
        assert!(!store.check_route("upload", "ip:1.1.1.1").unwrap().allowed);

        // Same client key under a different route is a separate window.
        let other = store.check_route("search", "ip:1.1.1.1").unwrap();
        assert!(other.allowed);
        assert_eq!(other.remaining, 99);
    }
}
