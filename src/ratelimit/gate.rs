//! Core rate limit gate implementation.

use std::time::{Duration, Instant};

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use tracing::{debug, trace};

use super::identity::ClientIdentity;
use super::window::ClientWindow;
use crate::error::RateLimitExceeded;

/// Default length of a counting window.
const DEFAULT_WINDOW: Duration = Duration::from_secs(60);
/// Default number of requests admitted per identity per window.
const DEFAULT_MAX_REQUESTS: u64 = 10;
/// Default period between background sweeps.
const DEFAULT_SWEEP_INTERVAL: Duration = Duration::from_secs(5 * 60);

/// Settings for a [`RateLimitGate`], fixed at construction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateLimitSettings {
    /// Length of the counting window
    pub window: Duration,
    /// Requests admitted per identity per window
    pub max_requests: u64,
    /// Period between background eviction passes
    pub sweep_interval: Duration,
}

impl Default for RateLimitSettings {
    fn default() -> Self {
        Self {
            window: DEFAULT_WINDOW,
            max_requests: DEFAULT_MAX_REQUESTS,
            sweep_interval: DEFAULT_SWEEP_INTERVAL,
        }
    }
}

/// Outcome of an admission check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    /// The request may proceed.
    Admit,
    /// The request must be rejected; the client may retry after the hint.
    Deny {
        /// Whole seconds until the client's window resets
        retry_after_secs: u64,
    },
}

impl Decision {
    pub fn is_admitted(&self) -> bool {
        matches!(self, Decision::Admit)
    }

    /// Convert into a `Result` so callers can bail out with `?`.
    pub fn into_result(self) -> Result<(), RateLimitExceeded> {
        match self {
            Decision::Admit => Ok(()),
            Decision::Deny { retry_after_secs } => Err(RateLimitExceeded { retry_after_secs }),
        }
    }
}

/// Per-client fixed window rate limiter.
///
/// The gate owns every `ClientWindow`; callers only ever receive a
/// [`Decision`]. It is safe to share behind an `Arc` across request handlers:
/// each identity's check-and-increment runs under its shard's write lock, so
/// concurrent requests can neither lose an increment nor both slip under the
/// threshold.
pub struct RateLimitGate {
    /// Counting windows indexed by client identity
    windows: DashMap<ClientIdentity, ClientWindow>,
    settings: RateLimitSettings,
}

impl RateLimitGate {
    /// Create a new gate with the given settings.
    pub fn new(settings: RateLimitSettings) -> Self {
        Self {
            windows: DashMap::new(),
            settings,
        }
    }

    /// Create a new gate with default settings.
    pub fn with_defaults() -> Self {
        Self::new(RateLimitSettings::default())
    }

    pub fn settings(&self) -> &RateLimitSettings {
        &self.settings
    }

    /// Check whether a request from `identity` may proceed right now.
    pub fn admit(&self, identity: &ClientIdentity) -> Decision {
        self.admit_at(identity, Instant::now())
    }

    /// Check whether a request from `identity` arriving at `now` may proceed.
    ///
    /// Denied requests are still counted, so a client that keeps retrying
    /// inside a blocked window keeps being denied until the window resets.
    pub fn admit_at(&self, identity: &ClientIdentity, now: Instant) -> Decision {
        let window = self.settings.window;

        let mut occupied = match self.windows.entry(identity.clone()) {
            Entry::Vacant(vacant) => {
                vacant.insert(ClientWindow::open(now, window));
                trace!(identity = %identity, "Opened rate limit window");
                return Decision::Admit;
            }
            Entry::Occupied(occupied) => occupied,
        };

        let client = occupied.get_mut();
        if client.is_expired(now) {
            client.reset(now, window);
            trace!(identity = %identity, "Rate limit window elapsed, starting fresh");
            return Decision::Admit;
        }

        let count = client.record();
        if count <= self.settings.max_requests {
            trace!(identity = %identity, count = count, "Request admitted");
            return Decision::Admit;
        }

        let retry_after_secs = client.retry_after_secs(now);
        debug!(
            identity = %identity,
            count = count,
            limit = self.settings.max_requests,
            retry_after_secs = retry_after_secs,
            "Rate limit exceeded"
        );
        Decision::Deny { retry_after_secs }
    }

    /// Evict every window that has fully expired.
    ///
    /// Returns the number of windows removed.
    pub fn sweep(&self) -> usize {
        self.sweep_at(Instant::now())
    }

    /// Evict every window that has fully expired as of `now`.
    ///
    /// The expiry check and the removal happen under the same shard lock, so
    /// a window reset by a concurrent [`admit`](Self::admit) is never evicted.
    pub fn sweep_at(&self, now: Instant) -> usize {
        let before = self.windows.len();
        let mut evicted = 0;
        self.windows.retain(|_, client| {
            let keep = !client.is_expired(now);
            if !keep {
                evicted += 1;
            }
            keep
        });

        debug!(
            evicted = evicted,
            before = before,
            remaining = self.windows.len(),
            "Swept expired rate limit windows"
        );
        evicted
    }

    /// Get the request count of the window tracked for `identity`.
    ///
    /// Returns `None` if no window is tracked. An expired window that has not
    /// been swept yet still reports its last count.
    pub fn current_count(&self, identity: &ClientIdentity) -> Option<u64> {
        self.windows.get(identity).map(|client| client.count())
    }

    /// Get the number of identities currently tracked.
    pub fn tracked_identities(&self) -> usize {
        self.windows.len()
    }
}

impl Default for RateLimitGate {
    fn default() -> Self {
        Self::with_defaults()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    fn identity(raw: &str) -> ClientIdentity {
        ClientIdentity::new(raw)
    }

    fn gate_with_limit(max_requests: u64) -> RateLimitGate {
        RateLimitGate::new(RateLimitSettings {
            max_requests,
            ..RateLimitSettings::default()
        })
    }

    #[test]
    fn test_gate_creation() {
        let gate = RateLimitGate::with_defaults();
        assert_eq!(gate.tracked_identities(), 0);
        assert_eq!(gate.settings().window, Duration::from_secs(60));
        assert_eq!(gate.settings().max_requests, 10);
        assert_eq!(gate.settings().sweep_interval, Duration::from_secs(300));
    }

    #[test]
    fn test_first_request_creates_window() {
        let gate = RateLimitGate::with_defaults();
        let client = identity("10.0.0.1");

        assert_eq!(gate.admit(&client), Decision::Admit);
        assert_eq!(gate.tracked_identities(), 1);
        assert_eq!(gate.current_count(&client), Some(1));
    }

    #[test]
    fn test_limit_exceeded_after_max_requests() {
        let gate = RateLimitGate::with_defaults();
        let client = identity("10.0.0.1");
        let now = Instant::now();

        for _ in 0..10 {
            assert_eq!(gate.admit_at(&client, now), Decision::Admit);
        }

        match gate.admit_at(&client, now) {
            Decision::Deny { retry_after_secs } => assert_eq!(retry_after_secs, 60),
            Decision::Admit => panic!("11th request should be denied"),
        }
    }

    #[test]
    fn test_denied_requests_are_still_counted() {
        let gate = gate_with_limit(2);
        let client = identity("10.0.0.1");
        let now = Instant::now();

        for _ in 0..5 {
            gate.admit_at(&client, now);
        }

        assert_eq!(gate.current_count(&client), Some(5));
        assert!(!gate.admit_at(&client, now + Duration::from_secs(30)).is_admitted());
    }

    #[test]
    fn test_retry_hint_shrinks_as_window_ages() {
        let gate = gate_with_limit(1);
        let client = identity("10.0.0.1");
        let start = Instant::now();

        gate.admit_at(&client, start);
        let decision = gate.admit_at(&client, start + Duration::from_millis(45_200));

        assert_eq!(decision, Decision::Deny { retry_after_secs: 15 });
    }

    #[test]
    fn test_window_resets_after_expiry() {
        let gate = RateLimitGate::with_defaults();
        let client = identity("10.0.0.1");
        let start = Instant::now();

        for _ in 0..11 {
            gate.admit_at(&client, start);
        }
        assert!(!gate.admit_at(&client, start).is_admitted());

        let later = start + Duration::from_secs(61);
        assert_eq!(gate.admit_at(&client, later), Decision::Admit);
        assert_eq!(gate.current_count(&client), Some(1));
    }

    #[test]
    fn test_request_at_exact_reset_still_counts() {
        let gate = gate_with_limit(1);
        let client = identity("10.0.0.1");
        let start = Instant::now();

        gate.admit_at(&client, start);
        let at_reset = start + Duration::from_secs(60);

        assert!(!gate.admit_at(&client, at_reset).is_admitted());
        assert_eq!(gate.current_count(&client), Some(2));
    }

    #[test]
    fn test_identities_have_separate_counters() {
        let gate = RateLimitGate::with_defaults();
        let a = identity("10.0.0.1");
        let b = identity("10.0.0.2");
        let now = Instant::now();

        for _ in 0..10 {
            gate.admit_at(&a, now);
        }
        assert!(!gate.admit_at(&a, now).is_admitted());

        assert_eq!(gate.admit_at(&b, now), Decision::Admit);
        assert_eq!(gate.current_count(&b), Some(1));
    }

    #[test]
    fn test_fallback_identity_shares_one_counter() {
        let gate = gate_with_limit(2);
        let now = Instant::now();

        assert!(gate.admit_at(&ClientIdentity::new(""), now).is_admitted());
        assert!(gate.admit_at(&ClientIdentity::fallback(), now).is_admitted());
        assert!(!gate.admit_at(&ClientIdentity::new("  "), now).is_admitted());
        assert_eq!(gate.tracked_identities(), 1);
    }

    #[test]
    fn test_decision_into_result() {
        assert!(Decision::Admit.into_result().is_ok());

        let err = Decision::Deny { retry_after_secs: 7 }.into_result().unwrap_err();
        assert_eq!(err.retry_after_secs, 7);
    }

    #[test]
    fn test_sweep_without_expired_entries_changes_nothing() {
        let gate = RateLimitGate::with_defaults();
        let now = Instant::now();
        gate.admit_at(&identity("10.0.0.1"), now);
        gate.admit_at(&identity("10.0.0.2"), now);

        assert_eq!(gate.sweep_at(now + Duration::from_secs(30)), 0);
        assert_eq!(gate.tracked_identities(), 2);
        assert_eq!(gate.current_count(&identity("10.0.0.1")), Some(1));
    }

    #[test]
    fn test_sweep_is_idempotent() {
        let gate = RateLimitGate::with_defaults();
        let start = Instant::now();
        gate.admit_at(&identity("10.0.0.1"), start);
        gate.admit_at(&identity("10.0.0.2"), start + Duration::from_secs(30));

        let at = start + Duration::from_secs(75);
        assert_eq!(gate.sweep_at(at), 1);
        assert_eq!(gate.sweep_at(at), 0);
        assert_eq!(gate.tracked_identities(), 1);
        assert_eq!(gate.current_count(&identity("10.0.0.2")), Some(1));
    }

    #[test]
    fn test_sweep_evicts_all_expired_identities() {
        let gate = RateLimitGate::with_defaults();
        let start = Instant::now();

        for i in 0..100 {
            gate.admit_at(&identity(&format!("10.0.{}.{}", i / 256, i % 256)), start);
        }
        assert_eq!(gate.tracked_identities(), 100);

        let evicted = gate.sweep_at(start + Duration::from_secs(61));
        assert_eq!(evicted, 100);
        assert_eq!(gate.tracked_identities(), 0);
    }

    #[test]
    fn test_sweep_keeps_window_reset_by_later_request() {
        let gate = RateLimitGate::with_defaults();
        let client = identity("10.0.0.1");
        let start = Instant::now();

        gate.admit_at(&client, start);
        let later = start + Duration::from_secs(61);
        gate.admit_at(&client, later);

        assert_eq!(gate.sweep_at(later), 0);
        assert_eq!(gate.current_count(&client), Some(1));
    }

    #[test]
    fn test_unswept_expired_window_does_not_block() {
        let gate = gate_with_limit(1);
        let client = identity("10.0.0.1");
        let start = Instant::now();

        gate.admit_at(&client, start);
        assert!(!gate.admit_at(&client, start).is_admitted());

        // Never swept: the expiry check in admit alone must release the client.
        assert!(gate.admit_at(&client, start + Duration::from_secs(120)).is_admitted());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 8)]
    async fn test_concurrent_admissions_never_exceed_limit() {
        let gate = Arc::new(RateLimitGate::with_defaults());
        let client = identity("198.51.100.4");
        let extra = 40;

        let tasks = (0..10 + extra).map(|_| {
            let gate = Arc::clone(&gate);
            let client = client.clone();
            tokio::spawn(async move { gate.admit(&client) })
        });

        let decisions = futures::future::join_all(tasks).await;
        let admitted = decisions
            .into_iter()
            .map(|joined| joined.unwrap())
            .filter(Decision::is_admitted)
            .count();

        assert_eq!(admitted, 10);
        assert_eq!(gate.current_count(&client), Some(10 + extra as u64));
    }

    #[test]
    fn test_concurrent_sweep_and_admit_stay_consistent() {
        let gate = Arc::new(gate_with_limit(1_000_000));
        let start = Instant::now();
        for i in 0..64 {
            gate.admit_at(&identity(&format!("client-{}", i)), start);
        }
        let later = start + Duration::from_secs(61);

        let admitter = {
            let gate = Arc::clone(&gate);
            std::thread::spawn(move || {
                for i in 0..64 {
                    gate.admit_at(&identity(&format!("client-{}", i)), later);
                }
            })
        };
        let sweeper = {
            let gate = Arc::clone(&gate);
            std::thread::spawn(move || gate.sweep_at(later))
        };
        admitter.join().unwrap();
        sweeper.join().unwrap();

        // Whatever the interleaving, every client admitted at `later` holds a
        // fresh window that no sweep at `later` may remove.
        assert_eq!(gate.tracked_identities(), 64);
        assert_eq!(gate.sweep_at(later), 0);
        for i in 0..64 {
            assert_eq!(gate.current_count(&identity(&format!("client-{}", i))), Some(1));
        }
    }
}
