use crate::config::CrawlerConfig;
use std::collections::VecDeque;
use std::time::Duration;
use tokio::time::Instant;

/// Per-domain limits derived from the crawler configuration
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RatePolicy {
    /// Minimum spacing between two requests to the same domain
    pub min_interval: Duration,

    /// Length of the sliding window
    pub window: Duration,

    /// Maximum requests allowed inside one window
    pub max_per_window: u32,
}

impl RatePolicy {
    pub fn from_config(config: &CrawlerConfig) -> Self {
        Self {
            min_interval: Duration::from_millis(config.minimum_request_interval),
            window: Duration::from_millis(config.rate_window),
            max_per_window: config.rate_window_max_requests.max(1),
        }
    }

    /// Effective spacing for a domain: the larger of the configured minimum
    /// and the robots.txt crawl delay
    pub fn interval_with(&self, crawl_delay: Option<Duration>) -> Duration {
        crawl_delay.map_or(self.min_interval, |d| d.max(self.min_interval))
    }
}

/// Tracks the state of a domain for rate limiting
///
/// Request slots are reserved ahead of time: a caller that has to wait still
/// records its slot immediately, so concurrent callers queue up behind it.
#[derive(Debug, Clone, Default)]
pub struct DomainState {
    /// Number of requests granted to this domain
    pub request_count: u64,

    /// Time of the most recently reserved request slot
    pub last_request_time: Option<Instant>,

    /// Set after the domain answered HTTP 429
    pub rate_limited_until: Option<Instant>,

    /// Reserved slots still inside the sliding window, oldest first
    recent: VecDeque<Instant>,
}

impl DomainState {
    /// Creates a new DomainState with default values
    pub fn new() -> Self {
        Self::default()
    }

    /// Earliest instant at which the next request may start
    pub fn earliest_slot(&self, policy: &RatePolicy, interval: Duration, now: Instant) -> Instant {
        let mut slot = now;

        if let Some(last) = self.last_request_time {
            slot = slot.max(last + interval);
        }

        if let Some(until) = self.rate_limited_until {
            slot = slot.max(until);
        }

        let max = policy.max_per_window as usize;
        loop {
            let active: Vec<Instant> = self
                .recent
                .iter()
                .copied()
                .filter(|t| *t + policy.window > slot)
                .collect();

            if active.len() < max {
                return slot;
            }

            // Wait for the oldest slot that keeps the window full to expire
            slot = active[active.len() - max] + policy.window;
        }
    }

    /// Checks if a request can be made now
    pub fn can_request(&self, policy: &RatePolicy, interval: Duration, now: Instant) -> bool {
        self.earliest_slot(policy, interval, now) <= now
    }

    /// Time until the next request can be made, or None if it can be made now
    pub fn time_until_next_request(
        &self,
        policy: &RatePolicy,
        interval: Duration,
        now: Instant,
    ) -> Option<Duration> {
        let slot = self.earliest_slot(policy, interval, now);
        (slot > now).then(|| slot - now)
    }

    /// Reserves the next request slot and returns it
    pub fn reserve(&mut self, policy: &RatePolicy, interval: Duration, now: Instant) -> Instant {
        let slot = self.earliest_slot(policy, interval, now);

        while let Some(front) = self.recent.front() {
            if *front + policy.window <= slot {
                self.recent.pop_front();
            } else {
                break;
            }
        }

        self.recent.push_back(slot);
        self.last_request_time = Some(slot);
        self.request_count += 1;
        slot
    }

    /// Blocks the domain until `now + cooldown`
    pub fn mark_rate_limited(&mut self, now: Instant, cooldown: Duration) {
        let until = now + cooldown;
        self.rate_limited_until = Some(self.rate_limited_until.map_or(until, |u| u.max(until)));
    }

    /// Clears the rate limited flag
    pub fn clear_rate_limit(&mut self) {
        self.rate_limited_until = None;
    }
}
