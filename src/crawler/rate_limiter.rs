//! Process-wide, per-domain request gate
//!
//! Every worker shares one limiter, so concurrent jobs hitting the same
//! domain are paced together. A caller reserves its slot under the lock and
//! then sleeps outside it; callers that arrive later queue behind it.

use crate::config::CrawlerConfig;
use crate::state::{DomainState, RatePolicy};
use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;
use tokio::time::Instant;

/// Pause applied to a domain after it answers HTTP 429
pub const RATE_LIMITED_COOLDOWN: Duration = Duration::from_secs(10);

pub struct RateLimiter {
    policy: RatePolicy,
    domains: Mutex<HashMap<String, DomainState>>,
}

impl RateLimiter {
    pub fn new(config: &CrawlerConfig) -> Self {
        Self::with_policy(RatePolicy::from_config(config))
    }

    pub fn with_policy(policy: RatePolicy) -> Self {
        Self {
            policy,
            domains: Mutex::new(HashMap::new()),
        }
    }

    fn domains(&self) -> MutexGuard<'_, HashMap<String, DomainState>> {
        // The map only holds timing data; a panic elsewhere cannot leave it inconsistent
        self.domains
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Waits until a request to `domain` is permitted
    ///
    /// # Arguments
    ///
    /// * `domain` - Host the request goes to
    /// * `crawl_delay` - robots.txt crawl delay; raises the minimum spacing
    ///
    /// # Returns
    ///
    /// How long the caller waited
    pub async fn acquire(&self, domain: &str, crawl_delay: Option<Duration>) -> Duration {
        let interval = self.policy.interval_with(crawl_delay);
        let now = Instant::now();

        let slot = {
            let mut domains = self.domains();
            domains
                .entry(domain.to_string())
                .or_default()
                .reserve(&self.policy, interval, now)
        };

        if slot > now {
            tracing::trace!(domain, wait_ms = (slot - now).as_millis() as u64, "Rate limited");
            tokio::time::sleep_until(slot).await;
        }
        slot.saturating_duration_since(now)
    }

    /// Pushes back every future request to `domain`
    pub fn penalize(&self, domain: &str, cooldown: Duration) {
        tracing::warn!(domain, cooldown_ms = cooldown.as_millis() as u64, "Domain is rate limiting us");
        self.domains()
            .entry(domain.to_string())
            .or_default()
            .mark_rate_limited(Instant::now(), cooldown);
    }

    /// Requests granted to `domain` so far
    pub fn request_count(&self, domain: &str) -> u64 {
        self.domains()
            .get(domain)
            .map_or(0, |state| state.request_count)
    }

    /// Number of domains seen
    pub fn tracked_domains(&self) -> usize {
        self.domains().len()
    }
}
