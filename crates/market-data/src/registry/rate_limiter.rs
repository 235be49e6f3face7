//! Minimum-interval rate limiter for external APIs.
//!
//! Every API name gets its own gate that remembers when the last call was
//! permitted. A caller holds the gate while it sleeps off the remaining
//! interval, so concurrent callers of one API are granted strictly one per
//! interval while different APIs never wait on each other.

use std::collections::HashMap;
use std::future::Future;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use log::{debug, info, warn};
use tokio::time::Instant;

use crate::errors::{MarketDataError, Result, RetryClass};

/// Gate shared by every API name missing from the table.
pub const DEFAULT_API: &str = "default";

/// Interval applied to unknown APIs when no table is supplied.
const DEFAULT_INTERVAL: Duration = Duration::from_secs(1);

/// Sleeps at least this long are logged at info level.
const NOTABLE_WAIT: Duration = Duration::from_secs(1);

type Gate = Arc<tokio::sync::Mutex<Option<Instant>>>;

/// Minimum interval between calls, per API name.
#[derive(Clone, Debug, PartialEq)]
pub struct RateLimitTable {
    default_interval: Duration,
    intervals: HashMap<String, Duration>,
}

impl RateLimitTable {
    /// An empty table where every API uses `default_interval`.
    pub fn new(default_interval: Duration) -> Self {
        Self {
            default_interval,
            intervals: HashMap::new(),
        }
    }

    /// Builder-style [`set`](Self::set).
    pub fn with_api(mut self, api: impl Into<String>, interval: Duration) -> Self {
        self.set(api, interval);
        self
    }

    /// Set the interval for one API. Setting [`DEFAULT_API`] replaces the fallback.
    pub fn set(&mut self, api: impl Into<String>, interval: Duration) {
        let api = api.into();
        if api == DEFAULT_API {
            self.default_interval = interval;
        } else {
            self.intervals.insert(api, interval);
        }
    }

    /// Convert a "`requests` per `period`" quota into an interval.
    ///
    /// Returns `None` for quotas that cannot be enforced (zero requests or an
    /// empty, negative or non-finite period).
    pub fn interval_from_quota(requests: u32, period_secs: f64) -> Option<Duration> {
        if requests == 0 || !period_secs.is_finite() || period_secs <= 0.0 {
            return None;
        }
        Duration::try_from_secs_f64(period_secs / f64::from(requests)).ok()
    }

    pub fn default_interval(&self) -> Duration {
        self.default_interval
    }

    pub fn interval_for(&self, api: &str) -> Duration {
        self.intervals
            .get(api)
            .copied()
            .unwrap_or(self.default_interval)
    }

    /// Name of the gate a call to `api` goes through.
    pub fn gate_name<'a>(&self, api: &'a str) -> &'a str {
        if self.intervals.contains_key(api) {
            api
        } else {
            DEFAULT_API
        }
    }

    /// Configured APIs, sorted by name.
    pub fn entries(&self) -> Vec<(&str, Duration)> {
        let mut entries: Vec<_> = self
            .intervals
            .iter()
            .map(|(name, interval)| (name.as_str(), *interval))
            .collect();
        entries.sort_by(|a, b| a.0.cmp(b.0));
        entries
    }
}

impl Default for RateLimitTable {
    /// Intervals for the sources the pipeline talks to.
    fn default() -> Self {
        Self::new(DEFAULT_INTERVAL)
            .with_api("sec_edgar", Duration::from_millis(100))
            .with_api("yfinance", Duration::from_millis(50))
            .with_api("nse", Duration::from_secs(1))
            .with_api("bse", Duration::from_secs(1))
            .with_api("screener", Duration::from_secs(3))
            .with_api("moneycontrol", Duration::from_secs(3))
    }
}

/// Retry budget for [`RateLimiter::with_backoff`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct BackoffPolicy {
    /// Total number of calls, including the first one.
    pub max_attempts: u32,
    /// Delay after the first failure; doubled after every further failure.
    pub initial_delay: Duration,
}

impl BackoffPolicy {
    pub fn new(max_attempts: u32, initial_delay: Duration) -> Self {
        Self {
            max_attempts,
            initial_delay,
        }
    }

    /// Delay to wait after `attempt` (1-based) failed.
    pub fn delay_after(&self, attempt: u32) -> Duration {
        let factor = 2u32.saturating_pow(attempt.saturating_sub(1));
        self.initial_delay.saturating_mul(factor)
    }

    /// Sum of the sleeps between attempts when every attempt fails.
    pub fn total_delay(&self) -> Duration {
        (1..self.max_attempts.max(1))
            .map(|attempt| self.delay_after(attempt))
            .fold(Duration::ZERO, Duration::saturating_add)
    }

    /// Longest a [`RateLimiter::with_backoff`] call can run when each attempt
    /// takes up to `per_attempt` before failing. Rate-limit waits are not
    /// included.
    pub fn worst_case(&self, per_attempt: Duration) -> Duration {
        per_attempt
            .saturating_mul(self.max_attempts.max(1))
            .saturating_add(self.total_delay())
    }
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        Self::new(5, Duration::from_secs(1))
    }
}

/// Per-API minimum-interval rate limiter.
///
/// Thread-safe; share it behind an `Arc`. Gates are created on demand.
pub struct RateLimiter {
    table: RateLimitTable,
    gates: Mutex<HashMap<String, Gate>>,
}

impl RateLimiter {
    pub fn new(table: RateLimitTable) -> Self {
        Self {
            table,
            gates: Mutex::new(HashMap::new()),
        }
    }

    pub fn table(&self) -> &RateLimitTable {
        &self.table
    }

    pub fn interval_for(&self, api: &str) -> Duration {
        self.table.interval_for(api)
    }

    /// Lock the gate map, recovering from poison if necessary.
    ///
    /// The map only ever grows, so a panic while it was held cannot leave it
    /// inconsistent.
    fn lock_gates(&self) -> MutexGuard<'_, HashMap<String, Gate>> {
        self.gates.lock().unwrap_or_else(|poisoned| {
            warn!("Rate limiter gates mutex was poisoned, recovering");
            poisoned.into_inner()
        })
    }

    fn gate(&self, name: &str) -> Gate {
        let mut gates = self.lock_gates();
        gates
            .entry(name.to_string())
            .or_insert_with(|| Arc::new(tokio::sync::Mutex::new(None)))
            .clone()
    }

    /// Wait until a call to `api` is permitted, then record it.
    pub async fn acquire(&self, api: &str) {
        let name = self.table.gate_name(api);
        let interval = self.table.interval_for(api);
        let gate = self.gate(name);

        let mut last_call = gate.lock().await;
        if let Some(last) = *last_call {
            let elapsed = last.elapsed();
            if elapsed < interval {
                let wait = interval - elapsed;
                if wait >= NOTABLE_WAIT {
                    info!("Rate limiter: waiting {:?} for '{}'", wait, api);
                } else {
                    debug!("Rate limiter: waiting {:?} for '{}'", wait, api);
                }
                tokio::time::sleep(wait).await;
            }
        }
        *last_call = Some(Instant::now());
    }

    /// Run `call` through the gate for `api`, retrying transient failures.
    ///
    /// The gate is acquired before every attempt. After a transient failure
    /// the limiter sleeps `initial_delay`, then `2x`, `4x`, ... before the next
    /// attempt. Errors classified [`RetryClass::Never`] are returned as-is.
    /// When `max_attempts` calls have all failed transiently the result is
    /// [`MarketDataError::SourceUnavailable`] wrapping the last error.
    pub async fn with_backoff<T, F, Fut>(
        &self,
        api: &str,
        policy: &BackoffPolicy,
        mut call: F,
    ) -> Result<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let max_attempts = policy.max_attempts.max(1);
        let mut attempt = 0;

        loop {
            attempt += 1;
            self.acquire(api).await;

            let error = match call().await {
                Ok(value) => {
                    if attempt > 1 {
                        info!("{}: succeeded on attempt {}", api, attempt);
                    }
                    return Ok(value);
                }
                Err(error) => error,
            };

            if error.retry_class() == RetryClass::Never {
                return Err(error);
            }

            if attempt >= max_attempts {
                warn!(
                    "{}: giving up after {} attempts, last error: {}",
                    api, attempt, error
                );
                return Err(MarketDataError::SourceUnavailable {
                    provider: api.to_string(),
                    attempts: attempt,
                    last_error: Box::new(error),
                });
            }

            let delay = policy.delay_after(attempt);
            warn!(
                "{}: attempt {}/{} failed ({}), retrying in {:?}",
                api, attempt, max_attempts, error, delay
            );
            tokio::time::sleep(delay).await;
        }
    }
}

impl Default for RateLimiter {
    fn default() -> Self {
        Self::new(RateLimitTable::default())
    }
}
