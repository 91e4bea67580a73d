use common::config::components::connections::PollingConfig;
use std::future::Future;
use std::time::{Duration, Instant};
use thiserror::Error;
use tracing::warn;

const DEFAULT_INTERVAL: Duration = Duration::from_secs(5);

/// How the delay between two polls evolves.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Backoff {
    Fixed,
    /// Multiply the delay by `factor` after every poll, capped at `max`.
    Exponential { factor: f64, max: Duration },
}

/// Outcome of a single probe.
#[derive(Debug, Clone, PartialEq)]
pub enum PollStep<T> {
    Done(T),
    Continue,
}

#[derive(Debug, Error)]
#[error("gave up waiting for {what} after {attempts} polls ({elapsed:.1?})")]
pub struct PollTimeout {
    pub what: String,
    pub attempts: u32,
    pub elapsed: Duration,
}

/// Bounded or unbounded polling of a remote state.
///
/// The default polls every five seconds with no limit on attempts or
/// elapsed time.
#[derive(Debug, Clone, PartialEq)]
pub struct PollingStrategy {
    pub interval: Duration,
    pub max_attempts: Option<u32>,
    pub deadline: Option<Duration>,
    pub backoff: Backoff,
}

impl Default for PollingStrategy {
    fn default() -> Self {
        Self::fixed(DEFAULT_INTERVAL)
    }
}

impl PollingStrategy {
    pub fn fixed(interval: Duration) -> Self {
        Self {
            interval,
            max_attempts: None,
            deadline: None,
            backoff: Backoff::Fixed,
        }
    }

    pub fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = Some(max_attempts.max(1));
        self
    }

    pub fn with_deadline(mut self, deadline: Duration) -> Self {
        self.deadline = Some(deadline);
        self
    }

    pub fn with_backoff(mut self, backoff: Backoff) -> Self {
        self.backoff = backoff;
        self
    }

    /// Build a strategy from a connection's `polling` block. Values that are
    /// not positive finite numbers are ignored with a warning.
    pub fn from_config(config: &PollingConfig) -> Self {
        let mut strategy = Self::default();
        if let Some(interval) = config.interval_secs.and_then(|v| secs("interval_secs", v)) {
            strategy.interval = interval;
        }
        if let Some(max_attempts) = config.max_attempts {
            strategy = strategy.with_max_attempts(max_attempts);
        }
        if let Some(deadline) = config.timeout_secs.and_then(|v| secs("timeout_secs", v)) {
            strategy.deadline = Some(deadline);
        }
        match config.backoff_factor {
            Some(factor) if factor.is_finite() && factor >= 1.0 => {
                let max = config
                    .max_interval_secs
                    .and_then(|v| secs("max_interval_secs", v))
                    .unwrap_or(Duration::from_secs(60));
                strategy.backoff = Backoff::Exponential { factor, max };
            }
            Some(factor) => warn!("ignoring backoff_factor {}: must be >= 1", factor),
            None => {}
        }
        strategy
    }

    fn next_delay(&self, current: Duration) -> Duration {
        match self.backoff {
            Backoff::Fixed => current,
            Backoff::Exponential { factor, max } => {
                Duration::try_from_secs_f64(current.as_secs_f64() * factor)
                    .unwrap_or(max)
                    .min(max)
            }
        }
    }

    /// Run `probe` until it reports [`PollStep::Done`], sleeping between
    /// attempts. Errors from the probe end polling immediately; running out
    /// of attempts or time yields a [`PollTimeout`].
    pub async fn poll<T, E, F, Fut>(&self, what: &str, mut probe: F) -> Result<T, E>
    where
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = Result<PollStep<T>, E>>,
        E: From<PollTimeout>,
    {
        let started = Instant::now();
        let mut delay = self.interval;
        let mut attempts = 0u32;

        loop {
            attempts += 1;
            if let PollStep::Done(value) = probe(attempts).await? {
                return Ok(value);
            }

            let elapsed = started.elapsed();
            let out_of_attempts = self.max_attempts.is_some_and(|max| attempts >= max);
            let out_of_time = self.deadline.is_some_and(|deadline| elapsed >= deadline);
            if out_of_attempts || out_of_time {
                return Err(PollTimeout {
                    what: what.to_string(),
                    attempts,
                    elapsed,
                }
                .into());
            }

            let sleep_for = match self.deadline {
                Some(deadline) => delay.min(deadline.saturating_sub(elapsed)),
                None => delay,
            };
            tokio::time::sleep(sleep_for).await;
            delay = self.next_delay(delay);
        }
    }
}

fn secs(field: &str, value: f64) -> Option<Duration> {
    match Duration::try_from_secs_f64(value) {
        Ok(duration) if !duration.is_zero() => Some(duration),
        _ => {
            warn!("ignoring polling {} = {}: must be a positive number of seconds", field, value);
            None
        }
    }
}
