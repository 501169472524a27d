//! Bounded connect retry with exponential backoff

use crate::transport::Transport;
use binance_types::{BinanceError, BinanceResult};
use std::time::Duration;
use tracing::{debug, warn};

/// How a session establishes its connection
///
/// A session makes at most `max_attempts` connect attempts, each bounded by
/// `connect_timeout`. Between attempts it sleeps for an exponentially
/// growing, jittered delay.
#[derive(Debug, Clone)]
pub struct ConnectRetry {
    /// Maximum number of connect attempts (at least one is always made)
    pub max_attempts: u32,
    /// Bound on a single connect attempt
    pub connect_timeout: Duration,
    /// Delay before the second attempt
    pub initial_delay: Duration,
    /// Maximum delay between attempts
    pub max_delay: Duration,
    /// Multiplier for exponential backoff (e.g., 2.0 doubles delay each attempt)
    pub multiplier: f64,
    /// Random jitter factor (0.0 to 1.0)
    pub jitter: f64,
}

impl Default for ConnectRetry {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            connect_timeout: Duration::from_secs(10),
            initial_delay: Duration::from_millis(100),
            max_delay: Duration::from_secs(5),
            multiplier: 2.0,
            jitter: 0.2,
        }
    }
}

impl ConnectRetry {
    /// Create a new config with default values
    pub fn new() -> Self {
        Self::default()
    }

    /// Single attempt, no retry
    pub fn once() -> Self {
        Self {
            max_attempts: 1,
            ..Default::default()
        }
    }

    /// Set maximum attempts
    pub fn with_max_attempts(mut self, max: u32) -> Self {
        self.max_attempts = max.max(1);
        self
    }

    /// Set per-attempt connect timeout
    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    /// Set initial delay
    pub fn with_initial_delay(mut self, delay: Duration) -> Self {
        self.initial_delay = delay;
        self
    }

    /// Set maximum delay
    pub fn with_max_delay(mut self, delay: Duration) -> Self {
        self.max_delay = delay;
        self
    }

    /// Set backoff multiplier
    pub fn with_multiplier(mut self, multiplier: f64) -> Self {
        self.multiplier = multiplier;
        self
    }

    /// Set jitter factor
    pub fn with_jitter(mut self, jitter: f64) -> Self {
        self.jitter = jitter.clamp(0.0, 1.0);
        self
    }

    /// Delay after a failed attempt (1-indexed)
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        if attempt == 0 {
            return self.initial_delay;
        }

        let exponent = attempt.saturating_sub(1) as i32;
        let delay_ms = self.initial_delay.as_millis() as f64 * self.multiplier.powi(exponent);
        let delay = Duration::from_millis(delay_ms as u64);

        std::cmp::min(delay, self.max_delay)
    }

    /// Apply jitter to a base delay
    pub fn apply_jitter(&self, base: Duration) -> Duration {
        if self.jitter == 0.0 {
            return base;
        }

        let jitter_range = base.as_millis() as f64 * self.jitter;
        let jitter = rand::random::<f64>() * 2.0 * jitter_range - jitter_range;
        let adjusted_ms = (base.as_millis() as f64 + jitter).max(0.0) as u64;

        Duration::from_millis(adjusted_ms)
    }

    /// Get delay with jitter applied for a given attempt
    pub fn delay_with_jitter(&self, attempt: u32) -> Duration {
        self.apply_jitter(self.delay_for_attempt(attempt))
    }

    /// Check if another attempt is allowed after `attempt` failures
    pub fn should_retry(&self, attempt: u32) -> bool {
        attempt < self.max_attempts
    }
}

/// Connect `transport`, retrying per `retry`
///
/// # Errors
/// Returns the last attempt's error once attempts are exhausted:
/// [`BinanceError::ConnectionTimeout`] if it timed out, otherwise
/// [`BinanceError::ConnectionFailed`].
pub async fn open(
    mut transport: Box<dyn Transport>,
    retry: &ConnectRetry,
) -> BinanceResult<Box<dyn Transport>> {
    let url = transport.endpoint().to_string();
    let mut attempt = 0;

    loop {
        attempt += 1;
        let error = match tokio::time::timeout(retry.connect_timeout, transport.connect()).await {
            Ok(Ok(())) => {
                debug!(%url, attempt, "Connected");
                return Ok(transport);
            }
            Ok(Err(e)) => e.into_binance(&url),
            Err(_) => BinanceError::ConnectionTimeout {
                url: url.clone(),
                timeout: retry.connect_timeout,
            },
        };

        if !retry.should_retry(attempt) {
            warn!(%url, attempt, %error, "Connect attempts exhausted");
            return Err(error);
        }

        let delay = retry.delay_with_jitter(attempt);
        warn!(%url, attempt, ?delay, %error, "Connect failed, retrying");
        tokio::time::sleep(delay).await;
    }
}
