//! Periodic listen-key renewal
//!
//! A listen key expires sixty minutes after its last renewal. The timer
//! renews it on a fixed interval and gives up on the first failure, handing
//! the error to a callback so the owner can tear the stream down.

use binance_types::{BinanceError, BinanceResult};
use futures::future::BoxFuture;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tracing::{debug, error, info};

/// Default renewal interval
pub const DEFAULT_KEEPALIVE_INTERVAL: Duration = Duration::from_secs(30 * 60);

/// One renewal attempt
pub type RenewFn = Arc<dyn Fn() -> BoxFuture<'static, BinanceResult<()>> + Send + Sync>;

/// Called once with the error that stopped the timer
pub type FailureCallback = Arc<dyn Fn(BinanceError) + Send + Sync>;

#[derive(Debug, Default)]
struct Status {
    running: AtomicBool,
    renewals: AtomicU64,
}

/// Renews a listen key until stopped or a renewal fails
///
/// The first renewal happens one full interval after [`KeepAliveTimer::start`].
/// Dropping the timer stops it.
pub struct KeepAliveTimer {
    interval: Duration,
    stop_tx: watch::Sender<bool>,
    status: Arc<Status>,
}

impl KeepAliveTimer {
    /// Spawn the renewal loop on the current runtime
    ///
    /// `interval` must be non-zero.
    pub fn start(interval: Duration, renew: RenewFn, on_failure: FailureCallback) -> Self {
        let (stop_tx, stop_rx) = watch::channel(false);
        let status = Arc::new(Status::default());
        status.running.store(true, Ordering::SeqCst);

        tokio::spawn(run(interval, renew, on_failure, status.clone(), stop_rx));
        info!(?interval, "Keepalive started");

        Self {
            interval,
            stop_tx,
            status,
        }
    }

    /// Stop scheduling renewals
    ///
    /// A renewal already in flight is abandoned.
    pub fn stop(&self) {
        if self.status.running.swap(false, Ordering::SeqCst) {
            debug!("Keepalive stopped");
        }
        self.stop_tx.send_replace(true);
    }

    /// Returns true until stopped or a renewal fails
    pub fn is_running(&self) -> bool {
        self.status.running.load(Ordering::SeqCst)
    }

    /// Number of successful renewals
    pub fn renewals(&self) -> u64 {
        self.status.renewals.load(Ordering::SeqCst)
    }

    /// Time between renewals
    pub fn interval(&self) -> Duration {
        self.interval
    }
}

impl Drop for KeepAliveTimer {
    fn drop(&mut self) {
        self.stop();
    }
}

impl std::fmt::Debug for KeepAliveTimer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KeepAliveTimer")
            .field("interval", &self.interval)
            .field("running", &self.is_running())
            .field("renewals", &self.renewals())
            .finish()
    }
}

async fn stopped(stop: &mut watch::Receiver<bool>) {
    loop {
        if *stop.borrow_and_update() {
            return;
        }
        if stop.changed().await.is_err() {
            return;
        }
    }
}

async fn run(
    interval: Duration,
    renew: RenewFn,
    on_failure: FailureCallback,
    status: Arc<Status>,
    mut stop: watch::Receiver<bool>,
) {
    let mut ticker = interval_at(Instant::now() + interval, interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            biased;
            _ = stopped(&mut stop) => break,
            _ = ticker.tick() => {}
        }

        let result = tokio::select! {
            biased;
            _ = stopped(&mut stop) => break,
            result = renew() => result,
        };

        match result {
            Ok(()) => {
                let count = status.renewals.fetch_add(1, Ordering::SeqCst) + 1;
                debug!(renewals = count, "Listen key renewed");
            }
            Err(e) => {
                let e = match e {
                    BinanceError::KeepAlive(_) => e,
                    other => BinanceError::KeepAlive(other.to_string()),
                };
                error!(error = %e, "Listen key renewal failed, keepalive stopping");
                status.running.store(false, Ordering::SeqCst);
                on_failure(e);
                return;
            }
        }
    }

    status.running.store(false, Ordering::SeqCst);
}
