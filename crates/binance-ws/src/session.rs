//! Session state and the per-session receive loop

use crate::decoder::{decode, DecodeSpec, StreamRecord};
use crate::retry::{open, ConnectRetry};
use crate::transport::Transport;
use binance_types::BinanceError;
use parking_lot::RwLock;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tracing::{debug, error, info, warn};

/// Callback receiving decoded records
///
/// Runs on the session's task, in frame arrival order. It must return
/// promptly: the session does not read the next frame until it does.
pub type RecordCallback = Arc<dyn Fn(StreamRecord) + Send + Sync>;

/// Lifecycle of a single subscription
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubscriptionState {
    /// Handle issued, task not yet running
    Requested,
    /// Establishing the connection
    Connecting,
    /// Delivering records
    Streaming,
    /// Cancellation observed, closing the transport
    Closing,
    /// Closed by unsubscribe
    Closed,
    /// Terminated by a fault or server close; resubscribe to recover
    Broken,
}

impl SubscriptionState {
    /// Returns true for `Closed` and `Broken`
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Closed | Self::Broken)
    }
}

/// How a receive loop ended
#[derive(Debug)]
pub enum SessionOutcome {
    /// Cancelled by unsubscribe or registry drop
    Cancelled,
    /// Cancelled on behalf of a failure outside the stream
    Aborted(String),
    /// Server closed the connection
    ServerClosed,
    /// Connect attempts exhausted
    ConnectFailed(BinanceError),
    /// Transport failed while receiving
    ReceiveFailed(BinanceError),
    /// A frame could not be decoded
    Protocol(BinanceError),
}

impl SessionOutcome {
    /// State the subscription ends in
    pub fn final_state(&self) -> SubscriptionState {
        match self {
            Self::Cancelled => SubscriptionState::Closed,
            _ => SubscriptionState::Broken,
        }
    }

    /// The fault that ended the session, if any
    pub fn error(&self) -> Option<&BinanceError> {
        match self {
            Self::ConnectFailed(e) | Self::ReceiveFailed(e) | Self::Protocol(e) => Some(e),
            _ => None,
        }
    }
}

/// State shared between a session's task and the registry
pub(crate) struct SessionShared {
    url: String,
    state: RwLock<SubscriptionState>,
    listeners: RwLock<Vec<RecordCallback>>,
    failure: RwLock<Option<String>>,
}

impl SessionShared {
    pub(crate) fn new(url: String, callback: RecordCallback) -> Arc<Self> {
        Arc::new(Self {
            url,
            state: RwLock::new(SubscriptionState::Requested),
            listeners: RwLock::new(vec![callback]),
            failure: RwLock::new(None),
        })
    }

    pub(crate) fn url(&self) -> &str {
        &self.url
    }

    pub(crate) fn state(&self) -> SubscriptionState {
        *self.state.read()
    }

    fn set_state(&self, state: SubscriptionState) {
        *self.state.write() = state;
    }

    pub(crate) fn add_listener(&self, callback: RecordCallback) {
        self.listeners.write().push(callback);
    }

    pub(crate) fn failure(&self) -> Option<String> {
        self.failure.read().clone()
    }

    /// Record why the session is being torn down; the loop then ends `Broken`
    pub(crate) fn mark_failed(&self, reason: String) {
        *self.failure.write() = Some(reason);
    }

    fn deliver(&self, record: StreamRecord) {
        // Snapshot so a listener may join or leave without deadlocking
        let listeners = self.listeners.read().clone();
        if let Some((last, rest)) = listeners.split_last() {
            for listener in rest {
                listener(record.clone());
            }
            last(record);
        }
    }
}

/// Resolves when cancellation is requested or the sender is gone
async fn cancelled(cancel: &mut watch::Receiver<bool>) {
    loop {
        if *cancel.borrow_and_update() {
            return;
        }
        if cancel.changed().await.is_err() {
            return;
        }
    }
}

/// Receive loop for one session
///
/// Connects, then delivers decoded frames until cancelled, the server
/// closes, the transport fails, or a frame cannot be decoded. The transport
/// is always closed (bounded by `close_timeout`) before returning.
pub(crate) async fn run(
    shared: Arc<SessionShared>,
    transport: Box<dyn Transport>,
    spec: DecodeSpec,
    retry: ConnectRetry,
    close_timeout: Duration,
    mut cancel: watch::Receiver<bool>,
) -> SessionOutcome {
    shared.set_state(SubscriptionState::Connecting);

    let opened = tokio::select! {
        biased;
        _ = cancelled(&mut cancel) => None,
        opened = open(transport, &retry) => Some(opened),
    };

    let mut transport = match opened {
        Some(Ok(transport)) => transport,
        Some(Err(e)) => return finish(&shared, SessionOutcome::ConnectFailed(e)),
        None => return finish(&shared, cancellation(&shared)),
    };

    shared.set_state(SubscriptionState::Streaming);
    info!(url = %shared.url, "Session streaming");

    let outcome = loop {
        tokio::select! {
            biased;
            _ = cancelled(&mut cancel) => break cancellation(&shared),
            frame = transport.recv() => match frame {
                Ok(Some(text)) => match decode(&text, &spec) {
                    Ok(record) => shared.deliver(record),
                    Err(e) => break SessionOutcome::Protocol(e),
                },
                Ok(None) => break SessionOutcome::ServerClosed,
                Err(e) => break SessionOutcome::ReceiveFailed(e.into_binance(&shared.url)),
            },
        }
    };

    if matches!(outcome, SessionOutcome::Cancelled | SessionOutcome::Aborted(_)) {
        shared.set_state(SubscriptionState::Closing);
    }
    match tokio::time::timeout(close_timeout, transport.close()).await {
        Ok(Ok(())) => debug!(url = %shared.url, "Transport closed"),
        Ok(Err(e)) => debug!(url = %shared.url, error = %e, "Transport close failed"),
        Err(_) => warn!(url = %shared.url, ?close_timeout, "Transport close timed out"),
    }

    finish(&shared, outcome)
}

fn cancellation(shared: &SessionShared) -> SessionOutcome {
    match shared.failure() {
        Some(reason) => SessionOutcome::Aborted(reason),
        None => SessionOutcome::Cancelled,
    }
}

fn finish(shared: &SessionShared, outcome: SessionOutcome) -> SessionOutcome {
    match &outcome {
        SessionOutcome::Cancelled => info!(url = %shared.url, "Session closed"),
        SessionOutcome::Aborted(reason) => warn!(url = %shared.url, %reason, "Session aborted"),
        SessionOutcome::ServerClosed => warn!(url = %shared.url, "Server closed session"),
        SessionOutcome::ConnectFailed(e)
        | SessionOutcome::ReceiveFailed(e)
        | SessionOutcome::Protocol(e) => {
            error!(url = %shared.url, error = %e, "Session broken");
            if shared.failure().is_none() {
                shared.mark_failed(e.to_string());
            }
        }
    }
    shared.set_state(outcome.final_state());
    outcome
}
