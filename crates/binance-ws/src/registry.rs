//! Registry of live streaming sessions

use crate::decoder::DecodeSpec;
use crate::retry::ConnectRetry;
use crate::session::{run, RecordCallback, SessionOutcome, SessionShared, SubscriptionState};
use crate::transport::Connector;
use binance_types::StreamKind;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::hash::{Hash, Hasher};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, instrument};

/// Handle to a subscription
///
/// Equality and hashing use the id only. Ids are never reused within a
/// registry.
#[derive(Debug, Clone, Copy)]
pub struct SubscriptionHandle {
    id: u64,
    kind: StreamKind,
}

impl SubscriptionHandle {
    /// Get the handle id
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Get the stream kind
    pub fn kind(&self) -> StreamKind {
        self.kind
    }
}

impl PartialEq for SubscriptionHandle {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for SubscriptionHandle {}

impl Hash for SubscriptionHandle {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.id.hash(state);
    }
}

/// Registry configuration
#[derive(Debug, Clone)]
pub struct RegistryConfig {
    /// Connect policy for every session
    pub retry: ConnectRetry,
    /// Bound on closing a transport
    pub close_timeout: Duration,
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            retry: ConnectRetry::default(),
            close_timeout: Duration::from_secs(5),
        }
    }
}

impl RegistryConfig {
    /// Create a new config with default values
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the connect policy
    pub fn with_retry(mut self, retry: ConnectRetry) -> Self {
        self.retry = retry;
        self
    }

    /// Set the close timeout
    pub fn with_close_timeout(mut self, timeout: Duration) -> Self {
        self.close_timeout = timeout;
        self
    }
}

struct Entry {
    kind: StreamKind,
    shared: Arc<SessionShared>,
    cancel: watch::Sender<bool>,
    /// Taken by whoever is tearing the session down
    task: Option<JoinHandle<SessionOutcome>>,
}

impl Entry {
    fn is_joinable(&self) -> bool {
        self.task.is_some() && !self.shared.state().is_terminal()
    }
}

/// Owns every streaming session
///
/// `subscribe` spawns one task per session and returns immediately.
/// `unsubscribe` cancels the task, waits for it to finish, and only then
/// drops the entry. Dropping the registry cancels every session.
pub struct SessionRegistry {
    connector: Arc<dyn Connector>,
    config: RegistryConfig,
    next_id: AtomicU64,
    sessions: Mutex<HashMap<u64, Entry>>,
}

impl SessionRegistry {
    /// Create a registry
    pub fn new(connector: Arc<dyn Connector>, config: RegistryConfig) -> Self {
        Self {
            connector,
            config,
            next_id: AtomicU64::new(1),
            sessions: Mutex::new(HashMap::new()),
        }
    }

    /// Start a session on `url` and return its handle
    ///
    /// Does not wait for the connection: the handle is in
    /// [`SubscriptionState::Requested`] or later when returned.
    ///
    /// # Panics
    /// Panics if called outside a Tokio runtime.
    #[instrument(skip(self, spec, callback))]
    pub fn subscribe(
        &self,
        kind: StreamKind,
        url: &str,
        spec: DecodeSpec,
        callback: RecordCallback,
    ) -> SubscriptionHandle {
        let mut sessions = self.sessions.lock();
        self.spawn_locked(&mut sessions, kind, url, spec, callback)
    }

    /// Join the live session on `url` if one exists, else start one
    ///
    /// A joined callback receives every record the session delivers from
    /// then on. All joiners share one handle, so unsubscribing it ends the
    /// session for all of them.
    #[instrument(skip(self, spec, callback))]
    pub fn subscribe_or_join(
        &self,
        kind: StreamKind,
        url: &str,
        spec: DecodeSpec,
        callback: RecordCallback,
    ) -> SubscriptionHandle {
        let mut sessions = self.sessions.lock();

        let live = sessions
            .iter()
            .find(|(_, entry)| entry.shared.url() == url && entry.is_joinable());
        if let Some((&id, entry)) = live {
            entry.shared.add_listener(callback);
            debug!(id, "Joined live session");
            return SubscriptionHandle { id, kind: entry.kind };
        }

        self.spawn_locked(&mut sessions, kind, url, spec, callback)
    }

    fn spawn_locked(
        &self,
        sessions: &mut HashMap<u64, Entry>,
        kind: StreamKind,
        url: &str,
        spec: DecodeSpec,
        callback: RecordCallback,
    ) -> SubscriptionHandle {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let shared = SessionShared::new(url.to_string(), callback);
        let transport = self.connector.transport(url);
        let (cancel, cancel_rx) = watch::channel(false);

        let task = tokio::spawn(run(
            shared.clone(),
            transport,
            spec,
            self.config.retry.clone(),
            self.config.close_timeout,
            cancel_rx,
        ));

        sessions.insert(
            id,
            Entry {
                kind,
                shared,
                cancel,
                task: Some(task),
            },
        );

        info!(id, ?kind, "Subscribed");
        SubscriptionHandle { id, kind }
    }

    /// Cancel a session, wait for its task to exit, then remove it
    ///
    /// Returns how the session ended. Unknown or already removed handles,
    /// and handles another caller is already tearing down, are a no-op
    /// returning `None`.
    #[instrument(skip(self), fields(id = handle.id))]
    pub async fn unsubscribe(&self, handle: SubscriptionHandle) -> Option<SessionOutcome> {
        let task = {
            let mut sessions = self.sessions.lock();
            let entry = sessions.get_mut(&handle.id)?;
            match entry.task.take() {
                Some(task) => {
                    entry.cancel.send_replace(true);
                    task
                }
                None if entry.shared.state().is_terminal() => {
                    // Already joined by abort
                    sessions.remove(&handle.id);
                    return None;
                }
                None => return None,
            }
        };

        let outcome = join(handle, task).await;
        self.sessions.lock().remove(&handle.id);
        info!("Unsubscribed");
        outcome
    }

    /// Tear a session down as failed, keeping its entry
    ///
    /// The session ends [`SubscriptionState::Broken`] with `reason` as its
    /// failure. The entry stays until unsubscribed, so the state remains
    /// observable.
    #[instrument(skip(self), fields(id = handle.id))]
    pub async fn abort(&self, handle: SubscriptionHandle, reason: String) -> Option<SessionOutcome> {
        let task = {
            let mut sessions = self.sessions.lock();
            let entry = sessions.get_mut(&handle.id)?;
            let task = entry.task.take()?;
            entry.shared.mark_failed(reason);
            entry.cancel.send_replace(true);
            task
        };

        join(handle, task).await
    }

    /// Unsubscribe every session
    pub async fn close_all(&self) {
        let handles = self.handles();
        if handles.is_empty() {
            return;
        }

        info!(count = handles.len(), "Closing all sessions");
        futures::future::join_all(handles.into_iter().map(|h| self.unsubscribe(h))).await;
    }

    /// Current state of a subscription, `None` once removed
    pub fn state(&self, handle: SubscriptionHandle) -> Option<SubscriptionState> {
        self.sessions.lock().get(&handle.id).map(|e| e.shared.state())
    }

    /// Why a broken subscription failed
    pub fn failure(&self, handle: SubscriptionHandle) -> Option<String> {
        self.sessions.lock().get(&handle.id).and_then(|e| e.shared.failure())
    }

    /// Handles of every registered session
    pub fn handles(&self) -> Vec<SubscriptionHandle> {
        self.sessions
            .lock()
            .iter()
            .map(|(&id, entry)| SubscriptionHandle { id, kind: entry.kind })
            .collect()
    }

    /// Number of registered sessions, including broken ones not yet removed
    pub fn len(&self) -> usize {
        self.sessions.lock().len()
    }

    /// Check if no sessions are registered
    pub fn is_empty(&self) -> bool {
        self.sessions.lock().is_empty()
    }
}

async fn join(handle: SubscriptionHandle, task: JoinHandle<SessionOutcome>) -> Option<SessionOutcome> {
    match task.await {
        Ok(outcome) => Some(outcome),
        Err(e) => {
            error!(id = handle.id, error = %e, "Session task failed");
            None
        }
    }
}

impl std::fmt::Debug for SessionRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionRegistry")
            .field("sessions", &self.len())
            .field("config", &self.config)
            .finish()
    }
}
