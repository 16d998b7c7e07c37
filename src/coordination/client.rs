use super::{CoordinationConnector, CoordinationStore};
use crate::config::CoordinationConfig;
use crate::error::{ConnectionError, WaitError};
use crate::logging::log_coordination_operation;
use crate::retry::RetryPolicy;
use parking_lot::RwLock;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

/// Shared, lazily connected client for one coordination ensemble.
///
/// The connection is created at most once at a time: concurrent callers that
/// find no live session queue on `connect_lock`, and only the first one runs
/// the retry loop. The others pick up its handle.
pub struct CoordinationClient {
    connector: Arc<dyn CoordinationConnector>,
    retry: RetryPolicy,
    poll_interval: Duration,
    handle: RwLock<Option<Arc<dyn CoordinationStore>>>,
    connect_lock: Mutex<()>,
    sessions_created: AtomicU64,
}

impl CoordinationClient {
    pub fn new(
        connector: Arc<dyn CoordinationConnector>,
        retry: RetryPolicy,
        poll_interval: Duration,
    ) -> Self {
        Self {
            connector,
            retry,
            poll_interval,
            handle: RwLock::new(None),
            connect_lock: Mutex::new(()),
            sessions_created: AtomicU64::new(0),
        }
    }

    pub fn from_config(connector: Arc<dyn CoordinationConnector>, config: &CoordinationConfig) -> Self {
        Self::new(connector, config.connect_retry, config.poll_interval())
    }

    pub fn target(&self) -> &str {
        self.connector.target()
    }

    pub fn poll_interval(&self) -> Duration {
        self.poll_interval
    }

    pub fn retry_policy(&self) -> &RetryPolicy {
        &self.retry
    }

    pub fn is_connected(&self) -> bool {
        self.handle.read().is_some()
    }

    /// Number of sessions this client has opened over its lifetime
    pub fn sessions_created(&self) -> u64 {
        self.sessions_created.load(Ordering::SeqCst)
    }

    /// Return the live session, connecting first if there is none.
    ///
    /// Idempotent. Fails with [`ConnectionError::RetriesExhausted`] once the
    /// retry policy is used up.
    pub async fn connect(&self) -> Result<Arc<dyn CoordinationStore>, ConnectionError> {
        if let Some(handle) = self.current() {
            return Ok(handle);
        }

        let _guard = self.connect_lock.lock().await;
        if let Some(handle) = self.current() {
            return Ok(handle);
        }

        let handle = self.connect_with_retry().await?;
        *self.handle.write() = Some(Arc::clone(&handle));
        self.sessions_created.fetch_add(1, Ordering::SeqCst);
        Ok(handle)
    }

    /// Drop the current session so the next call reconnects
    pub fn invalidate(&self) {
        if self.handle.write().take().is_some() {
            warn!(target_ensemble = %self.target(), "🔌 COORDINATION: Session invalidated");
        }
    }

    pub async fn exists(&self, path: &str) -> Result<bool, ConnectionError> {
        let store = self.connect().await?;
        match store.exists(path).await {
            Ok(exists) => Ok(exists),
            Err(e) => {
                if e.invalidates_session() {
                    self.invalidate();
                }
                Err(e)
            }
        }
    }

    /// Block until `path` no longer exists, polling on the configured
    /// interval. No deadline is applied.
    ///
    /// Returns the number of existence checks performed.
    pub async fn wait_for_path_deleted(&self, path: &str) -> Result<u32, WaitError> {
        self.wait_for_path_deleted_with(path, self.poll_interval, None)
            .await
    }

    /// Same as [`Self::wait_for_path_deleted`] with an explicit interval and
    /// an optional deadline. On expiry the path was still present at the
    /// last check and [`WaitError::Timeout`] is returned.
    pub async fn wait_for_path_deleted_with(
        &self,
        path: &str,
        poll_interval: Duration,
        deadline: Option<Duration>,
    ) -> Result<u32, WaitError> {
        let started = Instant::now();
        let outcome = match deadline {
            None => self.poll_until_absent(path, poll_interval).await,
            Some(limit) => {
                match tokio::time::timeout(limit, self.poll_until_absent(path, poll_interval)).await {
                    Ok(outcome) => outcome,
                    Err(_) => Err(WaitError::Timeout {
                        path: path.to_string(),
                        waited_ms: started.elapsed().as_millis() as u64,
                    }),
                }
            }
        };

        let status = if outcome.is_ok() { "deleted" } else { "failed" };
        log_coordination_operation(
            "wait_for_path_deleted",
            self.target(),
            Some(path),
            status,
            Some(started.elapsed().as_millis() as u64),
        );
        outcome
    }

    async fn poll_until_absent(&self, path: &str, poll_interval: Duration) -> Result<u32, WaitError> {
        let mut polls = 0u32;
        let mut consecutive_session_losses = 0u32;

        loop {
            polls += 1;
            match self.exists(path).await {
                Ok(false) => {
                    debug!(path = %path, polls = polls, "✅ COORDINATION: Path absent");
                    return Ok(polls);
                }
                Ok(true) => consecutive_session_losses = 0,
                Err(e) if e.invalidates_session() => {
                    consecutive_session_losses += 1;
                    if !self.retry.allows_retry_after(consecutive_session_losses) {
                        return Err(e.into());
                    }
                    warn!(
                        path = %path,
                        error = %e,
                        "⚠️ COORDINATION: Session lost while waiting, reconnecting"
                    );
                }
                Err(e) => return Err(e.into()),
            }
            tokio::time::sleep(poll_interval).await;
        }
    }

    fn current(&self) -> Option<Arc<dyn CoordinationStore>> {
        self.handle.read().clone()
    }

    async fn connect_with_retry(&self) -> Result<Arc<dyn CoordinationStore>, ConnectionError> {
        let started = Instant::now();
        let mut attempt = 0u32;

        loop {
            attempt += 1;
            match self.connector.connect().await {
                Ok(handle) => {
                    info!(
                        target_ensemble = %self.target(),
                        attempt = attempt,
                        "🔗 COORDINATION: Connected"
                    );
                    log_coordination_operation(
                        "connect",
                        self.target(),
                        None,
                        "connected",
                        Some(started.elapsed().as_millis() as u64),
                    );
                    return Ok(handle);
                }
                Err(e) if self.retry.allows_retry_after(attempt) => {
                    let delay = self.retry.backoff_for(attempt);
                    warn!(
                        target_ensemble = %self.target(),
                        attempt = attempt,
                        max_attempts = self.retry.max_attempts,
                        delay_ms = delay.as_millis() as u64,
                        error = %e,
                        "🔄 COORDINATION: Connect failed, retrying"
                    );
                    tokio::time::sleep(delay).await;
                }
                Err(e) => {
                    log_coordination_operation(
                        "connect",
                        self.target(),
                        None,
                        "exhausted",
                        Some(started.elapsed().as_millis() as u64),
                    );
                    return Err(ConnectionError::RetriesExhausted {
                        target: self.target().to_string(),
                        attempts: attempt,
                        reason: e.to_string(),
                    });
                }
            }
        }
    }
}

impl std::fmt::Debug for CoordinationClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CoordinationClient")
            .field("target", &self.target())
            .field("retry", &self.retry)
            .field("poll_interval", &self.poll_interval)
            .field("connected", &self.is_connected())
            .finish()
    }
}
