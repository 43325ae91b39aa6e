//! Session supervisor.
//!
//! [`AccountSync`] drives one account through
//! `Disconnected -> Bootstrapping -> Streaming -> Disconnected` for as
//! long as the shutdown token is alive. Each streaming session owns a
//! child cancellation token, a frame queue and a dispatcher; the session
//! is fully torn down (keepalive stopped, queue drained) before the next
//! bootstrap replaces the snapshot.

use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use super::{Dispatcher, keepalive_loop, stream_endpoint, subscribe, watchdog_loop};
use crate::config::SyncConfig;
use crate::models::{ListenKey, Order, OrderKey};
use crate::rest::UserDataApi;
use crate::state::{AccountStore, CompletedOrders, OrderTracker};
use crate::{Result, UserStreamError};

/// Where the supervisor currently is in its cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Disconnected,
    Bootstrapping,
    Streaming,
}

/// Why a streaming session ended.
enum DisconnectReason {
    /// The process is shutting down.
    Shutdown,
    /// The session was cancelled locally (watchdog, expired listen key).
    Forced(String),
    /// The transport failed or the server closed the stream.
    Transport(UserStreamError),
}

/// Keeps an in-memory account mirror in sync with the user data stream.
pub struct AccountSync<A> {
    api: Arc<A>,
    stream_url: String,
    tls: Option<Arc<rustls::ClientConfig>>,
    config: SyncConfig,
    store: Arc<AccountStore>,
    completed: Arc<CompletedOrders>,
    tracker: Arc<OrderTracker>,
    state: Mutex<SessionState>,
}

impl<A: UserDataApi> AccountSync<A> {
    #[must_use]
    pub fn new(
        api: Arc<A>,
        stream_url: impl Into<String>,
        tls: Option<Arc<rustls::ClientConfig>>,
        config: SyncConfig,
    ) -> Self {
        let completed = Arc::new(CompletedOrders::new(config.completed_ttl));
        Self {
            api,
            stream_url: stream_url.into(),
            tls,
            config,
            store: Arc::new(AccountStore::new()),
            completed,
            tracker: Arc::new(OrderTracker::new()),
            state: Mutex::new(SessionState::Disconnected),
        }
    }

    pub fn store(&self) -> &Arc<AccountStore> {
        &self.store
    }

    pub fn completed(&self) -> &Arc<CompletedOrders> {
        &self.completed
    }

    pub fn state(&self) -> SessionState {
        *self.state.lock()
    }

    fn set_state(&self, state: SessionState) {
        *self.state.lock() = state;
    }

    /// Starts watching an order the caller just submitted.
    ///
    /// If the stream does not report it within the configured threshold,
    /// the session is rebuilt. An order the stream has already reported
    /// (open or completed) is not watched at all.
    pub fn track_order(&self, symbol: &str, order_id: i64) {
        let key = OrderKey::new(symbol, order_id);
        self.tracker.track(key.clone());
        // The dispatcher may have applied the report before the caller
        // learned the order id. Checking after inserting closes that gap.
        if self.store.order_status(symbol, order_id).is_ok()
            || self.completed.get(symbol, order_id).is_some()
        {
            self.tracker.confirm(&key);
            debug!(symbol, order_id, "Order already reported, not tracked");
        }
    }

    /// Number of orders still waiting for a stream report.
    pub fn tracked_orders(&self) -> usize {
        self.tracker.len()
    }

    /// Looks up an order in the live map, then the completed archive,
    /// then over REST.
    ///
    /// # Errors
    ///
    /// Returns the REST error if the order is in neither local map and
    /// the fallback request fails.
    pub async fn order_status(&self, symbol: &str, order_id: i64) -> Result<Order> {
        if let Ok(order) = self.store.order_status(symbol, order_id) {
            return Ok(order);
        }
        if let Some(order) = self.completed.get(symbol, order_id) {
            return Ok(order);
        }
        self.api.fetch_order(symbol, order_id).await
    }

    /// Creates a listen key and replaces the store with a fresh snapshot.
    ///
    /// Nothing is written to the store unless every step succeeds. If the
    /// snapshot fails, the new listen key is closed again. Tracked orders
    /// that the snapshot accounts for stop being watched.
    ///
    /// # Errors
    ///
    /// Returns the first REST error encountered.
    pub async fn bootstrap(&self) -> Result<ListenKey> {
        let key = self.api.create_listen_key().await?;
        let taken_at = Instant::now();
        let snapshot = match self.api.fetch_account_snapshot().await {
            Ok(snapshot) => snapshot,
            Err(e) => {
                if let Err(close) = self.api.close_listen_key(&key).await {
                    warn!(error = %close, "Failed to close unused listen key");
                }
                return Err(e);
            }
        };

        let settled = self
            .tracker
            .reconcile(taken_at, |k| snapshot.open_orders.contains_key(k));
        if settled > 0 {
            debug!(settled, "Tracked orders covered by snapshot");
        }
        self.store.replace_snapshot(snapshot);
        Ok(key)
    }

    /// Runs bootstrap / stream / reconnect cycles until `shutdown` fires.
    pub async fn run(&self, shutdown: CancellationToken) {
        info!(url = %self.stream_url, "Account sync starting");

        loop {
            self.set_state(SessionState::Bootstrapping);
            let bootstrapped = tokio::select! {
                () = shutdown.cancelled() => break,
                result = self.bootstrap() => result,
            };

            let key = match bootstrapped {
                Ok(key) => key,
                Err(e) => {
                    error!(error = %e, "Bootstrap failed");
                    self.set_state(SessionState::Disconnected);
                    if sleep_or_shutdown(self.config.bootstrap_retry_delay, &shutdown).await {
                        break;
                    }
                    continue;
                }
            };

            self.set_state(SessionState::Streaming);
            let reason = self.stream_session(&key, &shutdown).await;
            self.set_state(SessionState::Disconnected);

            match reason {
                DisconnectReason::Shutdown => {
                    if let Err(e) = self.api.close_listen_key(&key).await {
                        warn!(error = %e, "Failed to close listen key");
                    }
                    break;
                }
                DisconnectReason::Forced(why) => {
                    // Planned teardown, rebuild right away.
                    info!(reason = %why, "Session closed, re-bootstrapping");
                }
                DisconnectReason::Transport(e) => {
                    warn!(
                        error = %e,
                        delay_secs = self.config.reconnect_delay.as_secs(),
                        "Stream lost, reconnecting"
                    );
                    if sleep_or_shutdown(self.config.reconnect_delay, &shutdown).await {
                        break;
                    }
                }
            }
        }

        self.set_state(SessionState::Disconnected);
        info!("Account sync stopped");
    }

    /// Streams one session and tears it down completely before returning.
    async fn stream_session(
        &self,
        key: &ListenKey,
        shutdown: &CancellationToken,
    ) -> DisconnectReason {
        let session = shutdown.child_token();
        let (tx, rx) = mpsc::channel(self.config.queue_capacity);

        let dispatcher = Dispatcher::new(
            Arc::clone(&self.api),
            Arc::clone(&self.store),
            Arc::clone(&self.completed),
            Arc::clone(&self.tracker),
            session.clone(),
            self.config.reconcile_on_fill,
        );
        let dispatch_task = tokio::spawn(dispatcher.run(rx));

        let keepalive_task = tokio::spawn(keepalive_loop(
            Arc::clone(&self.api),
            key.clone(),
            self.config.keepalive_interval,
            session.clone(),
        ));

        let watchdog_task = self.config.order_track_threshold.map(|threshold| {
            tokio::spawn(watchdog_loop(
                Arc::clone(&self.tracker),
                threshold,
                self.config.watchdog_interval,
                session.clone(),
            ))
        });

        let url = stream_endpoint(&self.stream_url, key);
        let result = subscribe(
            &url,
            self.tls.clone(),
            tx,
            self.config.queue_push_timeout,
            self.config.ping_interval,
            &session,
        )
        .await;

        session.cancel();
        if let Err(e) = keepalive_task.await {
            warn!(error = %e, "Keepalive task failed");
        }
        if let Some(task) = watchdog_task
            && let Err(e) = task.await
        {
            warn!(error = %e, "Watchdog task failed");
        }
        if let Err(e) = dispatch_task.await {
            warn!(error = %e, "Dispatcher task failed");
        }

        if shutdown.is_cancelled() {
            return DisconnectReason::Shutdown;
        }
        match result {
            Err(UserStreamError::ForcedReconnect(why)) => DisconnectReason::Forced(why),
            Err(e) => DisconnectReason::Transport(e),
            Ok(()) => DisconnectReason::Transport(UserStreamError::StreamClosed),
        }
    }
}

/// Sleeps for `delay`; returns `true` if shutdown fired first.
async fn sleep_or_shutdown(delay: Duration, shutdown: &CancellationToken) -> bool {
    tokio::select! {
        () = shutdown.cancelled() => true,
        () = tokio::time::sleep(delay) => false,
    }
}
