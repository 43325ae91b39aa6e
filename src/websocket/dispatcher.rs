//! Frame dispatch into the account store.

use std::sync::Arc;

use tokio::sync::mpsc;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::Result;
use crate::models::event::ExecutionReport;
use crate::models::{Balance, EventType, OrderStatus, UserEvent};
use crate::rest::UserDataApi;
use crate::state::{AccountStore, CompletedOrders, OrderTracker};

/// Single consumer of one session's frame queue.
///
/// Frames are applied in arrival order. A frame that fails to decode or
/// apply is logged and skipped.
pub struct Dispatcher<A> {
    api: Arc<A>,
    store: Arc<AccountStore>,
    completed: Arc<CompletedOrders>,
    tracker: Arc<OrderTracker>,
    session: CancellationToken,
    reconcile_on_fill: bool,
    reconciles: JoinSet<()>,
}

impl<A: UserDataApi> Dispatcher<A> {
    pub fn new(
        api: Arc<A>,
        store: Arc<AccountStore>,
        completed: Arc<CompletedOrders>,
        tracker: Arc<OrderTracker>,
        session: CancellationToken,
        reconcile_on_fill: bool,
    ) -> Self {
        Self {
            api,
            store,
            completed,
            tracker,
            session,
            reconcile_on_fill,
            reconciles: JoinSet::new(),
        }
    }

    /// Drains `rx` until every sender is dropped.
    ///
    /// Balance refreshes still in flight when the queue closes are
    /// aborted, so nothing from this session lands after the next
    /// snapshot.
    pub async fn run(mut self, mut rx: mpsc::Receiver<String>) {
        let mut frames = 0u64;
        while let Some(frame) = rx.recv().await {
            frames += 1;
            if let Err(e) = self.dispatch(&frame) {
                warn!(error = %e, "Skipping undecodable frame");
            }
            while self.reconciles.try_join_next().is_some() {}
        }

        self.reconciles.shutdown().await;
        debug!(frames, "Dispatcher drained");
    }

    /// Decodes and applies one frame.
    ///
    /// Returns the event type that was applied, or `None` for event types
    /// that are not handled.
    ///
    /// # Errors
    ///
    /// Returns an error if the frame is not a valid event or a balance
    /// delta is malformed. The store is left untouched in that case.
    pub fn dispatch(&mut self, frame: &str) -> Result<Option<EventType>> {
        let Some(event) = UserEvent::from_frame(frame)? else {
            debug!("Ignoring unhandled event type");
            return Ok(None);
        };
        let event_type = event.event_type();

        match event {
            UserEvent::AccountPosition(ev) => {
                let balances: Vec<Balance> = ev.balances.into_iter().map(Balance::from).collect();
                debug!(event = event_type.as_str(), assets = balances.len(), "Balance position");
                self.store.apply_balance_position(balances, ev.last_update);
            }
            UserEvent::BalanceDelta(ev) => {
                let applied = self.store.apply_balance_delta(&ev)?;
                debug!(
                    event = event_type.as_str(),
                    asset = %ev.asset,
                    delta = %ev.delta,
                    applied,
                    "Balance delta"
                );
            }
            UserEvent::Execution(report) => self.apply_execution(&report),
            UserEvent::AccountInfo(ev) => {
                let (info, balances) = ev.into_parts();
                self.store.replace_account(info, balances);
                debug!(event = event_type.as_str(), "Account info replaced");
            }
            UserEvent::ListenKeyExpired(ev) => {
                warn!(event_time = ev.event_time, "Listen key expired, forcing reconnect");
                self.session.cancel();
            }
        }

        Ok(Some(event_type))
    }

    fn apply_execution(&mut self, report: &ExecutionReport) {
        let update = self.store.upsert_order(report);
        let key = update.order.key();
        let confirmed = self.tracker.confirm(&key);

        debug!(
            symbol = %key.symbol,
            order_id = key.order_id,
            status = %update.order.status,
            execution = %report.execution_type,
            confirmed,
            "Execution report"
        );

        if update.removed {
            info!(
                symbol = %key.symbol,
                order_id = key.order_id,
                status = %update.order.status,
                "Order completed"
            );
            self.completed.insert(update.order);
        }

        if self.reconcile_on_fill && report.status == OrderStatus::Filled {
            self.spawn_reconcile();
        }
    }

    fn spawn_reconcile(&mut self) {
        let api = Arc::clone(&self.api);
        let store = Arc::clone(&self.store);
        self.reconciles.spawn(async move {
            match api.fetch_account().await {
                Ok((info, balances)) => {
                    let applied = store.apply_account_refresh(info, balances);
                    debug!(applied, "Balances reconciled after fill");
                }
                Err(e) => warn!(error = %e, "Balance reconcile failed"),
            }
        });
    }
}
