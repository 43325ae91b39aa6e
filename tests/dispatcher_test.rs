//! Dispatcher tests: frames in, account store changes out.

mod common;

use std::sync::Arc;
use std::sync::atomic::Ordering;
use std::time::Duration;

use rust_decimal_macros::dec;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use userstream::models::{AccountInfo, EventType, OrderKey, OrderStatus};
use userstream::state::{AccountStore, CompletedOrders, OrderTracker};
use userstream::websocket::Dispatcher;

use common::{FakeApi, balance, execution_frame, position_frame, snapshot};

struct Harness {
    api: Arc<FakeApi>,
    store: Arc<AccountStore>,
    completed: Arc<CompletedOrders>,
    tracker: Arc<OrderTracker>,
    session: CancellationToken,
}

impl Harness {
    fn new() -> Self {
        Self {
            api: Arc::new(FakeApi::default()),
            store: Arc::new(AccountStore::new()),
            completed: Arc::new(CompletedOrders::new(Duration::from_secs(600))),
            tracker: Arc::new(OrderTracker::new()),
            session: CancellationToken::new(),
        }
    }

    fn dispatcher(&self, reconcile_on_fill: bool) -> Dispatcher<FakeApi> {
        Dispatcher::new(
            Arc::clone(&self.api),
            Arc::clone(&self.store),
            Arc::clone(&self.completed),
            Arc::clone(&self.tracker),
            self.session.clone(),
            reconcile_on_fill,
        )
    }
}

#[test]
fn test_account_position_frame_yields_balance() {
    let harness = Harness::new();
    let mut dispatcher = harness.dispatcher(false);

    let frame = r#"{"e":"outboundAccountPosition","E":1600749480712,"u":1600749480711,"B":[{"a":"BNB","f":"1.60268308","l":"0.00000000"}]}"#;
    let applied = dispatcher.dispatch(frame).expect("Failed to dispatch frame");
    assert_eq!(applied, Some(EventType::AccountPosition));

    let bnb = harness.store.balance("BNB").expect("BNB balance missing");
    assert_eq!(bnb.free.to_string(), "1.60268308");
    assert_eq!(bnb.locked.to_string(), "0.00000000");
}

#[test]
fn test_balance_update_frame_adds_delta() {
    let harness = Harness::new();
    harness
        .store
        .replace_snapshot(snapshot(vec![balance("BTC", dec!(10.0), dec!(0))], vec![]));
    let mut dispatcher = harness.dispatcher(false);

    let frame = r#"{"e":"balanceUpdate","E":1573200697110,"a":"BTC","d":"+1.5","T":1573200697068}"#;
    dispatcher.dispatch(frame).expect("Failed to dispatch frame");

    let btc = harness.store.balance("BTC").expect("BTC balance missing");
    assert_eq!(btc.free, dec!(11.5));
}

#[test]
fn test_unknown_event_type_is_ignored() {
    let harness = Harness::new();
    let mut dispatcher = harness.dispatcher(false);

    let applied = dispatcher
        .dispatch(r#"{"e":"externalLockUpdate","E":1581557507324,"a":"NEO","d":"10","T":1581557507268}"#)
        .expect("Unknown events should not fail");
    assert_eq!(applied, None);
}

#[test]
fn test_malformed_frames_are_rejected_without_side_effects() {
    let harness = Harness::new();
    harness
        .store
        .replace_snapshot(snapshot(vec![balance("BTC", dec!(1), dec!(0))], vec![]));
    let mut dispatcher = harness.dispatcher(false);

    assert!(dispatcher.dispatch("not json").is_err());
    assert!(dispatcher.dispatch(r#"{"E":1}"#).is_err());
    assert!(
        dispatcher
            .dispatch(r#"{"e":"balanceUpdate","E":1,"a":"BTC","d":"abc","T":1}"#)
            .is_err()
    );

    assert_eq!(harness.store.balance("BTC").map(|b| b.free), Some(dec!(1)));
}

#[test]
fn test_execution_lifecycle_moves_order_to_archive() {
    let harness = Harness::new();
    harness.tracker.track(OrderKey::new("ETHBTC", 4293153));
    let mut dispatcher = harness.dispatcher(false);

    dispatcher
        .dispatch(&execution_frame("ETHBTC", 4293153, "NEW"))
        .expect("Failed to dispatch NEW");
    assert!(harness.tracker.is_empty());
    let open = harness.store.open_orders();
    assert_eq!(open.len(), 1);
    assert_eq!(open[0].status, OrderStatus::New);

    dispatcher
        .dispatch(&execution_frame("ETHBTC", 4293153, "FILLED"))
        .expect("Failed to dispatch FILLED");
    assert!(harness.store.open_orders().is_empty());

    let archived = harness
        .completed
        .get("ETHBTC", 4293153)
        .expect("Filled order should be archived");
    assert_eq!(archived.status, OrderStatus::Filled);
    assert_eq!(archived.executed_qty, dec!(1));
}

#[test]
fn test_listen_key_expired_cancels_session() {
    let harness = Harness::new();
    let mut dispatcher = harness.dispatcher(false);

    dispatcher
        .dispatch(r#"{"e":"listenKeyExpired","E":1576653824250,"listenKey":"OfYGbUzi3PraNagEkdKuFwUHn48brFsItTdsuiIXrucEvD0rhRXZ7I6URWfE8YE8"}"#)
        .expect("Failed to dispatch listenKeyExpired");
    assert!(harness.session.is_cancelled());
}

#[tokio::test]
async fn test_run_skips_bad_frame_and_keeps_order() {
    let harness = Harness::new();
    let dispatcher = harness.dispatcher(false);
    let (tx, rx) = mpsc::channel(8);

    tx.send(position_frame("BNB", "1.0", "0", 10)).await.unwrap();
    tx.send("{broken".to_string()).await.unwrap();
    tx.send(position_frame("BNB", "2.0", "0", 11)).await.unwrap();
    drop(tx);

    dispatcher.run(rx).await;

    let bnb = harness.store.balance("BNB").expect("BNB balance missing");
    assert_eq!(bnb.free, dec!(2.0));
    assert_eq!(harness.store.account_info().update_time, 11);
}

#[tokio::test]
async fn test_fill_triggers_balance_reconcile() {
    let harness = Harness::new();
    let info = AccountInfo {
        update_time: 1_700_000_000_000,
        ..AccountInfo::default()
    };
    harness
        .api
        .set_account(info, vec![balance("ETH", dec!(1.0), dec!(0))]);
    let dispatcher = harness.dispatcher(true);
    let (tx, rx) = mpsc::channel(8);
    let task = tokio::spawn(dispatcher.run(rx));

    tx.send(execution_frame("ETHBTC", 1, "FILLED")).await.unwrap();

    let store = Arc::clone(&harness.store);
    assert!(
        common::wait_until(Duration::from_secs(2), || store.balance("ETH").is_some()).await,
        "reconcile should apply the REST balances"
    );
    assert_eq!(harness.api.account_fetches.load(Ordering::SeqCst), 1);

    drop(tx);
    task.await.unwrap();
}

#[tokio::test]
async fn test_non_fill_does_not_reconcile() {
    let harness = Harness::new();
    let dispatcher = harness.dispatcher(true);
    let (tx, rx) = mpsc::channel(8);

    tx.send(execution_frame("ETHBTC", 1, "NEW")).await.unwrap();
    tx.send(execution_frame("ETHBTC", 1, "CANCELED")).await.unwrap();
    drop(tx);
    dispatcher.run(rx).await;

    assert_eq!(harness.api.account_fetches.load(Ordering::SeqCst), 0);
    assert!(harness.completed.get("ETHBTC", 1).is_some());
}
