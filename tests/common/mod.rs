//! Shared test utilities: an in-memory REST fake and a scripted stream server.

#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use parking_lot::Mutex;
use rust_decimal::Decimal;
use serde_json::json;
use tokio::net::TcpListener;
use tungstenite::Message;
use tungstenite::handshake::server::{ErrorResponse, Request, Response};
use userstream::models::{AccountInfo, AccountSnapshot, Balance, ListenKey, Order};
use userstream::rest::UserDataApi;
use userstream::{Result, UserStreamError};

pub fn balance(asset: &str, free: Decimal, locked: Decimal) -> Balance {
    Balance {
        asset: asset.to_string(),
        free,
        locked,
    }
}

pub fn snapshot(balances: Vec<Balance>, orders: Vec<Order>) -> AccountSnapshot {
    AccountSnapshot::new(AccountInfo::default(), balances, orders)
}

/// A REST open-order entry.
pub fn order(symbol: &str, order_id: i64, status: &str) -> Order {
    serde_json::from_value(json!({
        "symbol": symbol,
        "orderId": order_id,
        "orderListId": -1,
        "clientOrderId": format!("client-{order_id}"),
        "price": "0.10000000",
        "origQty": "1.00000000",
        "executedQty": "0.00000000",
        "cummulativeQuoteQty": "0.00000000",
        "status": status,
        "timeInForce": "GTC",
        "type": "LIMIT",
        "side": "BUY",
        "stopPrice": "0.00000000",
        "icebergQty": "0.00000000",
        "time": 1_499_827_319_559_i64,
        "updateTime": 1_499_827_319_559_i64,
        "isWorking": true,
        "origQuoteOrderQty": "0.00000000"
    }))
    .expect("Failed to build order")
}

/// An `executionReport` frame for `symbol`/`order_id` in `status`.
pub fn execution_frame(symbol: &str, order_id: i64, status: &str) -> String {
    let executed = if status == "FILLED" { "1.00000000" } else { "0.00000000" };
    let execution = if status == "FILLED" { "TRADE" } else { status };
    json!({
        "e": "executionReport",
        "E": 1_499_405_658_658_i64,
        "s": symbol,
        "c": "mUvoqJxFIILMdfAW5iGSOW",
        "S": "BUY",
        "o": "LIMIT",
        "f": "GTC",
        "q": "1.00000000",
        "p": "0.10264410",
        "P": "0.00000000",
        "F": "0.00000000",
        "g": -1,
        "C": "",
        "x": execution,
        "X": status,
        "r": "NONE",
        "i": order_id,
        "l": executed,
        "z": executed,
        "L": "0.10264410",
        "n": "0",
        "N": null,
        "T": 1_499_405_658_657_i64,
        "t": -1,
        "I": 8_641_984,
        "w": true,
        "m": false,
        "M": false,
        "O": 1_499_405_658_657_i64,
        "Z": "0.00000000",
        "Y": "0.00000000",
        "Q": "0.00000000"
    })
    .to_string()
}

/// An `outboundAccountPosition` frame.
pub fn position_frame(asset: &str, free: &str, locked: &str, update: u64) -> String {
    json!({
        "e": "outboundAccountPosition",
        "E": update + 1,
        "u": update,
        "B": [{"a": asset, "f": free, "l": locked}]
    })
    .to_string()
}

/// Scripted, in-memory stand-in for the exchange REST API.
///
/// Each bootstrap takes the next scripted snapshot; the last one repeats.
#[derive(Default)]
pub struct FakeApi {
    pub listen_keys: AtomicUsize,
    pub keepalives: AtomicUsize,
    pub closed: AtomicUsize,
    pub account_fetches: AtomicUsize,
    failing_bootstraps: AtomicUsize,
    failing_snapshots: AtomicUsize,
    snapshots: Mutex<VecDeque<AccountSnapshot>>,
    account: Mutex<Option<(AccountInfo, Vec<Balance>)>>,
    orders: Mutex<Vec<Order>>,
}

impl FakeApi {
    pub fn new(snapshots: Vec<AccountSnapshot>) -> Self {
        Self {
            snapshots: Mutex::new(snapshots.into()),
            ..Self::default()
        }
    }

    /// The next `n` listen key requests fail with an upstream error.
    pub fn fail_bootstraps(&self, n: usize) {
        self.failing_bootstraps.store(n, Ordering::SeqCst);
    }

    /// The next `n` snapshot fetches fail after the listen key was created.
    pub fn fail_snapshots(&self, n: usize) {
        self.failing_snapshots.store(n, Ordering::SeqCst);
    }

    /// Result of the account fetch used by balance reconciliation.
    pub fn set_account(&self, info: AccountInfo, balances: Vec<Balance>) {
        *self.account.lock() = Some((info, balances));
    }

    /// Orders known to the order lookup endpoint.
    pub fn add_order(&self, order: Order) {
        self.orders.lock().push(order);
    }

    pub fn listen_key_count(&self) -> usize {
        self.listen_keys.load(Ordering::SeqCst)
    }

    fn next_snapshot(&self) -> AccountSnapshot {
        let mut snapshots = self.snapshots.lock();
        if snapshots.len() > 1 {
            snapshots.pop_front().unwrap_or_default()
        } else {
            snapshots.front().cloned().unwrap_or_default()
        }
    }
}

impl UserDataApi for FakeApi {
    async fn create_listen_key(&self) -> Result<ListenKey> {
        let failing = self.failing_bootstraps.load(Ordering::SeqCst);
        if failing > 0 {
            self.failing_bootstraps.store(failing - 1, Ordering::SeqCst);
            return Err(UserStreamError::Upstream {
                status: 503,
                code: None,
                msg: "service unavailable".to_string(),
            });
        }
        let n = self.listen_keys.fetch_add(1, Ordering::SeqCst) + 1;
        Ok(ListenKey::new(format!("key-{n}")))
    }

    async fn keep_alive_listen_key(&self, _key: &ListenKey) -> Result<()> {
        self.keepalives.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn close_listen_key(&self, _key: &ListenKey) -> Result<()> {
        self.closed.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn fetch_account(&self) -> Result<(AccountInfo, Vec<Balance>)> {
        self.account_fetches.fetch_add(1, Ordering::SeqCst);
        self.account
            .lock()
            .clone()
            .ok_or_else(|| UserStreamError::Upstream {
                status: 500,
                code: None,
                msg: "no account scripted".to_string(),
            })
    }

    async fn fetch_open_orders(&self) -> Result<Vec<Order>> {
        Ok(Vec::new())
    }

    async fn fetch_order(&self, symbol: &str, order_id: i64) -> Result<Order> {
        self.orders
            .lock()
            .iter()
            .find(|o| o.symbol == symbol && o.order_id == order_id)
            .cloned()
            .ok_or_else(|| UserStreamError::Upstream {
                status: 400,
                code: Some(-2013),
                msg: "Order does not exist.".to_string(),
            })
    }

    async fn fetch_account_snapshot(&self) -> Result<AccountSnapshot> {
        let failing = self.failing_snapshots.load(Ordering::SeqCst);
        if failing > 0 {
            self.failing_snapshots.store(failing - 1, Ordering::SeqCst);
            return Err(UserStreamError::Upstream {
                status: 500,
                code: None,
                msg: "internal error".to_string(),
            });
        }
        Ok(self.next_snapshot())
    }
}

/// How a scripted stream connection ends after its frames are sent.
#[derive(Debug, Clone, Copy)]
pub enum SessionEnd {
    /// Drop the TCP connection without a close handshake.
    Disconnect,
    /// Keep the connection open until the client goes away.
    Hold,
}

#[derive(Debug, Clone)]
pub struct ScriptedSession {
    pub frames: Vec<String>,
    pub end: SessionEnd,
}

impl ScriptedSession {
    pub fn new(frames: Vec<String>, end: SessionEnd) -> Self {
        Self { frames, end }
    }
}

/// Local WebSocket server playing one script entry per connection.
pub struct StreamServer {
    pub base_url: String,
    pub paths: Arc<Mutex<Vec<String>>>,
}

impl StreamServer {
    pub fn connections(&self) -> usize {
        self.paths.lock().len()
    }
}

/// Starts a server; connection `i` plays `script[i]`, the last entry repeats.
pub async fn spawn_stream_server(script: Vec<ScriptedSession>) -> StreamServer {
    let listener = TcpListener::bind("127.0.0.1:0")
        .await
        .expect("Failed to bind test listener");
    let addr = listener.local_addr().expect("Failed to read local addr");
    let paths = Arc::new(Mutex::new(Vec::new()));
    let seen = Arc::clone(&paths);

    tokio::spawn(async move {
        let mut index = 0usize;
        while let Ok((stream, _)) = listener.accept().await {
            let session = script[index.min(script.len() - 1)].clone();
            index += 1;
            let seen = Arc::clone(&seen);

            tokio::spawn(async move {
                let callback = move |req: &Request,
                                     resp: Response|
                      -> std::result::Result<Response, ErrorResponse> {
                    seen.lock().push(req.uri().path().to_string());
                    Ok(resp)
                };
                let Ok(mut ws) = tokio_tungstenite::accept_hdr_async(stream, callback).await else {
                    return;
                };
                for frame in session.frames {
                    if ws.send(Message::Text(frame.into())).await.is_err() {
                        return;
                    }
                }
                match session.end {
                    SessionEnd::Disconnect => drop(ws),
                    SessionEnd::Hold => {
                        while let Some(Ok(_)) = ws.next().await {}
                    }
                }
            });
        }
    });

    StreamServer {
        base_url: format!("ws://{addr}"),
        paths,
    }
}

/// Polls `condition` every 10ms until it holds or `limit` elapses.
pub async fn wait_until(limit: Duration, mut condition: impl FnMut() -> bool) -> bool {
    let deadline = tokio::time::Instant::now() + limit;
    while tokio::time::Instant::now() < deadline {
        if condition() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    condition()
}
