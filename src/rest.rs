//! Binance REST client for the user data stream primitives.
//!
//! The synchronizer only needs a handful of calls: create and refresh a
//! listen key, fetch the account and its open orders, and look up a
//! single order. They sit behind the [`UserDataApi`] trait so the
//! supervisor can be driven by something other than the live exchange.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use reqwest::{Method, StatusCode};
use serde::Deserialize;
use serde::de::DeserializeOwned;
use tracing::{debug, info, warn};
use zeroize::Zeroizing;

use crate::auth::{API_KEY_HEADER, PreparedRequest, SignedRequest, current_millis};
use crate::config::BinanceConfig;
use crate::models::account::{IsolatedAccountResponse, MarginAccountResponse, SpotAccountResponse};
use crate::models::{AccountInfo, AccountSnapshot, AccountType, Balance, ListenKey, Order};
use crate::{Result, UserStreamError};

/// Timeout applied to every REST call.
const REQUEST_TIMEOUT: Duration = Duration::from_secs(5);

/// The REST calls the synchronizer depends on.
pub trait UserDataApi: Send + Sync + 'static {
    /// Creates a new listen key (`POST userDataStream`).
    fn create_listen_key(&self) -> impl Future<Output = Result<ListenKey>> + Send;

    /// Extends the validity of a listen key (`PUT userDataStream`).
    fn keep_alive_listen_key(&self, key: &ListenKey) -> impl Future<Output = Result<()>> + Send;

    /// Invalidates a listen key (`DELETE userDataStream`).
    fn close_listen_key(&self, key: &ListenKey) -> impl Future<Output = Result<()>> + Send;

    /// Fetches account info and all balances.
    fn fetch_account(&self) -> impl Future<Output = Result<(AccountInfo, Vec<Balance>)>> + Send;

    /// Fetches every open order of the account.
    fn fetch_open_orders(&self) -> impl Future<Output = Result<Vec<Order>>> + Send;

    /// Fetches a single order, open or not.
    fn fetch_order(&self, symbol: &str, order_id: i64)
    -> impl Future<Output = Result<Order>> + Send;

    /// Fetches balances and open orders and merges them into one snapshot.
    fn fetch_account_snapshot(&self) -> impl Future<Output = Result<AccountSnapshot>> + Send {
        async move {
            let (info, balances) = self.fetch_account().await?;
            let orders = self.fetch_open_orders().await?;
            Ok(AccountSnapshot::new(info, balances, orders))
        }
    }
}

/// Error body returned by the exchange on non-2xx responses.
#[derive(Debug, Deserialize)]
struct ApiErrorBody {
    code: i64,
    msg: String,
}

/// REST client bound to one account (credentials + wallet type).
pub struct RestClient {
    http: reqwest::Client,
    base_url: String,
    account_type: AccountType,
    api_key: String,
    api_secret: Zeroizing<String>,
    recv_window_ms: u64,
}

impl RestClient {
    /// Builds a client from configuration.
    ///
    /// Pass a TLS config to replace the built-in root store.
    ///
    /// # Errors
    ///
    /// Returns [`UserStreamError::Tls`] if the HTTP client cannot be built.
    pub fn new(config: &BinanceConfig, tls: Option<Arc<rustls::ClientConfig>>) -> Result<Self> {
        let mut builder = reqwest::Client::builder().timeout(REQUEST_TIMEOUT);
        if let Some(tls) = tls {
            builder = builder.use_preconfigured_tls((*tls).clone());
        }
        let http = builder
            .build()
            .map_err(|e| UserStreamError::Tls(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            http,
            base_url: config.api_url.trim_end_matches('/').to_string(),
            account_type: config.account_type.clone(),
            api_key: config.api_key.clone(),
            api_secret: config.api_secret.clone(),
            recv_window_ms: config.recv_window_ms,
        })
    }

    pub fn account_type(&self) -> &AccountType {
        &self.account_type
    }

    fn url(&self, path: &str) -> String {
        format!("{}{path}", self.base_url)
    }

    fn listen_key_request(&self, method: Method, key: Option<&ListenKey>) -> PreparedRequest {
        let mut request = SignedRequest::new(method, self.url(self.account_type.listen_key_path()));
        if let Some(symbol) = self.account_type.isolated_symbol() {
            request = request.param("symbol", symbol);
        }
        if let Some(key) = key {
            request = request.param("listenKey", key.as_str());
        }
        request.unsigned()
    }

    fn account_request(&self) -> Result<PreparedRequest> {
        let request = match &self.account_type {
            AccountType::Spot => SignedRequest::new(Method::GET, self.url("/api/v3/account")),
            AccountType::Margin => {
                SignedRequest::new(Method::GET, self.url("/sapi/v1/margin/account"))
            }
            AccountType::IsolatedMargin(symbol) => {
                SignedRequest::new(Method::GET, self.url("/sapi/v1/margin/isolated/account"))
                    .param("symbols", symbol.as_str())
            }
        };
        request.signed(&self.api_secret, self.recv_window_ms)
    }

    fn open_orders_request(&self) -> Result<PreparedRequest> {
        let request = match &self.account_type {
            AccountType::Spot => SignedRequest::new(Method::GET, self.url("/api/v3/openOrders")),
            AccountType::Margin => {
                SignedRequest::new(Method::GET, self.url("/sapi/v1/margin/openOrders"))
            }
            AccountType::IsolatedMargin(symbol) => {
                SignedRequest::new(Method::GET, self.url("/sapi/v1/margin/openOrders"))
                    .param("symbol", symbol.as_str())
                    .param("isIsolated", "TRUE")
            }
        };
        request.signed(&self.api_secret, self.recv_window_ms)
    }

    fn order_request(&self, symbol: &str, order_id: i64) -> Result<PreparedRequest> {
        let request = match &self.account_type {
            AccountType::Spot => SignedRequest::new(Method::GET, self.url("/api/v3/order")),
            AccountType::Margin | AccountType::IsolatedMargin(_) => {
                SignedRequest::new(Method::GET, self.url("/sapi/v1/margin/order"))
            }
        }
        .param("symbol", symbol)
        .param("orderId", order_id.to_string());

        let request = match self.account_type {
            AccountType::IsolatedMargin(_) => request.param("isIsolated", "TRUE"),
            _ => request,
        };
        request.signed(&self.api_secret, self.recv_window_ms)
    }

    /// Sends a request and returns the body of a 2xx response.
    async fn send(&self, request: PreparedRequest) -> Result<String> {
        debug!(method = %request.method, "Sending REST request");
        let response = self
            .http
            .request(request.method, &request.url)
            .header(API_KEY_HEADER, &self.api_key)
            .send()
            .await?;

        let status = response.status();
        let body = response.text().await?;
        check_status(status, body)
    }

    async fn execute<T: DeserializeOwned>(&self, request: PreparedRequest) -> Result<T> {
        let body = self.send(request).await?;
        Ok(serde_json::from_str(&body)?)
    }
}

/// Maps a non-2xx response to [`UserStreamError::Upstream`].
fn check_status(status: StatusCode, body: String) -> Result<String> {
    if status.is_success() {
        return Ok(body);
    }

    let (code, msg) = match serde_json::from_str::<ApiErrorBody>(&body) {
        Ok(err) => (Some(err.code), err.msg),
        Err(_) => (None, body),
    };
    warn!(status = status.as_u16(), code = ?code, msg = %msg, "Unexpected REST status");
    Err(UserStreamError::Upstream {
        status: status.as_u16(),
        code,
        msg,
    })
}

impl UserDataApi for RestClient {
    async fn create_listen_key(&self) -> Result<ListenKey> {
        let request = self.listen_key_request(Method::POST, None);
        let key: ListenKey = self.execute(request).await?;
        info!(account = %self.account_type, key = ?key, "Created listen key");
        Ok(key)
    }

    async fn keep_alive_listen_key(&self, key: &ListenKey) -> Result<()> {
        let request = self.listen_key_request(Method::PUT, Some(key));
        self.send(request).await?;
        debug!(account = %self.account_type, "Listen key kept alive");
        Ok(())
    }

    async fn close_listen_key(&self, key: &ListenKey) -> Result<()> {
        let request = self.listen_key_request(Method::DELETE, Some(key));
        self.send(request).await?;
        info!(account = %self.account_type, "Closed listen key");
        Ok(())
    }

    async fn fetch_account(&self) -> Result<(AccountInfo, Vec<Balance>)> {
        // Margin responses have no updateTime; stamp them with the send time.
        let requested_at = current_millis();
        let request = self.account_request()?;
        let parts = match self.account_type {
            AccountType::Spot => self.execute::<SpotAccountResponse>(request).await?.into_parts(),
            AccountType::Margin => self
                .execute::<MarginAccountResponse>(request)
                .await?
                .into_parts(requested_at),
            AccountType::IsolatedMargin(_) => self
                .execute::<IsolatedAccountResponse>(request)
                .await?
                .into_parts(requested_at),
        };
        Ok(parts)
    }

    async fn fetch_open_orders(&self) -> Result<Vec<Order>> {
        let request = self.open_orders_request()?;
        self.execute(request).await
    }

    async fn fetch_order(&self, symbol: &str, order_id: i64) -> Result<Order> {
        let request = self.order_request(symbol, order_id)?;
        self.execute(request).await
    }
}
