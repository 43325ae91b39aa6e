//! Application configuration loaded from environment variables.
//!
//! Credentials **must** be provided via environment variables:
//! - `BINANCE_KEY`: API key sent in the `X-MBX-APIKEY` header
//! - `BINANCE_SECRET`: API secret used to sign private requests
//!
//! Everything else is optional. Endpoints are overridden with
//! `BINANCE_API_URL` / `BINANCE_STREAM_URL`, the wallet with
//! `BINANCE_ACCOUNT_TYPE` (`spot`, `margin`, `isolated:<SYMBOL>`), and the
//! operational timings of the synchronizer with the variables read by
//! [`SyncConfig::from_env`].

use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use zeroize::Zeroizing;

use crate::models::AccountType;
use crate::{Result, UserStreamError};

/// Default REST endpoint.
const DEFAULT_API_URL: &str = "https://api.binance.com";

/// Default user data stream endpoint; the stream lives at `<base>/ws/<listenKey>`.
const DEFAULT_STREAM_URL: &str = "wss://stream.binance.com:9443";

/// Default receive window for signed requests, in milliseconds.
const DEFAULT_RECV_WINDOW_MS: u64 = 5000;

/// Top-level application configuration.
#[derive(Debug)]
pub struct AppConfig {
    pub binance: BinanceConfig,
    pub sync: SyncConfig,
}

/// Binance endpoints and credentials.
pub struct BinanceConfig {
    pub api_url: String,
    pub stream_url: String,
    pub account_type: AccountType,
    pub api_key: String,
    pub api_secret: Zeroizing<String>,
    pub recv_window_ms: u64,
    /// PEM bundle replacing the built-in web PKI roots.
    pub ca_bundle: Option<PathBuf>,
}

impl std::fmt::Debug for BinanceConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BinanceConfig")
            .field("api_url", &self.api_url)
            .field("stream_url", &self.stream_url)
            .field("account_type", &self.account_type)
            .field("api_key", &self.api_key)
            .field("api_secret", &"<redacted>")
            .field("recv_window_ms", &self.recv_window_ms)
            .field("ca_bundle", &self.ca_bundle)
            .finish()
    }
}

/// Timings and sizes of the synchronizer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncConfig {
    /// How often the listen key is refreshed. The key lives 60 minutes.
    pub keepalive_interval: Duration,
    /// Capacity of the frame queue between reader and dispatcher.
    pub queue_capacity: usize,
    /// How long the reader waits for queue space before dropping a frame.
    pub queue_push_timeout: Duration,
    /// Cadence of transport-level pings, `None` to rely on server pings.
    pub ping_interval: Option<Duration>,
    /// Delay before reconnecting after the stream broke.
    pub reconnect_delay: Duration,
    /// Delay before retrying a failed bootstrap.
    pub bootstrap_retry_delay: Duration,
    /// Age after which an unconfirmed order forces a reconnect, `None` disables the watchdog.
    pub order_track_threshold: Option<Duration>,
    /// How often the watchdog looks at the oldest tracked order.
    pub watchdog_interval: Duration,
    /// Retention of completed orders in the archive.
    pub completed_ttl: Duration,
    /// Re-fetch balances over REST after an order fills.
    pub reconcile_on_fill: bool,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            keepalive_interval: Duration::from_secs(30 * 60),
            queue_capacity: 256,
            queue_push_timeout: Duration::from_secs(1),
            ping_interval: None,
            reconnect_delay: Duration::from_secs(5),
            bootstrap_retry_delay: Duration::from_secs(3),
            order_track_threshold: None,
            watchdog_interval: Duration::from_secs(1),
            completed_ttl: Duration::from_secs(10 * 60),
            reconcile_on_fill: false,
        }
    }
}

impl SyncConfig {
    /// Reads the `BINANCE_*` timing variables, falling back to defaults.
    ///
    /// # Errors
    ///
    /// Returns [`UserStreamError::Config`] if a variable is set to a value
    /// that does not parse.
    pub fn from_env() -> Result<Self> {
        let defaults = Self::default();
        let queue_capacity = parsed_var("BINANCE_QUEUE_CAPACITY")?.unwrap_or(defaults.queue_capacity);
        if queue_capacity == 0 {
            return Err(UserStreamError::Config(
                "BINANCE_QUEUE_CAPACITY must be at least 1".to_string(),
            ));
        }

        Ok(Self {
            keepalive_interval: secs_var("BINANCE_KEEPALIVE_SECS")?
                .unwrap_or(defaults.keepalive_interval),
            queue_capacity,
            queue_push_timeout: millis_var("BINANCE_QUEUE_PUSH_TIMEOUT_MS")?
                .unwrap_or(defaults.queue_push_timeout),
            ping_interval: secs_var("BINANCE_PING_SECS")?.filter(|d| !d.is_zero()),
            reconnect_delay: secs_var("BINANCE_RECONNECT_DELAY_SECS")?
                .unwrap_or(defaults.reconnect_delay),
            bootstrap_retry_delay: secs_var("BINANCE_BOOTSTRAP_RETRY_SECS")?
                .unwrap_or(defaults.bootstrap_retry_delay),
            order_track_threshold: millis_var("BINANCE_ORDER_TRACK_MS")?.filter(|d| !d.is_zero()),
            watchdog_interval: millis_var("BINANCE_WATCHDOG_INTERVAL_MS")?
                .unwrap_or(defaults.watchdog_interval),
            completed_ttl: secs_var("BINANCE_COMPLETED_TTL_SECS")?
                .unwrap_or(defaults.completed_ttl),
            reconcile_on_fill: parsed_var("BINANCE_RECONCILE_ON_FILL")?
                .unwrap_or(defaults.reconcile_on_fill),
        })
    }
}

/// Loads the application configuration from environment variables.
///
/// # Errors
///
/// Returns [`UserStreamError::Config`] if a credential is missing or any
/// optional variable has an invalid value.
pub fn fetch_config() -> Result<AppConfig> {
    let api_key = non_empty_var("BINANCE_KEY");
    let api_secret = non_empty_var("BINANCE_SECRET").map(Zeroizing::new);

    let (api_key, api_secret) = match (api_key, api_secret) {
        (Some(key), Some(secret)) => (key, secret),
        (Some(_), None) => {
            return Err(UserStreamError::Config(
                "BINANCE_KEY is set but BINANCE_SECRET is missing".to_string(),
            ));
        }
        (None, Some(_)) => {
            return Err(UserStreamError::Config(
                "BINANCE_SECRET is set but BINANCE_KEY is missing".to_string(),
            ));
        }
        (None, None) => {
            return Err(UserStreamError::Config(
                "BINANCE_KEY and BINANCE_SECRET are required".to_string(),
            ));
        }
    };

    let account_type = match non_empty_var("BINANCE_ACCOUNT_TYPE") {
        Some(value) => value.parse()?,
        None => AccountType::Spot,
    };

    Ok(AppConfig {
        binance: BinanceConfig {
            api_url: non_empty_var("BINANCE_API_URL")
                .unwrap_or_else(|| DEFAULT_API_URL.to_string()),
            stream_url: non_empty_var("BINANCE_STREAM_URL")
                .unwrap_or_else(|| DEFAULT_STREAM_URL.to_string()),
            account_type,
            api_key,
            api_secret,
            recv_window_ms: parsed_var("BINANCE_RECV_WINDOW_MS")?
                .unwrap_or(DEFAULT_RECV_WINDOW_MS),
            ca_bundle: non_empty_var("BINANCE_CA_BUNDLE").map(PathBuf::from),
        },
        sync: SyncConfig::from_env()?,
    })
}

/// Returns the value of an environment variable if it exists and is non-empty.
fn non_empty_var(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|s| !s.is_empty())
}

fn parsed_var<T>(name: &str) -> Result<Option<T>>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    non_empty_var(name)
        .map(|raw| {
            raw.trim()
                .parse()
                .map_err(|e| UserStreamError::Config(format!("invalid {name}={raw:?}: {e}")))
        })
        .transpose()
}

fn secs_var(name: &str) -> Result<Option<Duration>> {
    Ok(parsed_var::<u64>(name)?.map(Duration::from_secs))
}

fn millis_var(name: &str) -> Result<Option<Duration>> {
    Ok(parsed_var::<u64>(name)?.map(Duration::from_millis))
}
