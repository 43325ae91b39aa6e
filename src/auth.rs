//! Signed request construction for the Binance REST API.
//!
//! Private endpoints take a `timestamp` and `recvWindow` parameter and a
//! `signature` computed over the URL-encoded parameter string:
//!
//! `signature = hex(HMAC-SHA256(secret, query))`
//!
//! Listen-key endpoints only need the `X-MBX-APIKEY` header and are sent
//! unsigned.

use std::time::{SystemTime, UNIX_EPOCH};

use hmac::{Hmac, Mac};
use reqwest::Method;
use sha2::Sha256;

use crate::Result;

/// Header carrying the API key on every authenticated call.
pub const API_KEY_HEADER: &str = "X-MBX-APIKEY";

/// Builder for a REST request with ordered query parameters.
#[derive(Debug, Clone)]
pub struct SignedRequest {
    method: Method,
    url: String,
    params: Vec<(String, String)>,
}

/// A request ready to be sent: method and URL including the query string.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PreparedRequest {
    pub method: Method,
    pub url: String,
}

impl SignedRequest {
    pub fn new(method: Method, url: impl Into<String>) -> Self {
        Self {
            method,
            url: url.into(),
            params: Vec::new(),
        }
    }

    /// Adds a query parameter, replacing an earlier one with the same name.
    #[must_use]
    pub fn param(mut self, key: &str, value: impl Into<String>) -> Self {
        let value = value.into();
        match self.params.iter_mut().find(|(k, _)| k == key) {
            Some(entry) => entry.1 = value,
            None => self.params.push((key.to_string(), value)),
        }
        self
    }

    /// Finishes the request without a signature.
    pub fn unsigned(self) -> PreparedRequest {
        let query = self.encoded_params();
        PreparedRequest {
            url: join_query(self.url, &query),
            method: self.method,
        }
    }

    /// Appends `timestamp`, `recvWindow` and `signature` using the current time.
    ///
    /// # Errors
    ///
    /// Returns [`UserStreamError::Config`](crate::UserStreamError::Config)
    /// if the secret cannot be used as an HMAC key.
    pub fn signed(self, secret: &str, recv_window_ms: u64) -> Result<PreparedRequest> {
        self.signed_at(secret, recv_window_ms, current_millis())
    }

    /// Same as [`signed`](Self::signed) with an explicit timestamp.
    pub fn signed_at(
        self,
        secret: &str,
        recv_window_ms: u64,
        timestamp_ms: u64,
    ) -> Result<PreparedRequest> {
        let request = self
            .param("timestamp", timestamp_ms.to_string())
            .param("recvWindow", recv_window_ms.to_string());
        let query = request.encoded_params();
        let signature = sign(secret, &query)?;
        let query = format!("{query}&signature={signature}");

        Ok(PreparedRequest {
            url: join_query(request.url, &query),
            method: request.method,
        })
    }

    fn encoded_params(&self) -> String {
        self.params
            .iter()
            .map(|(k, v)| format!("{}={}", urlencoding::encode(k), urlencoding::encode(v)))
            .collect::<Vec<_>>()
            .join("&")
    }
}

fn join_query(url: String, query: &str) -> String {
    if query.is_empty() {
        url
    } else {
        format!("{url}?{query}")
    }
}

/// Computes the hex-encoded HMAC-SHA256 of `payload` keyed by `secret`.
pub fn sign(secret: &str, payload: &str) -> Result<String> {
    let mut mac = Hmac::<Sha256>::new_from_slice(secret.as_bytes())
        .map_err(|e| crate::UserStreamError::Config(format!("invalid HMAC key: {e}")))?;
    mac.update(payload.as_bytes());
    Ok(hex::encode(mac.finalize().into_bytes()))
}

/// Milliseconds since the UNIX epoch, as expected by the `timestamp` parameter.
pub fn current_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or_default()
}
