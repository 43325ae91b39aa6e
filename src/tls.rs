//! TLS configuration with an optional custom root store.
//!
//! By default both the REST client and the WebSocket connector use the
//! built-in web PKI roots. When a PEM bundle is configured,
//! [`build_tls_config`] builds a [`rustls::ClientConfig`] that trusts only
//! the certificates in that bundle (corporate proxies, pinned roots).

use std::path::Path;
use std::sync::Arc;

use rustls::ClientConfig;

use crate::Result;

/// Builds a [`ClientConfig`] from a PEM bundle, or `None` for the defaults.
///
/// # Errors
///
/// Returns [`UserStreamError::Tls`](crate::UserStreamError::Tls) if the
/// bundle cannot be read, parsed, or contains no certificate.
pub fn build_tls_config(ca_bundle: Option<&Path>) -> Result<Option<Arc<ClientConfig>>> {
    let Some(path) = ca_bundle else {
        return Ok(None);
    };

    let pem = std::fs::read(path).map_err(|e| {
        crate::UserStreamError::Tls(format!("failed to read {}: {e}", path.display()))
    })?;

    let certs: Vec<_> = rustls_pemfile::certs(&mut pem.as_slice())
        .collect::<std::result::Result<Vec<_>, _>>()
        .map_err(|e| crate::UserStreamError::Tls(format!("failed to parse CA PEM: {e}")))?;

    if certs.is_empty() {
        return Err(crate::UserStreamError::Tls(format!(
            "no certificates found in {}",
            path.display()
        )));
    }

    let mut root_store = rustls::RootCertStore::empty();
    let (added, ignored) = root_store.add_parsable_certificates(certs);
    if added == 0 {
        return Err(crate::UserStreamError::Tls(format!(
            "none of the {ignored} certificates in {} could be used",
            path.display()
        )));
    }

    let config = ClientConfig::builder()
        .with_root_certificates(root_store)
        .with_no_client_auth();

    Ok(Some(Arc::new(config)))
}
