//! Publisher configuration and URL normalization.
//!
//! The config is plain serde so it can live in a TOML file next to the rest
//! of an application's settings:
//!
//! ```toml
//! url = "https://publisher.example.com/"
//! authorization = "s3cret"
//! min_backoff = 500
//! max_backoff = 60000
//! ```

use std::time::Duration;

use serde::{Deserialize, Serialize};
use url::Url;

use crate::types::PublisherError;

pub const DEFAULT_MIN_BACKOFF_MS: i64 = 500;
pub const DEFAULT_MAX_BACKOFF_MS: i64 = 60_000;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PublisherConfig {
    /// Base URL of the Publisher service.  Required.
    pub url: String,
    /// Credential sent as a `Bearer` header, or in-band when the transport
    /// could not send the header.
    pub authorization: Option<String>,
    /// Milliseconds.  Defaults to 500, never below 1 while retries are on.
    pub min_backoff: Option<i64>,
    /// Milliseconds.  Defaults to 60000; `0` disables reconnection.
    pub max_backoff: Option<i64>,
    /// Log every frame sent and received at `debug`.
    pub debug_wire: bool,
}

impl PublisherConfig {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            ..Default::default()
        }
    }

    /// Effective `(min, max)` reconnect delays after defaults and clamping.
    pub fn backoff_bounds(&self) -> (Duration, Duration) {
        let max = self.max_backoff.unwrap_or(DEFAULT_MAX_BACKOFF_MS).max(0);
        let min = if max == 0 {
            0
        } else {
            self.min_backoff.map_or(DEFAULT_MIN_BACKOFF_MS, |m| m.max(1))
        };
        (
            Duration::from_millis(min as u64),
            Duration::from_millis(max as u64),
        )
    }

    /// The normalized service URL (see [`normalize_url`]).
    pub fn service_url(&self) -> Result<Url, PublisherError> {
        normalize_url(&self.url)
    }
}

/// Parse a service URL, dropping query and fragment and making sure the
/// path ends in `/`.
pub fn normalize_url(raw: &str) -> Result<Url, PublisherError> {
    if raw.trim().is_empty() {
        return Err(PublisherError::Config("url is required".into()));
    }
    let mut url =
        Url::parse(raw).map_err(|e| PublisherError::Config(format!("invalid url {raw:?}: {e}")))?;
    if !matches!(url.scheme(), "http" | "https" | "ws" | "wss") {
        return Err(PublisherError::Config(format!(
            "unsupported url scheme {:?}",
            url.scheme()
        )));
    }
    if url.host_str().is_none() {
        return Err(PublisherError::Config(format!("url {raw:?} has no host")));
    }
    url.set_query(None);
    url.set_fragment(None);
    if !url.path().ends_with('/') {
        let path = format!("{}/", url.path());
        url.set_path(&path);
    }
    Ok(url)
}

/// The WebSocket endpoint for a normalized service URL: `ws` (or `wss` for
/// secure schemes) on the same host, at `<path>ws`.
pub fn websocket_endpoint(service: &Url) -> Result<Url, PublisherError> {
    let mut endpoint = service.clone();
    let scheme = match service.scheme() {
        "https" | "wss" => "wss",
        _ => "ws",
    };
    endpoint
        .set_scheme(scheme)
        .map_err(|()| PublisherError::Config(format!("cannot use {scheme} for {service}")))?;
    // Credentials embedded in the URL never go to the socket.
    let _ = endpoint.set_username("");
    let _ = endpoint.set_password(None);
    endpoint.set_query(None);
    endpoint.set_fragment(None);

    let base = match service.path().rfind('/') {
        Some(idx) => &service.path()[..=idx],
        None => "/",
    };
    endpoint.set_path(&format!("{base}ws"));
    Ok(endpoint)
}
