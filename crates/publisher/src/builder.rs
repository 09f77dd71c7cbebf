//! Builder pattern for constructing a [`Publisher`].

use std::sync::Arc;
use std::time::Duration;

use bfo_cbor::Value;
use tokio::sync::mpsc;

use crate::backoff::Backoff;
use crate::config::{normalize_url, websocket_endpoint, PublisherConfig};
use crate::publisher::Publisher;
use crate::request::CallbackHook;
use crate::session::{Session, SessionOptions, Shared};
use crate::transport::{ConnectTarget, Connector, WebSocketConnector};
use crate::types::PublisherError;

/// Fluent builder for [`Publisher`].
///
/// # Example
///
/// ```rust,no_run
/// # use bfo_publisher::PublisherBuilder;
/// # async fn demo() -> Result<(), bfo_publisher::PublisherError> {
/// let publisher = PublisherBuilder::new()
///     .url("https://bfo.example.com/publisher/")
///     .authorization("s3cret")
///     .max_backoff(std::time::Duration::from_secs(30))
///     .build()?;
/// publisher.connect();
/// publisher.wait_connected().await?;
/// # Ok(())
/// # }
/// ```
pub struct PublisherBuilder {
    config: PublisherConfig,
    callback: Option<CallbackHook>,
    connector: Option<Arc<dyn Connector>>,
}

impl PublisherBuilder {
    pub fn new() -> Self {
        Self::from_config(PublisherConfig::default())
    }

    pub fn from_config(config: PublisherConfig) -> Self {
        Self {
            config,
            callback: None,
            connector: None,
        }
    }

    /// Service URL (e.g. `https://bfo.example.com/publisher/`).  Required.
    pub fn url(mut self, url: impl Into<String>) -> Self {
        self.config.url = url.into();
        self
    }

    pub fn authorization(mut self, token: impl Into<String>) -> Self {
        self.config.authorization = Some(token.into());
        self
    }

    /// Delay before the first reconnect (default 500ms).
    pub fn min_backoff(mut self, d: Duration) -> Self {
        self.config.min_backoff = Some(millis(d));
        self
    }

    /// Reconnect delay cap (default 60s).  Zero disables reconnection.
    pub fn max_backoff(mut self, d: Duration) -> Self {
        self.config.max_backoff = Some(millis(d));
        self
    }

    pub fn debug_wire(mut self, on: bool) -> Self {
        self.config.debug_wire = on;
        self
    }

    /// Answer server `callback` messages.
    pub fn callback<F>(mut self, hook: F) -> Self
    where
        F: Fn(&Value) -> Option<Value> + Send + Sync + 'static,
    {
        self.callback = Some(Arc::new(hook));
        self
    }

    /// Replace the WebSocket connector.
    pub fn connector(mut self, connector: impl Connector) -> Self {
        self.connector = Some(Arc::new(connector));
        self
    }

    /// Validate the config and spawn the session task on the current Tokio
    /// runtime.
    pub fn build(self) -> Result<Publisher, PublisherError> {
        let url = normalize_url(&self.config.url)?;
        let endpoint = websocket_endpoint(&url)?;
        let runtime = tokio::runtime::Handle::try_current()
            .map_err(|_| PublisherError::Config("a Tokio runtime is required".into()))?;

        let options = SessionOptions {
            target: ConnectTarget {
                endpoint: endpoint.clone(),
                authorization: self.config.authorization.clone(),
            },
            connector: self
                .connector
                .unwrap_or_else(|| Arc::new(WebSocketConnector) as Arc<dyn Connector>),
            backoff: Backoff::from_config(&self.config),
            debug_wire: self.config.debug_wire,
        };

        let shared = Arc::new(Shared::new());
        let (commands_tx, commands_rx) = mpsc::unbounded_channel();
        let session = Session::new(options, Arc::clone(&shared), commands_rx);
        runtime.spawn(session.run());

        tracing::debug!(url = %url, endpoint = %endpoint, "publisher session spawned");
        Ok(Publisher::from_parts(
            url,
            endpoint,
            self.callback,
            commands_tx,
            shared,
        ))
    }
}

impl Default for PublisherBuilder {
    fn default() -> Self {
        Self::new()
    }
}

fn millis(d: Duration) -> i64 {
    i64::try_from(d.as_millis()).unwrap_or(i64::MAX)
}
