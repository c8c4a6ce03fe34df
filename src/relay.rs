//! Relay handle: one registered relay endpoint with its policy, subscription
//! set and transport.
//!
//! A `Relay` is owned exclusively by the manager's registry; all methods are
//! called under the registry lock, so the handle itself carries no locking.

use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, info, warn};
use url::Url;

use crate::error::TransportError;
use crate::message::{ClientMessage, Filters};
use crate::pool::PoolSink;
use crate::subscription::Subscription;
use crate::transport::{RelayOptions, Transport, WsTransport};

/// Per-relay permission flags, fixed for the lifetime of the registry entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RelayPolicy {
    /// Whether the manager may subscribe to this relay
    pub should_read: bool,
    /// Whether the manager may publish to this relay
    pub should_write: bool,
}

impl Default for RelayPolicy {
    fn default() -> Self {
        Self {
            should_read: true,
            should_write: true,
        }
    }
}

impl RelayPolicy {
    /// Read-only policy.
    pub fn read_only() -> Self {
        Self {
            should_read: true,
            should_write: false,
        }
    }

    /// Write-only policy.
    pub fn write_only() -> Self {
        Self {
            should_read: false,
            should_write: true,
        }
    }
}

/// Hooks invoked when a relay connection opens or closes. The default
/// methods are no-ops, so implementors override only what they need.
pub trait RelayLifecycle: Send + Sync {
    /// Called after a relay connection is established.
    fn on_open(&self, _url: &str) {}
    /// Called after a relay connection is closed.
    fn on_close(&self, _url: &str) {}
}

/// Lifecycle used when no hooks are injected.
#[derive(Debug, Default)]
pub struct NoopLifecycle;

impl RelayLifecycle for NoopLifecycle {}

/// One registered relay: endpoint, policy, active subscriptions and the
/// transport used to reach it.
pub struct Relay {
    url: String,
    policy: RelayPolicy,
    subscriptions: HashMap<String, Subscription>,
    transport: Box<dyn Transport>,
    lifecycle: Arc<dyn RelayLifecycle>,
    closed: bool,
    // Whether on_open has been delivered without a matching on_close yet.
    announced_open: bool,
}

impl Relay {
    /// Build a relay over a WebSocket transport. Does not connect.
    pub(crate) fn new(
        url: &str,
        policy: RelayPolicy,
        options: RelayOptions,
        sink: PoolSink,
        lifecycle: Arc<dyn RelayLifecycle>,
    ) -> Result<Self, TransportError> {
        let parsed = Url::parse(url)?;
        if parsed.scheme() != "ws" && parsed.scheme() != "wss" {
            return Err(TransportError::InvalidUrl(format!(
                "URL must use ws:// or wss:// scheme, got: {}",
                parsed.scheme()
            )));
        }
        let transport = Box::new(WsTransport::new(parsed, options, sink));
        Ok(Self::with_transport(url, policy, transport, lifecycle))
    }

    /// Build a relay over an injected transport (custom transports, tests).
    pub(crate) fn with_transport(
        url: &str,
        policy: RelayPolicy,
        transport: Box<dyn Transport>,
        lifecycle: Arc<dyn RelayLifecycle>,
    ) -> Self {
        Self {
            url: url.to_string(),
            policy,
            subscriptions: HashMap::new(),
            transport,
            lifecycle,
            closed: false,
            announced_open: false,
        }
    }

    /// Relay endpoint url.
    pub fn url(&self) -> &str {
        &self.url
    }

    /// Relay permission flags.
    pub fn policy(&self) -> RelayPolicy {
        self.policy
    }

    /// Whether the relay was explicitly closed (and should not be repaired).
    pub fn is_closed(&self) -> bool {
        self.closed
    }

    /// Whether the transport currently reports a live connection.
    pub fn is_connected(&self) -> bool {
        self.transport.is_connected()
    }

    /// First-time connect.
    pub async fn connect(&mut self) -> Result<(), TransportError> {
        self.closed = false;
        self.transport.connect().await?;
        info!(url = %self.url, "connected to relay");
        self.announced_open = true;
        self.lifecycle.on_open(&self.url);
        Ok(())
    }

    /// Retry connect after a detected drop. Re-issues a REQ for every
    /// subscription recorded on this relay so the stream resumes where the
    /// caller left it.
    pub async fn reconnect(&mut self) -> Result<(), TransportError> {
        self.transport.connect().await?;
        info!(url = %self.url, "reconnected to relay");
        self.announced_open = true;
        self.lifecycle.on_open(&self.url);

        let requests: Vec<ClientMessage> = self
            .subscriptions
            .values()
            .map(|sub| ClientMessage::req(sub.id.clone(), sub.filters.clone()))
            .collect();
        for request in requests {
            if let Err(e) = self.send(&request).await {
                warn!(url = %self.url, error = %e, "failed to resubscribe after reconnect");
            }
        }
        Ok(())
    }

    /// Close the transport and mark the relay as intentionally closed.
    /// Delivers `on_close` if an `on_open` is still unmatched, even when the
    /// remote end already dropped the connection.
    pub async fn close(&mut self) {
        self.transport.close().await;
        self.closed = true;
        if self.announced_open {
            self.announced_open = false;
            info!(url = %self.url, "disconnected from relay");
            self.lifecycle.on_close(&self.url);
        }
    }

    /// Record that the transport was found dead without an explicit close
    /// (remote drop, failed write). Delivers `on_close` once per open
    /// connection; subsequent calls are no-ops until the next connect.
    pub fn observe_disconnect(&mut self) {
        if self.announced_open {
            self.announced_open = false;
            info!(url = %self.url, "relay connection dropped");
            self.lifecycle.on_close(&self.url);
        }
    }

    /// Encode and send one client message. Failures mean the message is lost;
    /// the caller decides whether that is an error or fire-and-forget.
    pub async fn send(&mut self, message: &ClientMessage) -> Result<(), TransportError> {
        let text = message.to_json()?;
        debug!(url = %self.url, message = %text, "sending");
        self.transport.send(text).await
    }

    /// Record a subscription on this relay.
    pub fn add_subscription(&mut self, id: impl Into<String>, filters: Filters) {
        let sub = Subscription::new(id, filters);
        self.subscriptions.insert(sub.id.clone(), sub);
    }

    /// Remove a subscription record; no-op if absent.
    pub fn remove_subscription(&mut self, id: &str) {
        self.subscriptions.remove(id);
    }

    /// Ids of subscriptions recorded on this relay.
    pub fn subscription_ids(&self) -> Vec<String> {
        self.subscriptions.keys().cloned().collect()
    }

    /// Number of subscriptions recorded on this relay.
    pub fn subscription_count(&self) -> usize {
        self.subscriptions.len()
    }
}
