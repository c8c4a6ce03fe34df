//! Relay manager: registry, subscription/publish fan-out and the connection
//! monitor.
//!
//! The registry (url -> [`Relay`]) is the single shared resource. One
//! `tokio::sync::Mutex` covers every read and write of it — add, remove,
//! subscribe, unsubscribe, publish fan-out and the monitor sweep — including
//! the transport connect/reconnect calls made while holding it. A slow
//! connect on one relay therefore stalls the other operations for its
//! duration; the monitor's poll cadence and the record-then-send ordering
//! both rely on this serialization.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::error::{PolicyError, Result, ValidationError};
use crate::event::Event;
use crate::message::{ClientMessage, Filters};
use crate::pool::MessagePool;
use crate::relay::{NoopLifecycle, Relay, RelayLifecycle, RelayPolicy};
use crate::transport::{RelayOptions, Transport};

/// Manager configuration.
#[derive(Debug, Clone)]
pub struct ManagerConfig {
    /// How often the connection monitor sweeps the registry.
    pub monitor_interval: Duration,
}

impl Default for ManagerConfig {
    fn default() -> Self {
        Self {
            monitor_interval: Duration::from_secs(5),
        }
    }
}

/// Client-side orchestration over any number of relays: registry, policy
/// checks, subscription and publish fan-out, and background connection
/// repair.
///
/// Must be created inside a tokio runtime; construction spawns the
/// connection monitor task.
pub struct RelayManager {
    relays: Arc<Mutex<HashMap<String, Relay>>>,
    pool: MessagePool,
    lifecycle: Arc<dyn RelayLifecycle>,
    shutdown: CancellationToken,
}

impl RelayManager {
    /// Create a manager with default configuration and no lifecycle hooks.
    pub fn new() -> Self {
        Self::with_config(ManagerConfig::default())
    }

    /// Create a manager with a custom configuration.
    pub fn with_config(config: ManagerConfig) -> Self {
        Self::with_lifecycle(config, Arc::new(NoopLifecycle))
    }

    /// Create a manager with lifecycle hooks invoked on every relay
    /// connection open/close.
    pub fn with_lifecycle(config: ManagerConfig, lifecycle: Arc<dyn RelayLifecycle>) -> Self {
        let manager = Self {
            relays: Arc::new(Mutex::new(HashMap::new())),
            pool: MessagePool::new(),
            lifecycle,
            shutdown: CancellationToken::new(),
        };
        manager.spawn_monitor(config.monitor_interval);
        manager
    }

    /// The pool collecting inbound messages from every relay.
    pub fn message_pool(&self) -> &MessagePool {
        &self.pool
    }

    /// Register a relay with the default read+write policy and transport
    /// options, then connect it.
    pub async fn add_relay(&self, url: &str) -> Result<()> {
        self.add_relay_with_policy(url, RelayPolicy::default(), RelayOptions::default())
            .await
    }

    /// Register a relay with an explicit policy and transport options, then
    /// connect it. An existing entry under the same url is closed before it
    /// is replaced. The connect attempt runs synchronously under the
    /// registry lock; a failure is logged and left to the monitor to repair.
    pub async fn add_relay_with_policy(
        &self,
        url: &str,
        policy: RelayPolicy,
        options: RelayOptions,
    ) -> Result<()> {
        let relay = Relay::new(
            url,
            policy,
            options,
            self.pool.sink(),
            Arc::clone(&self.lifecycle),
        )?;
        self.register(url, relay).await;
        Ok(())
    }

    /// Register a relay over an injected transport. Intended for custom
    /// transports and tests; behaves exactly like
    /// [`add_relay_with_policy`](Self::add_relay_with_policy).
    pub async fn add_relay_with_transport(
        &self,
        url: &str,
        policy: RelayPolicy,
        transport: Box<dyn Transport>,
    ) -> Result<()> {
        let relay = Relay::with_transport(url, policy, transport, Arc::clone(&self.lifecycle));
        self.register(url, relay).await;
        Ok(())
    }

    async fn register(&self, url: &str, mut relay: Relay) {
        info!(url, "adding relay");
        let mut relays = self.relays.lock().await;
        if let Some(mut prior) = relays.remove(url) {
            debug!(url, "closing replaced relay entry");
            prior.close().await;
        }
        if let Err(e) = relay.connect().await {
            warn!(url, error = %e, "initial connect failed; monitor will retry");
        }
        relays.insert(url.to_string(), relay);
    }

    /// Close and drop a relay entry; no-op when the url is not registered.
    pub async fn remove_relay(&self, url: &str) {
        let mut relays = self.relays.lock().await;
        if let Some(mut relay) = relays.remove(url) {
            info!(url, "removing relay");
            relay.close().await;
        }
    }

    /// Open a subscription on one relay: record it, then send the REQ, both
    /// under the same critical section.
    ///
    /// Fails with [`PolicyError::UnknownRelay`] for an unregistered url and
    /// [`PolicyError::ReadDenied`] when the relay's policy forbids reading.
    /// A transport-level send failure is not surfaced; the subscription is
    /// recorded and replayed when the monitor reconnects the relay.
    pub async fn subscribe(&self, url: &str, id: &str, filters: Filters) -> Result<()> {
        let mut relays = self.relays.lock().await;
        let relay = relays
            .get_mut(url)
            .ok_or_else(|| PolicyError::UnknownRelay(url.to_string()))?;
        if !relay.policy().should_read {
            return Err(PolicyError::ReadDenied(url.to_string()).into());
        }

        relay.add_subscription(id, filters.clone());
        let request = ClientMessage::req(id, filters);
        if let Err(e) = relay.send(&request).await {
            warn!(url, subscription = id, error = %e, "failed to send REQ");
        }
        Ok(())
    }

    /// Open a subscription on every readable relay. Relays whose policy
    /// forbids reading are silently skipped.
    pub async fn subscribe_all(&self, id: &str, filters: Filters) {
        let mut relays = self.relays.lock().await;
        for relay in relays.values_mut() {
            if !relay.policy().should_read {
                continue;
            }
            relay.add_subscription(id, filters.clone());
            let request = ClientMessage::req(id, filters.clone());
            if let Err(e) = relay.send(&request).await {
                warn!(url = %relay.url(), subscription = id, error = %e, "failed to send REQ");
            }
        }
    }

    /// Close a subscription on one relay: remove the record and send CLOSE,
    /// regardless of the relay's read policy.
    ///
    /// Fails with [`PolicyError::UnknownRelay`] for an unregistered url.
    pub async fn unsubscribe(&self, url: &str, id: &str) -> Result<()> {
        let mut relays = self.relays.lock().await;
        let relay = relays
            .get_mut(url)
            .ok_or_else(|| PolicyError::UnknownRelay(url.to_string()))?;

        relay.remove_subscription(id);
        if let Err(e) = relay.send(&ClientMessage::close(id)).await {
            warn!(url, subscription = id, error = %e, "failed to send CLOSE");
        }
        Ok(())
    }

    /// Close a subscription on every relay unconditionally.
    pub async fn unsubscribe_all(&self, id: &str) {
        let mut relays = self.relays.lock().await;
        for relay in relays.values_mut() {
            relay.remove_subscription(id);
            if let Err(e) = relay.send(&ClientMessage::close(id)).await {
                warn!(url = %relay.url(), subscription = id, error = %e, "failed to send CLOSE");
            }
        }
    }

    /// Validate a signed event and fan it out to every relay whose policy
    /// allows writing.
    ///
    /// Fails with [`ValidationError::Unsigned`] or
    /// [`ValidationError::BadSignature`] before anything is sent. Delivery
    /// itself is fire-and-forget: one relay's send failure neither aborts
    /// the fan-out nor reaches the caller.
    pub async fn publish(&self, event: &Event) -> Result<()> {
        if !event.is_signed() {
            return Err(ValidationError::Unsigned(event.id.clone()).into());
        }
        if !event.verify() {
            return Err(ValidationError::BadSignature(event.id.clone()).into());
        }

        let message = ClientMessage::Event(event.clone());
        let mut relays = self.relays.lock().await;
        for relay in relays.values_mut() {
            if !relay.policy().should_write {
                continue;
            }
            if let Err(e) = relay.send(&message).await {
                warn!(url = %relay.url(), event = %event.id, error = %e, "failed to send EVENT");
            }
        }
        Ok(())
    }

    /// Close every relay's transport. Entries stay registered, marked closed
    /// so the monitor does not resurrect them; `remove_relay` frees an entry,
    /// re-adding reopens it.
    pub async fn close_all_connections(&self) {
        let mut relays = self.relays.lock().await;
        for relay in relays.values_mut() {
            relay.close().await;
        }
    }

    /// Urls of all registered relays.
    pub async fn relay_urls(&self) -> Vec<String> {
        self.relays.lock().await.keys().cloned().collect()
    }

    /// Whether a registered relay currently reports a live connection.
    /// `false` for unknown urls.
    pub async fn is_connected(&self, url: &str) -> bool {
        self.relays
            .lock()
            .await
            .get(url)
            .is_some_and(|r| r.is_connected())
    }

    /// Number of relays currently connected.
    pub async fn connected_count(&self) -> usize {
        self.relays
            .lock()
            .await
            .values()
            .filter(|r| r.is_connected())
            .count()
    }

    /// Ids of the subscriptions recorded on one relay.
    ///
    /// Fails with [`PolicyError::UnknownRelay`] for an unregistered url.
    pub async fn subscription_ids(&self, url: &str) -> Result<Vec<String>> {
        let relays = self.relays.lock().await;
        let relay = relays
            .get(url)
            .ok_or_else(|| PolicyError::UnknownRelay(url.to_string()))?;
        Ok(relay.subscription_ids())
    }

    /// Stop the connection monitor and close every relay. Terminal: the
    /// monitor is never restarted.
    pub async fn shutdown(&self) {
        self.shutdown.cancel();
        self.close_all_connections().await;
        info!("relay manager shut down");
    }

    fn spawn_monitor(&self, period: Duration) {
        let relays = Arc::clone(&self.relays);
        let token = self.shutdown.clone();

        tokio::spawn(async move {
            let start = tokio::time::Instant::now() + period;
            let mut ticker = tokio::time::interval_at(start, period);
            loop {
                tokio::select! {
                    _ = token.cancelled() => break,
                    _ = ticker.tick() => {
                        let mut relays = relays.lock().await;
                        for relay in relays.values_mut() {
                            if relay.is_closed() || relay.is_connected() {
                                continue;
                            }
                            relay.observe_disconnect();
                            debug!(url = %relay.url(), "relay disconnected, reconnecting");
                            if let Err(e) = relay.reconnect().await {
                                warn!(url = %relay.url(), error = %e, "reconnect failed");
                            }
                        }
                    }
                }
            }
            debug!("connection monitor stopped");
        });
    }
}

impl Default for RelayManager {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for RelayManager {
    fn drop(&mut self) {
        self.shutdown.cancel();
    }
}
