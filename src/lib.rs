//! Client-side relay orchestration for Nostr.
//!
//! This crate provides:
//! - A [`RelayManager`] holding any number of relay connections, each with
//!   its own read/write [`RelayPolicy`]
//! - Subscription fan-out ([`RelayManager::subscribe_all`]) and signed-event
//!   broadcast ([`RelayManager::publish`]) over the registered relays
//! - A background connection monitor that repairs dropped relays and replays
//!   their subscriptions
//! - A [`MessagePool`] aggregating inbound relay traffic for the application
//!
//! # Example
//!
//! ```rust,no_run
//! use nostr_relay_manager::{Filter, RelayManager, RelayMessage};
//!
//! #[tokio::main]
//! async fn main() {
//!     let manager = RelayManager::new();
//!
//!     manager.add_relay("wss://relay.damus.io").await.unwrap();
//!     manager.add_relay("wss://nos.lol").await.unwrap();
//!
//!     // Subscribe to kind 1 (text notes) on every readable relay
//!     let filter = Filter::new().kinds(vec![1]).limit(10);
//!     manager.subscribe_all("notes", vec![filter]).await;
//!
//!     // Drain inbound traffic
//!     loop {
//!         let msg = manager.message_pool().recv().await;
//!         if let RelayMessage::Event { event, .. } = msg.message {
//!             println!("{}: {}", msg.relay_url, event.content);
//!         }
//!     }
//! }
//! ```

mod error;
mod event;
mod manager;
mod message;
mod pool;
mod relay;
mod subscription;
mod transport;

pub use error::{ManagerError, PolicyError, Result, TransportError, ValidationError};
pub use event::{Event, EventError, EventTemplate};
pub use manager::{ManagerConfig, RelayManager};
pub use message::{ClientMessage, Filter, Filters, MessageError, RelayMessage};
pub use pool::{MessagePool, PoolMessage, PoolSink};
pub use relay::{NoopLifecycle, Relay, RelayLifecycle, RelayPolicy};
pub use subscription::{Subscription, generate_subscription_id};
pub use transport::{ProxyConfig, RelayOptions, Transport, WsTransport};
