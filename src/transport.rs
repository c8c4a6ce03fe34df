//! WebSocket transport for a single relay connection.
//!
//! The manager core only sees the [`Transport`] trait; [`WsTransport`] is the
//! production implementation. It owns the write half of the socket and spawns
//! a background read loop that parses inbound frames into [`RelayMessage`]s
//! and delivers them to the shared message pool.

use async_trait::async_trait;
use futures::stream::{SplitSink, SplitStream};
use futures::{SinkExt, StreamExt};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::task::JoinHandle;
use tokio::time::timeout;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, client_async_tls, connect_async};
use tracing::{debug, warn};
use url::Url;

use crate::error::TransportError;
use crate::message::RelayMessage;
use crate::pool::PoolSink;

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Outbound HTTP CONNECT proxy descriptor.
#[derive(Debug, Clone)]
pub struct ProxyConfig {
    /// Proxy host
    pub host: String,
    /// Proxy port
    pub port: u16,
}

/// Transport options fixed at relay-add time.
#[derive(Debug, Clone)]
pub struct RelayOptions {
    /// Timeout for one connect attempt
    pub connect_timeout: Duration,
    /// Optional outbound proxy
    pub proxy: Option<ProxyConfig>,
}

impl Default for RelayOptions {
    fn default() -> Self {
        Self {
            connect_timeout: Duration::from_secs(10),
            proxy: None,
        }
    }
}

/// The connection interface the relay handle drives. Implemented by
/// [`WsTransport`] for real relays and by test doubles.
#[async_trait]
pub trait Transport: Send {
    /// Open (or re-open) the underlying connection.
    async fn connect(&mut self) -> Result<(), TransportError>;

    /// Close the underlying connection.
    async fn close(&mut self);

    /// Whether the connection is currently live.
    fn is_connected(&self) -> bool;

    /// Send one already-encoded wire message.
    async fn send(&mut self, text: String) -> Result<(), TransportError>;
}

/// tokio-tungstenite transport with TLS and optional CONNECT proxy support.
pub struct WsTransport {
    url: Url,
    options: RelayOptions,
    sink: PoolSink,
    writer: Option<SplitSink<WsStream, Message>>,
    connected: Arc<AtomicBool>,
    read_task: Option<JoinHandle<()>>,
}

impl WsTransport {
    /// Create a transport for a relay url. Does not connect.
    pub fn new(url: Url, options: RelayOptions, sink: PoolSink) -> Self {
        Self {
            url,
            options,
            sink,
            writer: None,
            connected: Arc::new(AtomicBool::new(false)),
            read_task: None,
        }
    }

    async fn establish(&self) -> Result<WsStream, TransportError> {
        match &self.options.proxy {
            Some(proxy) => {
                let stream = proxy_connect(proxy, &self.url).await?;
                let (ws, _response) = client_async_tls(self.url.as_str(), stream)
                    .await
                    .map_err(|e| TransportError::WebSocket(e.to_string()))?;
                Ok(ws)
            }
            None => {
                let (ws, _response) = connect_async(self.url.as_str())
                    .await
                    .map_err(|e| TransportError::WebSocket(e.to_string()))?;
                Ok(ws)
            }
        }
    }

    fn spawn_read_loop(&mut self, mut reader: SplitStream<WsStream>) {
        let sink = self.sink.clone();
        let connected = Arc::clone(&self.connected);
        let url = self.url.to_string();

        let handle = tokio::spawn(async move {
            while let Some(frame) = reader.next().await {
                match frame {
                    Ok(Message::Text(text)) => match RelayMessage::from_json(text.as_str()) {
                        Ok(message) => sink.deliver(url.clone(), message),
                        Err(e) => debug!(url = %url, error = %e, "ignoring unparsable frame"),
                    },
                    Ok(Message::Close(_)) => {
                        debug!(url = %url, "relay closed connection");
                        break;
                    }
                    Ok(_) => {} // binary / ping / pong frames carry no protocol data
                    Err(e) => {
                        warn!(url = %url, error = %e, "WebSocket read error");
                        break;
                    }
                }
            }
            connected.store(false, Ordering::SeqCst);
        });

        self.read_task = Some(handle);
    }
}

#[async_trait]
impl Transport for WsTransport {
    async fn connect(&mut self) -> Result<(), TransportError> {
        if let Some(task) = self.read_task.take() {
            task.abort();
        }
        self.writer = None;
        self.connected.store(false, Ordering::SeqCst);

        debug!(url = %self.url, "connecting");
        let ws = timeout(self.options.connect_timeout, self.establish())
            .await
            .map_err(|_| TransportError::Timeout(self.options.connect_timeout))??;

        let (writer, reader) = ws.split();
        self.writer = Some(writer);
        self.connected.store(true, Ordering::SeqCst);
        self.spawn_read_loop(reader);
        Ok(())
    }

    async fn close(&mut self) {
        if let Some(task) = self.read_task.take() {
            task.abort();
        }
        if let Some(mut writer) = self.writer.take() {
            let _ = writer.close().await;
        }
        self.connected.store(false, Ordering::SeqCst);
    }

    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    async fn send(&mut self, text: String) -> Result<(), TransportError> {
        if !self.is_connected() {
            return Err(TransportError::NotConnected);
        }
        let writer = self.writer.as_mut().ok_or(TransportError::NotConnected)?;
        match writer.send(Message::Text(text.into())).await {
            Ok(()) => Ok(()),
            Err(e) => {
                // A failed write means the socket is gone; let the monitor repair it.
                self.connected.store(false, Ordering::SeqCst);
                Err(TransportError::WebSocket(e.to_string()))
            }
        }
    }
}

/// Open a TCP stream through an HTTP CONNECT proxy to the relay's host.
async fn proxy_connect(proxy: &ProxyConfig, url: &Url) -> Result<TcpStream, TransportError> {
    let host = url
        .host_str()
        .ok_or_else(|| TransportError::InvalidUrl(format!("no host in {}", url)))?;
    let port = url
        .port_or_known_default()
        .ok_or_else(|| TransportError::InvalidUrl(format!("no port for {}", url)))?;

    let mut stream = TcpStream::connect((proxy.host.as_str(), proxy.port)).await?;
    let request = format!("CONNECT {host}:{port} HTTP/1.1\r\nHost: {host}:{port}\r\n\r\n");
    stream.write_all(request.as_bytes()).await?;

    let mut response = Vec::new();
    let mut byte = [0u8; 1];
    while !response.ends_with(b"\r\n\r\n") {
        if response.len() > 8192 {
            return Err(TransportError::Proxy("oversized CONNECT response".into()));
        }
        let n = stream.read(&mut byte).await?;
        if n == 0 {
            return Err(TransportError::Proxy("proxy closed during handshake".into()));
        }
        response.push(byte[0]);
    }

    let status = String::from_utf8_lossy(&response);
    let ok = status
        .lines()
        .next()
        .is_some_and(|line| line.contains(" 200 ") || line.ends_with(" 200"));
    if !ok {
        return Err(TransportError::Proxy(format!(
            "CONNECT rejected: {}",
            status.lines().next().unwrap_or("")
        )));
    }
    Ok(stream)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pool::MessagePool;

    fn test_transport() -> WsTransport {
        let pool = MessagePool::new();
        WsTransport::new(
            Url::parse("wss://relay.example.com").unwrap(),
            RelayOptions::default(),
            pool.sink(),
        )
    }

    #[tokio::test]
    async fn test_not_connected_initially() {
        let transport = test_transport();
        assert!(!transport.is_connected());
    }

    #[tokio::test]
    async fn test_send_when_disconnected_fails() {
        let mut transport = test_transport();
        let err = transport.send("[\"CLOSE\",\"sub1\"]".to_string()).await;
        assert!(matches!(err, Err(TransportError::NotConnected)));
    }

    #[tokio::test]
    async fn test_close_when_disconnected_is_noop() {
        let mut transport = test_transport();
        transport.close().await;
        assert!(!transport.is_connected());
    }

    #[test]
    fn test_relay_options_default() {
        let options = RelayOptions::default();
        assert_eq!(options.connect_timeout, Duration::from_secs(10));
        assert!(options.proxy.is_none());
    }
}
