//! Connection builder and lifecycle.
//!
//! The [`ConnectionBuilder`] provides a fluent API for configuring the
//! connection. The [`Connection`] owns the lifecycle:
//! 1. Connect the TCP stream
//! 2. Split it into read and write halves
//! 3. Spawn the receive task on the read half
//! 4. Serialize sends on the write half
//! 5. Tear everything down on `close()`
//!
//! # Example
//!
//! ```ignore
//! use clips_client::{Connection, LinkEvent};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let connection = Connection::builder()
//!         .on_event(|event| match event {
//!             LinkEvent::Message(text) => println!("CLIPS: {}", text),
//!             LinkEvent::Malformed(e) => eprintln!("{}", e),
//!             LinkEvent::Disconnected => eprintln!("Disconnected"),
//!         })
//!         .connect("127.0.0.1", 5000)
//!         .await?;
//!
//!     connection.send("(reset)").await?;
//!     connection.send("(run -1)").await?;
//!     connection.close().await;
//!     Ok(())
//! }
//! ```

use std::io;
use std::net::{Shutdown, SocketAddr};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::net::tcp::OwnedWriteHalf;
use tokio::net::TcpStream;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::timeout;

use crate::error::{ClipsError, Result};
use crate::protocol::DEFAULT_BUFFER_CAPACITY;
use crate::receiver::{log_event, EventHandler, LinkEvent, Receiver, ReceiverExit};
use crate::writer::FrameWriter;

/// Default time `close()` waits for the receive task to exit.
pub const DEFAULT_CLOSE_TIMEOUT: Duration = Duration::from_millis(500);

/// Connection settings.
#[derive(Debug, Clone)]
pub struct ConnectionConfig {
    /// Size of each socket read, and initial frame buffer capacity.
    pub read_buffer_size: usize,
    /// Upper bound on how long `close()` waits for each teardown step.
    pub close_timeout: Duration,
    /// Disable Nagle's algorithm so each command leaves immediately.
    pub nodelay: bool,
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self {
            read_buffer_size: DEFAULT_BUFFER_CAPACITY,
            close_timeout: DEFAULT_CLOSE_TIMEOUT,
            nodelay: true,
        }
    }
}

/// Builder for configuring and opening a [`Connection`].
pub struct ConnectionBuilder {
    config: ConnectionConfig,
    handler: EventHandler,
}

impl ConnectionBuilder {
    /// Create a builder with default settings and a logging event handler.
    pub fn new() -> Self {
        Self {
            config: ConnectionConfig::default(),
            handler: Arc::new(log_event),
        }
    }

    /// Set the callback that receives messages and the disconnect event.
    ///
    /// Runs on the receive task; keep it short or hand work off.
    pub fn on_event<F>(mut self, handler: F) -> Self
    where
        F: Fn(LinkEvent) + Send + Sync + 'static,
    {
        self.handler = Arc::new(handler);
        self
    }

    /// Set the socket read size.
    ///
    /// Default: 64KB
    pub fn read_buffer_size(mut self, size: usize) -> Self {
        self.config.read_buffer_size = size;
        self
    }

    /// Set how long `close()` waits for the receive task.
    ///
    /// Default: 500ms
    pub fn close_timeout(mut self, timeout: Duration) -> Self {
        self.config.close_timeout = timeout;
        self
    }

    /// Enable or disable `TCP_NODELAY`.
    ///
    /// Default: enabled
    pub fn nodelay(mut self, nodelay: bool) -> Self {
        self.config.nodelay = nodelay;
        self
    }

    /// Replace the whole configuration.
    pub fn config(mut self, config: ConnectionConfig) -> Self {
        self.config = config;
        self
    }

    /// Connect to the server and start receiving.
    ///
    /// # Errors
    ///
    /// Returns `Connect` naming the target if the TCP connection fails.
    pub async fn connect(self, address: &str, port: u16) -> Result<Connection> {
        let target = format!("{}:{}", address, port);
        let stream = TcpStream::connect((address, port))
            .await
            .map_err(connect_error(target.clone()))?;
        tracing::debug!("Connected to {}", target);
        Connection::start(stream, self.config, self.handler).map_err(connect_error(target))
    }
}

/// Socket setup failures right after connect are reported like the connect itself.
fn connect_error(target: String) -> impl FnOnce(io::Error) -> ClipsError {
    move |source| ClipsError::Connect { target, source }
}

impl Default for ConnectionBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// An open connection to the rule-engine server.
///
/// `Send + Sync`: share it behind an `Arc` to send from several tasks.
pub struct Connection {
    writer: FrameWriter<OwnedWriteHalf>,
    /// Second handle on the socket so `close()` can shut it down while a
    /// send holds the write half.
    socket: std::net::TcpStream,
    /// Liveness flag, cleared by `close()` or by the receiver on disconnect.
    open: Arc<AtomicBool>,
    /// Set by the first `close()` call.
    closing: AtomicBool,
    stop: watch::Sender<bool>,
    receiver: std::sync::Mutex<Option<JoinHandle<ReceiverExit>>>,
    peer: SocketAddr,
    config: ConnectionConfig,
}

impl Connection {
    /// Create a new connection builder.
    pub fn builder() -> ConnectionBuilder {
        ConnectionBuilder::new()
    }

    /// Connect with default settings; messages go to the log.
    pub async fn open(address: &str, port: u16) -> Result<Self> {
        ConnectionBuilder::new().connect(address, port).await
    }

    fn start(
        stream: TcpStream,
        config: ConnectionConfig,
        handler: EventHandler,
    ) -> io::Result<Self> {
        if config.nodelay {
            stream.set_nodelay(true)?;
        }
        let peer = stream.peer_addr()?;

        let stream = stream.into_std()?;
        let socket = stream.try_clone()?;
        let stream = TcpStream::from_std(stream)?;
        let (read_half, write_half) = stream.into_split();

        let open = Arc::new(AtomicBool::new(true));
        let (stop, shutdown) = watch::channel(false);
        let receiver = Receiver::new(open.clone(), shutdown, handler, config.read_buffer_size)
            .spawn(read_half);

        Ok(Self {
            writer: FrameWriter::new(write_half),
            socket,
            open,
            closing: AtomicBool::new(false),
            stop,
            receiver: std::sync::Mutex::new(Some(receiver)),
            peer,
            config,
        })
    }

    /// Send `text` to the server as a raw command.
    ///
    /// Concurrent calls are serialized; each frame carries the next sequence
    /// number, starting at 1.
    ///
    /// # Errors
    ///
    /// - `ConnectionClosed` after `close()`, after a disconnect, or after a
    ///   previous write failure
    /// - `Send` if the socket write fails
    /// - `FrameTooLarge` / `SequenceExhausted` from framing
    pub async fn send(&self, text: &str) -> Result<()> {
        if !self.is_open() {
            return Err(ClipsError::ConnectionClosed);
        }
        self.writer.send(text).await.map(|_| ())
    }

    /// Whether the connection is neither closed nor disconnected.
    pub fn is_open(&self) -> bool {
        self.open.load(Ordering::Acquire)
    }

    /// Remote address of the server.
    pub fn peer_addr(&self) -> SocketAddr {
        self.peer
    }

    /// Sequence number the next successful send will use.
    pub async fn next_sequence(&self) -> Option<u32> {
        self.writer.next_sequence().await
    }

    /// Close the connection.
    ///
    /// Stops the receive task, shuts down the socket in both directions and
    /// waits (bounded by the close timeout) for the task to exit. A send in
    /// flight fails with `Send`. Safe to call any number of times from any
    /// task; only the first call does the work.
    pub async fn close(&self) {
        if self.closing.swap(true, Ordering::AcqRel) {
            return;
        }
        self.open.store(false, Ordering::Release);
        self.stop.send_replace(true);

        if let Err(e) = self.socket.shutdown(Shutdown::Both) {
            tracing::debug!("Socket shutdown failed: {}", e);
        }

        if timeout(self.config.close_timeout, self.writer.shutdown())
            .await
            .is_err()
        {
            tracing::warn!("Send still in flight on close, write half released on drop");
        }

        let task = self
            .receiver
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .take();
        if let Some(task) = task {
            let abort = task.abort_handle();
            match timeout(self.config.close_timeout, task).await {
                Ok(Ok(exit)) => tracing::debug!("Receiver exited: {:?}", exit),
                Ok(Err(e)) => tracing::error!("Receiver task failed: {}", e),
                Err(_) => {
                    tracing::warn!("Receiver did not stop in time, aborting");
                    abort.abort();
                }
            }
        }
        tracing::debug!("Closed connection to {}", self.peer);
    }
}

impl Drop for Connection {
    fn drop(&mut self) {
        // Without close() the receive task would outlive its connection.
        self.open.store(false, Ordering::Release);
        self.stop.send_replace(true);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_default() {
        let config = ConnectionConfig::default();
        assert_eq!(config.read_buffer_size, DEFAULT_BUFFER_CAPACITY);
        assert_eq!(config.close_timeout, Duration::from_millis(500));
        assert!(config.nodelay);
    }

    #[test]
    fn test_builder_configuration() {
        let builder = Connection::builder()
            .read_buffer_size(4096)
            .close_timeout(Duration::from_secs(2))
            .nodelay(false)
            .on_event(|_| {});

        assert_eq!(builder.config.read_buffer_size, 4096);
        assert_eq!(builder.config.close_timeout, Duration::from_secs(2));
        assert!(!builder.config.nodelay);
    }

    #[test]
    fn test_builder_config_replaces_all() {
        let config = ConnectionConfig {
            read_buffer_size: 128,
            close_timeout: Duration::from_millis(50),
            nodelay: false,
        };
        let builder = ConnectionBuilder::default().config(config);
        assert_eq!(builder.config.read_buffer_size, 128);
        assert_eq!(builder.config.close_timeout, Duration::from_millis(50));
    }

    #[tokio::test]
    async fn test_connect_refused_reports_target() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        drop(listener);

        let err = Connection::open("127.0.0.1", port).await.err().unwrap();
        match &err {
            ClipsError::Connect { target, .. } => {
                assert_eq!(target, &format!("127.0.0.1:{}", port));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_socket_setup_failure_is_a_connect_error() {
        let err = connect_error("127.0.0.1:5000".to_string())(io::ErrorKind::NotConnected.into());
        match err {
            ClipsError::Connect { target, source } => {
                assert_eq!(target, "127.0.0.1:5000");
                assert_eq!(source.kind(), io::ErrorKind::NotConnected);
            }
            other => panic!("unexpected error: {other}"),
        }
    }
}
