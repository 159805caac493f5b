//! Inbound side of a connection.
//!
//! One receive task per connection reads from the socket, feeds the bytes to a
//! [`FrameBuffer`] and dispatches what it decodes:
//!
//! ```text
//! Idle ─► Reading ⇄ Dispatching
//!            │
//!            ├─► Disconnected   peer closed or read failed
//!            └─► Stopped        close requested locally
//! ```
//!
//! Text frames reach the event handler trimmed of surrounding whitespace.
//! Control frames are logged and dropped.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::sync::watch;
use tokio::task::JoinHandle;

use crate::error::ClipsError;
use crate::protocol::{FrameBuffer, InboundFrame, Reply};

/// Something the receiver has to tell the host application.
#[derive(Debug)]
pub enum LinkEvent {
    /// A text message from the server, trimmed.
    Message(String),
    /// The rest of the current read was unparseable and has been dropped.
    Malformed(ClipsError),
    /// The peer closed the connection. Always the last event.
    Disconnected,
}

/// Callback invoked on the receive task for every [`LinkEvent`].
pub type EventHandler = Arc<dyn Fn(LinkEvent) + Send + Sync>;

/// Why the receive task ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReceiverExit {
    /// Peer closed the stream or the read failed.
    Disconnected,
    /// Local close.
    Stopped,
}

/// Handler used when the host does not install one: everything goes to the log.
pub fn log_event(event: LinkEvent) {
    match event {
        LinkEvent::Message(text) => tracing::info!("CLIPS: {}", text),
        LinkEvent::Malformed(e) => tracing::warn!("{}", e),
        LinkEvent::Disconnected => tracing::info!("Disconnected"),
    }
}

/// Background reader for one connection.
pub struct Receiver {
    open: Arc<AtomicBool>,
    shutdown: watch::Receiver<bool>,
    handler: EventHandler,
    read_buffer_size: usize,
}

impl Receiver {
    pub(crate) fn new(
        open: Arc<AtomicBool>,
        shutdown: watch::Receiver<bool>,
        handler: EventHandler,
        read_buffer_size: usize,
    ) -> Self {
        Self {
            open,
            shutdown,
            handler,
            read_buffer_size: read_buffer_size.max(1),
        }
    }

    /// Run the receive loop on its own task.
    pub fn spawn<R>(self, reader: R) -> JoinHandle<ReceiverExit>
    where
        R: AsyncRead + Unpin + Send + 'static,
    {
        tokio::spawn(self.run(reader))
    }

    /// Read until the peer disconnects or a stop is requested.
    pub async fn run<R>(mut self, mut reader: R) -> ReceiverExit
    where
        R: AsyncRead + Unpin,
    {
        let mut frames = FrameBuffer::with_capacity(self.read_buffer_size);
        let mut buf = vec![0u8; self.read_buffer_size];

        loop {
            let read = tokio::select! {
                biased;
                _ = stop_signal(&mut self.shutdown) => return self.stopped(),
                read = reader.read(&mut buf) => read,
            };

            let n = match read {
                Ok(0) => return self.end_of_stream(),
                Ok(n) => n,
                Err(e) => {
                    if self.stop_requested() {
                        return self.stopped();
                    }
                    tracing::warn!("Read failed: {}", e);
                    return self.disconnected();
                }
            };

            for frame in frames.push(&buf[..n]) {
                match frame {
                    Ok(InboundFrame::Text(text)) => {
                        (self.handler)(LinkEvent::Message(text.trim().to_string()));
                    }
                    Ok(InboundFrame::Control(content)) => log_control(&content),
                    Err(e) => {
                        tracing::warn!("Dropping the rest of this read: {}", e);
                        (self.handler)(LinkEvent::Malformed(e));
                    }
                }
            }
        }
    }

    fn stop_requested(&self) -> bool {
        *self.shutdown.borrow()
    }

    fn end_of_stream(&self) -> ReceiverExit {
        if self.stop_requested() {
            self.stopped()
        } else {
            self.disconnected()
        }
    }

    fn stopped(&self) -> ReceiverExit {
        tracing::debug!("Receiver stopped");
        ReceiverExit::Stopped
    }

    fn disconnected(&self) -> ReceiverExit {
        self.open.store(false, Ordering::Release);
        (self.handler)(LinkEvent::Disconnected);
        ReceiverExit::Disconnected
    }
}

/// Resolves once a stop is requested or the requesting side is gone.
async fn stop_signal(shutdown: &mut watch::Receiver<bool>) {
    let _ = shutdown.wait_for(|stop| *stop).await;
}

fn log_control(content: &[u8]) {
    match Reply::parse(content) {
        Some(reply) if reply.is_status() => {
            tracing::debug!("Server status: {}", reply.result);
        }
        Some(reply) => tracing::debug!(
            "Reply to command {}: success={} {}",
            reply.command_id,
            reply.success,
            reply.result
        ),
        None => tracing::trace!("Discarding {}-byte control frame", content.len()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::pin::Pin;
    use std::task::{Context, Poll};
    use std::time::Duration;
    use tokio::io::{duplex, AsyncWriteExt, DuplexStream, ReadBuf};
    use tokio::sync::mpsc;
    use tokio::time::timeout;

    const TEST_TIMEOUT: Duration = Duration::from_secs(5);

    fn frame(content: &[u8]) -> Vec<u8> {
        let mut bytes = ((content.len() + 2) as u16).to_le_bytes().to_vec();
        bytes.extend_from_slice(content);
        bytes
    }

    /// Reader whose every read fails with a connection reset.
    struct BrokenReader;

    impl AsyncRead for BrokenReader {
        fn poll_read(
            self: Pin<&mut Self>,
            _cx: &mut Context<'_>,
            _buf: &mut ReadBuf<'_>,
        ) -> Poll<std::io::Result<()>> {
            Poll::Ready(Err(std::io::ErrorKind::ConnectionReset.into()))
        }
    }

    struct Harness {
        server: DuplexStream,
        events: mpsc::UnboundedReceiver<LinkEvent>,
        open: Arc<AtomicBool>,
        stop: watch::Sender<bool>,
        task: JoinHandle<ReceiverExit>,
    }

    fn start() -> Harness {
        let (client, server) = duplex(4096);
        let (tx, events) = mpsc::unbounded_channel();
        let (stop, shutdown) = watch::channel(false);
        let open = Arc::new(AtomicBool::new(true));

        let handler: EventHandler = Arc::new(move |event| {
            let _ = tx.send(event);
        });
        let task = Receiver::new(open.clone(), shutdown, handler, 1024).spawn(client);

        Harness {
            server,
            events,
            open,
            stop,
            task,
        }
    }

    async fn next_message(events: &mut mpsc::UnboundedReceiver<LinkEvent>) -> String {
        match timeout(TEST_TIMEOUT, events.recv()).await.unwrap() {
            Some(LinkEvent::Message(text)) => text,
            other => panic!("expected a message, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_two_frames_in_one_read() {
        let mut h = start();
        let mut data = frame(b"first message\n");
        data.extend(frame(b"  second message  "));
        h.server.write_all(&data).await.unwrap();

        assert_eq!(next_message(&mut h.events).await, "first message");
        assert_eq!(next_message(&mut h.events).await, "second message");
    }

    #[tokio::test]
    async fn test_frame_split_across_reads() {
        let mut h = start();
        let data = frame(b"Block C on top of B");

        h.server.write_all(&data[..3]).await.unwrap();
        tokio::time::sleep(Duration::from_millis(20)).await;
        h.server.write_all(&data[3..]).await.unwrap();

        assert_eq!(next_message(&mut h.events).await, "Block C on top of B");
    }

    #[tokio::test]
    async fn test_control_frames_not_dispatched() {
        let mut h = start();
        let mut data = frame(&[0, 1, 0, 0, 0, 1]);
        data.extend(frame(b"\x00\xFF\xFF\xFF\xFF\x01watching:0"));
        data.extend(frame(b"visible"));
        h.server.write_all(&data).await.unwrap();

        assert_eq!(next_message(&mut h.events).await, "visible");
        assert!(h.events.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_malformed_frame_reported_then_recovers() {
        let mut h = start();
        let mut data = frame(b"before");
        data.extend_from_slice(&[0, 0, b'x', b'y']);
        h.server.write_all(&data).await.unwrap();

        assert_eq!(next_message(&mut h.events).await, "before");
        match timeout(TEST_TIMEOUT, h.events.recv()).await.unwrap() {
            Some(LinkEvent::Malformed(ClipsError::MalformedFrame(_))) => {}
            other => panic!("expected malformed frame, got {:?}", other),
        }

        h.server.write_all(&frame(b"after")).await.unwrap();
        assert_eq!(next_message(&mut h.events).await, "after");
    }

    #[tokio::test]
    async fn test_eof_yields_single_disconnect() {
        let mut h = start();
        h.server.write_all(&frame(b"bye")).await.unwrap();
        drop(h.server);

        let exit = timeout(TEST_TIMEOUT, h.task).await.unwrap().unwrap();
        assert_eq!(exit, ReceiverExit::Disconnected);
        assert!(!h.open.load(Ordering::Acquire));

        assert_eq!(next_message(&mut h.events).await, "bye");
        assert!(matches!(h.events.recv().await, Some(LinkEvent::Disconnected)));
        // Sender side of the channel is gone with the task: nothing follows.
        assert!(h.events.recv().await.is_none());
    }

    #[tokio::test]
    async fn test_stop_unblocks_pending_read() {
        let mut h = start();
        tokio::time::sleep(Duration::from_millis(20)).await;

        h.stop.send(true).unwrap();
        let exit = timeout(TEST_TIMEOUT, h.task).await.unwrap().unwrap();

        assert_eq!(exit, ReceiverExit::Stopped);
        assert!(h.open.load(Ordering::Acquire), "stop leaves the flag to close()");
        assert!(h.events.recv().await.is_none(), "no disconnect on local stop");
    }

    #[tokio::test]
    async fn test_stop_requested_before_start() {
        let (client, _server) = duplex(64);
        let (stop, shutdown) = watch::channel(false);
        stop.send(true).unwrap();

        let receiver = Receiver::new(
            Arc::new(AtomicBool::new(true)),
            shutdown,
            Arc::new(log_event),
            64,
        );
        let exit = timeout(TEST_TIMEOUT, receiver.run(client)).await.unwrap();
        assert_eq!(exit, ReceiverExit::Stopped);
    }

    #[tokio::test]
    async fn test_read_error_yields_single_disconnect() {
        let (tx, mut events) = mpsc::unbounded_channel();
        let (_stop, shutdown) = watch::channel(false);
        let open = Arc::new(AtomicBool::new(true));
        let handler: EventHandler = Arc::new(move |event| {
            let _ = tx.send(event);
        });

        let exit = timeout(
            TEST_TIMEOUT,
            Receiver::new(open.clone(), shutdown, handler, 64).run(BrokenReader),
        )
        .await
        .unwrap();

        assert_eq!(exit, ReceiverExit::Disconnected);
        assert!(!open.load(Ordering::Acquire));
        assert!(matches!(events.recv().await, Some(LinkEvent::Disconnected)));
        assert!(events.recv().await.is_none());
    }
}
