//! # clips-client
//!
//! Client transport for the CLIPS rule-engine server's framed TCP protocol.
//!
//! ## Architecture
//!
//! - **Protocol**: pure encode/decode of length-prefixed frames, plus a
//!   persistent buffer that reassembles frames split across reads
//! - **Writer**: sends raw commands with monotonically increasing sequence
//!   numbers, one caller at a time
//! - **Receiver**: background task that turns inbound bytes into
//!   [`LinkEvent`]s for the host application
//!
//! ## Example
//!
//! ```ignore
//! use clips_client::{Connection, LinkEvent};
//!
//! #[tokio::main]
//! async fn main() {
//!     let connection = Connection::builder()
//!         .on_event(|event| {
//!             if let LinkEvent::Message(text) = event {
//!                 println!("CLIPS: {}", text);
//!             }
//!         })
//!         .connect("127.0.0.1", 5000)
//!         .await
//!         .unwrap();
//!
//!     connection.send("(load cubes.clp)").await.unwrap();
//!     connection.close().await;
//! }
//! ```

pub mod error;
pub mod protocol;
pub mod receiver;
pub mod writer;

mod connection;

pub use connection::{Connection, ConnectionBuilder, ConnectionConfig, DEFAULT_CLOSE_TIMEOUT};
pub use error::{ClipsError, Result};
pub use receiver::{EventHandler, LinkEvent, ReceiverExit};
