//! Runtime pieces around the squeeze frame protocol.
//!
//! [`squeeze_proto`] moves single frames over borrowed streams. This crate
//! adds what a long-lived connection needs: a bounded outbound queue with
//! blocking backpressure, a writer task that drains it in order, connection
//! halves that refuse reuse after a fatal error, and a TCP client and
//! server built from them.
//!
//! ```no_run
//! # async fn demo() -> squeeze::Result<()> {
//! use squeeze::{Cancel, Client, Config};
//!
//! let client = Client::connect("127.0.0.1:7070", Config::default(), 64, Cancel::new()).await?;
//! client.enqueue("hello").await?;
//! client.send_file("/var/log/syslog").await?;
//! client.finish().await?;
//! # Ok(())
//! # }
//! ```

mod client;
mod conn;
mod error;
mod queue;
mod server;
mod writer;

pub use client::Client;
pub use conn::{FrameReceiver, FrameSender};
pub use error::{Error, Result};
pub use queue::{Drain, Outbox, outbox};
pub use server::{Handler, Mode, Server};
pub use squeeze_proto::{Algorithm, Cancel, Config, Flag, Layout, Received, Sent, Source, Transfer};
pub use writer::spawn_writer;
