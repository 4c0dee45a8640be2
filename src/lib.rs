//! # wirecall
//!
//! Length-prefixed binary RPC over TCP: a dispatching multi-worker server
//! and a client that turns the asynchronous wire protocol into one awaited
//! request/response call with a hard timeout.
//!
//! ## Architecture
//!
//! - **Wire**: every frame is a 4-byte Big Endian length prefix plus a
//!   Query or Response body ([`protocol`]).
//! - **Server**: an acceptor, a bounded ingress queue, a fixed worker pool
//!   dispatching to registered handlers, and a reaper that sweeps dead
//!   connections ([`server`]).
//! - **Client**: a writer/reader task pair around one socket and a pending
//!   table correlating responses to callers by dispatch id ([`Client`]).
//!
//! Request flow: caller → `Client::call` → outgoing queue → writer →
//! socket → connection reader → ingress queue → worker → handler →
//! outgoing queue → connection writer → socket → client reader → pending
//! table → caller.
//!
//! ## Example
//!
//! ```ignore
//! use wirecall::{Client, ClientConfig, Server, ServerConfig};
//!
//! #[tokio::main]
//! async fn main() -> wirecall::Result<()> {
//!     let mut server = Server::bind(ServerConfig::new("127.0.0.1:0".parse().unwrap())).await?;
//!     server.register("add_one", |x: i32| async move { Ok(x + 1) })?;
//!     let addr = server.local_addr()?;
//!     tokio::spawn(server.serve());
//!
//!     let client = Client::connect(addr, ClientConfig::default()).await?;
//!     let answer: i32 = client.call("add_one", &7).await?;
//!     assert_eq!(answer, 8);
//!     Ok(())
//! }
//! ```

pub mod codec;
pub mod error;
pub mod handler;
pub mod protocol;
pub mod queue;
pub mod server;

mod client;
mod pending;

pub use client::{Client, ClientConfig, DEFAULT_HARD_TIMEOUT};
pub use error::{Result, WirecallError};
pub use handler::{HandlerError, HandlerResult};
pub use server::{ClientStats, Server, ServerConfig, ServerStats, GET_STATS, PING};
