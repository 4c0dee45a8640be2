//! RPC server: listener, handler registry, worker pool, and reaper.
//!
//! # Architecture
//!
//! ```text
//! accept ──► ClientManager reader ──► ingress queue ──► worker ──► handler
//!                    ▲                                     │
//!                    └──── outgoing queue ◄── Response ◄───┘
//! ```
//!
//! One acceptor task, one reaper task, N workers, and a reader/writer task
//! pair per accepted connection. Registration happens before [`Server::serve`];
//! serving freezes the registry, so dispatch reads it without locks.
//!
//! # Example
//!
//! ```ignore
//! let config = ServerConfig::new("127.0.0.1:4800".parse()?);
//! let mut server = Server::bind(config).await?;
//! server.register("add_one", |x: i32| async move { Ok(x + 1) })?;
//! server.serve().await?;
//! ```

pub(crate) mod connection;
mod stats;
mod worker;

pub use stats::{ClientStats, ServerStats};

use std::future::Future;
use std::marker::PhantomData;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use serde::de::DeserializeOwned;
use serde::Serialize;
use tokio::net::TcpListener;

use crate::codec::{MsgPackCodec, PayloadCodec};
use crate::error::Result;
use crate::handler::{HandlerRegistry, HandlerResult};
use crate::protocol::DEFAULT_MAX_FRAME_SIZE;
use crate::queue::BoundedQueue;
use connection::{ClientManager, IngressItem};

/// Name of the built-in echo probe (i32 → i32).
pub const PING: &str = "_ping";

/// Name of the built-in statistics probe (bool → [`ServerStats`]).
pub const GET_STATS: &str = "_getStats";

/// Default capacity of the ingress queue.
pub const DEFAULT_INGRESS_CAPACITY: usize = 2000;

/// Default number of worker tasks.
pub const DEFAULT_WORKER_COUNT: usize = 8;

/// Default interval between dead-client sweeps.
pub const DEFAULT_REAP_INTERVAL: Duration = Duration::from_secs(2);

/// Default capacity of each connection's outgoing queue.
pub const DEFAULT_OUTGOING_CAPACITY: usize = 1024;

/// Server configuration.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Address to bind the listener on.
    pub addr: SocketAddr,
    /// Maximum queries waiting for a worker, across all connections.
    pub ingress_capacity: usize,
    /// Number of worker tasks invoking handlers.
    pub worker_count: usize,
    /// Interval between dead-client sweeps.
    pub reap_interval: Duration,
    /// Capacity of each connection's outgoing queue.
    pub outgoing_capacity: usize,
    /// Maximum accepted frame body size in bytes.
    pub max_frame_size: u32,
}

impl ServerConfig {
    /// Configuration with defaults for everything but the address.
    pub fn new(addr: SocketAddr) -> Self {
        Self {
            addr,
            ingress_capacity: DEFAULT_INGRESS_CAPACITY,
            worker_count: DEFAULT_WORKER_COUNT,
            reap_interval: DEFAULT_REAP_INTERVAL,
            outgoing_capacity: DEFAULT_OUTGOING_CAPACITY,
            max_frame_size: DEFAULT_MAX_FRAME_SIZE,
        }
    }
}

/// A bound RPC server, generic over the payload codec.
pub struct Server<C: PayloadCodec = MsgPackCodec> {
    listener: TcpListener,
    config: ServerConfig,
    registry: HandlerRegistry,
    ingress: Arc<BoundedQueue<IngressItem>>,
    clients: Arc<Mutex<Vec<ClientManager>>>,
    _codec: PhantomData<fn() -> C>,
}

impl Server<MsgPackCodec> {
    /// Bind a listener with the default MsgPack codec and pre-register the
    /// built-in probes.
    pub async fn bind(config: ServerConfig) -> Result<Self> {
        Self::bind_with_codec(config).await
    }
}

impl<C: PayloadCodec + 'static> Server<C> {
    /// Bind a listener with an explicit payload codec.
    pub async fn bind_with_codec(config: ServerConfig) -> Result<Server<C>> {
        let listener = TcpListener::bind(config.addr).await?;
        let ingress = Arc::new(BoundedQueue::new(config.ingress_capacity));
        let clients: Arc<Mutex<Vec<ClientManager>>> = Arc::new(Mutex::new(Vec::new()));

        let mut registry = HandlerRegistry::new();
        register_builtins::<C>(&mut registry, ingress.clone(), clients.clone())?;

        Ok(Server {
            listener,
            config,
            registry,
            ingress,
            clients,
            _codec: PhantomData,
        })
    }

    /// Local address of the bound listener.
    pub fn local_addr(&self) -> Result<SocketAddr> {
        Ok(self.listener.local_addr()?)
    }

    /// Register a handler under `name`.
    ///
    /// Registration is only possible before [`Server::serve`] consumes the
    /// server.
    ///
    /// # Errors
    ///
    /// Fails with `HandlerAlreadyRegistered` for duplicate names and with
    /// `ReservedName` for names starting with `_`.
    pub fn register<F, T, R, Fut>(&mut self, name: &str, handler: F) -> Result<()>
    where
        F: Fn(T) -> Fut + Send + Sync + 'static,
        T: DeserializeOwned + Send + 'static,
        R: Serialize + Send + 'static,
        Fut: Future<Output = HandlerResult<R>> + Send + 'static,
    {
        self.registry.register::<C, F, T, R, Fut>(name, handler)
    }

    /// Serve forever: spawn the workers and the reaper, then accept.
    ///
    /// Individual accept failures are logged and the loop continues.
    pub async fn serve(self) -> Result<()> {
        let registry = Arc::new(self.registry);
        for id in 0..self.config.worker_count {
            tokio::spawn(worker::worker_loop(id, self.ingress.clone(), registry.clone()));
        }
        tokio::spawn(reaper_loop(self.clients.clone(), self.config.reap_interval));

        tracing::debug!(
            addr = %self.listener.local_addr()?,
            workers = self.config.worker_count,
            "serving"
        );

        loop {
            match self.listener.accept().await {
                Ok((stream, peer)) => {
                    tracing::debug!(peer = %peer, "accepted connection");
                    let manager = ClientManager::start(
                        stream,
                        peer,
                        self.ingress.clone(),
                        self.config.outgoing_capacity,
                        self.config.max_frame_size,
                    );
                    lock_clients(&self.clients).push(manager);
                }
                Err(e) => {
                    tracing::error!(error = %e, "accept failed");
                }
            }
        }
    }
}

fn lock_clients(clients: &Mutex<Vec<ClientManager>>) -> MutexGuard<'_, Vec<ClientManager>> {
    clients.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Periodically drop managers whose loops have died.
async fn reaper_loop(clients: Arc<Mutex<Vec<ClientManager>>>, interval: Duration) {
    let mut ticker = tokio::time::interval(interval);
    loop {
        ticker.tick().await;
        let reaped = {
            let mut clients = lock_clients(&clients);
            let before = clients.len();
            clients.retain(|manager| manager.is_alive());
            before - clients.len()
        };
        if reaped > 0 {
            tracing::debug!(reaped, "reaped dead connections");
        }
    }
}

/// Pre-register `_ping` and `_getStats`.
fn register_builtins<C: PayloadCodec + 'static>(
    registry: &mut HandlerRegistry,
    ingress: Arc<BoundedQueue<IngressItem>>,
    clients: Arc<Mutex<Vec<ClientManager>>>,
) -> Result<()> {
    registry.register_reserved::<C, _, i32, i32, _>(PING, |value: i32| async move { Ok(value) })?;

    registry.register_reserved::<C, _, bool, ServerStats, _>(GET_STATS, move |_: bool| {
        let ingress = ingress.clone();
        let clients = clients.clone();
        async move {
            let snapshot = lock_clients(&clients)
                .iter()
                .map(ClientManager::stats)
                .collect();
            Ok(ServerStats {
                ingress_queue_len: ingress.len(),
                clients: snapshot,
            })
        }
    })?;

    Ok(())
}
