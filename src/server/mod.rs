//! The wire listener and replica assembly.
//!
//! [`PlacementServer`] accepts TCP connections and runs one
//! [`ClientConnection`] task per client, generic over the [`Handler`]
//! answering requests. It keeps a concurrent registry of live
//! connections whose only purpose is the global close: on leadership
//! loss or shutdown every live connection is interrupted mid-read, so
//! clients observe a hard disconnect rather than stale replies.
//!
//! [`PlacementNode`] wires a full replica together: shared core, the
//! production handler, the server, and the election loop.
//!
//! # Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use placekeeper::cluster::Config;
//! use placekeeper::meta::MemStore;
//! use placekeeper::server::PlacementNode;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let node = PlacementNode::start(Config::default(), Arc::new(MemStore::new())).await?;
//!     println!("serving on {}", node.addr());
//!     tokio::signal::ctrl_c().await?;
//!     node.shutdown().await;
//!     Ok(())
//! }
//! ```

mod connection;
pub mod handler;
pub mod leader;
pub mod request;
pub mod response;

pub use connection::ClientConnection;
pub use handler::{Handler, RequestContext};

use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use dashmap::DashMap;
use tokio::net::TcpListener;
use tokio::runtime::Handle;
use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinHandle;

use crate::cluster::{Config, ControlCore, ControlHandler, metrics};
use crate::error::{Error, Result};
use crate::meta::MetaStore;

/// Concurrent set of live connections, used only for the global close.
#[derive(Default)]
pub struct ConnectionRegistry {
    conns: DashMap<u64, mpsc::Sender<()>>,
    next_id: AtomicU64,
}

impl ConnectionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a connection; returns its id and the close-signal receiver.
    pub fn register(&self) -> (u64, mpsc::Receiver<()>) {
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        let (tx, rx) = mpsc::channel(1);
        self.conns.insert(id, tx);
        (id, rx)
    }

    /// Remove a connection after its task exits.
    pub fn deregister(&self, id: u64) {
        self.conns.remove(&id);
    }

    /// Interrupt every live connection's read loop.
    pub fn close_all(&self) {
        let count = self.conns.len();
        if count > 0 {
            tracing::info!(connections = count, "closing all client connections");
        }
        for entry in self.conns.iter() {
            let _ = entry.value().try_send(());
        }
    }

    /// Number of live connections.
    pub fn len(&self) -> usize {
        self.conns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.conns.is_empty()
    }
}

/// A TCP server speaking the framed placement protocol.
pub struct PlacementServer<H: Handler> {
    listener: TcpListener,
    handler: Arc<H>,
    shutdown_tx: broadcast::Sender<()>,
    registry: Arc<ConnectionRegistry>,
    max_frame_size: usize,
    data_runtime: Handle,
}

impl<H: Handler + 'static> PlacementServer<H> {
    /// Bind on `addr`, spawning connection tasks on the current runtime.
    pub async fn new(addr: &str, handler: H, max_frame_size: usize) -> Result<Self> {
        Self::with_runtime(addr, handler, max_frame_size, Handle::current()).await
    }

    /// Bind on `addr`, spawning connection tasks on `data_runtime`.
    pub async fn with_runtime(
        addr: &str,
        handler: H,
        max_frame_size: usize,
        data_runtime: Handle,
    ) -> Result<Self> {
        let listener = TcpListener::bind(addr)
            .await
            .map_err(|e| Error::IoError(e.kind()))?;
        let (shutdown_tx, _) = broadcast::channel(1);

        tracing::info!(addr = %addr, "placement server listening");

        Ok(Self {
            listener,
            handler: Arc::new(handler),
            shutdown_tx,
            registry: Arc::new(ConnectionRegistry::new()),
            max_frame_size,
            data_runtime,
        })
    }

    /// The bound local address.
    pub fn local_addr(&self) -> Result<SocketAddr> {
        self.listener
            .local_addr()
            .map_err(|e| Error::IoError(e.kind()))
    }

    /// The live-connection registry, shared with the election loop.
    pub fn connections(&self) -> Arc<ConnectionRegistry> {
        self.registry.clone()
    }

    /// Number of currently live connections.
    pub fn active_connections(&self) -> usize {
        self.registry.len()
    }

    /// A receiver that fires when shutdown is initiated.
    pub fn subscribe_shutdown(&self) -> broadcast::Receiver<()> {
        self.shutdown_tx.subscribe()
    }

    /// Stop accepting and interrupt every live connection.
    pub fn shutdown(&self) {
        let _ = self.shutdown_tx.send(());
        self.registry.close_all();
        tracing::info!("shutdown signal sent");
    }

    /// Initiate shutdown and wait for connection workers to drain.
    ///
    /// Returns `true` if every live connection exited within the timeout.
    pub async fn shutdown_and_wait(&self, timeout: std::time::Duration) -> bool {
        self.shutdown();

        let start = std::time::Instant::now();
        let check_interval = std::time::Duration::from_millis(10);

        while start.elapsed() < timeout {
            let active = self.registry.len();
            if active == 0 {
                tracing::info!("all connections drained");
                return true;
            }
            tracing::debug!(active_connections = active, "waiting for connections to drain");
            tokio::time::sleep(check_interval).await;
        }

        let remaining = self.registry.len();
        tracing::warn!(
            remaining_connections = remaining,
            "shutdown timeout, connections still active"
        );
        false
    }

    /// Accept connections until shutdown.
    pub async fn run(&self) -> Result<()> {
        let mut shutdown_rx = self.shutdown_tx.subscribe();

        loop {
            tokio::select! {
                _ = shutdown_rx.recv() => {
                    tracing::info!("server shutting down, no longer accepting connections");
                    return Ok(());
                }
                accepted = self.listener.accept() => {
                    let (stream, addr) = accepted.map_err(|e| Error::IoError(e.kind()))?;
                    tracing::debug!(client_addr = %addr, "accepted connection");

                    metrics::TOTAL_CONNECTIONS.inc();
                    metrics::ACTIVE_CONNECTIONS.inc();

                    let (id, mut close_rx) = self.registry.register();
                    let registry = self.registry.clone();
                    let handler = self.handler.clone();
                    let max_frame_size = self.max_frame_size;

                    self.data_runtime.spawn(async move {
                        let mut conn = ClientConnection::new(stream, addr);
                        if let Err(e) = conn
                            .handle_requests(handler, max_frame_size, &mut close_rx)
                            .await
                        {
                            tracing::error!(client_addr = %addr, error = ?e, "connection ended with error");
                        }
                        registry.deregister(id);
                        metrics::ACTIVE_CONNECTIONS.dec();
                    });
                }
            }
        }
    }

    /// Serve a single connection on the current task (useful for tests).
    pub async fn accept_one(&self) -> Result<()> {
        let (stream, addr) = self
            .listener
            .accept()
            .await
            .map_err(|e| Error::IoError(e.kind()))?;

        let (id, mut close_rx) = self.registry.register();
        let mut conn = ClientConnection::new(stream, addr);
        let result = conn
            .handle_requests(self.handler.clone(), self.max_frame_size, &mut close_rx)
            .await;
        self.registry.deregister(id);
        result
    }
}

/// A fully assembled placement-driver replica.
pub struct PlacementNode {
    core: Arc<ControlCore>,
    server: Arc<PlacementServer<ControlHandler>>,
    addr: SocketAddr,
    election: JoinHandle<()>,
    accept: JoinHandle<()>,
}

impl PlacementNode {
    /// Start a replica on the current runtime.
    pub async fn start(config: Config, store: Arc<dyn MetaStore>) -> Result<Self> {
        Self::start_with_runtime(config, store, Handle::current()).await
    }

    /// Start a replica, spawning connection tasks on `data_runtime`.
    /// The election loop stays on the calling (control) runtime.
    pub async fn start_with_runtime(
        config: Config,
        store: Arc<dyn MetaStore>,
        data_runtime: Handle,
    ) -> Result<Self> {
        config.validate().map_err(Error::Config)?;

        let core = Arc::new(ControlCore::new(config.clone(), store));
        let handler = ControlHandler::new(core.clone());
        let server = Arc::new(
            PlacementServer::with_runtime(
                &config.listen_addr,
                handler,
                config.max_frame_size,
                data_runtime,
            )
            .await?,
        );
        let addr = server.local_addr()?;

        let election = tokio::spawn(leader::election_loop(
            core.clone(),
            server.connections(),
            server.subscribe_shutdown(),
        ));

        let accept = {
            let server = server.clone();
            tokio::spawn(async move {
                if let Err(e) = server.run().await {
                    tracing::error!(error = ?e, "accept loop ended with error");
                }
            })
        };

        Ok(Self {
            core,
            server,
            addr,
            election,
            accept,
        })
    }

    /// The bound listen address.
    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    /// The shared replica core.
    pub fn core(&self) -> &Arc<ControlCore> {
        &self.core
    }

    /// Whether this replica currently holds leadership.
    pub fn is_leader(&self) -> bool {
        self.core.is_leader()
    }

    /// Number of currently live client connections.
    pub fn active_connections(&self) -> usize {
        self.server.active_connections()
    }

    /// Stop the replica: cancel accept, close connections, join workers.
    pub async fn shutdown(self) {
        self.server
            .shutdown_and_wait(std::time::Duration::from_secs(5))
            .await;
        let _ = self.election.await;
        let _ = self.accept.await;
        tracing::info!("placement node stopped");
    }
}
