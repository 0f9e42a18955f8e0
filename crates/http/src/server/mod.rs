//! TCP accept loop and server configuration.

use std::collections::HashMap;
use std::fmt;
use std::io;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use serde::Deserialize;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::connection::{Connection, ConnectionConfig};
use crate::handler::Router;
use crate::scheduler::Scheduler;

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub addr: SocketAddr,
    /// Worker tasks in the handler pool; `0` sizes the pool from the host's
    /// parallelism.
    pub workers: usize,
    /// How long shutdown waits for in-flight handlers before aborting them.
    pub shutdown_grace: Duration,
    pub connection: ConnectionConfig,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            addr: SocketAddr::from(([0, 0, 0, 0], 8080)),
            workers: 0,
            shutdown_grace: Duration::from_secs(5),
            connection: ConnectionConfig::default(),
        }
    }
}

/// Accepts connections and serves each on its own task.
///
/// Every accepted connection is registered with a cancellation token derived
/// from the server's shutdown token; cancelling the server sweeps them all.
pub struct Server {
    config: ServerConfig,
    router: Arc<dyn Router>,
    shutdown: CancellationToken,
}

impl fmt::Debug for Server {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Server")
            .field("config", &self.config)
            .field("shutdown", &self.shutdown)
            .finish_non_exhaustive()
    }
}

impl Server {
    pub fn new(config: ServerConfig, router: Arc<dyn Router>) -> Self {
        Self { config, router, shutdown: CancellationToken::new() }
    }

    /// Token that stops the accept loop and closes open connections when
    /// cancelled.
    pub fn shutdown_token(&self) -> CancellationToken {
        self.shutdown.clone()
    }

    /// Binds the configured address and serves until shut down.
    pub async fn run(self) -> io::Result<()> {
        let listener = TcpListener::bind(self.config.addr).await?;
        self.run_on(listener).await
    }

    /// Serves on an already bound listener until shut down.
    pub async fn run_on(self, listener: TcpListener) -> io::Result<()> {
        let local_addr = listener.local_addr()?;
        info!(addr = %local_addr, "listening");

        let scheduler = Arc::new(Scheduler::new(self.config.workers));
        let registry: Arc<Mutex<HashMap<u64, CancellationToken>>> = Arc::default();
        let mut next_id: u64 = 0;

        loop {
            let accepted = tokio::select! {
                biased;
                _ = self.shutdown.cancelled() => break,
                accepted = listener.accept() => accepted,
            };
            let (stream, peer) = match accepted {
                Ok(pair) => pair,
                Err(error) => {
                    warn!(error = %error, "accept failed");
                    continue;
                }
            };

            next_id += 1;
            let id = next_id;
            let token = self.shutdown.child_token();
            if let Ok(mut open) = registry.lock() {
                open.insert(id, token.clone());
            }

            let scheduler = Arc::clone(&scheduler);
            let router = Arc::clone(&self.router);
            let registry = Arc::clone(&registry);
            let config = self.config.connection.clone();
            tokio::spawn(async move {
                debug!(%peer, id, "connection opened");
                let (read_half, write_half) = stream.into_split();
                let connection = Connection::with_config(read_half, write_half, config, token);
                match connection.serve(&scheduler, router).await {
                    Ok(()) => debug!(%peer, id, "connection closed"),
                    Err(error) => debug!(%peer, id, error = %error, "connection failed"),
                }
                if let Ok(mut open) = registry.lock() {
                    open.remove(&id);
                }
            });
        }

        let open = registry.lock().map(|open| open.len()).unwrap_or(0);
        info!(connections = open, "shutting down");
        // Child tokens fire with the shutdown token; connections unwind on
        // their own tasks while the scheduler drains.
        scheduler.shutdown(self.config.shutdown_grace).await;
        Ok(())
    }
}
