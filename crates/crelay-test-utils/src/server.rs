//! Live daemon helper for end-to-end tests.
//!
//! [`TestServer`] binds the daemon to an ephemeral loopback port and serves
//! in a background task. Dropping it sends the shutdown signal.

use std::net::SocketAddr;
use std::sync::Arc;

use tokio::net::TcpListener;
use tokio::task::JoinHandle;

use crelay_config::AppConfig;
use crelay_core::{Daemon, DaemonError, Dispatcher};

/// A running daemon on `127.0.0.1:<ephemeral>`.
pub struct TestServer {
    pub addr: SocketAddr,
    daemon: Arc<Daemon>,
    handle: Option<JoinHandle<Result<(), DaemonError>>>,
}

impl TestServer {
    /// Serve with the backends enabled by `config`.
    pub async fn start(config: AppConfig) -> Self {
        Self::spawn(Daemon::new(config, &[])).await
    }

    /// Serve with an explicit dispatcher, e.g. over a recording backend.
    pub async fn with_dispatcher(config: AppConfig, dispatcher: Dispatcher) -> Self {
        Self::spawn(Daemon::with_dispatcher(config, dispatcher, &[])).await
    }

    async fn spawn(daemon: Daemon) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0")
            .await
            .expect("failed to bind test listener");
        let addr = listener.local_addr().expect("listener has an address");
        let daemon = Arc::new(daemon);
        let running = daemon.clone();
        let handle = tokio::spawn(async move { running.serve(listener).await });
        Self {
            addr,
            daemon,
            handle: Some(handle),
        }
    }

    /// Absolute URL for `path` on this server.
    pub fn url(&self, path: &str) -> String {
        format!("http://{}{}", self.addr, path)
    }

    /// Stop the daemon and wait for it to finish.
    pub async fn stop(mut self) -> Result<(), DaemonError> {
        self.daemon.shutdown();
        match self.handle.take() {
            Some(handle) => handle.await.expect("daemon task panicked"),
            None => Ok(()),
        }
    }
}

impl Drop for TestServer {
    fn drop(&mut self) {
        self.daemon.shutdown();
    }
}
