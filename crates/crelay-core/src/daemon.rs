//! Core daemon process: startup, HTTP serving and shutdown.

use std::net::SocketAddr;
use std::sync::Arc;

use tokio::net::TcpListener;
use tokio::sync::watch;
use tracing::{info, warn};

use crelay_config::AppConfig;

use crate::command::{Action, Command};
use crate::dispatch::{Dispatcher, Outcome};
use crate::http::{self, AppState};

/// The crelay HTTP daemon.
pub struct Daemon {
    config: AppConfig,
    state: Arc<AppState>,
    /// Flips to `true` once shutdown is requested. A watch channel, so a
    /// request made before `serve` starts is not lost.
    shutdown_tx: watch::Sender<bool>,
}

impl Daemon {
    /// Create a daemon for `config`. `label_overrides` come from the command
    /// line and replace the configured labels in channel order.
    pub fn new(config: AppConfig, label_overrides: &[String]) -> Self {
        let dispatcher = Dispatcher::from_config(&config);
        Self::with_dispatcher(config, dispatcher, label_overrides)
    }

    /// Create a daemon around an existing dispatcher.
    pub fn with_dispatcher(config: AppConfig, dispatcher: Dispatcher, label_overrides: &[String]) -> Self {
        let (shutdown_tx, _) = watch::channel(false);
        let labels = config.labels_with_overrides(label_overrides);
        Self {
            config,
            state: Arc::new(AppState { dispatcher, labels }),
            shutdown_tx,
        }
    }

    /// Bind the configured address and serve until shutdown.
    pub async fn run(&self) -> Result<(), DaemonError> {
        let addr: SocketAddr = self
            .config
            .listen_addr()
            .map_err(|e| DaemonError::Startup(e.to_string()))?;
        let listener = TcpListener::bind(addr)
            .await
            .map_err(|e| DaemonError::Startup(format!("cannot listen on {addr}: {e}")))?;
        self.serve(listener).await
    }

    /// Serve on an already bound listener until shutdown.
    pub async fn serve(&self, listener: TcpListener) -> Result<(), DaemonError> {
        let shutdown_rx = self.shutdown_tx.subscribe();

        info!(
            version = crate::build_info::VERSION_LINE,
            addr = %listener.local_addr()?,
            pulse_secs = self.state.dispatcher.pulse_duration().as_secs(),
            backends = self.state.dispatcher.discovery().backend_count(),
            "crelay daemon starting"
        );
        self.config.log_effective();
        for (n, label) in self.state.labels.iter().enumerate() {
            info!(channel = n + 1, label = %label, "Relay label");
        }
        self.report_card().await;

        let server = http::serve(listener, self.state.clone(), self.shutdown_tx.subscribe());
        tokio::pin!(server);

        tokio::select! {
            result = &mut server => {
                result?;
            }
            _ = stop_requested(shutdown_rx) => {
                info!("Shutdown signal received, stopping daemon");
                server.await?;
            }
            _ = tokio::signal::ctrl_c() => {
                warn!("Ctrl-C received, initiating graceful shutdown");
                self.shutdown();
                server.await?;
            }
        }

        info!("Daemon stopped");
        Ok(())
    }

    /// Log which card is attached at startup. Requests re-detect regardless.
    async fn report_card(&self) {
        match self.state.dispatcher.dispatch(&Command::new(Action::Info)).await {
            Ok(Outcome::Card(card)) => info!(
                card_type = %card.card_type,
                path = %card.path,
                relays = card.relay_count,
                "Relay card detected"
            ),
            Ok(_) => {}
            Err(e) => warn!(error = %e, "No relay card detected at startup"),
        }
    }

    /// Request a graceful shutdown of the daemon.
    pub fn shutdown(&self) {
        self.shutdown_tx.send_replace(true);
    }

    /// Get a reference to the daemon's configuration.
    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    /// Effective channel labels.
    pub fn labels(&self) -> &[String] {
        &self.state.labels
    }
}

/// Resolves once shutdown has been requested.
async fn stop_requested(mut rx: watch::Receiver<bool>) {
    let _ = rx.wait_for(|stop| *stop).await;
}

/// Errors from the daemon runtime.
#[derive(Debug, thiserror::Error)]
pub enum DaemonError {
    #[error("daemon startup failed: {0}")]
    Startup(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}
