//! HTTP server

use std::net::SocketAddr;
use std::sync::Arc;

use tokio::net::TcpListener;
use tokio::signal;
use tracing::{error, info, warn};

use crate::client_config::ClientConfig;
use crate::config::Config;
use crate::routes::create_router;
use crate::state::AppState;
use crate::{Error, Result};

/// Consumer access provider server
pub struct Server {
    addr: SocketAddr,
    state: Arc<AppState>,
}

impl Server {
    /// Resolve the bind address and build the shared state
    pub fn new(config: &Config, client: Arc<ClientConfig>) -> Result<Self> {
        let addr = SocketAddr::new(
            config
                .server
                .host
                .parse()
                .map_err(|e| Error::Config(format!("Invalid host: {e}")))?,
            config.server.port,
        );
        let state = Arc::new(AppState::new(config, client)?);
        Ok(Self { addr, state })
    }

    /// Run until Ctrl-C or SIGTERM
    pub async fn run(self) -> Result<()> {
        let app = create_router(Arc::clone(&self.state));
        let listener = TcpListener::bind(self.addr).await?;

        info!("============================================================");
        info!("PERSEUS CAP v{}", env!("CARGO_PKG_VERSION"));
        info!("============================================================");
        info!(addr = %self.addr, "Listening");
        info!(server = %self.state.client.server, "Authorization server");
        info!(redirect_uri = %self.state.client.redirect_uri, "Redirect URI");
        if self.state.client.skip_server_verification {
            warn!("Server certificate verification DISABLED");
        }
        info!("============================================================");

        axum::serve(listener, app)
            .with_graceful_shutdown(shutdown_signal())
            .await?;

        info!("Server stopped");
        Ok(())
    }
}

/// Shutdown signal handler
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {},
        () = terminate => {},
    }

    info!("Shutdown signal received");
}
