//! Perseus CAP - consumer access provider server

use std::process::ExitCode;
use std::sync::Arc;

use clap::Parser;
use tracing::{error, info};

use perseus_cap::{
    cli::{Cli, Command},
    client_config::{ClientConfig, ClientOverrides, global_cache},
    config::Config,
    server::Server,
    setup_tracing,
    tls::AwsSecretsManager,
};

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    // Setup tracing
    if let Err(e) = setup_tracing(&cli.log_level, cli.log_format.as_deref()) {
        eprintln!("Failed to setup tracing: {e}");
        return ExitCode::FAILURE;
    }

    let config = match Config::load(cli.config.as_deref()) {
        Ok(mut config) => {
            if let Some(port) = cli.port {
                config.server.port = port;
            }
            if let Some(ref host) = cli.host {
                config.server.host = host.clone();
            }
            config
        }
        Err(e) => {
            error!("Failed to load configuration: {e}");
            return ExitCode::FAILURE;
        }
    };

    match cli.command {
        Some(Command::CheckCerts) => run_check_certs(&config).await,
        Some(Command::Serve) | None => run_server(&config).await,
    }
}

/// Resolve the client configuration through the process-wide cache
async fn resolve_client(config: &Config) -> perseus_cap::Result<Arc<ClientConfig>> {
    global_cache()
        .get_or_try_init(|| {
            let store = Arc::new(AwsSecretsManager::new(config.tls.region.clone()));
            ClientConfig::initialize(config, ClientOverrides::default(), store)
        })
        .await
}

/// Load and validate the certificate bundle, then exit
async fn run_check_certs(config: &Config) -> ExitCode {
    let client = match resolve_client(config).await {
        Ok(client) => client,
        Err(e) => {
            eprintln!("❌ {e}");
            return ExitCode::FAILURE;
        }
    };

    match client.certificates.validate() {
        Ok(report) => {
            println!("✅ Private key matches certificate {} of {}", report.matching_index + 1, report.certificates);
            println!("   Subject: {}", report.subject);
            println!("   CA bundle: {}", if client.certificates.ca_bundle.is_some() { "present" } else { "none" });
            ExitCode::SUCCESS
        }
        Err(e) => {
            eprintln!("❌ {e}");
            ExitCode::FAILURE
        }
    }
}

/// Run the server
async fn run_server(config: &Config) -> ExitCode {
    info!(
        version = env!("CARGO_PKG_VERSION"),
        app_env = %config.app_env(),
        port = config.server.port,
        "Starting Perseus CAP"
    );

    let client = match resolve_client(config).await {
        Ok(client) => client,
        Err(e) => {
            error!("Failed to initialize client configuration: {e}");
            return ExitCode::FAILURE;
        }
    };

    let server = match Server::new(config, client) {
        Ok(s) => s,
        Err(e) => {
            error!("Failed to create server: {e}");
            return ExitCode::FAILURE;
        }
    };

    if let Err(e) = server.run().await {
        error!("Server error: {e}");
        return ExitCode::FAILURE;
    }

    info!("Shutdown complete");
    ExitCode::SUCCESS
}
