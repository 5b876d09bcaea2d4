use anyhow::Context;
use clap::{Parser, Subcommand};
use esign_sync::callback::CallbackAuthenticator;
use esign_sync::config::AppConfig;
use esign_sync::provider::{HttpTransport, ProviderClient};
use esign_sync::service::ContractService;
use esign_sync::store::SledStore;
use esign_sync::{telemetry, webhook};
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{info, warn};

#[derive(Parser)]
#[command(name = "esign-sync", version, about = "E-signature status synchronization service")]
struct Cli {
    /// TOML configuration file; ESIGN_* environment variables override it
    #[arg(short, long, global = true, env = "ESIGN_CONFIG")]
    config: Option<PathBuf>,

    /// Emit logs as JSON lines
    #[arg(long, global = true)]
    json_logs: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Serve provider callbacks and the contract API
    Serve {
        #[arg(long)]
        bind: Option<SocketAddr>,
    },
    /// Sync every contract awaiting a signature once, then exit
    Poll,
}

fn build_service(config: &AppConfig) -> anyhow::Result<Arc<ContractService>> {
    let store = SledStore::open(&config.storage.path)
        .with_context(|| format!("opening store at {}", config.storage.path))?;
    let transport = HttpTransport::new(config.provider.timeout())?;
    let provider = ProviderClient::new(config, Arc::new(transport))?;

    Ok(Arc::new(ContractService::new(
        Arc::new(store),
        Arc::new(provider),
    )))
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        warn!(error = %err, "could not listen for shutdown signal");
    }
    info!("shutting down");
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let mut config = AppConfig::load(cli.config.as_deref())?;
    telemetry::init(cli.json_logs || config.server.json_logs);
    config.validate().context("invalid configuration")?;

    match cli.command {
        Command::Serve { bind } => {
            if let Some(bind) = bind {
                config.server.bind = bind;
            }
            let service = build_service(&config)?;
            let state = Arc::new(webhook::WebhookState {
                authenticator: CallbackAuthenticator::from_config(&config.callback),
                service,
            });
            let app = webhook::router(state, &config.callback.path);

            let listener = tokio::net::TcpListener::bind(config.server.bind).await?;
            info!(addr = %config.server.bind, host = %config.provider.host, "listening");
            axum::serve(listener, app)
                .with_graceful_shutdown(shutdown_signal())
                .await?;
        }
        Command::Poll => {
            let service = build_service(&config)?;
            let results = service.poll_pending().await?;
            let failed = results.iter().filter(|r| r.result.is_err()).count();
            info!(total = results.len(), failed, "poll finished");
        }
    }

    Ok(())
}
