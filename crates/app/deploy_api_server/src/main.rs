//! Deployment agent API server binary.
//!
//! Loads and validates auth configuration, starts the session sweeper and
//! serves the auth endpoints until interrupted.

use std::sync::Arc;

use clap::Parser;
use deploy_api::config::{ApiConfig, DEFAULT_BIND_ADDR};
use deploy_core::auth::SessionService;
use deploy_core::clock::{Clock, SystemClock};
use deploy_core::config::AuthConfig;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

/// CLI arguments for the API server.
#[derive(Parser, Debug)]
#[command(name = "deploy_api_server", about = "Deployment agent API server")]
struct Args {
    /// Address to listen on.
    #[arg(long, env = "BIND_ADDR", default_value = DEFAULT_BIND_ADDR)]
    bind: String,

    /// Port to listen on; overrides the port in `--bind` (0 = ephemeral).
    #[arg(long)]
    port: Option<u16>,
}

impl Args {
    fn bind_addr(&self) -> String {
        match self.port {
            Some(port) => {
                let host = self
                    .bind
                    .rsplit_once(':')
                    .map_or(self.bind.as_str(), |(host, _)| host);
                format!("{host}:{port}")
            }
            None => self.bind.clone(),
        }
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,deploy_api=debug,deploy_core=debug".into()),
        )
        .init();

    let args = Args::parse();

    let auth_config = match AuthConfig::from_env() {
        Ok(config) => config,
        Err(e) => {
            error!(error = %e, "invalid auth configuration, refusing to start");
            return Err(e.into());
        }
    };
    info!(config = ?auth_config, "auth configuration loaded");

    let clock: Arc<dyn Clock> = Arc::new(SystemClock);
    let service = Arc::new(SessionService::from_config(&auth_config, Arc::clone(&clock))?);

    let sweeper_ct = CancellationToken::new();
    let sweeper = service.registry().spawn_sweeper(
        clock,
        auth_config.sweep_interval,
        auth_config.refresh_ttl,
        sweeper_ct.clone(),
    );

    let config = ApiConfig {
        bind_addr: args.bind_addr(),
        secure_cookies: auth_config.production,
    };

    let state = deploy_api::AppState {
        service,
        config: config.clone(),
    };
    let app = deploy_api::router(state);

    let listener = tokio::net::TcpListener::bind(&config.bind_addr).await?;
    let local_addr = listener.local_addr()?;
    info!(addr = %local_addr, secure_cookies = config.secure_cookies, "REST API listening");

    let api_result = axum::serve(listener, app)
        .with_graceful_shutdown(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                error!(error = %e, "failed to listen for shutdown signal");
            }
            info!("shutdown signal received");
        })
        .await;

    // Stop the sweeper once the API has drained.
    sweeper_ct.cancel();
    let _ = sweeper.await;

    api_result?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn port_overrides_bind_port() {
        let args = Args::parse_from(["deploy_api_server", "--bind", "0.0.0.0:9000", "--port", "0"]);
        assert_eq!(args.bind_addr(), "0.0.0.0:0");
    }

    #[test]
    fn bind_is_used_verbatim_without_port() {
        let args = Args::parse_from(["deploy_api_server", "--bind", "127.0.0.1:8081"]);
        assert_eq!(args.bind_addr(), "127.0.0.1:8081");
    }
}
