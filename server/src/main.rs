use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use hyper::body::Incoming;
use hyper::server::conn::http1;
use hyper::Request;
use hyper_util::rt::{TokioIo, TokioTimer};
use hyper_util::service::TowerToHyperService;
use tokio::net::TcpListener;
use tower::ServiceExt;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use server::auth::{TokenPolicy, TokenService};
use server::call_log::{ClientAddr, TracingSink};
use server::database::utils::get_timestamp;
use server::database::{self, SqliteIdentityStore, SqliteProductStore, SqliteTokenStore};
use server::{build_service, cors_layer, AppState};
use shared::config::{load_config, LiveConfig};

const PURGE_INTERVAL: Duration = Duration::from_secs(60 * 60);

#[derive(Parser, Debug)]
#[command(name = "catalog-server", version, about = "Product catalog API server")]
struct Args {
    /// Path to the TOML configuration file
    #[arg(short, long, default_value = "config.toml")]
    config: String,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let config = load_config(&args.config)
        .with_context(|| format!("Failed to load config from {}", args.config))?;

    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&config.logging.level))
        .context("Invalid logging.level filter")?;
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let jwt_secret = config
        .auth
        .resolved_jwt_secret()
        .context("JWT secret is not configured")?;

    let pool = database::connect(&config.database).await?;
    let token_store = Arc::new(SqliteTokenStore::new(pool.clone()));

    let tokens = TokenService::new(
        &jwt_secret,
        TokenPolicy::from_config(&config.auth),
        Arc::new(SqliteIdentityStore::new(pool.clone())),
        token_store.clone(),
    );

    let addr: SocketAddr = config
        .server
        .addr()
        .parse()
        .with_context(|| format!("Invalid bind address {}", config.server.addr()))?;
    let cors = cors_layer(&config.cors)?;
    let request_timeout = Duration::from_secs(config.server.request_timeout_secs);

    let live = LiveConfig::new(config);
    let state = AppState::new(
        live.clone(),
        Arc::new(tokens),
        Arc::new(SqliteProductStore::new(pool)),
    );

    spawn_reload_on_sighup(args.config.clone(), live);

    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(PURGE_INTERVAL);
        loop {
            ticker.tick().await;
            match token_store.purge_expired(get_timestamp()).await {
                Ok(0) => {}
                Ok(n) => info!("Purged {} expired refresh tokens", n),
                Err(e) => warn!("Refresh token purge failed: {}", e),
            }
        }
    });

    let service = build_service::<Incoming>(state, Arc::new(TracingSink), cors, request_timeout);

    let listener = TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind to {}", addr))?;
    info!("Listening on http://{}", addr);

    loop {
        let (stream, peer) = tokio::select! {
            accepted = listener.accept() => match accepted {
                Ok(conn) => conn,
                Err(e) => {
                    warn!("Failed to accept connection: {}", e);
                    continue;
                }
            },
            _ = tokio::signal::ctrl_c() => {
                info!("Shutdown signal received");
                break;
            }
        };

        let io = TokioIo::new(stream);
        let service = service.clone().map_request(move |mut req: Request<Incoming>| {
            req.extensions_mut().insert(ClientAddr(peer));
            req
        });

        tokio::task::spawn(async move {
            if let Err(err) = http1::Builder::new()
                .timer(TokioTimer::new())
                .serve_connection(io, TowerToHyperService::new(service))
                .await
            {
                error!("Error serving connection from {}: {:?}", peer, err);
            }
        });
    }

    info!("Server closed");
    Ok(())
}

/// Re-read the config file on SIGHUP.
///
/// Cookie attributes take effect immediately; everything wired at startup
/// is reported by `LiveConfig::reload` and waits for a restart.
#[cfg(unix)]
fn spawn_reload_on_sighup(path: String, live: LiveConfig) {
    use tokio::signal::unix::{signal, SignalKind};

    tokio::spawn(async move {
        let mut hangup = match signal(SignalKind::hangup()) {
            Ok(s) => s,
            Err(e) => {
                warn!("SIGHUP handler unavailable, config reload disabled: {}", e);
                return;
            }
        };

        while hangup.recv().await.is_some() {
            match load_config(&path) {
                Ok(new_config) => {
                    let pending = live.reload(new_config).await;
                    info!("Configuration reloaded from {}", path);
                    if !pending.is_empty() {
                        warn!("Changes to {} take effect after a restart", pending.join(", "));
                    }
                }
                Err(e) => error!("Config reload failed, keeping current config: {}", e),
            }
        }
    });
}

#[cfg(not(unix))]
fn spawn_reload_on_sighup(_path: String, _live: LiveConfig) {}
