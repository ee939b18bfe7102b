//! EVE SSO identity server binary.
//!
//! Serves the login and session routes, sweeps expired login states and
//! refreshes stored provider tokens in the background.

use std::sync::Arc;

use clap::{Parser, ValueEnum};
use eveauth_api::config::ApiConfig;
use eveauth_core::auth::jwt::SessionIssuer;
use eveauth_core::config::SsoConfig;
use eveauth_core::profiles::{MemoryProfileStore, PgProfileStore, ProfileStore};
use eveauth_core::sso::flow::SsoFlow;
use eveauth_core::sso::identity::NoGroupSync;
use eveauth_core::sso::state::SWEEP_INTERVAL;
use sqlx::postgres::PgPoolOptions;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

/// Where character profiles are kept.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum StoreKind {
    Postgres,
    /// Profiles are lost on restart.
    Memory,
}

/// CLI arguments.
#[derive(Parser, Debug)]
#[command(name = "eveauth_server", about = "EVE SSO identity and session server")]
struct Args {
    /// Address to listen on.
    #[arg(long, env = "BIND_ADDR", default_value = "127.0.0.1:3100")]
    bind: String,

    /// PostgreSQL connection URL.
    #[arg(
        long,
        env = "DATABASE_URL",
        default_value = "postgres://localhost:5432/eveauth"
    )]
    database_url: String,

    /// Maximum number of database connections in the pool.
    #[arg(long, default_value_t = 5)]
    max_connections: u32,

    #[arg(long, value_enum, env = "PROFILE_STORE", default_value = "postgres")]
    store: StoreKind,

    /// Do not start the background token refresh worker.
    #[arg(long, default_value_t = false)]
    no_refresh: bool,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                tracing_subscriber::EnvFilter::new("info,eveauth_api=debug,eveauth_core=debug")
            }),
        )
        .init();

    let args = Args::parse();
    let sso_config = SsoConfig::from_env()?;
    let mut config = ApiConfig::from_env()?;
    config.bind_addr = args.bind.clone();
    config.pg_connection_url = args.database_url.clone();

    info!(bind = %config.bind_addr, store = ?args.store, "starting eveauth_server");

    let store: Arc<dyn ProfileStore> = match args.store {
        StoreKind::Postgres => {
            let pool = PgPoolOptions::new()
                .max_connections(args.max_connections)
                .acquire_timeout(std::time::Duration::from_secs(30))
                .connect(&config.pg_connection_url)
                .await?;
            info!("running database migrations");
            eveauth_api::migrate(&pool).await?;
            Arc::new(PgProfileStore::new(pool, &config.token_encryption_key))
        }
        StoreKind::Memory => {
            warn!("using in-memory profile store; profiles are lost on restart");
            Arc::new(MemoryProfileStore::new())
        }
    };

    let sessions = SessionIssuer::new(config.session_secret.as_bytes());
    let flow = Arc::new(SsoFlow::new(
        sso_config,
        store,
        Arc::new(NoGroupSync),
        sessions,
    )?);

    let shutdown = CancellationToken::new();
    let mut background = vec![
        flow.state_store()
            .spawn_sweeper(SWEEP_INTERVAL, shutdown.clone()),
    ];
    if args.no_refresh {
        info!("token refresh worker disabled");
    } else {
        background.push(Arc::new(flow.refresh_worker()).spawn(shutdown.clone()));
    }

    let app = eveauth_api::router(eveauth_api::AppState::new(flow, config.clone()));
    let listener = tokio::net::TcpListener::bind(&config.bind_addr).await?;
    info!(addr = %listener.local_addr()?, "REST API listening");

    let serve_result = axum::serve(listener, app)
        .with_graceful_shutdown({
            let shutdown = shutdown.clone();
            async move {
                tokio::select! {
                    _ = tokio::signal::ctrl_c() => info!("shutdown signal received"),
                    _ = shutdown.cancelled() => {}
                }
            }
        })
        .await;

    shutdown.cancel();
    for handle in background {
        let _ = handle.await;
    }

    serve_result?;
    Ok(())
}
