//! Tessera authentication server binary.
//!
//! Serves the session and token endpoints and runs the session maintenance
//! worker until interrupted.

use std::net::SocketAddr;
use std::sync::Arc;

use clap::Parser;
use sqlx::postgres::PgPoolOptions;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use tessera_api::{AppState, Backends};
use tessera_core::cache::{Cache, MemoryCache};
use tessera_core::config::AuthConfig;
use tessera_core::maintenance::SessionMaintenance;
use tessera_core::store::{
    AccountStore, MemoryAccountStore, MemorySessionStore, PgAccountStore, PgSessionStore,
    SessionStore,
};

/// CLI arguments for the server.
#[derive(Parser, Debug)]
#[command(name = "tessera_server", about = "Tessera session and token server")]
struct Args {
    /// Port to listen on (0 = ephemeral).
    #[arg(long, default_value_t = 3100)]
    port: u16,

    /// Address to bind.
    #[arg(long, default_value = "127.0.0.1")]
    host: String,

    /// PostgreSQL connection URL.
    #[arg(
        long,
        env = "DATABASE_URL",
        default_value = "postgres://localhost:5432/tessera"
    )]
    database_url: String,

    /// Maximum number of database connections in the pool.
    #[arg(long, default_value_t = 5)]
    max_connections: u32,

    /// Keep accounts and sessions in process memory instead of PostgreSQL.
    ///
    /// Everything is lost on exit. Meant for local development.
    #[arg(long, default_value_t = false)]
    in_memory: bool,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                tracing_subscriber::EnvFilter::new("info,tessera_core=debug,tessera_api=debug")
            }),
        )
        .init();

    let args = Args::parse();
    let config = AuthConfig::from_env()?;

    info!(
        port = args.port,
        in_memory = args.in_memory,
        algorithm = ?config.jwt.algorithm,
        "starting tessera_server"
    );

    let accounts: Arc<dyn AccountStore>;
    let sessions: Arc<dyn SessionStore>;
    if args.in_memory {
        warn!("in-memory mode: accounts and sessions are not persisted");
        accounts = Arc::new(MemoryAccountStore::new());
        sessions = Arc::new(MemorySessionStore::new());
    } else {
        info!(max_connections = args.max_connections, "configuring connection pool");
        let pool = PgPoolOptions::new()
            .max_connections(args.max_connections)
            .acquire_timeout(std::time::Duration::from_secs(30))
            .connect(&args.database_url)
            .await?;

        info!("running database migrations");
        tessera_core::migrate::migrate(&pool).await?;
        accounts = Arc::new(PgAccountStore::new(pool.clone()));
        sessions = Arc::new(PgSessionStore::new(pool));
    }

    let cache: Arc<dyn Cache> = Arc::new(MemoryCache::new());
    let signer = Arc::new(config.jwt.signer()?);

    let state = AppState::new(
        &config,
        Backends {
            accounts,
            sessions: sessions.clone(),
            cache: cache.clone(),
            signer,
        },
    );
    let app = tessera_api::router(state);

    let shutdown = CancellationToken::new();
    let maintenance = SessionMaintenance::new(sessions, cache.clone(), config.maintenance);
    let maintenance_handle = tokio::spawn({
        let shutdown = shutdown.clone();
        async move { maintenance.run(shutdown).await }
    });

    let listener = tokio::net::TcpListener::bind((args.host.as_str(), args.port)).await?;
    info!(addr = %listener.local_addr()?, "REST API listening");

    tokio::spawn({
        let shutdown = shutdown.clone();
        async move {
            if let Err(e) = tokio::signal::ctrl_c().await {
                warn!(error = %e, "cannot listen for shutdown signal");
                return;
            }
            info!("shutdown requested");
            shutdown.cancel();
        }
    });

    let api_result = axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown({
        let shutdown = shutdown.clone();
        async move { shutdown.cancelled().await }
    })
    .await;

    // Stop the worker even when the server exits on its own.
    shutdown.cancel();
    match maintenance_handle.await {
        Ok(Err(e)) => info!(reason = %e, "session maintenance stopped"),
        Ok(Ok(())) => {}
        Err(e) => warn!(error = %e, "session maintenance task failed"),
    }
    cache.close().await?;

    api_result?;

    Ok(())
}
