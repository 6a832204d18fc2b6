//! mosifra-web - Mosifra platform service
//!
//! HTTP/JSON backend for the Mosifra platform: account registration and
//! login with emailed two-factor codes, CSV-driven student invitations,
//! and the admin approval pipeline for organisation accounts.

use std::sync::Arc;

use anyhow::Result;
use clap::Parser;
use mosifra_common::config::ServerConfig;
use mosifra_common::db::init_database;
use mosifra_common::email::{HttpMailer, LogMailer, Mailer};
use mosifra_web::{build_router, AppState};
use tracing::info;

#[derive(Parser, Debug)]
#[command(name = "mosifra-web", about = "Mosifra platform service")]
struct Cli {
    /// Data folder (overrides config file and MOSIFRA_DATA_DIR)
    #[arg(long)]
    data_dir: Option<String>,

    /// HTTP port (overrides config file and MOSIFRA_PORT)
    #[arg(long)]
    port: Option<u16>,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::INFO.into()),
        )
        .init();

    // Log build identification immediately, before any database delays
    info!(
        "Starting Mosifra platform service (mosifra-web) v{} [{}] built {} ({})",
        env!("CARGO_PKG_VERSION"),
        env!("GIT_HASH"),
        env!("BUILD_TIMESTAMP"),
        env!("BUILD_PROFILE")
    );

    let cli = Cli::parse();
    let config = ServerConfig::resolve(cli.data_dir.as_deref(), cli.port)?;

    std::fs::create_dir_all(&config.data_dir)?;
    let db_path = config.database_path();
    info!("Database path: {}", db_path.display());

    let pool = init_database(&db_path).await?;
    info!("✓ Database initialized");

    let mailer: Arc<dyn Mailer> = match HttpMailer::from_settings(&config.mail) {
        Some(mailer) => {
            info!("✓ Outbound mail via HTTP mail API");
            Arc::new(mailer)
        }
        None => {
            info!("No mail endpoint configured - emails will be logged only");
            Arc::new(LogMailer)
        }
    };

    let addr = format!("{}:{}", config.host, config.port);
    let state = AppState::new(pool, mailer, config);
    let app = build_router(state);

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    info!("mosifra-web listening on http://{}", addr);
    info!("Health check: http://{}/health", addr);

    axum::serve(listener, app).await?;

    Ok(())
}
