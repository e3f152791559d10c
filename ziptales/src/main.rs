/*
ziptales - single-binary main.rs
Starts the Rocket HTTP server, or runs one feed refresh with --refresh-only.
*/

use anyhow::Result;
use clap::Parser;
use common::{init_db_pool, Config};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{error, info};
use tracing_subscriber::{fmt, EnvFilter};

use ziptales::ingestion::{self, FetchSettings};
use ziptales::news::NewsService;
use ziptales::server::{launch_rocket, AppState};
use ziptales::store::{sqlite, ArticleStore, SqliteArticleStore};

#[derive(Parser, Debug)]
#[command(name = "ziptales", about = "ZipTales news credibility server")]
struct Args {
    /// Path to config.toml
    #[arg(long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Pull the configured feeds once and exit (do not bind HTTP server)
    #[arg(long)]
    refresh_only: bool,

    /// Override log level (info, debug, warn, error)
    #[arg(long, default_value = "info")]
    log_level: String,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let filter = EnvFilter::try_new(&args.log_level).unwrap_or_else(|_| EnvFilter::new("info"));
    fmt().with_env_filter(filter).init();

    // Resolve config paths
    let default_path = PathBuf::from("config.default.toml");

    let override_path = if let Some(p) = args.config {
        if !p.exists() {
            error!(path = ?p, "specified config file not found");
            return Err(anyhow::anyhow!("Config file not found: {}", p.display()));
        }
        Some(p)
    } else {
        let p = PathBuf::from("config.toml");
        if p.exists() { Some(p) } else { None }
    };

    let config = match Config::load_with_defaults(
        if default_path.exists() { Some(&default_path) } else { None },
        override_path.as_deref(),
    )
    .await
    {
        Ok(cfg) => cfg,
        Err(e) => {
            error!("failed to load configuration: {:#}", e);
            return Err(e);
        }
    };
    info!(default = ?default_path, override = ?override_path, "configuration loaded");

    let db_path_abs = match tokio::fs::canonicalize(&config.database.path).await {
        Ok(p) => p.to_string_lossy().to_string(),
        Err(_) => config.database.path.clone(),
    };
    info!(db_path = %db_path_abs, "resolved DB path");

    let db_pool = match init_db_pool(&db_path_abs).await {
        Ok(p) => p,
        Err(e) => {
            error!(db_path = %db_path_abs, "failed to initialize database pool: {:#}", e);
            return Err(e);
        }
    };

    if config
        .admin
        .as_ref()
        .and_then(|a| a.auto_migrate)
        .unwrap_or(true)
    {
        sqlite::ensure_schema(&db_pool).await?;
    } else {
        info!("admin.auto_migrate = false: assuming the schema is in place");
    }
    common::sync_users(&config, &db_pool).await?;
    info!("Configuration users synchronized into database");

    let store: Arc<dyn ArticleStore> = Arc::new(SqliteArticleStore::new(db_pool.clone()));
    let news = NewsService::from_config(&config, store);

    if args.refresh_only {
        info!("Running a single feed refresh");
        let settings = FetchSettings::from_config(config.ingestion.as_ref());
        let report = ingestion::refresh_feeds(&news, &config.feeds, settings).await?;
        info!(
            feeds = report.feeds_checked,
            failed = report.feeds_failed,
            new_articles = report.new_article_ids.len(),
            skipped = report.skipped,
            "refresh finished"
        );
        return Ok(());
    }

    let state = AppState::new(db_pool, news, Some(Arc::new(config)));

    info!("Launching Rocket HTTP server");
    if let Err(e) = launch_rocket(state).await {
        error!("Rocket server failed: {:#}", e);
        return Err(e);
    }

    info!("Shutdown complete");
    Ok(())
}
