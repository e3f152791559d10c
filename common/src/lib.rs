/*!
common/src/lib.rs

Shared configuration types and DB helper functions for ZipTales.

This file provides:
- Config data structures (deserialized from TOML)
- An async loader that merges a default file with an optional override
- Helpers to open an SQLite pool and seed configured users
*/

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::SqlitePool;
use std::path::Path;
use std::str::FromStr;

/// Database configuration section
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    /// Path to the sqlite database file (e.g. "data/ziptales.db")
    pub path: String,
}

/// HTTP listener settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    pub bind: Option<String>,
    pub port: Option<u16>,
}

/// Remote LLM config (used if `llm.adapter = "remote"`)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RemoteLlmConfig {
    pub api_url: Option<String>,
    pub api_key_env: Option<String>,
    pub model: Option<String>,
    pub timeout_seconds: Option<u64>,
    pub max_tokens: Option<usize>,
}

/// LLM top-level config
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmConfig {
    pub adapter: Option<String>, // "remote", "none"
    pub remote: Option<RemoteLlmConfig>,
}

/// Credibility analysis tuning
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CredibilityConfig {
    /// Upper bound for the remote scoring call before falling back to the keyword heuristic
    pub remote_timeout_seconds: Option<u64>,
    /// Texts shorter than this skip the remote call entirely
    pub min_remote_chars: Option<usize>,
}

/// Token signing settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthConfig {
    /// Name of the env var holding the HS256 secret
    pub jwt_secret_env: Option<String>,
    pub token_ttl_hours: Option<u64>,
}

/// External news feed pulled on refresh
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FeedConfig {
    pub url: String,
    pub title: Option<String>,
    /// Category assigned to every article coming from this feed
    pub category: Option<String>,
}

/// Feed fetching behavior
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IngestionConfig {
    pub fetch_timeout_seconds: Option<u64>,
    pub max_retries: Option<u32>,
}

/// Users seeded into the database at startup
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserConfig {
    pub username: String,
    pub display_name: Option<String>,
    pub password_hash: Option<String>,
}

/// Admin / maintenance config
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AdminConfig {
    pub auto_migrate: Option<bool>,
}

/// Top-level application configuration (deserialized from config.toml)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub database: DatabaseConfig,
    pub server: Option<ServerConfig>,
    pub llm: Option<LlmConfig>,
    #[serde(default)]
    pub credibility: CredibilityConfig,
    pub auth: Option<AuthConfig>,
    #[serde(default)]
    pub feeds: Vec<FeedConfig>,
    pub ingestion: Option<IngestionConfig>,
    #[serde(default)]
    pub users: Vec<UserConfig>,
    pub admin: Option<AdminConfig>,
}

impl Config {
    /// Load configuration from a TOML file asynchronously.
    ///
    /// Example:
    ///   let cfg = Config::from_file("config.toml").await?;
    pub async fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let data = tokio::fs::read_to_string(path.as_ref())
            .await
            .with_context(|| format!("Failed to read config file: {}", path.as_ref().display()))?;
        let cfg: Config = toml::from_str(&data).context("Failed to parse TOML configuration")?;
        cfg.validate()?;
        Ok(cfg)
    }

    /// Load configuration with an optional default file and an optional override file.
    /// If both are present, they are merged (override takes precedence).
    pub async fn load_with_defaults(default_path: Option<&Path>, override_path: Option<&Path>) -> Result<Self> {
        let mut config_value = toml::Value::Table(toml::map::Map::new());

        for path in [default_path, override_path].into_iter().flatten() {
            if path.exists() {
                let data = tokio::fs::read_to_string(path).await
                    .with_context(|| format!("Failed to read config: {}", path.display()))?;
                let val: toml::Value = toml::from_str(&data)
                    .with_context(|| format!("Failed to parse configuration: {}", path.display()))?;
                merge_toml(&mut config_value, val);
            }
        }

        let cfg: Config = config_value.try_into().context("Failed to parse merged configuration")?;
        cfg.validate()?;
        Ok(cfg)
    }

    /// Reject feed and LLM endpoints that are not absolute URLs.
    pub fn validate(&self) -> Result<()> {
        for feed in &self.feeds {
            url::Url::parse(&feed.url)
                .with_context(|| format!("Invalid feed url in config: {}", feed.url))?;
        }
        if let Some(api_url) = self
            .llm
            .as_ref()
            .and_then(|l| l.remote.as_ref())
            .and_then(|r| r.api_url.as_deref())
        {
            url::Url::parse(api_url)
                .with_context(|| format!("Invalid llm.remote.api_url: {}", api_url))?;
        }
        Ok(())
    }
}

fn merge_toml(a: &mut toml::Value, b: toml::Value) {
    match (a, b) {
        (toml::Value::Table(a_map), toml::Value::Table(b_map)) => {
            for (k, v) in b_map {
                if let Some(a_val) = a_map.get_mut(&k) {
                    merge_toml(a_val, v);
                } else {
                    a_map.insert(k, v);
                }
            }
        }
        (a_val, b_val) => *a_val = b_val,
    }
}

/// Initialize an SQLite connection pool.
///
/// Creates the parent directory and the DB file if necessary and returns a
/// WAL-mode pool capped at 5 connections.
///
/// Example:
///   let pool = init_db_pool("data/ziptales.db").await?;
pub async fn init_db_pool(path: &str) -> Result<SqlitePool> {
    if let Some(parent) = Path::new(path).parent() {
        tokio::fs::create_dir_all(parent).await.with_context(|| {
            format!("Failed to create DB parent directory: {}", parent.display())
        })?;
    }

    // Touch the file first so permission problems surface with a clear message.
    tokio::fs::OpenOptions::new()
        .create(true)
        .write(true)
        .open(path)
        .await
        .with_context(|| format!("Failed to create or open DB file: {}", path))?;

    let options = SqliteConnectOptions::from_str(&format!("sqlite://{}", path))?
        .create_if_missing(true)
        .foreign_keys(true)
        .journal_mode(sqlx::sqlite::SqliteJournalMode::Wal);

    let pool = SqlitePoolOptions::new()
        .max_connections(5)
        .connect_with(options)
        .await
        .with_context(|| format!("Failed to connect to sqlite database at path: {}", path))?;

    Ok(pool)
}

/// Ensure that users defined in the configuration are present in the `users` table.
///  - INSERT OR IGNORE a row for each configured user (safe to call repeatedly)
///  - UPDATE `display_name` and `password_hash` when the config provides them
pub async fn sync_users(config: &Config, pool: &SqlitePool) -> Result<()> {
    for u in &config.users {
        sqlx::query(
            "INSERT OR IGNORE INTO users (username, display_name, password_hash) VALUES (?, ?, ?)"
        )
        .bind(&u.username)
        .bind(u.display_name.clone())
        .bind(u.password_hash.clone())
        .execute(pool)
        .await
        .with_context(|| format!("failed to insert or ignore user {}", u.username))?;

        // COALESCE keeps existing values when the config leaves a field out
        sqlx::query(
            "UPDATE users SET display_name = COALESCE(?, display_name), password_hash = COALESCE(?, password_hash) WHERE username = ?"
        )
        .bind(u.display_name.clone())
        .bind(u.password_hash.clone())
        .bind(&u.username)
        .execute(pool)
        .await
        .with_context(|| format!("failed to update user {}", u.username))?;
    }

    Ok(())
}
