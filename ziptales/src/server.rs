use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use anyhow::{anyhow, Result};
use chrono::{DateTime, Utc};
use rocket::http::Status;
use rocket::serde::json::Json;
use rocket::{delete, get, post, routes, Build, Rocket, State};
use serde::{Deserialize, Serialize};
use serde_json::json;
use sqlx::{Row, SqlitePool};

use common::Config;

use crate::article::{Article, CredibilityTier, NewArticle, VoteDirection};
use crate::credibility::{Assessment, KEYWORD_TABLE_VERSION};
use crate::ingestion::{self, FetchSettings};
use crate::news::{NewsService, SaveOutcome, Submission};
use crate::profile::{self, ProfileUpdate, UserProfile};
use crate::store::{AnalysisRecord, ArticleQuery, TierFilter};
use crate::votes::VoteOutcome;

use argon2::password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString};
use argon2::Argon2;
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header as JwtHeader, Validation};
use rand::rngs::OsRng;

const DEFAULT_JWT_SECRET_ENV: &str = "ZIPTALES_JWT_SECRET";
const DEFAULT_TOKEN_TTL_HOURS: u64 = 24;

/// Application state stored inside Rocket managed state.
#[derive(Clone)]
pub struct AppState {
    pub started_at: DateTime<Utc>,
    pub config: Option<Arc<Config>>,
    pub db: SqlitePool,
    pub news: NewsService,
    pub auth: AuthSettings,
}

impl AppState {
    pub fn new(db: SqlitePool, news: NewsService, config: Option<Arc<Config>>) -> Self {
        Self {
            started_at: Utc::now(),
            auth: AuthSettings::from_config(config.as_deref()),
            config,
            db,
            news,
        }
    }
}

/// JWT claims we encode (subject = user id)
#[derive(Debug, Serialize, Deserialize)]
struct Claims {
    sub: i64,
    exp: usize,
}

/// Token signing and checking.
///
/// Handlers take the token from the JSON body (field `token`) or the query
/// string instead of a request guard. A missing or invalid token makes the
/// caller anonymous; it is never an error by itself.
#[derive(Clone)]
pub struct AuthSettings {
    secret: String,
    ttl_hours: u64,
}

impl AuthSettings {
    pub fn new(secret: impl Into<String>, ttl_hours: u64) -> Self {
        Self {
            secret: secret.into(),
            ttl_hours,
        }
    }

    /// Secret from the env var named by `[auth] jwt_secret_env`, falling back
    /// to a development secret.
    pub fn from_config(config: Option<&Config>) -> Self {
        let auth = config.and_then(|c| c.auth.as_ref());
        let env_name = auth
            .and_then(|a| a.jwt_secret_env.clone())
            .unwrap_or_else(|| DEFAULT_JWT_SECRET_ENV.to_string());
        let secret = match std::env::var(&env_name) {
            Ok(s) if !s.is_empty() => s,
            _ => {
                tracing::warn!("{} not set, signing tokens with the development secret", env_name);
                "dev-secret".to_string()
            }
        };
        let ttl_hours = auth
            .and_then(|a| a.token_ttl_hours)
            .unwrap_or(DEFAULT_TOKEN_TTL_HOURS);
        Self::new(secret, ttl_hours)
    }

    /// Create a signed JWT for a user id.
    pub fn issue(&self, user_id: i64) -> Result<String, jsonwebtoken::errors::Error> {
        let now = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
            .as_secs() as usize;
        let claims = Claims {
            sub: user_id,
            exp: now + (self.ttl_hours as usize * 3600),
        };
        encode(
            &JwtHeader::default(),
            &claims,
            &EncodingKey::from_secret(self.secret.as_bytes()),
        )
    }

    /// User id carried by `token`, if it is present and valid.
    pub fn identify(&self, token: Option<&str>) -> Option<i64> {
        let token = token.filter(|t| !t.is_empty())?;
        let key = DecodingKey::from_secret(self.secret.as_bytes());
        match decode::<Claims>(token, &key, &Validation::new(Algorithm::HS256)) {
            Ok(data) => Some(data.claims.sub),
            Err(e) => {
                tracing::warn!("auth: rejected token: {}", e);
                None
            }
        }
    }
}

/// Article as served, with its credibility band spelled out.
#[derive(Serialize)]
pub struct ArticleView {
    #[serde(flatten)]
    pub article: Article,
    pub tier: CredibilityTier,
    pub tier_label: &'static str,
}

impl From<Article> for ArticleView {
    fn from(article: Article) -> Self {
        let tier = article.tier();
        ArticleView {
            article,
            tier,
            tier_label: tier.label(),
        }
    }
}

#[derive(Serialize)]
struct ArticleDetail {
    #[serde(flatten)]
    view: ArticleView,
    analyses: Vec<AnalysisRecord>,
}

/// Response structure for `/api/v1/status`.
#[derive(Serialize)]
struct StatusResponse {
    status: &'static str,
    uptime_seconds: i64,
    users_count: usize,
    feeds_count: usize,
    remote_analysis: bool,
    keyword_table_version: u32,
}

#[derive(Serialize)]
struct AnalyzeResponse {
    #[serde(flatten)]
    assessment: Assessment,
    tier: CredibilityTier,
    verdict: &'static str,
}

/// Request body for user registration.
#[derive(Deserialize)]
struct RegisterRequest {
    username: String,
    display_name: Option<String>,
    email: Option<String>,
    password: String,
}

/// Request body for user login.
#[derive(Deserialize)]
struct LoginRequest {
    username: String,
    password: String,
}

#[derive(Deserialize)]
struct SubmitRequest {
    token: Option<String>,
    #[serde(flatten)]
    article: NewArticle,
}

#[derive(Deserialize)]
struct ProfileRequest {
    token: Option<String>,
    #[serde(flatten)]
    update: ProfileUpdate,
}

#[derive(Deserialize)]
struct AnalyzeRequest {
    text: String,
}

#[derive(Deserialize)]
struct VoteRequest {
    token: Option<String>,
    direction: VoteDirection,
}

/// Body of endpoints that only need the caller's identity.
#[derive(Deserialize)]
struct TokenRequest {
    token: Option<String>,
}

/// Store failures become 503 so clients retry and keep their prior view.
fn unavailable(what: &str, e: anyhow::Error) -> Status {
    tracing::error!("{}: {:#}", what, e);
    Status::ServiceUnavailable
}

fn not_applied(reason: &str) -> Json<serde_json::Value> {
    Json(json!({ "applied": false, "reason": reason }))
}

#[get("/health")]
async fn health() -> &'static str {
    "OK"
}

/// Status endpoint returning simple JSON with uptime and basic config info.
#[get("/api/v1/status")]
async fn status(state: &State<AppState>) -> Json<StatusResponse> {
    let uptime = (Utc::now() - state.started_at).num_seconds();
    let (users_count, feeds_count) = match &state.config {
        Some(cfg) => (cfg.users.len(), cfg.feeds.len()),
        None => (0, 0),
    };

    Json(StatusResponse {
        status: "ok",
        uptime_seconds: uptime,
        users_count,
        feeds_count,
        remote_analysis: state.news.analyzer().has_remote(),
        keyword_table_version: KEYWORD_TABLE_VERSION,
    })
}

/// Register endpoint: create a user with hashed password and return a JWT.
#[post("/api/v1/register", data = "<body>")]
async fn register(
    state: &State<AppState>,
    body: Json<RegisterRequest>,
) -> Result<Json<serde_json::Value>, Status> {
    if body.username.trim().is_empty() || body.password.is_empty() {
        return Err(Status::BadRequest);
    }

    // Hash password with Argon2 + random salt
    let salt = SaltString::generate(&mut OsRng);
    let password_hash = Argon2::default()
        .hash_password(body.password.as_bytes(), &salt)
        .map_err(|e| {
            tracing::error!("failed to hash password: {}", e);
            Status::InternalServerError
        })?
        .to_string();

    let res = sqlx::query(
        "INSERT INTO users (username, display_name, email, password_hash, reputation) VALUES (?, ?, ?, ?, ?)",
    )
    .bind(body.username.trim())
    .bind(body.display_name.clone())
    .bind(body.email.as_deref().map(str::trim).filter(|e| !e.is_empty()))
    .bind(&password_hash)
    .bind(i64::from(profile::NEW_USER_REPUTATION))
    .execute(&state.db)
    .await
    .map_err(|e| match e {
        sqlx::Error::Database(db) if db.message().contains("UNIQUE") => Status::Conflict,
        other => {
            tracing::error!("failed to insert user: {}", other);
            Status::ServiceUnavailable
        }
    })?;

    let user_id = res.last_insert_rowid();
    tracing::info!(user_id, "user registered");

    match state.auth.issue(user_id) {
        Ok(token) => Ok(Json(json!({ "token": token, "user_id": user_id }))),
        Err(e) => {
            tracing::error!("failed to create jwt: {}", e);
            Err(Status::InternalServerError)
        }
    }
}

/// Login endpoint: verify password and return JWT.
#[post("/api/v1/login", data = "<body>")]
async fn login(
    state: &State<AppState>,
    body: Json<LoginRequest>,
) -> Result<Json<serde_json::Value>, Status> {
    let row = sqlx::query("SELECT id, password_hash FROM users WHERE username = ?")
        .bind(&body.username)
        .fetch_optional(&state.db)
        .await
        .map_err(|e| {
            tracing::error!("db error on login: {}", e);
            Status::ServiceUnavailable
        })?
        .ok_or(Status::Unauthorized)?;

    let user_id = row.get::<i64, _>("id");
    // Users seeded from config without a hash cannot log in
    let stored_hash = row
        .get::<Option<String>, _>("password_hash")
        .ok_or(Status::Unauthorized)?;

    let parsed_hash = PasswordHash::new(&stored_hash).map_err(|e| {
        tracing::error!("invalid password hash in db: {}", e);
        Status::InternalServerError
    })?;

    Argon2::default()
        .verify_password(body.password.as_bytes(), &parsed_hash)
        .map_err(|e| {
            tracing::warn!("password verify failed: {}", e);
            Status::Unauthorized
        })?;

    match state.auth.issue(user_id) {
        Ok(token) => Ok(Json(json!({ "token": token, "user_id": user_id }))),
        Err(e) => {
            tracing::error!("failed to create jwt: {}", e);
            Err(Status::InternalServerError)
        }
    }
}

#[get("/api/v1/profile?<token>")]
async fn get_profile(
    state: &State<AppState>,
    token: Option<String>,
) -> Result<Json<UserProfile>, Status> {
    let user_id = state
        .auth
        .identify(token.as_deref())
        .ok_or(Status::Unauthorized)?;
    profile::get_profile(&state.db, user_id)
        .await
        .map_err(|e| unavailable("failed to load profile", e))?
        .map(Json)
        .ok_or(Status::NotFound)
}

#[post("/api/v1/profile", data = "<body>")]
async fn update_profile(
    state: &State<AppState>,
    body: Json<ProfileRequest>,
) -> Result<Json<serde_json::Value>, Status> {
    let body = body.into_inner();
    let Some(user_id) = state.auth.identify(body.token.as_deref()) else {
        return Ok(not_applied("unauthenticated"));
    };
    if let Err(message) = body.update.validate() {
        return Ok(Json(json!({
            "applied": false,
            "reason": "invalid",
            "message": message,
        })));
    }

    let updated = profile::update_profile(&state.db, user_id, &body.update)
        .await
        .map_err(|e| unavailable("failed to update profile", e))?
        .ok_or(Status::NotFound)?;
    tracing::info!(user_id, "profile updated");
    Ok(Json(json!({ "applied": true, "profile": updated })))
}

/// Newest first, optionally narrowed by category, search text and credibility band.
#[get("/api/v1/articles?<category>&<q>&<filter>&<limit>")]
async fn list_articles(
    state: &State<AppState>,
    category: Option<String>,
    q: Option<String>,
    filter: Option<String>,
    limit: Option<usize>,
) -> Result<Json<Vec<ArticleView>>, Status> {
    let filter = match filter.as_deref() {
        Some(f) => f.parse::<TierFilter>().map_err(|e| {
            tracing::warn!("list_articles: {}", e);
            Status::BadRequest
        })?,
        None => TierFilter::All,
    };
    let query = ArticleQuery {
        category,
        search: q,
        filter,
        limit,
    };

    let articles = state
        .news
        .list(&query)
        .await
        .map_err(|e| unavailable("failed to list articles", e))?;
    Ok(Json(articles.into_iter().map(ArticleView::from).collect()))
}

#[get("/api/v1/articles/<id>")]
async fn get_article(state: &State<AppState>, id: &str) -> Result<Json<ArticleDetail>, Status> {
    let article = state
        .news
        .get(id)
        .await
        .map_err(|e| unavailable("failed to load article", e))?
        .ok_or(Status::NotFound)?;
    let analyses = state
        .news
        .analyses(id)
        .await
        .map_err(|e| unavailable("failed to load analyses", e))?;

    Ok(Json(ArticleDetail {
        view: article.into(),
        analyses,
    }))
}

#[post("/api/v1/articles", data = "<body>")]
async fn submit_article(
    state: &State<AppState>,
    body: Json<SubmitRequest>,
) -> Result<Json<serde_json::Value>, Status> {
    let body = body.into_inner();
    let user_id = state.auth.identify(body.token.as_deref());

    let submission = state
        .news
        .submit_article(user_id, body.article)
        .await
        .map_err(|e| unavailable("failed to store article", e))?;

    Ok(match submission {
        Submission::Accepted { article, assessment } => Json(json!({
            "applied": true,
            "article": ArticleView::from(article),
            "assessment": assessment,
        })),
        Submission::Unauthenticated => not_applied("unauthenticated"),
        Submission::Invalid { reason } => Json(json!({
            "applied": false,
            "reason": "invalid",
            "message": reason,
        })),
        Submission::Duplicate { article_id } => Json(json!({
            "applied": false,
            "reason": "duplicate",
            "article_id": article_id,
        })),
    })
}

/// Score text without storing it.
#[post("/api/v1/analyze", data = "<body>")]
async fn analyze(state: &State<AppState>, body: Json<AnalyzeRequest>) -> Json<AnalyzeResponse> {
    let assessment = state.news.analyze_text(&body.text).await;
    Json(AnalyzeResponse {
        tier: assessment.tier(),
        verdict: assessment.verdict(),
        assessment,
    })
}

#[post("/api/v1/articles/<id>/vote", data = "<body>")]
async fn vote(
    state: &State<AppState>,
    id: &str,
    body: Json<VoteRequest>,
) -> Result<Json<serde_json::Value>, Status> {
    let user_id = state.auth.identify(body.token.as_deref());
    let outcome = state
        .news
        .vote(user_id, id, body.direction)
        .await
        .map_err(|e| unavailable("failed to record vote", e))?;

    Ok(match outcome {
        VoteOutcome::Accepted(article) => Json(json!({
            "applied": true,
            "article": ArticleView::from(article),
        })),
        VoteOutcome::AlreadyVoted => not_applied("already_voted"),
        VoteOutcome::UnknownArticle => not_applied("unknown_article"),
        VoteOutcome::Unauthenticated => not_applied("unauthenticated"),
    })
}

#[post("/api/v1/articles/<id>/save", data = "<body>")]
async fn toggle_saved(
    state: &State<AppState>,
    id: &str,
    body: Json<TokenRequest>,
) -> Result<Json<serde_json::Value>, Status> {
    let user_id = state.auth.identify(body.token.as_deref());
    let outcome = state
        .news
        .toggle_saved(user_id, id)
        .await
        .map_err(|e| unavailable("failed to toggle saved article", e))?;

    Ok(match outcome {
        SaveOutcome::Toggled { saved } => Json(json!({ "applied": true, "saved": saved })),
        SaveOutcome::UnknownArticle => not_applied("unknown_article"),
        SaveOutcome::Unauthenticated => not_applied("unauthenticated"),
    })
}

#[get("/api/v1/saved?<token>")]
async fn saved_articles(
    state: &State<AppState>,
    token: Option<String>,
) -> Result<Json<Vec<ArticleView>>, Status> {
    let user_id = state
        .auth
        .identify(token.as_deref())
        .ok_or(Status::Unauthorized)?;
    let articles = state
        .news
        .saved_articles(user_id)
        .await
        .map_err(|e| unavailable("failed to load saved articles", e))?;
    Ok(Json(articles.into_iter().map(ArticleView::from).collect()))
}

#[delete("/api/v1/saved?<token>")]
async fn clear_saved(
    state: &State<AppState>,
    token: Option<String>,
) -> Result<Json<serde_json::Value>, Status> {
    let user_id = state
        .auth
        .identify(token.as_deref())
        .ok_or(Status::Unauthorized)?;
    let cleared = state
        .news
        .clear_saved(user_id)
        .await
        .map_err(|e| unavailable("failed to clear saved articles", e))?;
    Ok(Json(json!({ "cleared": cleared })))
}

#[get("/api/v1/stats?<category>")]
async fn stats(
    state: &State<AppState>,
    category: Option<String>,
) -> Result<Json<crate::news::FeedStats>, Status> {
    state
        .news
        .stats(category.as_deref())
        .await
        .map(Json)
        .map_err(|e| unavailable("failed to compute stats", e))
}

/// Pull the configured feeds once. Runs inline; the response carries the report.
#[post("/api/v1/refresh", data = "<body>")]
async fn refresh(
    state: &State<AppState>,
    body: Json<TokenRequest>,
) -> Result<Json<serde_json::Value>, Status> {
    let Some(user_id) = state.auth.identify(body.token.as_deref()) else {
        return Ok(not_applied("unauthenticated"));
    };

    let (feeds, settings) = match &state.config {
        Some(cfg) => (cfg.feeds.clone(), FetchSettings::from_config(cfg.ingestion.as_ref())),
        None => (Vec::new(), FetchSettings::default()),
    };
    tracing::info!(user_id, feeds = feeds.len(), "manual refresh triggered");

    let report = ingestion::refresh_feeds(&state.news, &feeds, settings)
        .await
        .map_err(|e| unavailable("feed refresh failed", e))?;

    Ok(Json(json!({ "applied": true, "report": report })))
}

/// Build the Rocket instance with managed state and routes, applying
/// `[server] bind` and `port` from the config when present.
pub fn build_rocket(state: AppState) -> Rocket<Build> {
    let mut fig = rocket::Config::figment();
    if let Some(server) = state.config.as_ref().and_then(|c| c.server.as_ref()) {
        if let Some(bind) = &server.bind {
            fig = fig.merge(("address", bind.clone()));
        }
        if let Some(port) = server.port {
            fig = fig.merge(("port", port));
        }
    }

    rocket::custom(fig).manage(state).mount(
        "/",
        routes![
            health,
            status,
            register,
            login,
            get_profile,
            update_profile,
            list_articles,
            get_article,
            submit_article,
            analyze,
            vote,
            toggle_saved,
            saved_articles,
            clear_saved,
            stats,
            refresh,
        ],
    )
}

/// Launch the HTTP server and wait until it shuts down (SIGINT/SIGTERM etc.).
///
/// The DB pool, schema and service are prepared by the caller.
pub async fn launch_rocket(state: AppState) -> Result<()> {
    tracing::info!("Starting Rocket HTTP server");
    build_rocket(state)
        .launch()
        .await
        .map_err(|e| anyhow!("Rocket failed: {}", e))?;

    tracing::info!("Rocket HTTP server has shut down");
    Ok(())
}
