use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use sqlx::sqlite::SqlitePoolOptions;
use sqlx::{Row, Sqlite, SqlitePool};
use tracing::{debug, info};

use super::{AnalysisRecord, ArticleQuery, ArticleStore, Rescore};
use crate::article::{Article, VoteDirection, Votes};
use crate::profile;
use crate::votes::VoteOutcome;

const ARTICLE_COLUMNS: &str = "id, title, summary, content, author, source, category, url, \
     published_at, tags_json, location, image_url, credibility_score, upvotes, downvotes, verified, \
     submitted_by";

/// SQLite-backed article store
#[derive(Clone)]
pub struct SqliteArticleStore {
    pool: SqlitePool,
}

impl SqliteArticleStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Private in-memory database with the schema applied.
    ///
    /// Uses a single connection that never expires, since every SQLite
    /// `:memory:` connection is a separate database.
    pub async fn in_memory() -> Result<Self> {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect("sqlite::memory:")
            .await
            .context("failed to open in-memory sqlite database")?;
        ensure_schema(&pool).await?;
        Ok(Self::new(pool))
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }
}

#[derive(sqlx::FromRow)]
struct ArticleRow {
    id: String,
    title: String,
    summary: String,
    content: String,
    author: String,
    source: String,
    category: String,
    url: Option<String>,
    published_at: DateTime<Utc>,
    tags_json: String,
    location: Option<String>,
    image_url: Option<String>,
    credibility_score: i64,
    upvotes: i64,
    downvotes: i64,
    verified: bool,
    submitted_by: Option<i64>,
}

impl TryFrom<ArticleRow> for Article {
    type Error = anyhow::Error;

    fn try_from(row: ArticleRow) -> Result<Self> {
        let tags: Vec<String> = serde_json::from_str(&row.tags_json)
            .with_context(|| format!("corrupt tags for article {}", row.id))?;
        Ok(Article {
            id: row.id,
            title: row.title,
            summary: row.summary,
            content: row.content,
            author: row.author,
            source: row.source,
            category: row.category,
            url: row.url,
            published_at: row.published_at,
            tags,
            location: row.location,
            image_url: row.image_url,
            credibility_score: row.credibility_score.clamp(0, 100) as u8,
            votes: Votes {
                upvotes: row.upvotes.max(0) as u32,
                downvotes: row.downvotes.max(0) as u32,
            },
            verified: row.verified,
            submitted_by: row.submitted_by,
        })
    }
}

async fn fetch_article<'e, E>(executor: E, id: &str) -> Result<Option<Article>>
where
    E: sqlx::Executor<'e, Database = Sqlite>,
{
    let row = sqlx::query_as::<_, ArticleRow>(&format!(
        "SELECT {} FROM articles WHERE id = ?",
        ARTICLE_COLUMNS
    ))
    .bind(id)
    .fetch_optional(executor)
    .await
    .context("failed to fetch article")?;

    row.map(Article::try_from).transpose()
}

#[async_trait::async_trait]
impl ArticleStore for SqliteArticleStore {
    async fn get_article(&self, id: &str) -> Result<Option<Article>> {
        fetch_article(&self.pool, id).await
    }

    async fn find_by_url(&self, url: &str) -> Result<Option<Article>> {
        let row = sqlx::query_as::<_, ArticleRow>(&format!(
            "SELECT {} FROM articles WHERE url = ?",
            ARTICLE_COLUMNS
        ))
        .bind(url)
        .fetch_optional(&self.pool)
        .await
        .context("failed to look up article by url")?;

        row.map(Article::try_from).transpose()
    }

    async fn list_articles(&self, query: &ArticleQuery) -> Result<Vec<Article>> {
        let (min_score, max_score) = query.filter.score_range();
        let category = query.category.as_deref().filter(|c| !c.is_empty());

        // Category and tier are filtered in SQL; the text search runs in Rust
        // because SQLite's lower() only folds ASCII.
        let rows = sqlx::query_as::<_, ArticleRow>(&format!(
            r#"
            SELECT {}
            FROM articles
            WHERE (?1 IS NULL OR category = ?1 COLLATE NOCASE)
              AND credibility_score BETWEEN ?2 AND ?3
            ORDER BY published_at DESC, rowid DESC
            "#,
            ARTICLE_COLUMNS
        ))
        .bind(category)
        .bind(i64::from(min_score))
        .bind(i64::from(max_score))
        .fetch_all(&self.pool)
        .await
        .context("failed to list articles")?;

        let mut articles = Vec::with_capacity(rows.len());
        for row in rows {
            let article = Article::try_from(row)?;
            if query.matches_search(&article) {
                articles.push(article);
                if query.limit.map_or(false, |l| articles.len() >= l) {
                    break;
                }
            }
        }
        Ok(articles)
    }

    async fn insert_article(&self, article: &Article) -> Result<()> {
        let tags_json = serde_json::to_string(&article.tags).context("failed to serialize tags")?;

        sqlx::query(
            r#"
            INSERT INTO articles
            (id, title, summary, content, author, source, category, url,
             published_at, tags_json, location, image_url, credibility_score, upvotes, downvotes,
             verified, submitted_by)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&article.id)
        .bind(&article.title)
        .bind(&article.summary)
        .bind(&article.content)
        .bind(&article.author)
        .bind(&article.source)
        .bind(&article.category)
        .bind(&article.url)
        .bind(article.published_at)
        .bind(&tags_json)
        .bind(&article.location)
        .bind(&article.image_url)
        .bind(i64::from(article.credibility_score))
        .bind(i64::from(article.votes.upvotes))
        .bind(i64::from(article.votes.downvotes))
        .bind(article.verified)
        .bind(article.submitted_by)
        .execute(&self.pool)
        .await
        .with_context(|| format!("failed to insert article {}", article.id))?;

        debug!("Stored article {} ({})", article.id, article.title);
        Ok(())
    }

    async fn has_voted(&self, user_id: i64, article_id: &str) -> Result<bool> {
        let existing = sqlx::query_scalar::<_, i64>(
            "SELECT id FROM votes WHERE user_id = ? AND article_id = ?",
        )
        .bind(user_id)
        .bind(article_id)
        .fetch_optional(&self.pool)
        .await
        .context("failed to check existing vote")?;

        Ok(existing.is_some())
    }

    async fn record_vote(
        &self,
        user_id: i64,
        article_id: &str,
        direction: VoteDirection,
        rescore: Rescore,
    ) -> Result<VoteOutcome> {
        let mut tx = self.pool.begin().await.context("failed to begin vote transaction")?;

        // The insert comes first so the write lock is held before anything is read.
        let inserted = sqlx::query(
            r#"
            INSERT OR IGNORE INTO votes (user_id, article_id, direction)
            SELECT ?, id, ? FROM articles WHERE id = ?
            "#,
        )
        .bind(user_id)
        .bind(direction.as_str())
        .bind(article_id)
        .execute(&mut tx)
        .await
        .context("failed to insert vote")?;

        if inserted.rows_affected() == 0 {
            let known = sqlx::query_scalar::<_, String>("SELECT id FROM articles WHERE id = ?")
                .bind(article_id)
                .fetch_optional(&mut tx)
                .await
                .context("failed to check article")?;
            tx.rollback().await.context("failed to roll back vote")?;
            return Ok(if known.is_some() {
                VoteOutcome::AlreadyVoted
            } else {
                VoteOutcome::UnknownArticle
            });
        }

        let counter = match direction {
            VoteDirection::Up => "upvotes",
            VoteDirection::Down => "downvotes",
        };
        let row = sqlx::query(&format!(
            "UPDATE articles SET {0} = {0} + 1 WHERE id = ? \
             RETURNING credibility_score, upvotes, downvotes, verified, submitted_by",
            counter
        ))
        .bind(article_id)
        .fetch_one(&mut tx)
        .await
        .context("failed to increment vote counter")?;

        let old_score: i64 = row.try_get("credibility_score")?;
        let votes = Votes {
            upvotes: row.try_get::<i64, _>("upvotes")?.max(0) as u32,
            downvotes: row.try_get::<i64, _>("downvotes")?.max(0) as u32,
        };
        let was_verified: bool = row.try_get("verified")?;
        let submitted_by: Option<i64> = row.try_get("submitted_by")?;
        let new_score = rescore(old_score.clamp(0, 100) as u8, votes);
        let now_verified = Article::is_trusted_score(new_score);

        sqlx::query("UPDATE articles SET credibility_score = ?, verified = ? WHERE id = ?")
            .bind(i64::from(new_score))
            .bind(now_verified)
            .bind(article_id)
            .execute(&mut tx)
            .await
            .context("failed to update credibility score")?;

        if let (false, true, Some(submitter)) = (was_verified, now_verified, submitted_by) {
            profile::award_reputation(&mut tx, submitter, profile::VERIFIED_SUBMISSION_POINTS).await?;
            info!("Article {} verified, credited user {}", article_id, submitter);
        }

        let article = fetch_article(&mut tx, article_id)
            .await?
            .context("article vanished during vote")?;

        tx.commit().await.context("failed to commit vote")?;

        Ok(VoteOutcome::Accepted(article))
    }

    async fn toggle_saved(&self, user_id: i64, article_id: &str) -> Result<bool> {
        let mut tx = self.pool.begin().await.context("failed to begin save transaction")?;

        let removed = sqlx::query("DELETE FROM saved_articles WHERE user_id = ? AND article_id = ?")
            .bind(user_id)
            .bind(article_id)
            .execute(&mut tx)
            .await
            .context("failed to remove saved article")?;

        let now_saved = if removed.rows_affected() > 0 {
            false
        } else {
            sqlx::query("INSERT INTO saved_articles (user_id, article_id) VALUES (?, ?)")
                .bind(user_id)
                .bind(article_id)
                .execute(&mut tx)
                .await
                .context("failed to save article")?;
            true
        };

        tx.commit().await.context("failed to commit save toggle")?;
        Ok(now_saved)
    }

    async fn saved_article_ids(&self, user_id: i64) -> Result<Vec<String>> {
        sqlx::query_scalar::<_, String>(
            "SELECT article_id FROM saved_articles WHERE user_id = ? ORDER BY id",
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await
        .context("failed to list saved articles")
    }

    async fn clear_saved(&self, user_id: i64) -> Result<usize> {
        let res = sqlx::query("DELETE FROM saved_articles WHERE user_id = ?")
            .bind(user_id)
            .execute(&self.pool)
            .await
            .context("failed to clear saved articles")?;
        Ok(res.rows_affected() as usize)
    }

    async fn store_analysis(&self, record: &AnalysisRecord) -> Result<()> {
        let notes_json = serde_json::to_string(&record.notes).context("failed to serialize notes")?;

        sqlx::query(
            r#"
            INSERT INTO credibility_analyses
            (article_id, score, method, model, table_version, notes_json, created_at)
            VALUES (?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&record.article_id)
        .bind(i64::from(record.score))
        .bind(&record.method)
        .bind(&record.model)
        .bind(i64::from(record.table_version))
        .bind(&notes_json)
        .bind(record.created_at)
        .execute(&self.pool)
        .await
        .context("failed to insert credibility analysis")?;

        info!("Stored {} credibility analysis for article {}", record.method, record.article_id);
        Ok(())
    }

    async fn analyses(&self, article_id: &str) -> Result<Vec<AnalysisRecord>> {
        let rows = sqlx::query(
            r#"
            SELECT article_id, score, method, model, table_version, notes_json, created_at
            FROM credibility_analyses
            WHERE article_id = ?
            ORDER BY id
            "#,
        )
        .bind(article_id)
        .fetch_all(&self.pool)
        .await
        .context("failed to fetch credibility analyses")?;

        rows.into_iter()
            .map(|r| {
                let notes_json: String = r.try_get("notes_json")?;
                Ok(AnalysisRecord {
                    article_id: r.try_get("article_id")?,
                    score: r.try_get::<i64, _>("score")?.clamp(0, 100) as u8,
                    method: r.try_get("method")?,
                    model: r.try_get("model")?,
                    table_version: r.try_get::<i64, _>("table_version")?.max(0) as u32,
                    notes: serde_json::from_str(&notes_json).context("corrupt analysis notes")?,
                    created_at: r.try_get("created_at")?,
                })
            })
            .collect()
    }
}

/// Create the tables the service needs. Idempotent, safe to run at every startup.
pub async fn ensure_schema(pool: &SqlitePool) -> Result<()> {
    info!("store: ensuring DB schema (CREATE TABLE IF NOT EXISTS ...)");

    let stmts = [
        r#"
        CREATE TABLE IF NOT EXISTS users (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            username TEXT NOT NULL UNIQUE,
            display_name TEXT,
            password_hash TEXT,
            email TEXT,
            bio TEXT NOT NULL DEFAULT '',
            location TEXT NOT NULL DEFAULT '',
            avatar_url TEXT,
            interests_json TEXT NOT NULL DEFAULT '[]',
            reputation INTEGER NOT NULL DEFAULT 50 CHECK (reputation >= 0),
            created_at TIMESTAMP DEFAULT (strftime('%Y-%m-%dT%H:%M:%SZ', 'now'))
        );
        "#,
        r#"
        CREATE TABLE IF NOT EXISTS articles (
            id TEXT PRIMARY KEY,
            title TEXT NOT NULL,
            summary TEXT NOT NULL DEFAULT '',
            content TEXT NOT NULL,
            author TEXT NOT NULL DEFAULT '',
            source TEXT NOT NULL DEFAULT '',
            category TEXT NOT NULL DEFAULT '',
            url TEXT UNIQUE,
            published_at TIMESTAMP NOT NULL,
            tags_json TEXT NOT NULL DEFAULT '[]',
            location TEXT,
            image_url TEXT,
            credibility_score INTEGER NOT NULL CHECK (credibility_score BETWEEN 0 AND 100),
            upvotes INTEGER NOT NULL DEFAULT 0 CHECK (upvotes >= 0),
            downvotes INTEGER NOT NULL DEFAULT 0 CHECK (downvotes >= 0),
            verified BOOLEAN NOT NULL DEFAULT FALSE,
            submitted_by INTEGER,
            created_at TIMESTAMP DEFAULT (strftime('%Y-%m-%dT%H:%M:%SZ', 'now')),
            FOREIGN KEY(submitted_by) REFERENCES users(id) ON DELETE SET NULL
        );
        "#,
        r#"
        CREATE INDEX IF NOT EXISTS idx_articles_published ON articles (published_at);
        "#,
        r#"
        CREATE TABLE IF NOT EXISTS votes (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            user_id INTEGER NOT NULL,
            article_id TEXT NOT NULL,
            direction TEXT NOT NULL CHECK (direction IN ('up', 'down')),
            created_at TIMESTAMP DEFAULT (strftime('%Y-%m-%dT%H:%M:%SZ', 'now')),
            FOREIGN KEY(user_id) REFERENCES users(id) ON DELETE CASCADE,
            FOREIGN KEY(article_id) REFERENCES articles(id) ON DELETE CASCADE,
            UNIQUE(user_id, article_id)
        );
        "#,
        r#"
        CREATE TABLE IF NOT EXISTS saved_articles (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            user_id INTEGER NOT NULL,
            article_id TEXT NOT NULL,
            created_at TIMESTAMP DEFAULT (strftime('%Y-%m-%dT%H:%M:%SZ', 'now')),
            FOREIGN KEY(user_id) REFERENCES users(id) ON DELETE CASCADE,
            FOREIGN KEY(article_id) REFERENCES articles(id) ON DELETE CASCADE,
            UNIQUE(user_id, article_id)
        );
        "#,
        r#"
        CREATE TABLE IF NOT EXISTS credibility_analyses (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            article_id TEXT NOT NULL,
            score INTEGER NOT NULL,
            method TEXT NOT NULL,
            model TEXT,
            table_version INTEGER NOT NULL,
            notes_json TEXT NOT NULL DEFAULT '[]',
            created_at TIMESTAMP NOT NULL,
            FOREIGN KEY(article_id) REFERENCES articles(id) ON DELETE CASCADE
        );
        "#,
    ];

    for s in &stmts {
        sqlx::query(s)
            .execute(pool)
            .await
            .with_context(|| "failed to ensure schema")?;
    }

    info!("store: DB schema ensured");
    Ok(())
}
