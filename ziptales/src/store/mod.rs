//! Article persistence behind a trait so the service can run on SQLite or in memory.

use anyhow::Result;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::article::{Article, CredibilityTier, VoteDirection, Votes};
use crate::credibility::Assessment;
use crate::votes::VoteOutcome;

pub mod memory;
pub mod sqlite;

pub use memory::MemoryArticleStore;
pub use sqlite::SqliteArticleStore;

/// Computes the new score from the old score and the post-vote tallies
pub type Rescore = fn(u8, Votes) -> u8;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TierFilter {
    #[default]
    All,
    Trusted,
    Pending,
    Disputed,
}

impl TierFilter {
    pub fn matches(&self, score: u8) -> bool {
        let tier = CredibilityTier::from_score(score);
        match self {
            TierFilter::All => true,
            TierFilter::Trusted => tier == CredibilityTier::Trusted,
            TierFilter::Pending => tier == CredibilityTier::Pending,
            TierFilter::Disputed => tier == CredibilityTier::Disputed,
        }
    }

    /// Inclusive score bounds of the band
    pub fn score_range(&self) -> (u8, u8) {
        match self {
            TierFilter::All => (0, 100),
            TierFilter::Trusted => (70, 100),
            TierFilter::Pending => (40, 69),
            TierFilter::Disputed => (0, 39),
        }
    }
}

impl std::str::FromStr for TierFilter {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "" | "all" => Ok(TierFilter::All),
            "trusted" | "verified" => Ok(TierFilter::Trusted),
            "pending" => Ok(TierFilter::Pending),
            "disputed" => Ok(TierFilter::Disputed),
            other => anyhow::bail!("unknown credibility filter: {}", other),
        }
    }
}

/// Listing criteria. Empty query returns everything, newest first.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ArticleQuery {
    /// Exact category, ASCII case-insensitive
    pub category: Option<String>,
    /// Case-insensitive substring of the title or the content
    pub search: Option<String>,
    #[serde(default)]
    pub filter: TierFilter,
    pub limit: Option<usize>,
}

impl ArticleQuery {
    pub fn category(category: impl Into<String>) -> Self {
        ArticleQuery {
            category: Some(category.into()),
            ..Default::default()
        }
    }

    pub fn matches_category(&self, article: &Article) -> bool {
        match self.category.as_deref() {
            Some(c) if !c.is_empty() => article.category.eq_ignore_ascii_case(c),
            _ => true,
        }
    }

    pub fn matches_search(&self, article: &Article) -> bool {
        match self.search.as_deref().map(str::trim) {
            Some(term) if !term.is_empty() => {
                let term = term.to_lowercase();
                article.title.to_lowercase().contains(&term)
                    || article.content.to_lowercase().contains(&term)
            }
            _ => true,
        }
    }

    pub fn matches(&self, article: &Article) -> bool {
        self.matches_category(article)
            && self.filter.matches(article.credibility_score)
            && self.matches_search(article)
    }
}

/// A persisted credibility analysis
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AnalysisRecord {
    pub article_id: String,
    pub score: u8,
    pub method: String,
    pub model: Option<String>,
    pub table_version: u32,
    pub notes: Vec<String>,
    pub created_at: DateTime<Utc>,
}

impl AnalysisRecord {
    pub fn new(article_id: &str, assessment: &Assessment) -> Self {
        AnalysisRecord {
            article_id: article_id.to_string(),
            score: assessment.score,
            method: assessment.method.as_str().to_string(),
            model: assessment.model.clone(),
            table_version: assessment.table_version,
            notes: assessment.signals.iter().map(|s| s.note.to_string()).collect(),
            created_at: Utc::now(),
        }
    }
}

#[async_trait::async_trait]
pub trait ArticleStore: Send + Sync {
    async fn get_article(&self, id: &str) -> Result<Option<Article>>;

    async fn find_by_url(&self, url: &str) -> Result<Option<Article>>;

    async fn list_articles(&self, query: &ArticleQuery) -> Result<Vec<Article>>;

    async fn insert_article(&self, article: &Article) -> Result<()>;

    async fn has_voted(&self, user_id: i64, article_id: &str) -> Result<bool>;

    /// Insert the vote, bump the matching counter and store `rescore`'s
    /// result as the new score, all or nothing.
    async fn record_vote(
        &self,
        user_id: i64,
        article_id: &str,
        direction: VoteDirection,
        rescore: Rescore,
    ) -> Result<VoteOutcome>;

    /// Flip membership of the article in the user's saved set; returns the new membership.
    async fn toggle_saved(&self, user_id: i64, article_id: &str) -> Result<bool>;

    /// Saved article ids in the order they were saved
    async fn saved_article_ids(&self, user_id: i64) -> Result<Vec<String>>;

    async fn clear_saved(&self, user_id: i64) -> Result<usize>;

    async fn store_analysis(&self, record: &AnalysisRecord) -> Result<()>;

    /// Analyses for an article, oldest first
    async fn analyses(&self, article_id: &str) -> Result<Vec<AnalysisRecord>>;
}
