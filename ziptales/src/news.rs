//! The news service: everything a request handler needs, with the store and
//! analyzer injected instead of living in shared globals.

use anyhow::{Context, Result};
use serde::Serialize;
use std::sync::Arc;
use tracing::{info, warn};

use crate::article::{Article, CredibilityTier, NewArticle, VoteDirection};
use crate::credibility::{Assessment, CredibilityAnalyzer};
use crate::store::{AnalysisRecord, ArticleQuery, ArticleStore};
use crate::votes::{VoteAggregator, VoteOutcome};

/// Texts shorter than this are scored locally without a model call
pub const DEFAULT_MIN_REMOTE_CHARS: usize = 20;

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum Submission {
    Accepted { article: Article, assessment: Assessment },
    Unauthenticated,
    Invalid { reason: String },
    /// An article with the same url is already stored
    Duplicate { article_id: String },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum SaveOutcome {
    Toggled { saved: bool },
    UnknownArticle,
    Unauthenticated,
}

/// Counts shown above article lists
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct FeedStats {
    pub articles: usize,
    pub trusted: usize,
    pub pending: usize,
    pub disputed: usize,
    pub total_votes: u64,
    pub average_score: u8,
}

impl FeedStats {
    pub fn from_articles(articles: &[Article]) -> Self {
        let mut stats = FeedStats {
            articles: articles.len(),
            ..Default::default()
        };
        let mut score_sum: u64 = 0;
        for a in articles {
            match a.tier() {
                CredibilityTier::Trusted => stats.trusted += 1,
                CredibilityTier::Pending => stats.pending += 1,
                CredibilityTier::Disputed => stats.disputed += 1,
            }
            stats.total_votes += u64::from(a.votes.total());
            score_sum += u64::from(a.credibility_score);
        }
        if !articles.is_empty() {
            stats.average_score = (score_sum as f64 / articles.len() as f64).round() as u8;
        }
        stats
    }
}

#[derive(Clone)]
pub struct NewsService {
    store: Arc<dyn ArticleStore>,
    analyzer: CredibilityAnalyzer,
    votes: VoteAggregator,
    min_remote_chars: usize,
}

impl NewsService {
    pub fn new(store: Arc<dyn ArticleStore>, analyzer: CredibilityAnalyzer) -> Self {
        Self {
            votes: VoteAggregator::new(store.clone()),
            store,
            analyzer,
            min_remote_chars: DEFAULT_MIN_REMOTE_CHARS,
        }
    }

    /// Wire the analyzer and scoring policy from `[llm]` and `[credibility]`.
    pub fn from_config(config: &common::Config, store: Arc<dyn ArticleStore>) -> Self {
        let provider = crate::llm::provider_from_config(config.llm.as_ref());
        let mut analyzer = CredibilityAnalyzer::new(provider);
        if let Some(secs) = config.credibility.remote_timeout_seconds {
            analyzer = analyzer.with_timeout(std::time::Duration::from_secs(secs));
        }
        Self::new(store, analyzer).with_min_remote_chars(
            config
                .credibility
                .min_remote_chars
                .unwrap_or(DEFAULT_MIN_REMOTE_CHARS),
        )
    }

    pub fn with_min_remote_chars(mut self, min_remote_chars: usize) -> Self {
        self.min_remote_chars = min_remote_chars;
        self
    }

    pub fn store(&self) -> &Arc<dyn ArticleStore> {
        &self.store
    }

    pub fn analyzer(&self) -> &CredibilityAnalyzer {
        &self.analyzer
    }

    /// Score text without storing anything. Short texts skip the model.
    pub async fn analyze_text(&self, text: &str) -> Assessment {
        if text.trim().chars().count() < self.min_remote_chars {
            return self.analyzer.assess_locally(text);
        }
        self.analyzer.analyze(text).await
    }

    /// Score a submission, store it and log the analysis.
    pub async fn submit_article(&self, user_id: Option<i64>, new: NewArticle) -> Result<Submission> {
        let Some(user_id) = user_id else {
            return Ok(Submission::Unauthenticated);
        };
        if new.title.trim().is_empty() {
            return Ok(Submission::Invalid { reason: "title is required".into() });
        }
        if new.content.trim().is_empty() {
            return Ok(Submission::Invalid { reason: "content is required".into() });
        }
        if let Some(url) = new.url.as_deref() {
            if url::Url::parse(url).is_err() {
                return Ok(Submission::Invalid { reason: format!("invalid url: {}", url) });
            }
            if let Some(existing) = self.store.find_by_url(url).await? {
                info!(article_id = %existing.id, user_id, "duplicate submission ignored");
                return Ok(Submission::Duplicate { article_id: existing.id });
            }
        }

        let (article, assessment) = self.score_and_store(new, Some(user_id)).await?;
        info!(
            article_id = %article.id,
            user_id,
            score = article.credibility_score,
            method = assessment.method.as_str(),
            "article submitted"
        );
        Ok(Submission::Accepted { article, assessment })
    }

    /// Shared by submissions and feed ingestion.
    pub(crate) async fn score_and_store(
        &self,
        new: NewArticle,
        submitted_by: Option<i64>,
    ) -> Result<(Article, Assessment)> {
        let assessment = self.analyze_text(&new.content).await;
        let mut article = Article::from_submission(new, assessment.score);
        article.submitted_by = submitted_by;

        self.store.insert_article(&article).await?;

        // The article is stored at this point; a failed log write only warns.
        if let Err(e) = self
            .store
            .store_analysis(&AnalysisRecord::new(&article.id, &assessment))
            .await
        {
            warn!("failed to persist analysis for article {}: {:#}", article.id, e);
        }

        Ok((article, assessment))
    }

    pub async fn get(&self, id: &str) -> Result<Option<Article>> {
        self.store.get_article(id).await
    }

    pub async fn list(&self, query: &ArticleQuery) -> Result<Vec<Article>> {
        self.store.list_articles(query).await
    }

    pub async fn analyses(&self, article_id: &str) -> Result<Vec<AnalysisRecord>> {
        self.store.analyses(article_id).await
    }

    pub async fn vote(
        &self,
        user_id: Option<i64>,
        article_id: &str,
        direction: VoteDirection,
    ) -> Result<VoteOutcome> {
        match user_id {
            Some(user_id) => self.votes.cast_vote(user_id, article_id, direction).await,
            None => Ok(VoteOutcome::Unauthenticated),
        }
    }

    pub async fn toggle_saved(&self, user_id: Option<i64>, article_id: &str) -> Result<SaveOutcome> {
        let Some(user_id) = user_id else {
            return Ok(SaveOutcome::Unauthenticated);
        };
        if self.store.get_article(article_id).await?.is_none() {
            return Ok(SaveOutcome::UnknownArticle);
        }
        let saved = self
            .store
            .toggle_saved(user_id, article_id)
            .await
            .with_context(|| format!("failed to toggle saved state of article {}", article_id))?;
        Ok(SaveOutcome::Toggled { saved })
    }

    /// The user's saved articles in the order they were saved
    pub async fn saved_articles(&self, user_id: i64) -> Result<Vec<Article>> {
        let ids = self.store.saved_article_ids(user_id).await?;
        let mut articles = Vec::with_capacity(ids.len());
        for id in ids {
            if let Some(article) = self.store.get_article(&id).await? {
                articles.push(article);
            }
        }
        Ok(articles)
    }

    pub async fn clear_saved(&self, user_id: i64) -> Result<usize> {
        self.store.clear_saved(user_id).await
    }

    pub async fn stats(&self, category: Option<&str>) -> Result<FeedStats> {
        let query = ArticleQuery {
            category: category.map(str::to_string),
            ..Default::default()
        };
        let articles = self.store.list_articles(&query).await?;
        Ok(FeedStats::from_articles(&articles))
    }
}
