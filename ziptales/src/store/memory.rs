use anyhow::Result;
use std::collections::HashMap;
use tokio::sync::RwLock;

use super::{AnalysisRecord, ArticleQuery, ArticleStore, Rescore};
use crate::article::{Article, VoteDirection};
use crate::votes::VoteOutcome;

#[derive(Default)]
struct State {
    /// Insertion order
    articles: Vec<Article>,
    votes: HashMap<(i64, String), VoteDirection>,
    saved: HashMap<i64, Vec<String>>,
    analyses: Vec<AnalysisRecord>,
}

/// Process-local store. Every mutation holds the write lock for its whole
/// duration, which gives votes the same all-or-nothing behavior as SQLite.
#[derive(Default)]
pub struct MemoryArticleStore {
    state: RwLock<State>,
}

impl MemoryArticleStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_articles(articles: Vec<Article>) -> Self {
        Self {
            state: RwLock::new(State {
                articles,
                ..Default::default()
            }),
        }
    }
}

#[async_trait::async_trait]
impl ArticleStore for MemoryArticleStore {
    async fn get_article(&self, id: &str) -> Result<Option<Article>> {
        let state = self.state.read().await;
        Ok(state.articles.iter().find(|a| a.id == id).cloned())
    }

    async fn find_by_url(&self, url: &str) -> Result<Option<Article>> {
        let state = self.state.read().await;
        Ok(state
            .articles
            .iter()
            .find(|a| a.url.as_deref() == Some(url))
            .cloned())
    }

    async fn list_articles(&self, query: &ArticleQuery) -> Result<Vec<Article>> {
        let state = self.state.read().await;
        let mut found: Vec<Article> = state
            .articles
            .iter()
            .rev()
            .filter(|a| query.matches(a))
            .cloned()
            .collect();
        // stable: equal timestamps keep newest-inserted first
        found.sort_by(|a, b| b.published_at.cmp(&a.published_at));
        if let Some(limit) = query.limit {
            found.truncate(limit);
        }
        Ok(found)
    }

    async fn insert_article(&self, article: &Article) -> Result<()> {
        let mut state = self.state.write().await;
        if state.articles.iter().any(|a| a.id == article.id) {
            anyhow::bail!("article {} already exists", article.id);
        }
        if let Some(url) = article.url.as_deref() {
            if state.articles.iter().any(|a| a.url.as_deref() == Some(url)) {
                anyhow::bail!("article with url {} already exists", url);
            }
        }
        state.articles.push(article.clone());
        Ok(())
    }

    async fn has_voted(&self, user_id: i64, article_id: &str) -> Result<bool> {
        let state = self.state.read().await;
        Ok(state.votes.contains_key(&(user_id, article_id.to_string())))
    }

    async fn record_vote(
        &self,
        user_id: i64,
        article_id: &str,
        direction: VoteDirection,
        rescore: Rescore,
    ) -> Result<VoteOutcome> {
        let mut state = self.state.write().await;
        let key = (user_id, article_id.to_string());

        let Some(index) = state.articles.iter().position(|a| a.id == article_id) else {
            return Ok(VoteOutcome::UnknownArticle);
        };
        if state.votes.contains_key(&key) {
            return Ok(VoteOutcome::AlreadyVoted);
        }

        state.votes.insert(key, direction);
        let article = &mut state.articles[index];
        article.votes = article.votes.incremented(direction);
        article.credibility_score = rescore(article.credibility_score, article.votes);
        article.verified = Article::is_trusted_score(article.credibility_score);

        Ok(VoteOutcome::Accepted(article.clone()))
    }

    async fn toggle_saved(&self, user_id: i64, article_id: &str) -> Result<bool> {
        let mut state = self.state.write().await;
        let saved = state.saved.entry(user_id).or_default();
        if let Some(pos) = saved.iter().position(|id| id == article_id) {
            saved.remove(pos);
            Ok(false)
        } else {
            saved.push(article_id.to_string());
            Ok(true)
        }
    }

    async fn saved_article_ids(&self, user_id: i64) -> Result<Vec<String>> {
        let state = self.state.read().await;
        Ok(state.saved.get(&user_id).cloned().unwrap_or_default())
    }

    async fn clear_saved(&self, user_id: i64) -> Result<usize> {
        let mut state = self.state.write().await;
        Ok(state.saved.remove(&user_id).map(|ids| ids.len()).unwrap_or(0))
    }

    async fn store_analysis(&self, record: &AnalysisRecord) -> Result<()> {
        let mut state = self.state.write().await;
        state.analyses.push(record.clone());
        Ok(())
    }

    async fn analyses(&self, article_id: &str) -> Result<Vec<AnalysisRecord>> {
        let state = self.state.read().await;
        Ok(state
            .analyses
            .iter()
            .filter(|r| r.article_id == article_id)
            .cloned()
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::article::{NewArticle, Votes};
    use crate::votes::blend_score;

    fn article(score: u8) -> Article {
        Article::from_submission(
            NewArticle {
                title: "Ferry schedule changes".into(),
                content: "The port authority confirmed new ferry times.".into(),
                ..Default::default()
            },
            score,
        )
    }

    #[tokio::test]
    async fn record_vote_applies_once_per_user() {
        let a = article(50);
        let store = MemoryArticleStore::with_articles(vec![a.clone()]);

        let VoteOutcome::Accepted(updated) = store
            .record_vote(7, &a.id, VoteDirection::Up, blend_score)
            .await
            .unwrap()
        else {
            panic!("first vote not accepted");
        };
        assert_eq!(updated.votes, Votes { upvotes: 1, downvotes: 0 });
        assert_eq!(updated.credibility_score, 70);
        assert!(updated.verified);
        assert!(store.has_voted(7, &a.id).await.unwrap());

        assert_eq!(
            store
                .record_vote(7, &a.id, VoteDirection::Down, blend_score)
                .await
                .unwrap(),
            VoteOutcome::AlreadyVoted
        );
        assert_eq!(store.get_article(&a.id).await.unwrap().unwrap(), updated);
        assert_eq!(
            store
                .record_vote(7, "missing", VoteDirection::Up, blend_score)
                .await
                .unwrap(),
            VoteOutcome::UnknownArticle
        );
    }
}
