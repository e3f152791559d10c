use anyhow::{Context, Result};
use serde::Serialize;
use std::sync::Arc;
use tracing::{debug, info};

use crate::article::{Article, VoteDirection, Votes};
use crate::store::ArticleStore;

/// Weight kept from the previous score when a vote lands
const PRIOR_WEIGHT: f64 = 0.6;
/// Points available to the community vote ratio
const COMMUNITY_POINTS: f64 = 40.0;

/// Result of a vote attempt. Only `Accepted` changes anything.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", content = "article", rename_all = "snake_case")]
pub enum VoteOutcome {
    Accepted(Article),
    AlreadyVoted,
    UnknownArticle,
    Unauthenticated,
}

impl VoteOutcome {
    pub fn is_accepted(&self) -> bool {
        matches!(self, VoteOutcome::Accepted(_))
    }
}

/// Blend the previous score with the community ratio of `votes`.
///
/// `votes` are the tallies after the new vote was counted.
pub fn blend_score(old_score: u8, votes: Votes) -> u8 {
    let blended = f64::from(old_score) * PRIOR_WEIGHT + votes.ratio() * COMMUNITY_POINTS;
    blended.round().clamp(0.0, 100.0) as u8
}

/// The one path through which votes reach an article.
#[derive(Clone)]
pub struct VoteAggregator {
    store: Arc<dyn ArticleStore>,
}

impl VoteAggregator {
    pub fn new(store: Arc<dyn ArticleStore>) -> Self {
        Self { store }
    }

    /// Record `user_id`'s vote and rescore the article in one transaction.
    ///
    /// A user who already voted on the article gets `AlreadyVoted` and the
    /// tallies stay as they were. Store failures are returned as errors with
    /// nothing committed.
    pub async fn cast_vote(
        &self,
        user_id: i64,
        article_id: &str,
        direction: VoteDirection,
    ) -> Result<VoteOutcome> {
        let outcome = self
            .store
            .record_vote(user_id, article_id, direction, blend_score)
            .await
            .with_context(|| format!("failed to record vote on article {}", article_id))?;

        match &outcome {
            VoteOutcome::Accepted(article) => info!(
                article_id,
                user_id,
                direction = direction.as_str(),
                upvotes = article.votes.upvotes,
                downvotes = article.votes.downvotes,
                score = article.credibility_score,
                "vote accepted"
            ),
            other => debug!(article_id, user_id, ?other, "vote ignored"),
        }

        Ok(outcome)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn first_upvote_from_fifty() {
        let votes = Votes::default().incremented(VoteDirection::Up);
        assert_eq!(votes, Votes { upvotes: 1, downvotes: 0 });
        assert_eq!(blend_score(50, votes), 70);
    }

    #[test]
    fn single_vote_formula_for_every_start() {
        for s0 in 0..=100u8 {
            let up = blend_score(s0, Votes { upvotes: 1, downvotes: 0 });
            let down = blend_score(s0, Votes { upvotes: 0, downvotes: 1 });
            assert_eq!(up, (f64::from(s0) * 0.6 + 40.0).round() as u8);
            assert_eq!(down, (f64::from(s0) * 0.6).round() as u8);
        }
    }

    #[test]
    fn stays_in_range() {
        for s0 in [0u8, 1, 49, 50, 99, 100] {
            for up in 0..20 {
                for down in 0..20 {
                    let score = blend_score(s0, Votes { upvotes: up, downvotes: down });
                    assert!(score <= 100);
                }
            }
        }
    }

    #[test]
    fn zero_totals_use_neutral_ratio() {
        assert_eq!(blend_score(50, Votes::default()), 50);
        assert_eq!(blend_score(100, Votes::default()), 80);
    }

    #[test]
    fn mixed_tallies() {
        // 142 up, 9 down from 85: 51 + 37.6158 = 88.6
        assert_eq!(blend_score(85, Votes { upvotes: 142, downvotes: 9 }), 89);
        // 34 up, 68 down from 45: 27 + 13.33 = 40.3
        assert_eq!(blend_score(45, Votes { upvotes: 34, downvotes: 68 }), 40);
    }
}
