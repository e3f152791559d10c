use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Score at or above which an article is considered trustworthy.
pub const TRUST_THRESHOLD: u8 = 70;
/// Score at or above which an article is pending rather than disputed.
pub const PENDING_THRESHOLD: u8 = 40;

/// Community tallies for an article
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Votes {
    pub upvotes: u32,
    pub downvotes: u32,
}

impl Votes {
    pub fn total(&self) -> u32 {
        self.upvotes + self.downvotes
    }

    /// Share of up-votes, 0.5 when nobody has voted yet
    pub fn ratio(&self) -> f64 {
        match self.total() {
            0 => 0.5,
            total => f64::from(self.upvotes) / f64::from(total),
        }
    }

    /// Tallies after one more vote in `direction`
    pub fn incremented(self, direction: VoteDirection) -> Self {
        match direction {
            VoteDirection::Up => Votes { upvotes: self.upvotes + 1, ..self },
            VoteDirection::Down => Votes { downvotes: self.downvotes + 1, ..self },
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VoteDirection {
    Up,
    Down,
}

impl VoteDirection {
    pub fn as_str(&self) -> &'static str {
        match self {
            VoteDirection::Up => "up",
            VoteDirection::Down => "down",
        }
    }
}

impl std::str::FromStr for VoteDirection {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "up" => Ok(VoteDirection::Up),
            "down" => Ok(VoteDirection::Down),
            other => anyhow::bail!("unknown vote direction: {}", other),
        }
    }
}

/// Credibility band shown next to an article
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CredibilityTier {
    Trusted,
    Pending,
    Disputed,
}

impl CredibilityTier {
    pub fn from_score(score: u8) -> Self {
        if score >= TRUST_THRESHOLD {
            CredibilityTier::Trusted
        } else if score >= PENDING_THRESHOLD {
            CredibilityTier::Pending
        } else {
            CredibilityTier::Disputed
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            CredibilityTier::Trusted => "Trusted",
            CredibilityTier::Pending => "Pending Verification",
            CredibilityTier::Disputed => "Disputed",
        }
    }
}

/// A news article as stored and served
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Article {
    pub id: String,
    pub title: String,
    pub summary: String,
    pub content: String,
    pub author: String,
    pub source: String,
    pub category: String,
    pub url: Option<String>,
    pub published_at: DateTime<Utc>,
    pub tags: Vec<String>,
    pub location: Option<String>,
    pub image_url: Option<String>,
    pub credibility_score: u8,
    pub votes: Votes,
    pub verified: bool,
    /// Account that submitted the article; `None` for feed imports
    pub submitted_by: Option<i64>,
}

impl Article {
    /// Build a fresh article from a submission and its initial score.
    pub fn from_submission(new: NewArticle, credibility_score: u8) -> Self {
        let credibility_score = credibility_score.min(100);
        Article {
            id: uuid::Uuid::new_v4().to_string(),
            title: new.title,
            summary: new.summary,
            content: new.content,
            author: new.author,
            source: new.source,
            category: new.category,
            url: new.url,
            published_at: new.published_at.unwrap_or_else(Utc::now),
            tags: new.tags,
            location: new.location,
            image_url: new.image_url,
            credibility_score,
            votes: Votes::default(),
            verified: Self::is_trusted_score(credibility_score),
            submitted_by: None,
        }
    }

    /// Whether a score earns the verified badge
    pub fn is_trusted_score(score: u8) -> bool {
        score >= TRUST_THRESHOLD
    }

    pub fn tier(&self) -> CredibilityTier {
        CredibilityTier::from_score(self.credibility_score)
    }
}

/// Fields supplied when an article is submitted or ingested
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NewArticle {
    pub title: String,
    #[serde(default)]
    pub summary: String,
    pub content: String,
    #[serde(default)]
    pub author: String,
    #[serde(default)]
    pub source: String,
    #[serde(default)]
    pub category: String,
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default)]
    pub published_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub location: Option<String>,
    #[serde(default)]
    pub image_url: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tiers_follow_thresholds() {
        assert_eq!(CredibilityTier::from_score(100), CredibilityTier::Trusted);
        assert_eq!(CredibilityTier::from_score(70), CredibilityTier::Trusted);
        assert_eq!(CredibilityTier::from_score(69), CredibilityTier::Pending);
        assert_eq!(CredibilityTier::from_score(40), CredibilityTier::Pending);
        assert_eq!(CredibilityTier::from_score(39), CredibilityTier::Disputed);
        assert_eq!(CredibilityTier::from_score(0), CredibilityTier::Disputed);
    }

    #[test]
    fn ratio_defaults_to_half() {
        assert_eq!(Votes::default().ratio(), 0.5);
        let v = Votes { upvotes: 3, downvotes: 1 };
        assert_eq!(v.ratio(), 0.75);
        assert_eq!(v.incremented(VoteDirection::Down), Votes { upvotes: 3, downvotes: 2 });
    }

    #[test]
    fn submission_sets_verified_from_score() {
        let new = NewArticle {
            title: "t".into(),
            content: "c".into(),
            ..Default::default()
        };
        let trusted = Article::from_submission(new.clone(), 70);
        let pending = Article::from_submission(new, 69);
        assert!(trusted.verified);
        assert!(!pending.verified);
        assert_ne!(trusted.id, pending.id);
        assert_eq!(trusted.votes, Votes::default());
    }

    #[test]
    fn direction_parses_case_insensitively() {
        assert_eq!("UP".parse::<VoteDirection>().unwrap(), VoteDirection::Up);
        assert_eq!(" down ".parse::<VoteDirection>().unwrap(), VoteDirection::Down);
        assert!("sideways".parse::<VoteDirection>().is_err());
    }
}
