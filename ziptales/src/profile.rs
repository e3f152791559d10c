//! User profiles and contributor reputation.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use sqlx::{Row, Sqlite, SqlitePool};

/// Points a new account starts with
pub const NEW_USER_REPUTATION: u32 = 50;

/// Credited to the submitter when an article first reaches the trusted band
pub const VERIFIED_SUBMISSION_POINTS: u32 = 20;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ReputationLevel {
    Newcomer,
    Verified,
    Trusted,
    Expert,
}

impl ReputationLevel {
    pub fn from_points(points: u32) -> Self {
        match points {
            p if p >= 500 => ReputationLevel::Expert,
            p if p >= 200 => ReputationLevel::Trusted,
            p if p >= 100 => ReputationLevel::Verified,
            _ => ReputationLevel::Newcomer,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            ReputationLevel::Newcomer => "Newcomer",
            ReputationLevel::Verified => "Verified",
            ReputationLevel::Trusted => "Trusted",
            ReputationLevel::Expert => "Expert",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct UserProfile {
    pub id: i64,
    pub username: String,
    pub display_name: Option<String>,
    pub email: Option<String>,
    pub bio: String,
    pub location: String,
    pub avatar_url: Option<String>,
    pub interests: Vec<String>,
    pub reputation: u32,
    pub level: ReputationLevel,
}

/// Fields a user may change on their own profile. `None` leaves a field as is.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ProfileUpdate {
    #[serde(default)]
    pub display_name: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub bio: Option<String>,
    #[serde(default)]
    pub location: Option<String>,
    #[serde(default)]
    pub avatar_url: Option<String>,
    #[serde(default)]
    pub interests: Option<Vec<String>>,
}

impl ProfileUpdate {
    pub fn validate(&self) -> Result<(), String> {
        if let Some(avatar) = self.avatar_url.as_deref().filter(|a| !a.is_empty()) {
            url::Url::parse(avatar).map_err(|_| format!("invalid avatar url: {}", avatar))?;
        }
        if let Some(email) = self.email.as_deref().filter(|e| !e.is_empty()) {
            if !email.contains('@') {
                return Err(format!("invalid email: {}", email));
            }
        }
        Ok(())
    }
}

/// Trimmed, without blanks or repeats, first occurrence wins.
fn normalize_interests(interests: &[String]) -> Vec<String> {
    let mut out: Vec<String> = Vec::new();
    for interest in interests.iter().map(|i| i.trim()).filter(|i| !i.is_empty()) {
        if !out.iter().any(|seen| seen.eq_ignore_ascii_case(interest)) {
            out.push(interest.to_string());
        }
    }
    out
}

pub async fn get_profile(pool: &SqlitePool, user_id: i64) -> Result<Option<UserProfile>> {
    let row = sqlx::query(
        r#"
        SELECT id, username, display_name, email, bio, location, avatar_url, interests_json, reputation
        FROM users WHERE id = ?
        "#,
    )
    .bind(user_id)
    .fetch_optional(pool)
    .await
    .context("failed to fetch user profile")?;

    let Some(row) = row else {
        return Ok(None);
    };
    let interests_json: String = row.try_get("interests_json")?;
    let reputation = row.try_get::<i64, _>("reputation")?.max(0) as u32;
    Ok(Some(UserProfile {
        id: row.try_get("id")?,
        username: row.try_get("username")?,
        display_name: row.try_get("display_name")?,
        email: row.try_get("email")?,
        bio: row.try_get("bio")?,
        location: row.try_get("location")?,
        avatar_url: row.try_get("avatar_url")?,
        interests: serde_json::from_str(&interests_json)
            .with_context(|| format!("corrupt interests for user {}", user_id))?,
        reputation,
        level: ReputationLevel::from_points(reputation),
    }))
}

/// Apply `update` and return the stored profile, or `None` for an unknown user.
pub async fn update_profile(
    pool: &SqlitePool,
    user_id: i64,
    update: &ProfileUpdate,
) -> Result<Option<UserProfile>> {
    let interests_json = update
        .interests
        .as_deref()
        .map(|i| serde_json::to_string(&normalize_interests(i)))
        .transpose()
        .context("failed to serialize interests")?;

    let res = sqlx::query(
        r#"
        UPDATE users SET
            display_name = COALESCE(?, display_name),
            email = COALESCE(?, email),
            bio = COALESCE(?, bio),
            location = COALESCE(?, location),
            avatar_url = COALESCE(?, avatar_url),
            interests_json = COALESCE(?, interests_json)
        WHERE id = ?
        "#,
    )
    .bind(update.display_name.as_deref().map(str::trim))
    .bind(update.email.as_deref().map(str::trim))
    .bind(update.bio.as_deref().map(str::trim))
    .bind(update.location.as_deref().map(str::trim))
    .bind(update.avatar_url.as_deref().map(str::trim))
    .bind(interests_json)
    .bind(user_id)
    .execute(pool)
    .await
    .with_context(|| format!("failed to update profile of user {}", user_id))?;

    if res.rows_affected() == 0 {
        return Ok(None);
    }
    get_profile(pool, user_id).await
}

/// Add `points` to a user's reputation. Runs inside the caller's transaction
/// when given one.
pub async fn award_reputation<'e, E>(executor: E, user_id: i64, points: u32) -> Result<()>
where
    E: sqlx::Executor<'e, Database = Sqlite>,
{
    sqlx::query("UPDATE users SET reputation = reputation + ? WHERE id = ?")
        .bind(i64::from(points))
        .bind(user_id)
        .execute(executor)
        .await
        .with_context(|| format!("failed to award reputation to user {}", user_id))?;
    Ok(())
}
