//! Credibility scoring: a remote model call with a keyword fallback.

use anyhow::{Context, Result};
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

use crate::article::{CredibilityTier, TRUST_THRESHOLD, PENDING_THRESHOLD};
use crate::llm::{extract_first_integer, LlmProvider, LlmRequest};

pub mod heuristic;

pub use heuristic::{HeuristicReport, Signal, SignalKind, KEYWORD_TABLE_VERSION};

const DEFAULT_REMOTE_TIMEOUT: Duration = Duration::from_secs(10);

/// Which tier produced a score
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ScoreMethod {
    Remote,
    Heuristic,
}

impl ScoreMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            ScoreMethod::Remote => "remote",
            ScoreMethod::Heuristic => "heuristic",
        }
    }
}

/// Outcome of analyzing a piece of text
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Assessment {
    pub score: u8,
    pub method: ScoreMethod,
    /// Model that produced a remote score
    pub model: Option<String>,
    pub table_version: u32,
    /// Keyword groups found in the text, reported whichever tier scored it
    pub signals: Vec<Signal>,
}

impl Assessment {
    fn from_heuristic(report: HeuristicReport) -> Self {
        Assessment {
            score: report.score,
            method: ScoreMethod::Heuristic,
            model: None,
            table_version: KEYWORD_TABLE_VERSION,
            signals: report.signals,
        }
    }

    pub fn tier(&self) -> CredibilityTier {
        CredibilityTier::from_score(self.score)
    }

    pub fn verdict(&self) -> &'static str {
        verdict(self.score)
    }
}

/// Status line shown by the assistant next to a score.
pub fn verdict(score: u8) -> &'static str {
    if score >= TRUST_THRESHOLD {
        "Likely Trustworthy"
    } else if score >= PENDING_THRESHOLD {
        "Requires Verification"
    } else {
        "High Risk - Verify Carefully"
    }
}

/// Two-stage resolver: ask the model once, otherwise fall back to keywords.
///
/// `analyze` never fails. Remote errors, timeouts and unusable replies are
/// logged and replaced by the heuristic score.
#[derive(Clone)]
pub struct CredibilityAnalyzer {
    provider: Option<Arc<dyn LlmProvider>>,
    timeout: Duration,
}

impl CredibilityAnalyzer {
    pub fn new(provider: Option<Arc<dyn LlmProvider>>) -> Self {
        Self {
            provider,
            timeout: DEFAULT_REMOTE_TIMEOUT,
        }
    }

    /// Analyzer that never leaves the process
    pub fn heuristic_only() -> Self {
        Self::new(None)
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn has_remote(&self) -> bool {
        self.provider.is_some()
    }

    /// Tier 1 alone: one model call, no retry.
    pub async fn remote_score(&self, text: &str) -> Result<u8> {
        let provider = self
            .provider
            .as_ref()
            .context("no remote credibility provider configured")?;

        let request = LlmRequest {
            prompt: build_prompt(text),
            max_tokens: Some(10),
            temperature: Some(0.0),
            timeout_seconds: Some(self.timeout.as_secs().max(1)),
        };

        let response = tokio::time::timeout(self.timeout, provider.generate(request))
            .await
            .context("credibility analysis timed out")??;

        let value = extract_first_integer(&response.content)
            .with_context(|| format!("no integer in model reply: {:?}", response.content))?;

        if !(0..=100).contains(&value) {
            anyhow::bail!("model score out of range: {}", value);
        }

        Ok(value as u8)
    }

    /// Tier 2 alone: pure keyword scoring.
    pub fn assess_locally(&self, text: &str) -> Assessment {
        Assessment::from_heuristic(heuristic::assess(text))
    }

    pub async fn analyze(&self, text: &str) -> Assessment {
        let local = self.assess_locally(text);

        let Some(provider) = &self.provider else {
            return local;
        };

        match self.remote_score(text).await {
            Ok(score) => {
                debug!(score, model = provider.model(), "remote credibility score");
                Assessment {
                    score,
                    method: ScoreMethod::Remote,
                    model: Some(provider.model().to_string()),
                    ..local
                }
            }
            Err(e) => {
                warn!("remote credibility analysis failed: {:#}, falling back to keyword heuristic", e);
                local
            }
        }
    }

    pub async fn score(&self, text: &str) -> u8 {
        self.analyze(text).await.score
    }
}

fn build_prompt(text: &str) -> String {
    format!(
        r#"You are a news credibility analyst. Rate how credible the following news text is.

Consider:
- reliability of the cited sources
- factual accuracy and verifiability of the claims
- bias and one-sided framing
- sensationalism and emotional language

Reply with a single integer from 0 (not credible) to 100 (highly credible) and nothing else.

NEWS TEXT:
{}
"#,
        text
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::{LlmResponse, UsageMetadata};

    struct Canned {
        reply: Result<String, String>,
        delay: Duration,
    }

    #[async_trait::async_trait]
    impl LlmProvider for Canned {
        async fn generate(&self, _request: LlmRequest) -> Result<LlmResponse> {
            tokio::time::sleep(self.delay).await;
            match &self.reply {
                Ok(content) => Ok(LlmResponse {
                    content: content.clone(),
                    usage: UsageMetadata::default(),
                    model: "canned".into(),
                }),
                Err(e) => Err(anyhow::anyhow!(e.clone())),
            }
        }

        fn model(&self) -> &str {
            "canned"
        }
    }

    fn analyzer(reply: Result<&str, &str>, delay: Duration) -> CredibilityAnalyzer {
        let provider = Canned {
            reply: reply.map(str::to_string).map_err(str::to_string),
            delay,
        };
        CredibilityAnalyzer::new(Some(Arc::new(provider)))
    }

    const TEXT: &str = "Breaking: anonymous official confirmed a university study";

    #[tokio::test]
    async fn remote_score_wins_when_usable() {
        let a = analyzer(Ok("Score: 83"), Duration::ZERO);
        let assessment = a.analyze(TEXT).await;
        assert_eq!(assessment.score, 83);
        assert_eq!(assessment.method, ScoreMethod::Remote);
        assert_eq!(assessment.model.as_deref(), Some("canned"));
        assert_eq!(assessment.signals.len(), 4);
    }

    #[tokio::test]
    async fn falls_back_on_provider_error() {
        let a = analyzer(Err("connection refused"), Duration::ZERO);
        let assessment = a.analyze(TEXT).await;
        assert_eq!(assessment.score, 60);
        assert_eq!(assessment.method, ScoreMethod::Heuristic);
        assert!(assessment.model.is_none());
    }

    #[tokio::test]
    async fn falls_back_on_missing_or_out_of_range_integer() {
        for reply in ["I cannot rate this.", "150", "-3"] {
            let a = analyzer(Ok(reply), Duration::ZERO);
            assert_eq!(a.score(TEXT).await, 60, "reply {:?}", reply);
        }
    }

    #[tokio::test]
    async fn falls_back_on_timeout() {
        let a = analyzer(Ok("90"), Duration::from_millis(500))
            .with_timeout(Duration::from_millis(50));
        assert!(a.remote_score(TEXT).await.is_err());
        assert_eq!(a.score(TEXT).await, 60);
    }

    #[tokio::test]
    async fn heuristic_only_never_calls_out() {
        let a = CredibilityAnalyzer::heuristic_only();
        assert!(!a.has_remote());
        assert!(a.remote_score(TEXT).await.is_err());
        let assessment = a.analyze(TEXT).await;
        assert_eq!(assessment.method, ScoreMethod::Heuristic);
        assert_eq!(assessment.table_version, KEYWORD_TABLE_VERSION);
    }

    #[test]
    fn verdict_bands() {
        assert_eq!(verdict(85), "Likely Trustworthy");
        assert_eq!(verdict(50), "Requires Verification");
        assert_eq!(verdict(10), "High Risk - Verify Carefully");
    }
}
