//! Deterministic keyword scoring used when the remote model is unavailable.
//!
//! Each group fires at most once no matter how many of its keywords appear.
//! Matching is a substring test on the lowercased text, so "unconfirmed"
//! also counts as "confirmed".

use serde::Serialize;

/// Bumped whenever a keyword or weight in [`KEYWORD_TABLE`] changes.
pub const KEYWORD_TABLE_VERSION: u32 = 2;

/// Score of a text that trips no group.
pub const BASELINE: i32 = 50;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SignalKind {
    Academic,
    Confirmation,
    Expertise,
    Citation,
    Sensational,
    Anonymous,
    Hearsay,
    Conspiracy,
}

#[derive(Debug)]
enum Matcher {
    Keywords(&'static [&'static str]),
    /// An absolute http(s) link somewhere in the text
    Link,
}

#[derive(Debug)]
pub struct KeywordGroup {
    pub kind: SignalKind,
    pub weight: i32,
    pub note: &'static str,
    matcher: Matcher,
}

pub const KEYWORD_TABLE: &[KeywordGroup] = &[
    KeywordGroup {
        kind: SignalKind::Academic,
        weight: 20,
        note: "Academic sources mentioned.",
        matcher: Matcher::Keywords(&["study", "research", "university"]),
    },
    KeywordGroup {
        kind: SignalKind::Confirmation,
        weight: 15,
        note: "Official confirmation language used.",
        matcher: Matcher::Keywords(&["confirmed", "verified", "official"]),
    },
    KeywordGroup {
        kind: SignalKind::Expertise,
        weight: 10,
        note: "Expert voices quoted.",
        matcher: Matcher::Keywords(&["expert", "professor", "scientist"]),
    },
    KeywordGroup {
        kind: SignalKind::Citation,
        weight: 8,
        note: "Links to external references.",
        matcher: Matcher::Link,
    },
    KeywordGroup {
        kind: SignalKind::Sensational,
        weight: -10,
        note: "Sensational language detected.",
        matcher: Matcher::Keywords(&["breaking", "urgent", "shocking"]),
    },
    KeywordGroup {
        kind: SignalKind::Anonymous,
        weight: -15,
        note: "Anonymous sources present.",
        matcher: Matcher::Keywords(&["anonymous", "unnamed source"]),
    },
    KeywordGroup {
        kind: SignalKind::Hearsay,
        weight: -20,
        note: "Unconfirmed or rumored claims.",
        matcher: Matcher::Keywords(&["rumor", "allegedly", "unconfirmed"]),
    },
    KeywordGroup {
        kind: SignalKind::Conspiracy,
        weight: -30,
        note: "Conspiratorial framing.",
        matcher: Matcher::Keywords(&["conspiracy", "cover-up", "they don't want you to know"]),
    },
];

impl KeywordGroup {
    fn matches(&self, lowered: &str) -> bool {
        match &self.matcher {
            Matcher::Keywords(words) => words.iter().any(|w| lowered.contains(w)),
            Matcher::Link => contains_link(lowered),
        }
    }
}

/// A group that fired during assessment
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Signal {
    pub kind: SignalKind,
    pub weight: i32,
    pub note: &'static str,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct HeuristicReport {
    pub score: u8,
    pub signals: Vec<Signal>,
}

/// Score `text` and report which groups contributed.
pub fn assess(text: &str) -> HeuristicReport {
    let lowered = text.to_lowercase();

    let signals: Vec<Signal> = KEYWORD_TABLE
        .iter()
        .filter(|group| group.matches(&lowered))
        .map(|group| Signal {
            kind: group.kind,
            weight: group.weight,
            note: group.note,
        })
        .collect();

    let raw = BASELINE + signals.iter().map(|s| s.weight).sum::<i32>();

    HeuristicReport {
        score: raw.clamp(0, 100) as u8,
        signals,
    }
}

pub fn score(text: &str) -> u8 {
    assess(text).score
}

fn contains_link(text: &str) -> bool {
    text.split_whitespace()
        .map(|token| token.trim_matches(|c: char| matches!(c, '(' | ')' | '<' | '>' | '"' | '\'' | ',' | '[' | ']')))
        .filter(|token| token.starts_with("http://") || token.starts_with("https://"))
        .any(|token| {
            url::Url::parse(token)
                .map(|u| u.host_str().map_or(false, |h| !h.is_empty()))
                .unwrap_or(false)
        })
}
