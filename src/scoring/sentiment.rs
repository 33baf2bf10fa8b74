use std::cmp::Ordering;
use std::fmt;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Sentiment {
    Positive,
    Neutral,
    Negative,
}

impl Sentiment {
    pub fn as_str(self) -> &'static str {
        match self {
            Sentiment::Positive => "positive",
            Sentiment::Neutral => "neutral",
            Sentiment::Negative => "negative",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "positive" => Some(Sentiment::Positive),
            "neutral" => Some(Sentiment::Neutral),
            "negative" => Some(Sentiment::Negative),
            _ => None,
        }
    }
}

impl fmt::Display for Sentiment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// No entry is a substring of another entry in either list.
const POSITIVE_WORDS: &[&str] = &[
    "good",
    "great",
    "excellent",
    "amazing",
    "love",
    "best",
    "easy",
    "helpful",
    "intuitive",
    "powerful",
    "fantastic",
    "recommend",
    "reliable",
    "awesome",
    "flexible",
];

const NEGATIVE_WORDS: &[&str] = &[
    "bad",
    "terrible",
    "poor",
    "awful",
    "hate",
    "worst",
    "difficult",
    "slow",
    "buggy",
    "expensive",
    "confusing",
    "frustrat",
    "broken",
    "lacking",
    "disappoint",
];

/// Positive/negative word tally; ties (including none at all) are neutral.
pub fn extract_sentiment(text: &str) -> Sentiment {
    let folded = text.to_lowercase();
    let positive = count_hits(&folded, POSITIVE_WORDS);
    let negative = count_hits(&folded, NEGATIVE_WORDS);

    match positive.cmp(&negative) {
        Ordering::Greater => Sentiment::Positive,
        Ordering::Less => Sentiment::Negative,
        Ordering::Equal => Sentiment::Neutral,
    }
}

fn count_hits(text: &str, words: &[&str]) -> usize {
    words.iter().map(|w| text.matches(w).count()).sum()
}

// ── Tests ──
