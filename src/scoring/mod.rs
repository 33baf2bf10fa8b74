//! Content relevance and quality scoring.
//!
//! Everything here is local, deterministic and synchronous. Bad input never
//! raises: empty text, unknown dimensions and unparseable ratings all degrade
//! to zero, neutral or `None`.

pub mod classify;
pub mod rating;
pub mod relevance;
pub mod sentiment;
pub mod technical;

pub use classify::{classify_content, ContentCategory};
pub use rating::extract_rating;
pub use relevance::RelevanceScore;
pub use sentiment::{extract_sentiment, Sentiment};
pub use technical::{score_technical_content, StructuredSignals};

use crate::dimension::{Dimension, KeywordSets};

/// Keyword scorer over a fixed set of dimension keyword sets.
#[derive(Debug, Clone, Default)]
pub struct Scorer {
    keywords: KeywordSets,
}

impl Scorer {
    pub fn new(keywords: KeywordSets) -> Self {
        Scorer { keywords }
    }

    pub fn keywords(&self) -> &KeywordSets {
        &self.keywords
    }

    /// Score `text` against a dimension given by name. Unknown names score zero.
    pub fn score_relevance(&self, text: &str, dimension: &str) -> RelevanceScore {
        match Dimension::parse(dimension) {
            Some(d) => self.score_dimension(text, d),
            None => RelevanceScore::default(),
        }
    }

    pub fn score_dimension(&self, text: &str, dimension: Dimension) -> RelevanceScore {
        self.keywords
            .get(dimension)
            .map(|set| relevance::score_keywords(text, set))
            .unwrap_or_default()
    }

    pub fn score_all(&self, text: &str) -> Vec<(Dimension, RelevanceScore)> {
        Dimension::ALL
            .into_iter()
            .map(|d| (d, self.score_dimension(text, d)))
            .collect()
    }
}

// ── Tests ──

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_text_is_zero_for_every_dimension() {
        let scorer = Scorer::default();
        for d in Dimension::ALL {
            let s = scorer.score_relevance("", d.as_str());
            assert_eq!(s.relevance, 0.0, "{}", d);
            assert_eq!(s.confidence, 0.0, "{}", d);
        }
    }

    #[test]
    fn unknown_dimension_is_zero_not_error() {
        let scorer = Scorer::default();
        let s = scorer.score_relevance("api endpoint rest graphql", "quantum_roadmap");
        assert_eq!(s.relevance, 0.0);
        assert_eq!(s.confidence, 0.0);
        assert_eq!(s.total_keywords, 0);
    }

    #[test]
    fn spreadsheet_tool_is_relevant() {
        let scorer = Scorer::default();
        let s = scorer.score_relevance("This is a spreadsheet tool", "spreadsheet_interface");
        assert!(s.relevance > 0.0);
    }

    #[test]
    fn rest_api_end_to_end() {
        let scorer = Scorer::default();
        let s = scorer.score_relevance(
            "Our REST API supports OAuth authentication and returns JSON. Rate limit: 1000/hour.",
            "api_first_architecture",
        );
        assert!((s.relevance - 3.0 / 6.0).abs() < 1e-9);
        assert!(s.confidence > 0.0 && s.confidence < 1.0);
    }

    #[test]
    fn score_all_covers_each_dimension_once() {
        let scorer = Scorer::default();
        let all = scorer.score_all("Automate any workflow with webhooks and the REST API");
        assert_eq!(all.len(), Dimension::ALL.len());
        let automation = all
            .iter()
            .find(|(d, _)| *d == Dimension::WorkflowAutomation)
            .unwrap();
        assert!(automation.1.keyword_matches >= 2);
    }
}
