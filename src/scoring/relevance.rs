use serde::Serialize;

use crate::dimension::{fold_case, DimensionKeywordSet};

/// Weight of the raw match ratio in the confidence blend.
const RATIO_WEIGHT: f64 = 0.7;
/// Per-mille scale applied to the match density term. Matches per character
/// divided by this is at most 0.001, so confidence is `0.7 * relevance` plus a
/// negligible bump and short snippets are not penalised in practice.
const DENSITY_SCALE: f64 = 1000.0;

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize)]
pub struct RelevanceScore {
    pub relevance: f64,
    pub confidence: f64,
    pub keyword_matches: usize,
    pub total_keywords: usize,
}

impl RelevanceScore {
    /// Relevance on the 0–100 scale some callers report.
    pub fn relevance_pct(&self) -> f64 {
        self.relevance * 100.0
    }
}

/// Count distinct keywords present in `text` (case-folded substring match).
pub fn score_keywords(text: &str, set: &DimensionKeywordSet) -> RelevanceScore {
    let total_keywords = set.len();
    if text.trim().is_empty() || set.is_empty() {
        return RelevanceScore {
            total_keywords,
            ..RelevanceScore::default()
        };
    }

    let folded = fold_case(text);
    let keyword_matches = set
        .keywords
        .iter()
        .filter(|k| folded.contains(k.as_str()))
        .count();

    let relevance = (keyword_matches as f64 / total_keywords as f64).clamp(0.0, 1.0);
    let length = folded.chars().count().max(1) as f64;
    let density = keyword_matches as f64 / length / DENSITY_SCALE;
    let confidence = (relevance * RATIO_WEIGHT + density).min(1.0);

    RelevanceScore {
        relevance,
        confidence,
        keyword_matches,
        total_keywords,
    }
}

// ── Tests ──

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dimension::{Dimension, KeywordSets};

    fn api_set() -> DimensionKeywordSet {
        KeywordSets::defaults()
            .get(Dimension::ApiFirstArchitecture)
            .unwrap()
            .clone()
    }

    #[test]
    fn rest_api_snippet_matches_half_the_keywords() {
        let text =
            "Our REST API supports OAuth authentication and returns JSON. Rate limit: 1000/hour.";
        let s = score_keywords(text, &api_set());
        assert_eq!(s.keyword_matches, 3);
        assert_eq!(s.total_keywords, 6);
        assert!((s.relevance - 0.5).abs() < 1e-9);
        assert!(s.confidence > 0.0 && s.confidence < 1.0);
        assert!((s.relevance_pct() - 50.0).abs() < 1e-9);
    }

    #[test]
    fn empty_text_is_zero() {
        let s = score_keywords("", &api_set());
        assert_eq!(s.relevance, 0.0);
        assert_eq!(s.confidence, 0.0);
        assert_eq!(s.keyword_matches, 0);
        let s = score_keywords("   \n\t", &api_set());
        assert_eq!(s.relevance, 0.0);
        assert_eq!(s.confidence, 0.0);
    }

    #[test]
    fn case_changes_do_not_matter() {
        let text = "GraphQL endpoint with an SDK";
        let a = score_keywords(text, &api_set());
        let b = score_keywords(&text.to_uppercase(), &api_set());
        let c = score_keywords(&text.to_lowercase(), &api_set());
        assert_eq!(a, b);
        assert_eq!(a, c);
        assert_eq!(a.keyword_matches, 3);
    }

    #[test]
    fn sharp_s_folds_like_its_uppercase() {
        let enterprise = KeywordSets::defaults()
            .get(Dimension::EnterpriseReadiness)
            .unwrap()
            .clone();
        let text = "Anmeldung per ßo";
        let lower = score_keywords(text, &enterprise);
        let upper = score_keywords(&text.to_uppercase(), &enterprise);
        assert_eq!(lower, upper);
        assert_eq!(lower.keyword_matches, 1);
        assert!((lower.relevance - 0.125).abs() < 1e-9);

        let street = score_keywords("Straße API", &api_set());
        assert_eq!(street, score_keywords("STRASSE API", &api_set()));
        assert_eq!(street, score_keywords("strasse api", &api_set()));
    }

    #[test]
    fn confidence_tracks_relevance() {
        let s = score_keywords("sdk", &api_set());
        let ratio = s.relevance * 0.7;
        assert!(s.confidence > ratio);
        assert!(s.confidence - ratio <= 0.001);
    }

    #[test]
    fn no_match_means_no_confidence() {
        let s = score_keywords("A cozy cafe with great coffee", &api_set());
        assert_eq!(s.keyword_matches, 0);
        assert_eq!(s.relevance, 0.0);
        assert_eq!(s.confidence, 0.0);
    }

    #[test]
    fn every_keyword_caps_relevance_at_one() {
        let text = "api endpoint rest graphql sdk authentication api api";
        let s = score_keywords(text, &api_set());
        assert_eq!(s.relevance, 1.0);
        assert!(s.confidence <= 1.0);
        assert!(s.confidence >= 0.7);
    }

    #[test]
    fn empty_keyword_set_is_zero_signal() {
        let set = DimensionKeywordSet::new(Dimension::PricingModel, Vec::<String>::new());
        let s = score_keywords("pricing page", &set);
        assert_eq!(s, RelevanceScore::default());
    }
}
