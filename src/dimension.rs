use std::collections::{BTreeSet, HashMap};
use std::fmt;

use serde::{Deserialize, Serialize};
use tracing::warn;

/// Strategic dimensions competitor content is scored against.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Dimension {
    ApiFirstArchitecture,
    SpreadsheetInterface,
    AiCapabilities,
    WorkflowAutomation,
    EnterpriseReadiness,
    Collaboration,
    PricingModel,
}

impl Dimension {
    pub const ALL: [Dimension; 7] = [
        Dimension::ApiFirstArchitecture,
        Dimension::SpreadsheetInterface,
        Dimension::AiCapabilities,
        Dimension::WorkflowAutomation,
        Dimension::EnterpriseReadiness,
        Dimension::Collaboration,
        Dimension::PricingModel,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Dimension::ApiFirstArchitecture => "api_first_architecture",
            Dimension::SpreadsheetInterface => "spreadsheet_interface",
            Dimension::AiCapabilities => "ai_capabilities",
            Dimension::WorkflowAutomation => "workflow_automation",
            Dimension::EnterpriseReadiness => "enterprise_readiness",
            Dimension::Collaboration => "collaboration",
            Dimension::PricingModel => "pricing_model",
        }
    }

    /// Unknown names yield `None`; callers treat that as zero signal.
    pub fn parse(name: &str) -> Option<Self> {
        let name = name.trim().to_lowercase();
        Self::ALL.into_iter().find(|d| d.as_str() == name)
    }

    fn default_keywords(self) -> &'static [&'static str] {
        match self {
            Dimension::ApiFirstArchitecture => {
                &["api", "endpoint", "rest", "graphql", "sdk", "authentication"]
            }
            Dimension::SpreadsheetInterface => &[
                "spreadsheet",
                "grid view",
                "formula",
                "cell",
                "pivot",
                "csv",
                "excel",
            ],
            Dimension::AiCapabilities => &[
                "artificial intelligence",
                "machine learning",
                "ai-powered",
                "llm",
                "copilot",
                "gpt",
                "generative",
            ],
            Dimension::WorkflowAutomation => &[
                "automation",
                "workflow",
                "trigger",
                "webhook",
                "integration",
                "zapier",
                "scheduled",
            ],
            Dimension::EnterpriseReadiness => &[
                "sso",
                "saml",
                "soc 2",
                "gdpr",
                "hipaa",
                "audit log",
                "compliance",
                "permissions",
            ],
            Dimension::Collaboration => &[
                "real-time",
                "collaborat",
                "comments",
                "sharing",
                "mentions",
                "team",
            ],
            Dimension::PricingModel => &[
                "pricing",
                "free plan",
                "per seat",
                "per user",
                "free trial",
                "billing",
                "enterprise plan",
            ],
        }
    }
}

impl fmt::Display for Dimension {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Full Unicode case folding, so `"ß"` and `"SS"` compare equal.
pub fn fold_case(s: &str) -> String {
    caseless::default_case_fold_str(s)
}

/// Keywords for one dimension, case-folded and de-duplicated.
#[derive(Debug, Clone, Serialize)]
pub struct DimensionKeywordSet {
    pub dimension: Dimension,
    pub keywords: BTreeSet<String>,
}

impl DimensionKeywordSet {
    pub fn new<I, S>(dimension: Dimension, keywords: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let keywords = keywords
            .into_iter()
            .map(|k| fold_case(k.as_ref().trim()))
            .filter(|k| !k.is_empty())
            .collect();
        DimensionKeywordSet { dimension, keywords }
    }

    pub fn len(&self) -> usize {
        self.keywords.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keywords.is_empty()
    }
}

/// All keyword sets, built once at startup and shared read-only.
#[derive(Debug, Clone)]
pub struct KeywordSets {
    sets: HashMap<Dimension, DimensionKeywordSet>,
}

impl KeywordSets {
    pub fn defaults() -> Self {
        let sets = Dimension::ALL
            .into_iter()
            .map(|d| (d, DimensionKeywordSet::new(d, d.default_keywords())))
            .collect();
        KeywordSets { sets }
    }

    /// Defaults with whole-set replacements keyed by dimension name.
    pub fn with_overrides(overrides: &HashMap<String, Vec<String>>) -> Self {
        let mut sets = Self::defaults();
        for (name, keywords) in overrides {
            match Dimension::parse(name) {
                Some(d) => {
                    sets.sets.insert(d, DimensionKeywordSet::new(d, keywords));
                }
                None => warn!("Ignoring keyword override for unknown dimension '{}'", name),
            }
        }
        sets
    }

    pub fn get(&self, dimension: Dimension) -> Option<&DimensionKeywordSet> {
        self.sets.get(&dimension)
    }

    /// Sets in `Dimension::ALL` order.
    pub fn iter(&self) -> impl Iterator<Item = &DimensionKeywordSet> {
        Dimension::ALL.iter().filter_map(|d| self.sets.get(d))
    }
}

impl Default for KeywordSets {
    fn default() -> Self {
        Self::defaults()
    }
}

// ── Tests ──

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn names_parse_back() {
        for d in Dimension::ALL {
            assert_eq!(Dimension::parse(d.as_str()), Some(d));
        }
        assert_eq!(
            Dimension::parse("  Spreadsheet_Interface "),
            Some(Dimension::SpreadsheetInterface)
        );
        assert_eq!(Dimension::parse("blockchain_strategy"), None);
        assert_eq!(Dimension::parse(""), None);
    }

    #[test]
    fn api_defaults_are_the_six_core_terms() {
        let sets = KeywordSets::defaults();
        let api = sets.get(Dimension::ApiFirstArchitecture).unwrap();
        let words: Vec<&str> = api.keywords.iter().map(String::as_str).collect();
        assert_eq!(
            words,
            vec!["api", "authentication", "endpoint", "graphql", "rest", "sdk"]
        );
        assert!(sets
            .get(Dimension::SpreadsheetInterface)
            .unwrap()
            .keywords
            .contains("spreadsheet"));
    }

    #[test]
    fn overrides_replace_whole_set_and_skip_unknown() {
        let mut overrides = HashMap::new();
        overrides.insert(
            "pricing_model".to_string(),
            vec!["Pricing".to_string(), " seat ".to_string(), "".to_string()],
        );
        overrides.insert("nonsense".to_string(), vec!["x".to_string()]);

        let sets = KeywordSets::with_overrides(&overrides);
        let pricing = sets.get(Dimension::PricingModel).unwrap();
        assert_eq!(pricing.len(), 2);
        assert!(pricing.keywords.contains("pricing"));
        assert!(pricing.keywords.contains("seat"));
        assert_eq!(sets.iter().count(), Dimension::ALL.len());
    }

    #[test]
    fn keywords_are_case_folded() {
        let set = DimensionKeywordSet::new(Dimension::PricingModel, ["Maßgeschneidert", "PER SEAT"]);
        assert!(set.keywords.contains("massgeschneidert"));
        assert!(set.keywords.contains("per seat"));
        assert_eq!(fold_case("STRASSE"), fold_case("straße"));
    }

    #[test]
    fn serde_uses_snake_case_names() {
        let json = serde_json::to_string(&Dimension::ApiFirstArchitecture).unwrap();
        assert_eq!(json, "\"api_first_architecture\"");
    }
}
