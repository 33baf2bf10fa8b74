use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::dimension::Dimension;
use crate::scoring::{ContentCategory, Sentiment};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceKind {
    Page,
    Feed,
    Review,
}

impl SourceKind {
    pub fn as_str(self) -> &'static str {
        match self {
            SourceKind::Page => "page",
            SourceKind::Feed => "feed",
            SourceKind::Review => "review",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "page" => Some(SourceKind::Page),
            "feed" => Some(SourceKind::Feed),
            "review" => Some(SourceKind::Review),
            _ => None,
        }
    }
}

impl fmt::Display for SourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Source {
    pub url: String,
    pub kind: SourceKind,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Company {
    pub name: String,
    pub slug: String,
    #[serde(default)]
    pub sources: Vec<Source>,
}

/// One scored (company, dimension, url) observation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoredItem {
    pub company: String,
    pub dimension: Dimension,
    pub source_url: String,
    pub source_kind: SourceKind,
    pub category: ContentCategory,
    pub title: Option<String>,
    pub raw_text: String,
    pub relevance_score: f64,
    pub confidence_score: f64,
    pub keyword_matches: usize,
    pub total_keywords: usize,
    pub sentiment: Sentiment,
    pub extracted_rating: Option<f64>,
    pub technical_score: f64,
    pub extraction_timestamp: DateTime<Utc>,
}

/// Competitors tracked when no `companies` list is configured.
pub fn default_companies() -> Vec<Company> {
    fn company(name: &str, slug: &str, sources: &[(&str, SourceKind)]) -> Company {
        Company {
            name: name.to_string(),
            slug: slug.to_string(),
            sources: sources
                .iter()
                .map(|(url, kind)| Source {
                    url: url.to_string(),
                    kind: *kind,
                })
                .collect(),
        }
    }

    vec![
        company(
            "Airtable",
            "airtable",
            &[
                ("https://www.airtable.com/platform", SourceKind::Page),
                ("https://airtable.com/developers/web/api/introduction", SourceKind::Page),
                ("https://www.airtable.com/pricing", SourceKind::Page),
                ("https://blog.airtable.com/rss/", SourceKind::Feed),
                ("https://www.g2.com/products/airtable/reviews", SourceKind::Review),
            ],
        ),
        company(
            "Smartsheet",
            "smartsheet",
            &[
                ("https://www.smartsheet.com/platform", SourceKind::Page),
                ("https://developers.smartsheet.com/api/smartsheet/introduction", SourceKind::Page),
                ("https://www.smartsheet.com/pricing", SourceKind::Page),
                ("https://www.g2.com/products/smartsheet/reviews", SourceKind::Review),
            ],
        ),
        company(
            "Notion",
            "notion",
            &[
                ("https://www.notion.so/product", SourceKind::Page),
                ("https://developers.notion.com/reference/intro", SourceKind::Page),
                ("https://www.notion.so/pricing", SourceKind::Page),
                ("https://www.notion.so/releases/rss.xml", SourceKind::Feed),
                ("https://www.g2.com/products/notion/reviews", SourceKind::Review),
            ],
        ),
        company(
            "Coda",
            "coda",
            &[
                ("https://coda.io/product", SourceKind::Page),
                ("https://coda.io/developers/apis/v1", SourceKind::Page),
                ("https://coda.io/pricing", SourceKind::Page),
                ("https://www.g2.com/products/coda/reviews", SourceKind::Review),
            ],
        ),
        company(
            "Baserow",
            "baserow",
            &[
                ("https://baserow.io/product", SourceKind::Page),
                ("https://baserow.io/docs/apis/rest-api", SourceKind::Page),
                ("https://baserow.io/pricing", SourceKind::Page),
                ("https://baserow.io/blog/rss", SourceKind::Feed),
            ],
        ),
        company(
            "NocoDB",
            "nocodb",
            &[
                ("https://nocodb.com/", SourceKind::Page),
                ("https://docs.nocodb.com/developer-resources/rest-apis/overview", SourceKind::Page),
                ("https://github.com/nocodb/nocodb/releases.atom", SourceKind::Feed),
                ("https://www.g2.com/products/nocodb/reviews", SourceKind::Review),
            ],
        ),
    ]
}

// ── Tests ──

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_companies_have_unique_slugs_and_sources() {
        let companies = default_companies();
        let mut slugs: Vec<&str> = companies.iter().map(|c| c.slug.as_str()).collect();
        slugs.sort();
        slugs.dedup();
        assert_eq!(slugs.len(), companies.len());
        assert!(companies.iter().all(|c| !c.sources.is_empty()));
    }

    #[test]
    fn source_kind_names_parse_back() {
        for k in [SourceKind::Page, SourceKind::Feed, SourceKind::Review] {
            assert_eq!(SourceKind::parse(k.as_str()), Some(k));
        }
        assert_eq!(SourceKind::parse("tweet"), None);
    }
}
