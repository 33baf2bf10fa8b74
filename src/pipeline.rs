use std::collections::HashMap;

use anyhow::Result;
use chrono::Utc;
use indicatif::{ProgressBar, ProgressStyle};
use rayon::prelude::*;
use rusqlite::Connection;
use tracing::{debug, warn};

use crate::config::ScoringSettings;
use crate::db::{self, FetchedDoc};
use crate::extract;
use crate::feeds;
use crate::model::{ScoredItem, SourceKind};
use crate::reviews;
use crate::scoring::{
    classify_content, extract_rating, extract_sentiment, score_technical_content,
    ContentCategory, Scorer, Sentiment, StructuredSignals,
};

const CHUNK_SIZE: usize = 200;

pub struct ProcessCounts {
    pub documents: usize,
    pub items: usize,
    pub empty: usize,
}

impl ProcessCounts {
    pub fn print(&self) {
        println!(
            "Scored {} documents into {} items ({} documents had no signal).",
            self.documents, self.items, self.empty,
        );
    }
}

/// What one piece of content contributes before per-dimension scoring.
struct Observation {
    url: String,
    category: ContentCategory,
    title: Option<String>,
    text: String,
    sentiment: Sentiment,
    rating: Option<f64>,
    technical: f64,
}

/// Score one fetched document against every dimension.
///
/// Pages and review pages yield one item per dimension; feeds yield one per
/// entry per dimension. Items with no keyword match or below
/// `min_relevance` are dropped.
pub fn score_document(
    scorer: &Scorer,
    settings: &ScoringSettings,
    doc: &FetchedDoc,
) -> Vec<ScoredItem> {
    score_covering(scorer, settings, doc).1
}

/// Items for `doc` plus every source URL it covered, scored or not.
fn score_covering(
    scorer: &Scorer,
    settings: &ScoringSettings,
    doc: &FetchedDoc,
) -> (Vec<String>, Vec<ScoredItem>) {
    let observations = match doc.kind {
        SourceKind::Page => vec![observe_page(doc)],
        SourceKind::Feed => observe_feed(doc),
        SourceKind::Review => vec![observe_reviews(doc)],
    };

    let urls = observations.iter().map(|obs| obs.url.clone()).collect();
    let items = observations
        .into_iter()
        .flat_map(|obs| to_items(scorer, settings, &doc.company, doc.kind, obs))
        .collect();
    (urls, items)
}

fn observe_page(doc: &FetchedDoc) -> Observation {
    let page = extract::parse_page(&doc.body, Some(&doc.url));
    Observation {
        category: classify_content(&doc.url, &page.text),
        sentiment: extract_sentiment(&page.text),
        rating: extract_rating(&page.text),
        technical: score_technical_content(&page.signals()),
        url: doc.url.clone(),
        title: page.title,
        text: page.text,
    }
}

fn observe_feed(doc: &FetchedDoc) -> Vec<Observation> {
    let entries = match feeds::parse_feed(&doc.body) {
        Ok(entries) => entries,
        Err(e) => {
            warn!("Unreadable feed {}: {}", doc.url, e);
            return Vec::new();
        }
    };

    entries
        .into_iter()
        .enumerate()
        .map(|(i, entry)| {
            let text = entry.text();
            debug!("Feed entry '{}' published {:?}", entry.title, entry.published_at());
            let url = if entry.link.is_empty() {
                format!("{}#item-{}", doc.url, i)
            } else {
                entry.link.clone()
            };
            let signals = StructuredSignals {
                text_length: text.split_whitespace().count(),
                ..StructuredSignals::default()
            };
            let category = match classify_content(&url, &text) {
                ContentCategory::Marketing => ContentCategory::Blog,
                c => c,
            };
            Observation {
                category,
                sentiment: extract_sentiment(&text),
                rating: extract_rating(&text),
                technical: score_technical_content(&signals),
                title: (!entry.title.is_empty()).then(|| entry.title.clone()),
                url,
                text,
            }
        })
        .collect()
}

fn observe_reviews(doc: &FetchedDoc) -> Observation {
    let page = extract::parse_page(&doc.body, Some(&doc.url));
    let snippets = reviews::extract_reviews(&doc.body);
    let text = if snippets.is_empty() {
        page.text.clone()
    } else {
        reviews::combined_text(&snippets)
    };
    let rating = reviews::mean_rating(&snippets).or_else(|| extract_rating(&text));
    Observation {
        url: doc.url.clone(),
        category: ContentCategory::Review,
        title: page.title.clone(),
        sentiment: extract_sentiment(&text),
        rating,
        technical: score_technical_content(&page.signals()),
        text,
    }
}

fn to_items(
    scorer: &Scorer,
    settings: &ScoringSettings,
    company: &str,
    kind: SourceKind,
    obs: Observation,
) -> Vec<ScoredItem> {
    if obs.text.trim().is_empty() {
        return Vec::new();
    }
    let now = Utc::now();
    let raw_text = truncate_chars(&obs.text, settings.max_text_chars);

    scorer
        .score_all(&obs.text)
        .into_iter()
        .filter(|(_, s)| s.keyword_matches > 0 && s.relevance >= settings.min_relevance)
        .map(|(dimension, s)| ScoredItem {
            company: company.to_string(),
            dimension,
            source_url: obs.url.clone(),
            source_kind: kind,
            category: obs.category,
            title: obs.title.clone(),
            raw_text: raw_text.clone(),
            relevance_score: s.relevance,
            confidence_score: s.confidence,
            keyword_matches: s.keyword_matches,
            total_keywords: s.total_keywords,
            sentiment: obs.sentiment,
            extracted_rating: obs.rating,
            technical_score: obs.technical,
            extraction_timestamp: now,
        })
        .collect()
}

fn truncate_chars(s: &str, max: usize) -> String {
    match s.char_indices().nth(max) {
        Some((idx, _)) => s[..idx].to_string(),
        None => s.to_string(),
    }
}

/// Score documents in parallel chunks; each chunk is persisted in one
/// transaction and its fetches marked processed.
///
/// Every URL a document covers is replaced wholesale, so dimensions a refetch
/// no longer scores drop out of the store.
pub fn process_documents(
    conn: &Connection,
    scorer: &Scorer,
    settings: &ScoringSettings,
    docs: &[FetchedDoc],
) -> Result<ProcessCounts> {
    let pb = ProgressBar::new(docs.len() as u64);
    pb.set_style(
        ProgressStyle::default_bar()
            .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} ({per_sec})")?
            .progress_chars("#>-"),
    );

    let mut counts = ProcessCounts {
        documents: 0,
        items: 0,
        empty: 0,
    };

    for chunk in docs.chunks(CHUNK_SIZE) {
        let results: Vec<(Vec<String>, Vec<ScoredItem>)> = chunk
            .par_iter()
            .map(|doc| score_covering(scorer, settings, doc))
            .collect();

        // The last fetch of a URL within the chunk wins.
        let mut latest: HashMap<(String, String), usize> = HashMap::new();
        for (idx, (doc, (urls, _))) in chunk.iter().zip(&results).enumerate() {
            for url in urls {
                latest.insert((doc.company.clone(), url.clone()), idx);
            }
        }

        let mut covered = Vec::new();
        let mut items = Vec::new();
        for (idx, (doc, (urls, scored))) in chunk.iter().zip(results).enumerate() {
            if scored.is_empty() {
                debug!("No signal in {}", doc.url);
                counts.empty += 1;
            }
            let owns = |url: &str| {
                latest.get(&(doc.company.clone(), url.to_string())) == Some(&idx)
            };
            items.extend(scored.into_iter().filter(|i| owns(i.source_url.as_str())));
            covered.extend(
                urls.into_iter()
                    .filter(|u| owns(u.as_str()))
                    .map(|u| (doc.company.clone(), u)),
            );
        }

        counts.items += db::replace_items(conn, &covered, &items)?;
        let ids: Vec<i64> = chunk.iter().map(|d| d.fetch_id).collect();
        db::mark_processed(conn, &ids)?;
        counts.documents += chunk.len();
        pb.inc(chunk.len() as u64);
    }

    pb.finish_and_clear();
    Ok(counts)
}

// ── Tests ──

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dimension::Dimension;

    fn doc(kind: SourceKind, url: &str, body: String) -> FetchedDoc {
        FetchedDoc {
            fetch_id: 1,
            company: "acme".into(),
            kind,
            url: url.into(),
            body,
        }
    }

    fn fixture(name: &str) -> String {
        std::fs::read_to_string(format!("tests/fixtures/{}", name)).unwrap()
    }

    #[test]
    fn api_page_scores_api_dimension() {
        let scorer = Scorer::default();
        let d = doc(
            SourceKind::Page,
            "https://acme.example/docs/api/",
            fixture("api_docs.html"),
        );
        let items = score_document(&scorer, &ScoringSettings::default(), &d);

        let api = items
            .iter()
            .find(|i| i.dimension == Dimension::ApiFirstArchitecture)
            .expect("api item");
        assert!(api.relevance_score > 0.5);
        assert_eq!(api.category, ContentCategory::ApiReference);
        assert_eq!(api.title.as_deref(), Some("Acme REST API Reference"));
        assert!(api.technical_score > 5.0);
        assert!(items.iter().all(|i| i.keyword_matches > 0));
        assert!(items.iter().all(|i| i.source_url == d.url));
    }

    #[test]
    fn feed_yields_items_per_entry() {
        let scorer = Scorer::default();
        let d = doc(
            SourceKind::Feed,
            "https://blog.acme.example/rss",
            fixture("blog_rss.xml"),
        );
        let items = score_document(&scorer, &ScoringSettings::default(), &d);
        assert!(items
            .iter()
            .any(|i| i.source_url == "https://blog.acme.example/graphql-api"
                && i.dimension == Dimension::ApiFirstArchitecture));
        assert!(items.iter().all(|i| i.source_kind == SourceKind::Feed));
    }

    #[test]
    fn review_page_carries_mean_rating() {
        let scorer = Scorer::default();
        let d = doc(
            SourceKind::Review,
            "https://www.g2.com/products/acme/reviews",
            fixture("review_page.html"),
        );
        let items = score_document(&scorer, &ScoringSettings::default(), &d);
        assert!(!items.is_empty());
        for i in &items {
            assert_eq!(i.category, ContentCategory::Review);
            assert_eq!(i.extracted_rating, Some(3.25));
        }
    }

    #[test]
    fn threshold_and_truncation() {
        let scorer = Scorer::default();
        let body = "<html><body><p>Our REST API endpoint with an SDK and a spreadsheet grid view.</p></body></html>";
        let settings = ScoringSettings {
            min_relevance: 0.4,
            max_text_chars: 10,
            ..ScoringSettings::default()
        };
        let items = score_document(
            &scorer,
            &settings,
            &doc(SourceKind::Page, "https://acme.example/", body.to_string()),
        );
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].dimension, Dimension::ApiFirstArchitecture);
        assert_eq!(items[0].raw_text.chars().count(), 10);
    }

    #[test]
    fn garbage_feed_is_empty() {
        let scorer = Scorer::default();
        let d = doc(SourceKind::Feed, "https://x/feed", "<rss><item><title>a</oops>".into());
        assert!(score_document(&scorer, &ScoringSettings::default(), &d).is_empty());
    }

    #[test]
    fn process_persists_and_marks() {
        let conn = db::tests::memory_db();
        conn.execute(
            "INSERT INTO sources (id, company, kind, url) VALUES (1, 'acme', 'page', 'https://acme.example/docs/api/')",
            [],
        )
        .unwrap();
        conn.execute(
            "INSERT INTO fetches (id, source_id, company, kind, url, body) VALUES (1, 1, 'acme', 'page', 'https://acme.example/docs/api/', ?1)",
            [fixture("api_docs.html")],
        )
        .unwrap();

        let docs = db::fetch_unprocessed(&conn, None).unwrap();
        let scorer = Scorer::default();
        let counts =
            process_documents(&conn, &scorer, &ScoringSettings::default(), &docs).unwrap();
        assert_eq!(counts.documents, 1);
        assert!(counts.items > 0);
        assert!(db::fetch_unprocessed(&conn, None).unwrap().is_empty());

        // Reprocessing the same document updates in place.
        let again = process_documents(&conn, &scorer, &ScoringSettings::default(), &docs).unwrap();
        assert_eq!(db::get_stats(&conn).unwrap().items, again.items);
    }

    fn seed_fetch(conn: &Connection, id: i64, body: &str) {
        conn.execute(
            "INSERT OR IGNORE INTO sources (id, company, kind, url) VALUES (1, 'acme', 'page', 'https://acme.example/')",
            [],
        )
        .unwrap();
        conn.execute(
            "INSERT INTO fetches (id, source_id, company, kind, url, body) VALUES (?1, 1, 'acme', 'page', 'https://acme.example/', ?2)",
            rusqlite::params![id, body],
        )
        .unwrap();
    }

    #[test]
    fn refetch_drops_dimensions_no_longer_scored() {
        let conn = db::tests::memory_db();
        let scorer = Scorer::default();
        let settings = ScoringSettings::default();

        seed_fetch(&conn, 1, "<html><body><p>Our REST API and SDK</p></body></html>");
        let docs = db::fetch_unprocessed(&conn, None).unwrap();
        process_documents(&conn, &scorer, &settings, &docs).unwrap();
        let api = db::aggregate(&conn, "acme", Dimension::ApiFirstArchitecture).unwrap();
        assert_eq!(api.item_count, 1);
        assert!((api.mean_relevance - 0.5).abs() < 1e-9);

        seed_fetch(&conn, 2, "<html><body><p>We now sell spreadsheets only</p></body></html>");
        let docs = db::fetch_unprocessed(&conn, None).unwrap();
        process_documents(&conn, &scorer, &settings, &docs).unwrap();

        let api = db::aggregate(&conn, "acme", Dimension::ApiFirstArchitecture).unwrap();
        assert_eq!(api.item_count, 0);
        assert_eq!(api.mean_relevance, 0.0);
        let sheet = db::aggregate(&conn, "acme", Dimension::SpreadsheetInterface).unwrap();
        assert_eq!(sheet.item_count, 1);
    }

    #[test]
    fn later_fetch_in_same_chunk_wins() {
        let conn = db::tests::memory_db();
        seed_fetch(&conn, 1, "<html><body><p>Our REST API and SDK</p></body></html>");
        seed_fetch(&conn, 2, "<html><body><p>We now sell spreadsheets only</p></body></html>");

        let docs = db::fetch_unprocessed(&conn, None).unwrap();
        assert_eq!(docs.len(), 2);
        process_documents(&conn, &Scorer::default(), &ScoringSettings::default(), &docs).unwrap();

        let api = db::aggregate(&conn, "acme", Dimension::ApiFirstArchitecture).unwrap();
        assert_eq!(api.item_count, 0);
        let sheet = db::aggregate(&conn, "acme", Dimension::SpreadsheetInterface).unwrap();
        assert_eq!(sheet.item_count, 1);
    }

    #[test]
    fn unreadable_feed_keeps_earlier_items() {
        let conn = db::tests::memory_db();
        conn.execute(
            "INSERT INTO sources (id, company, kind, url) VALUES (1, 'acme', 'feed', 'https://x/feed')",
            [],
        )
        .unwrap();
        let mut kept = db::tests::item("acme", Dimension::ApiFirstArchitecture, "https://x/post", 0.5);
        kept.source_kind = SourceKind::Feed;
        db::replace_items(&conn, &[], &[kept]).unwrap();
        conn.execute(
            "INSERT INTO fetches (id, source_id, company, kind, url, body) VALUES (1, 1, 'acme', 'feed', 'https://x/feed', '<rss><item>')",
            [],
        )
        .unwrap();

        let docs = db::fetch_unprocessed(&conn, None).unwrap();
        process_documents(&conn, &Scorer::default(), &ScoringSettings::default(), &docs).unwrap();
        assert_eq!(db::get_stats(&conn).unwrap().items, 1);
    }
}
