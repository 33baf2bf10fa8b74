use std::collections::HashSet;
use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use rusqlite::types::Type;
use rusqlite::{params, Connection, Row};
use serde::Serialize;

use crate::dimension::Dimension;
use crate::model::{Company, ScoredItem, SourceKind};
use crate::scoring::{ContentCategory, Sentiment};

pub fn connect(path: &Path) -> Result<Connection> {
    if let Some(dir) = path.parent().filter(|d| !d.as_os_str().is_empty()) {
        fs::create_dir_all(dir).with_context(|| format!("Failed to create {:?}", dir))?;
    }
    let conn = Connection::open(path).with_context(|| format!("Failed to open {:?}", path))?;
    conn.execute_batch("PRAGMA journal_mode=WAL; PRAGMA foreign_keys=ON;")?;
    Ok(conn)
}

pub fn init_schema(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "
        CREATE TABLE IF NOT EXISTS sources (
            id         INTEGER PRIMARY KEY,
            company    TEXT NOT NULL,
            kind       TEXT NOT NULL CHECK(kind IN ('page','feed','review')),
            url        TEXT NOT NULL,
            visited    BOOLEAN NOT NULL DEFAULT 0,
            visited_at TEXT,
            created_at TEXT NOT NULL DEFAULT (datetime('now')),
            UNIQUE(company, url)
        );
        CREATE INDEX IF NOT EXISTS idx_sources_visited ON sources(visited);

        CREATE TABLE IF NOT EXISTS fetches (
            id           INTEGER PRIMARY KEY,
            source_id    INTEGER NOT NULL REFERENCES sources(id),
            company      TEXT NOT NULL,
            kind         TEXT NOT NULL,
            url          TEXT NOT NULL,
            body         TEXT,
            status       INTEGER,
            error        TEXT,
            latency_ms   INTEGER,
            fetched_at   TEXT NOT NULL DEFAULT (datetime('now')),
            processed_at TEXT
        );
        CREATE INDEX IF NOT EXISTS idx_fetches_company ON fetches(company);

        CREATE TABLE IF NOT EXISTS scored_items (
            id              INTEGER PRIMARY KEY,
            company         TEXT NOT NULL,
            dimension       TEXT NOT NULL,
            source_url      TEXT NOT NULL,
            source_kind     TEXT NOT NULL,
            category        TEXT NOT NULL,
            title           TEXT,
            raw_text        TEXT NOT NULL,
            relevance       REAL NOT NULL,
            confidence      REAL NOT NULL,
            keyword_matches INTEGER NOT NULL,
            total_keywords  INTEGER NOT NULL,
            sentiment       TEXT NOT NULL CHECK(sentiment IN ('positive','neutral','negative')),
            rating          REAL,
            technical_score REAL NOT NULL,
            extracted_at    TEXT NOT NULL,
            updated_at      TEXT NOT NULL DEFAULT (datetime('now')),
            UNIQUE(company, dimension, source_url)
        );
        CREATE INDEX IF NOT EXISTS idx_items_company_dim ON scored_items(company, dimension);

        CREATE TABLE IF NOT EXISTS reports (
            id         INTEGER PRIMARY KEY,
            company    TEXT NOT NULL,
            body       TEXT NOT NULL,
            origin     TEXT NOT NULL CHECK(origin IN ('llm','fallback')),
            model      TEXT,
            created_at TEXT NOT NULL DEFAULT (datetime('now'))
        );
        CREATE INDEX IF NOT EXISTS idx_reports_company ON reports(company);
        ",
    )?;
    Ok(())
}

// ── Sources ──

pub fn insert_sources(conn: &Connection, companies: &[Company]) -> Result<usize> {
    let tx = conn.unchecked_transaction()?;
    let mut count = 0;
    {
        let mut stmt =
            tx.prepare("INSERT OR IGNORE INTO sources (company, kind, url) VALUES (?1, ?2, ?3)")?;
        for c in companies {
            for s in &c.sources {
                count += stmt.execute(params![c.slug, s.kind.as_str(), s.url])?;
            }
        }
    }
    tx.commit()?;
    Ok(count)
}

#[derive(Debug, Clone)]
pub struct PendingSource {
    pub id: i64,
    pub company: String,
    pub kind: SourceKind,
    pub url: String,
}

pub fn fetch_unvisited(
    conn: &Connection,
    company: Option<&str>,
    limit: Option<usize>,
) -> Result<Vec<PendingSource>> {
    let sql = format!(
        "SELECT id, company, kind, url FROM sources
         WHERE visited = 0 AND (?1 IS NULL OR company = ?1)
         ORDER BY id{}",
        match limit {
            Some(n) => format!(" LIMIT {}", n),
            None => String::new(),
        }
    );
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt
        .query_map(params![company], |row| {
            Ok(PendingSource {
                id: row.get(0)?,
                company: row.get(1)?,
                kind: parse_col(row, 2, SourceKind::parse)?,
                url: row.get(3)?,
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}

/// Mark sources unvisited again so the next fetch picks them up.
pub fn reset_visited(conn: &Connection, company: Option<&str>) -> Result<usize> {
    let n = conn.execute(
        "UPDATE sources SET visited = 0, visited_at = NULL WHERE ?1 IS NULL OR company = ?1",
        params![company],
    )?;
    Ok(n)
}

/// One fetch attempt, successful or not.
pub struct FetchRow {
    pub source_id: i64,
    pub company: String,
    pub kind: SourceKind,
    pub url: String,
    pub body: Option<String>,
    pub status: Option<i32>,
    pub error: Option<String>,
    pub latency_ms: Option<i64>,
}

// ── Processing ──

#[derive(Debug, Clone)]
pub struct FetchedDoc {
    pub fetch_id: i64,
    pub company: String,
    pub kind: SourceKind,
    pub url: String,
    pub body: String,
}

pub fn fetch_unprocessed(conn: &Connection, limit: Option<usize>) -> Result<Vec<FetchedDoc>> {
    let sql = format!(
        "SELECT id, company, kind, url, body FROM fetches
         WHERE body IS NOT NULL AND processed_at IS NULL
         ORDER BY id{}",
        match limit {
            Some(n) => format!(" LIMIT {}", n),
            None => String::new(),
        }
    );
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt
        .query_map([], |row| {
            Ok(FetchedDoc {
                fetch_id: row.get(0)?,
                company: row.get(1)?,
                kind: parse_col(row, 2, SourceKind::parse)?,
                url: row.get(3)?,
                body: row.get(4)?,
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}

pub fn mark_processed(conn: &Connection, fetch_ids: &[i64]) -> Result<()> {
    let tx = conn.unchecked_transaction()?;
    {
        let mut stmt =
            tx.prepare("UPDATE fetches SET processed_at = datetime('now') WHERE id = ?1")?;
        for id in fetch_ids {
            stmt.execute(params![id])?;
        }
    }
    tx.commit()?;
    Ok(())
}

// ── Scored items ──

const UPSERT_ITEM: &str = "
    INSERT INTO scored_items
        (company, dimension, source_url, source_kind, category, title, raw_text,
         relevance, confidence, keyword_matches, total_keywords, sentiment, rating,
         technical_score, extracted_at)
    VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15)
    ON CONFLICT(company, dimension, source_url) DO UPDATE SET
        source_kind     = excluded.source_kind,
        category        = excluded.category,
        title           = excluded.title,
        raw_text        = excluded.raw_text,
        relevance       = excluded.relevance,
        confidence      = excluded.confidence,
        keyword_matches = excluded.keyword_matches,
        total_keywords  = excluded.total_keywords,
        sentiment       = excluded.sentiment,
        rating          = excluded.rating,
        technical_score = excluded.technical_score,
        extracted_at    = excluded.extracted_at,
        updated_at      = datetime('now')
    RETURNING id";

/// Insert or update the record for (company, dimension, url); returns its id.
/// A repeated key updates in place, so duplicates never surface as conflicts.
pub fn upsert(
    conn: &Connection,
    company: &str,
    dimension: Dimension,
    url: &str,
    item: &ScoredItem,
) -> Result<i64> {
    let id = conn.prepare_cached(UPSERT_ITEM)?.query_row(
        params![
            company,
            dimension.as_str(),
            url,
            item.source_kind.as_str(),
            item.category.as_str(),
            item.title,
            item.raw_text,
            item.relevance_score,
            item.confidence_score,
            item.keyword_matches,
            item.total_keywords,
            item.sentiment.as_str(),
            item.extracted_rating,
            item.technical_score,
            item.extraction_timestamp.to_rfc3339(),
        ],
        |r| r.get(0),
    )?;
    Ok(id)
}

/// Write scored items in one transaction.
///
/// Each `(company, url)` in `covered` ends up holding exactly the dimensions
/// present in `items`; rows for dimensions its latest content no longer scores
/// are deleted.
pub fn replace_items(
    conn: &Connection,
    covered: &[(String, String)],
    items: &[ScoredItem],
) -> Result<usize> {
    let kept: HashSet<(&str, &str, Dimension)> = items
        .iter()
        .map(|i| (i.company.as_str(), i.source_url.as_str(), i.dimension))
        .collect();

    let tx = conn.unchecked_transaction()?;
    {
        let mut existing = tx.prepare_cached(
            "SELECT id, dimension FROM scored_items WHERE company = ?1 AND source_url = ?2",
        )?;
        let mut delete = tx.prepare_cached("DELETE FROM scored_items WHERE id = ?1")?;
        for (company, url) in covered {
            let rows = existing
                .query_map(params![company, url], |r| {
                    Ok((r.get::<_, i64>(0)?, parse_col(r, 1, Dimension::parse)?))
                })?
                .collect::<Result<Vec<_>, _>>()?;
            for (id, dimension) in rows {
                if !kept.contains(&(company.as_str(), url.as_str(), dimension)) {
                    delete.execute(params![id])?;
                }
            }
        }
    }
    for item in items {
        upsert(&tx, &item.company, item.dimension, &item.source_url, item)?;
    }
    tx.commit()?;
    Ok(items.len())
}

#[derive(Debug, Clone, Serialize)]
pub struct StoredItem {
    pub id: i64,
    #[serde(flatten)]
    pub item: ScoredItem,
}

#[derive(Debug, Clone, Default)]
pub struct ItemFilter {
    pub company: Option<String>,
    pub dimension: Option<Dimension>,
    pub limit: usize,
}

/// Items ordered by relevance, then technical score.
pub fn list_items(conn: &Connection, filter: &ItemFilter) -> Result<Vec<StoredItem>> {
    let mut stmt = conn.prepare(
        "SELECT id, company, dimension, source_url, source_kind, category, title, raw_text,
                relevance, confidence, keyword_matches, total_keywords, sentiment, rating,
                technical_score, extracted_at
         FROM scored_items
         WHERE (?1 IS NULL OR company = ?1) AND (?2 IS NULL OR dimension = ?2)
         ORDER BY relevance DESC, technical_score DESC, id
         LIMIT ?3",
    )?;
    let rows = stmt
        .query_map(
            params![
                filter.company,
                filter.dimension.map(Dimension::as_str),
                filter.limit as i64
            ],
            row_to_item,
        )?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}

pub fn top_items(
    conn: &Connection,
    company: &str,
    dimension: Dimension,
    n: usize,
) -> Result<Vec<StoredItem>> {
    list_items(
        conn,
        &ItemFilter {
            company: Some(company.to_string()),
            dimension: Some(dimension),
            limit: n,
        },
    )
}

fn row_to_item(row: &Row) -> rusqlite::Result<StoredItem> {
    let ts: String = row.get(15)?;
    let extraction_timestamp = DateTime::parse_from_rfc3339(&ts)
        .map(|d| d.with_timezone(&Utc))
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(15, Type::Text, Box::new(e)))?;
    Ok(StoredItem {
        id: row.get(0)?,
        item: ScoredItem {
            company: row.get(1)?,
            dimension: parse_col(row, 2, Dimension::parse)?,
            source_url: row.get(3)?,
            source_kind: parse_col(row, 4, SourceKind::parse)?,
            category: parse_col(row, 5, ContentCategory::parse)?,
            title: row.get(6)?,
            raw_text: row.get(7)?,
            relevance_score: row.get(8)?,
            confidence_score: row.get(9)?,
            keyword_matches: row.get(10)?,
            total_keywords: row.get(11)?,
            sentiment: parse_col(row, 12, Sentiment::parse)?,
            extracted_rating: row.get(13)?,
            technical_score: row.get(14)?,
            extraction_timestamp,
        },
    })
}

fn parse_col<T>(row: &Row, idx: usize, parse: fn(&str) -> Option<T>) -> rusqlite::Result<T> {
    let raw: String = row.get(idx)?;
    parse(&raw).ok_or_else(|| {
        rusqlite::Error::FromSqlConversionFailure(
            idx,
            Type::Text,
            format!("unexpected value '{}'", raw).into(),
        )
    })
}

// ── Aggregation ──

#[derive(Debug, Clone, Serialize)]
pub struct Aggregate {
    pub dimension: Dimension,
    pub mean_relevance: f64,
    pub mean_confidence: f64,
    pub item_count: usize,
}

/// Arithmetic mean over every stored item for the key, computed on demand.
pub fn aggregate(conn: &Connection, company: &str, dimension: Dimension) -> Result<Aggregate> {
    let (mean_relevance, mean_confidence, item_count) = conn.query_row(
        "SELECT COALESCE(AVG(relevance), 0.0), COALESCE(AVG(confidence), 0.0), COUNT(*)
         FROM scored_items WHERE company = ?1 AND dimension = ?2",
        params![company, dimension.as_str()],
        |r| Ok((r.get(0)?, r.get(1)?, r.get(2)?)),
    )?;
    Ok(Aggregate {
        dimension,
        mean_relevance,
        mean_confidence,
        item_count,
    })
}

pub fn aggregate_company(conn: &Connection, company: &str) -> Result<Vec<Aggregate>> {
    Dimension::ALL
        .into_iter()
        .map(|d| aggregate(conn, company, d))
        .collect()
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct SentimentBreakdown {
    pub positive: usize,
    pub neutral: usize,
    pub negative: usize,
}

/// Sentiment per distinct source URL (items repeat across dimensions).
pub fn sentiment_breakdown(conn: &Connection, company: &str) -> Result<SentimentBreakdown> {
    let mut stmt = conn.prepare(
        "SELECT sentiment, COUNT(DISTINCT source_url) FROM scored_items
         WHERE company = ?1 GROUP BY sentiment",
    )?;
    let mut out = SentimentBreakdown::default();
    let rows = stmt.query_map(params![company], |r| {
        Ok((r.get::<_, String>(0)?, r.get::<_, usize>(1)?))
    })?;
    for row in rows {
        let (sentiment, n) = row?;
        match Sentiment::parse(&sentiment) {
            Some(Sentiment::Positive) => out.positive = n,
            Some(Sentiment::Neutral) => out.neutral = n,
            Some(Sentiment::Negative) => out.negative = n,
            None => {}
        }
    }
    Ok(out)
}

pub fn average_rating(conn: &Connection, company: &str) -> Result<Option<f64>> {
    let avg = conn.query_row(
        "SELECT AVG(rating) FROM (
             SELECT DISTINCT source_url, rating FROM scored_items
             WHERE company = ?1 AND rating IS NOT NULL
         )",
        params![company],
        |r| r.get(0),
    )?;
    Ok(avg)
}

// ── Reports ──

#[derive(Debug, Clone, Serialize)]
pub struct StoredReport {
    pub id: i64,
    pub company: String,
    pub body: String,
    pub origin: String,
    pub model: Option<String>,
    pub created_at: String,
}

pub fn save_report(
    conn: &Connection,
    company: &str,
    body: &str,
    origin: &str,
    model: Option<&str>,
) -> Result<i64> {
    conn.execute(
        "INSERT INTO reports (company, body, origin, model) VALUES (?1, ?2, ?3, ?4)",
        params![company, body, origin, model],
    )?;
    Ok(conn.last_insert_rowid())
}

pub fn latest_report(conn: &Connection, company: &str) -> Result<Option<StoredReport>> {
    let mut stmt = conn.prepare(
        "SELECT id, company, body, origin, model, created_at FROM reports
         WHERE company = ?1 ORDER BY id DESC LIMIT 1",
    )?;
    let mut rows = stmt.query_map(params![company], |row| {
        Ok(StoredReport {
            id: row.get(0)?,
            company: row.get(1)?,
            body: row.get(2)?,
            origin: row.get(3)?,
            model: row.get(4)?,
            created_at: row.get(5)?,
        })
    })?;
    Ok(rows.next().transpose()?)
}

// ── Overview ──

#[derive(Debug, Clone, Serialize)]
pub struct OverviewRow {
    pub company: String,
    pub dimension: String,
    pub mean_relevance: f64,
    pub max_relevance: f64,
    pub item_count: usize,
}

pub fn fetch_overview(
    conn: &Connection,
    company: Option<&str>,
    dimension: Option<Dimension>,
    limit: usize,
) -> Result<Vec<OverviewRow>> {
    let mut stmt = conn.prepare(
        "SELECT company, dimension, AVG(relevance), MAX(relevance), COUNT(*)
         FROM scored_items
         WHERE (?1 IS NULL OR company = ?1) AND (?2 IS NULL OR dimension = ?2)
         GROUP BY company, dimension
         ORDER BY AVG(relevance) DESC, company, dimension
         LIMIT ?3",
    )?;
    let rows = stmt
        .query_map(
            params![company, dimension.map(Dimension::as_str), limit as i64],
            |row| {
                Ok(OverviewRow {
                    company: row.get(0)?,
                    dimension: row.get(1)?,
                    mean_relevance: row.get(2)?,
                    max_relevance: row.get(3)?,
                    item_count: row.get(4)?,
                })
            },
        )?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}

// ── Stats ──

#[derive(Debug, Clone, Serialize)]
pub struct Stats {
    pub sources: usize,
    pub visited: usize,
    pub unvisited: usize,
    pub fetched: usize,
    pub errors: usize,
    pub processed: usize,
    pub items: usize,
    pub reports: usize,
}

pub fn get_stats(conn: &Connection) -> Result<Stats> {
    let count = |sql: &str| -> Result<usize> { Ok(conn.query_row(sql, [], |r| r.get(0))?) };
    let sources = count("SELECT COUNT(*) FROM sources")?;
    let visited = count("SELECT COUNT(*) FROM sources WHERE visited = 1")?;
    Ok(Stats {
        sources,
        visited,
        unvisited: sources - visited,
        fetched: count("SELECT COUNT(*) FROM fetches")?,
        errors: count("SELECT COUNT(*) FROM fetches WHERE error IS NOT NULL")?,
        processed: count("SELECT COUNT(*) FROM fetches WHERE processed_at IS NOT NULL")?,
        items: count("SELECT COUNT(*) FROM scored_items")?,
        reports: count("SELECT COUNT(*) FROM reports")?,
    })
}

// ── Tests ──
