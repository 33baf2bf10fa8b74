use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::Result;
use indicatif::{ProgressBar, ProgressStyle};
use rusqlite::Connection;
use tokio::sync::Semaphore;
use tracing::{debug, info, warn};

use crate::config::FetchSettings;
use crate::db::{FetchRow, PendingSource};
use crate::error::FetchError;

/// `base_ms * 2^attempt`, saturating instead of overflowing.
fn backoff_delay(base_ms: u64, attempt: u32) -> Duration {
    Duration::from_millis(base_ms.saturating_mul(2u64.saturating_pow(attempt)))
}

/// Fetch stats returned after completion.
pub struct FetchStats {
    pub total: usize,
    pub ok: usize,
    pub errors: usize,
}

/// Plain HTTP client for competitor pages, feeds and review sites.
pub struct Fetcher {
    client: reqwest::Client,
    delay: Duration,
    max_retries: u32,
    base_backoff_ms: u64,
}

impl Fetcher {
    pub fn new(settings: &FetchSettings) -> Result<Self> {
        let client = reqwest::Client::builder()
            .user_agent(&settings.user_agent)
            .timeout(Duration::from_secs(settings.timeout_secs))
            .build()?;
        Ok(Fetcher {
            client,
            delay: Duration::from_millis(settings.delay_ms),
            max_retries: settings.max_retries,
            base_backoff_ms: settings.base_backoff_ms,
        })
    }

    /// One GET. Non-2xx statuses and blank bodies are errors.
    pub async fn fetch(&self, url: &str) -> Result<(u16, String), FetchError> {
        let resp = self.client.get(url).send().await?;
        let status = resp.status();
        if !status.is_success() {
            return Err(FetchError::Status(status.as_u16()));
        }
        let body = resp.text().await?;
        if body.trim().is_empty() {
            return Err(FetchError::Empty);
        }
        Ok((status.as_u16(), body))
    }

    /// GET with exponential backoff on rate limits, server errors and transport failures.
    pub async fn fetch_with_retry(&self, url: &str) -> Result<(u16, String), FetchError> {
        let mut attempt = 0;
        loop {
            match self.fetch(url).await {
                Ok(found) => return Ok(found),
                Err(e) if e.is_retryable() && attempt < self.max_retries => {
                    let backoff = backoff_delay(self.base_backoff_ms, attempt);
                    warn!(
                        "{} on {} (attempt {}/{}), backing off {:.1}s",
                        e,
                        url,
                        attempt + 1,
                        self.max_retries,
                        backoff.as_secs_f64()
                    );
                    tokio::time::sleep(backoff).await;
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }

    async fn fetch_row(&self, source: PendingSource) -> FetchRow {
        let start = Instant::now();
        let result = self.fetch_with_retry(&source.url).await;
        let latency_ms = Some(start.elapsed().as_millis() as i64);

        let (body, status, error) = match result {
            Ok((status, body)) => (Some(body), Some(status as i32), None),
            Err(e) => {
                warn!("Fetch failed for {}: {}", source.url, e);
                (None, e.status().map(i32::from), Some(e.to_string()))
            }
        };

        FetchRow {
            source_id: source.id,
            company: source.company,
            kind: source.kind,
            url: source.url,
            body,
            status,
            error,
            latency_ms,
        }
    }
}

/// Fetch sources concurrently, saving each result to DB as it arrives.
///
/// Failed fetches are stored with their error and still mark the source visited.
pub async fn fetch_sources_streaming(
    conn: &Connection,
    fetcher: Arc<Fetcher>,
    concurrency: usize,
    sources: Vec<PendingSource>,
) -> Result<FetchStats> {
    let semaphore = Arc::new(Semaphore::new(concurrency.max(1)));
    let total = sources.len();

    let pb = ProgressBar::new(total as u64);
    pb.set_style(
        ProgressStyle::default_bar()
            .template("[{elapsed_precise}] {bar:40} {pos}/{len} ({per_sec}, eta {eta})")?
            .progress_chars("=> "),
    );

    // Workers send rows, this loop owns the connection
    let (tx, mut rx) = tokio::sync::mpsc::channel::<FetchRow>(concurrency.max(1) * 2);

    for source in sources {
        let fetcher = Arc::clone(&fetcher);
        let sem = Arc::clone(&semaphore);
        let tx = tx.clone();

        tokio::spawn(async move {
            let Ok(_permit) = sem.acquire().await else {
                return;
            };
            let row = fetcher.fetch_row(source).await;
            let _ = tx.send(row).await;
            if !fetcher.delay.is_zero() {
                tokio::time::sleep(fetcher.delay).await;
            }
        });
    }

    drop(tx);

    let mut ok = 0usize;
    let mut errors = 0usize;

    let mut insert_stmt = conn.prepare(
        "INSERT INTO fetches (source_id, company, kind, url, body, status, error, latency_ms)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
    )?;
    let mut update_stmt = conn.prepare(
        "UPDATE sources SET visited = 1, visited_at = datetime('now') WHERE id = ?1",
    )?;

    while let Some(row) = rx.recv().await {
        if row.error.is_some() {
            errors += 1;
        } else {
            ok += 1;
        }
        debug!("Fetched {} ({:?} ms)", row.url, row.latency_ms);
        save_one(&mut insert_stmt, &mut update_stmt, &row)?;
        pb.inc(1);
    }

    pb.finish_and_clear();
    info!("Fetched {} sources ({} ok, {} errors)", total, ok, errors);

    Ok(FetchStats { total, ok, errors })
}

fn save_one(
    insert: &mut rusqlite::Statement,
    update: &mut rusqlite::Statement,
    row: &FetchRow,
) -> Result<()> {
    insert.execute(rusqlite::params![
        row.source_id,
        row.company,
        row.kind.as_str(),
        row.url,
        row.body,
        row.status,
        row.error,
        row.latency_ms,
    ])?;
    update.execute(rusqlite::params![row.source_id])?;
    Ok(())
}

// ── Tests ──
