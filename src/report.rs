use std::fmt::Write as _;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use rusqlite::Connection;
use serde::Serialize;
use tracing::{info, warn};

use crate::config::{LlmSettings, ReportSettings};
use crate::db::{self, SentimentBreakdown};
use crate::dimension::Dimension;
use crate::error::UpstreamError;
use crate::llm::{GenerationRequest, GenerationResponse, TextGenerator};
use crate::model::Company;
use crate::scoring::ContentCategory;

const SYSTEM_PROMPT: &str = "You are a competitive intelligence analyst for a spreadsheet-database \
product. Given keyword-based scores for one competitor, write a concise briefing in Markdown: \
a two-sentence overview, then strengths, weaknesses and what to watch. Only use the data provided.";

#[derive(Debug, Clone, Serialize)]
pub struct SourceRef {
    pub url: String,
    pub title: Option<String>,
    pub category: ContentCategory,
    pub relevance: f64,
}

#[derive(Debug, Clone, Serialize)]
pub struct DimensionSummary {
    pub dimension: Dimension,
    pub mean_relevance: f64,
    pub mean_confidence: f64,
    pub item_count: usize,
    pub top_sources: Vec<SourceRef>,
}

/// Everything the report generator is told about one company.
#[derive(Debug, Clone, Serialize)]
pub struct ReportPayload {
    pub company: String,
    pub company_name: String,
    pub generated_at: DateTime<Utc>,
    pub dimensions: Vec<DimensionSummary>,
    pub sentiment: SentimentBreakdown,
    pub average_rating: Option<f64>,
    pub total_items: usize,
}

impl ReportPayload {
    /// Dimensions with data, strongest first.
    fn ranked(&self) -> Vec<&DimensionSummary> {
        let mut dims: Vec<_> = self.dimensions.iter().filter(|d| d.item_count > 0).collect();
        dims.sort_by(|a, b| b.mean_relevance.total_cmp(&a.mean_relevance));
        dims
    }
}

pub fn build_payload(
    conn: &Connection,
    company: &Company,
    top_sources: usize,
) -> Result<ReportPayload> {
    let mut dimensions = Vec::with_capacity(Dimension::ALL.len());
    for agg in db::aggregate_company(conn, &company.slug)? {
        let top = db::top_items(conn, &company.slug, agg.dimension, top_sources)?
            .into_iter()
            .map(|s| SourceRef {
                url: s.item.source_url,
                title: s.item.title,
                category: s.item.category,
                relevance: s.item.relevance_score,
            })
            .collect();
        dimensions.push(DimensionSummary {
            dimension: agg.dimension,
            mean_relevance: agg.mean_relevance,
            mean_confidence: agg.mean_confidence,
            item_count: agg.item_count,
            top_sources: top,
        });
    }

    Ok(ReportPayload {
        company: company.slug.clone(),
        company_name: company.name.clone(),
        generated_at: Utc::now(),
        total_items: dimensions.iter().map(|d| d.item_count).sum(),
        sentiment: db::sentiment_breakdown(conn, &company.slug)?,
        average_rating: db::average_rating(conn, &company.slug)?,
        dimensions,
    })
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ReportOrigin {
    Llm,
    Fallback,
}

impl ReportOrigin {
    pub fn as_str(self) -> &'static str {
        match self {
            ReportOrigin::Llm => "llm",
            ReportOrigin::Fallback => "fallback",
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct Report {
    pub company: String,
    pub company_name: String,
    pub body: String,
    pub origin: ReportOrigin,
    pub model: Option<String>,
    pub generated_at: DateTime<Utc>,
    #[serde(skip)]
    pub payload: ReportPayload,
}

#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    /// Per call, not overall.
    pub timeout: Duration,
    pub max_retries: u32,
    pub base_backoff: Duration,
}

/// `base * 2^attempt`, saturating instead of overflowing.
fn backoff_delay(base: Duration, attempt: u32) -> Duration {
    base.saturating_mul(2u32.saturating_pow(attempt))
}

impl From<&LlmSettings> for RetryPolicy {
    fn from(s: &LlmSettings) -> Self {
        RetryPolicy {
            timeout: Duration::from_secs(s.timeout_secs),
            max_retries: s.max_retries,
            base_backoff: Duration::from_millis(s.base_backoff_ms),
        }
    }
}

/// Turns a payload into a written report. Generation never fails outright:
/// once retries are spent the report falls back to canned insights.
pub struct Reporter {
    generator: Arc<dyn TextGenerator>,
    policy: RetryPolicy,
    max_tokens: u32,
    temperature: f32,
    output_dir: Option<PathBuf>,
}

impl Reporter {
    pub fn new(
        generator: Arc<dyn TextGenerator>,
        llm: &LlmSettings,
        report: &ReportSettings,
    ) -> Self {
        Reporter {
            generator,
            policy: RetryPolicy::from(llm),
            max_tokens: llm.max_tokens,
            temperature: llm.temperature,
            output_dir: report.output_dir.clone(),
        }
    }

    #[cfg(test)]
    pub fn with_policy(mut self, policy: RetryPolicy) -> Self {
        self.policy = policy;
        self
    }

    #[cfg(test)]
    pub fn with_output_dir(mut self, dir: Option<PathBuf>) -> Self {
        self.output_dir = dir;
        self
    }

    pub fn model(&self) -> &str {
        self.generator.model()
    }

    pub async fn generate(&self, payload: &ReportPayload) -> Report {
        let request = GenerationRequest {
            system_prompt: SYSTEM_PROMPT.to_string(),
            user_prompt: user_prompt(payload),
            max_tokens: self.max_tokens,
            temperature: self.temperature,
        };

        let (body, origin, model) = match self.call_with_retry(&request).await {
            Ok(resp) => (resp.text, ReportOrigin::Llm, Some(resp.model)),
            Err(e) => {
                warn!("Report for {} falls back to canned insights: {}", payload.company, e);
                (fallback_insights(payload), ReportOrigin::Fallback, None)
            }
        };

        Report {
            company: payload.company.clone(),
            company_name: payload.company_name.clone(),
            body,
            origin,
            model,
            generated_at: Utc::now(),
            payload: payload.clone(),
        }
    }

    async fn call_with_retry(
        &self,
        request: &GenerationRequest,
    ) -> Result<GenerationResponse, UpstreamError> {
        let mut attempt = 0;
        loop {
            let call = self.generator.generate(request);
            let result = match tokio::time::timeout(self.policy.timeout, call).await {
                Ok(r) => r,
                Err(_) => Err(UpstreamError::Unavailable(format!(
                    "no response within {:.1}s",
                    self.policy.timeout.as_secs_f64()
                ))),
            };
            match result {
                Err(e) if e.is_retryable() && attempt < self.policy.max_retries => {
                    let backoff = backoff_delay(self.policy.base_backoff, attempt);
                    warn!(
                        "{} (attempt {}/{}), backing off {:.1}s",
                        e,
                        attempt + 1,
                        self.policy.max_retries,
                        backoff.as_secs_f64()
                    );
                    tokio::time::sleep(backoff).await;
                    attempt += 1;
                }
                other => return other,
            }
        }
    }

    /// Store the report and, when an output directory is set, write a Markdown copy.
    pub fn save(&self, conn: &Connection, report: &Report) -> Result<(i64, Option<PathBuf>)> {
        let id = db::save_report(
            conn,
            &report.company,
            &report.body,
            report.origin.as_str(),
            report.model.as_deref(),
        )?;
        let path = match &self.output_dir {
            Some(dir) => Some(write_markdown(dir, report)?),
            None => None,
        };
        info!("Saved {} report {} for {}", report.origin.as_str(), id, report.company);
        Ok((id, path))
    }
}

fn user_prompt(payload: &ReportPayload) -> String {
    let data = serde_json::to_string_pretty(payload).unwrap_or_default();
    format!(
        "Competitor: {}\nRelevance is the share of a dimension's keywords found (0 to 1).\n\n```json\n{}\n```",
        payload.company_name, data
    )
}

/// Deterministic summary used when text generation is unavailable.
pub fn fallback_insights(payload: &ReportPayload) -> String {
    let ranked = payload.ranked();
    let mut out = String::new();

    if ranked.is_empty() {
        let _ = writeln!(
            out,
            "No scored content is available for {} yet. Fetch and process sources first.",
            payload.company_name
        );
        return out;
    }

    let _ = writeln!(
        out,
        "{} has {} scored items across {} dimensions.\n",
        payload.company_name,
        payload.total_items,
        ranked.len()
    );

    let _ = writeln!(out, "### Strengths");
    for d in ranked.iter().take(2) {
        let _ = writeln!(
            out,
            "- {}: {:.0}% mean relevance over {} items",
            d.dimension,
            d.mean_relevance * 100.0,
            d.item_count
        );
    }

    let missing: Vec<_> = payload
        .dimensions
        .iter()
        .filter(|d| d.item_count == 0)
        .map(|d| d.dimension.as_str())
        .collect();
    let _ = writeln!(out, "\n### Gaps");
    if let Some(weakest) = ranked.last().filter(|_| ranked.len() > 2) {
        let _ = writeln!(
            out,
            "- {}: weakest signal at {:.0}% mean relevance",
            weakest.dimension,
            weakest.mean_relevance * 100.0
        );
    }
    if !missing.is_empty() {
        let _ = writeln!(out, "- No evidence found for: {}", missing.join(", "));
    }

    let s = payload.sentiment;
    let _ = writeln!(out, "\n### Market perception");
    let _ = writeln!(
        out,
        "- Sentiment across sources: {} positive, {} neutral, {} negative",
        s.positive, s.neutral, s.negative
    );
    if let Some(r) = payload.average_rating {
        let _ = writeln!(out, "- Average extracted rating: {:.1}", r);
    }
    out
}

pub fn render_markdown(report: &Report) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "# {}: competitive summary\n", report.company_name);
    let _ = writeln!(
        out,
        "_Generated {} ({}{})_\n",
        report.generated_at.format("%Y-%m-%d %H:%M UTC"),
        report.origin.as_str(),
        report
            .model
            .as_deref()
            .map(|m| format!(", {}", m))
            .unwrap_or_default()
    );
    let _ = writeln!(out, "{}\n", report.body.trim_end());
    let _ = writeln!(out, "## Dimension scores\n");
    let _ = writeln!(out, "| Dimension | Mean relevance | Confidence | Items |");
    let _ = writeln!(out, "|---|---:|---:|---:|");
    for d in &report.payload.dimensions {
        let _ = writeln!(
            out,
            "| {} | {:.1}% | {:.2} | {} |",
            d.dimension,
            d.mean_relevance * 100.0,
            d.mean_confidence,
            d.item_count
        );
    }
    out
}

fn write_markdown(dir: &Path, report: &Report) -> Result<PathBuf> {
    fs::create_dir_all(dir).with_context(|| format!("Failed to create {:?}", dir))?;
    let path = dir.join(format!(
        "{}-{}.md",
        report.company,
        report.generated_at.format("%Y%m%d-%H%M%S")
    ));
    fs::write(&path, render_markdown(report)).with_context(|| format!("Failed to write {:?}", path))?;
    Ok(path)
}

// ── Tests ──
