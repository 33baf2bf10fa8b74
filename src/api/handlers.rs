use std::sync::Arc;

use axum::extract::{Path, Query, State};
use axum::Json;
use rusqlite::Connection;

use super::errors::ApiError;
use super::models::*;
use crate::config::Settings;
use crate::db::{self, ItemFilter, Stats, StoredItem};
use crate::dimension::Dimension;
use crate::model::Company;
use crate::report::{self, Reporter};
use crate::scoring::{classify_content, extract_rating, extract_sentiment, Scorer};

const DEFAULT_ITEM_LIMIT: usize = 50;
const MAX_ITEM_LIMIT: usize = 500;

type ApiResult<T> = Result<Json<ApiResponse<T>>, ApiError>;

/// Shared state handed to every handler.
#[derive(Clone)]
pub struct AppState {
    pub settings: Arc<Settings>,
    pub scorer: Arc<Scorer>,
    pub reporter: Arc<Reporter>,
}

impl AppState {
    pub fn new(settings: Settings, reporter: Reporter) -> Self {
        let scorer = Scorer::new(settings.keyword_sets());
        AppState {
            settings: Arc::new(settings),
            scorer: Arc::new(scorer),
            reporter: Arc::new(reporter),
        }
    }

    fn company(&self, key: &str) -> Result<Company, ApiError> {
        self.settings
            .company(key)
            .cloned()
            .ok_or_else(|| ApiError::NotFound(format!("Company '{}' not found", key)))
    }

    /// Run a blocking store operation on its own connection.
    async fn with_db<T, F>(&self, f: F) -> Result<T, ApiError>
    where
        F: FnOnce(&Connection) -> anyhow::Result<T> + Send + 'static,
        T: Send + 'static,
    {
        let path = self.settings.database.path.clone();
        let out = tokio::task::spawn_blocking(move || {
            let conn = db::connect(&path)?;
            f(&conn)
        })
        .await??;
        Ok(out)
    }
}

fn parse_dimension(name: &str) -> Result<Dimension, ApiError> {
    Dimension::parse(name)
        .ok_or_else(|| ApiError::BadRequest(format!("Unknown dimension '{}'", name)))
}

/// `GET /api/health`
pub async fn health(State(state): State<AppState>) -> Json<ApiResponse<HealthResponse>> {
    Json(ApiResponse::ok(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        llm_model: state.reporter.model().to_string(),
    }))
}

/// `GET /api/companies`
pub async fn list_companies(State(state): State<AppState>) -> Json<ApiResponse<Vec<CompanyInfo>>> {
    let companies = state
        .settings
        .companies
        .iter()
        .map(|c| CompanyInfo {
            name: c.name.clone(),
            slug: c.slug.clone(),
            source_count: c.sources.len(),
        })
        .collect();
    Json(ApiResponse::ok(companies))
}

/// `GET /api/dimensions`
pub async fn list_dimensions(
    State(state): State<AppState>,
) -> Json<ApiResponse<Vec<DimensionInfo>>> {
    let dims = state
        .scorer
        .keywords()
        .iter()
        .map(|set| DimensionInfo {
            name: set.dimension,
            keywords: set.keywords.iter().cloned().collect(),
        })
        .collect();
    Json(ApiResponse::ok(dims))
}

/// `GET /api/items?company=&dimension=&limit=`
pub async fn list_items(
    State(state): State<AppState>,
    Query(q): Query<ItemsQuery>,
) -> ApiResult<Vec<StoredItem>> {
    let company = match q.company.as_deref() {
        Some(key) => Some(state.company(key)?.slug),
        None => None,
    };
    let dimension = q.dimension.as_deref().map(parse_dimension).transpose()?;
    let filter = ItemFilter {
        company,
        dimension,
        limit: q.limit.unwrap_or(DEFAULT_ITEM_LIMIT).min(MAX_ITEM_LIMIT),
    };
    let items = state.with_db(move |conn| db::list_items(conn, &filter)).await?;
    Ok(Json(ApiResponse::ok(items)))
}

/// `GET /api/companies/:company/scores`
pub async fn company_scores(
    State(state): State<AppState>,
    Path(company): Path<String>,
) -> ApiResult<CompanyScores> {
    let company = state.company(&company)?;
    let slug = company.slug.clone();
    let aggregates = state
        .with_db(move |conn| db::aggregate_company(conn, &slug))
        .await?;
    Ok(Json(ApiResponse::ok(CompanyScores {
        company: company.slug,
        name: company.name,
        dimensions: aggregates.into_iter().map(to_score).collect(),
    })))
}

/// `GET /api/companies/:company/scores/:dimension`
pub async fn dimension_score(
    State(state): State<AppState>,
    Path((company, dimension)): Path<(String, String)>,
) -> ApiResult<DimensionScore> {
    let company = state.company(&company)?;
    let dimension = parse_dimension(&dimension)?;
    let agg = state
        .with_db(move |conn| db::aggregate(conn, &company.slug, dimension))
        .await?;
    Ok(Json(ApiResponse::ok(to_score(agg))))
}

fn to_score(agg: db::Aggregate) -> DimensionScore {
    DimensionScore {
        dimension: agg.dimension,
        mean_relevance: agg.mean_relevance,
        relevance_pct: agg.mean_relevance * 100.0,
        mean_confidence: agg.mean_confidence,
        item_count: agg.item_count,
    }
}

/// `POST /api/score`: ad-hoc scoring; unknown dimensions score zero.
pub async fn score_text(
    State(state): State<AppState>,
    Json(req): Json<ScoreRequest>,
) -> ApiResult<ScoreResponse> {
    let score = state.scorer.score_relevance(&req.text, &req.dimension);
    Ok(Json(ApiResponse::ok(ScoreResponse {
        dimension: req.dimension.clone(),
        relevance: score.relevance,
        relevance_pct: score.relevance_pct(),
        confidence: score.confidence,
        keyword_matches: score.keyword_matches,
        total_keywords: score.total_keywords,
        sentiment: extract_sentiment(&req.text),
        rating: extract_rating(&req.text),
        category: classify_content(req.url.as_deref().unwrap_or(""), &req.text),
    })))
}

/// `GET /api/reports/:company`: latest stored report.
pub async fn get_report(
    State(state): State<AppState>,
    Path(company): Path<String>,
) -> ApiResult<ReportResponse> {
    let company = state.company(&company)?;
    let slug = company.slug.clone();
    let stored = state
        .with_db(move |conn| db::latest_report(conn, &slug))
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("No report for '{}' yet", company.slug)))?;
    Ok(Json(ApiResponse::ok(ReportResponse {
        id: stored.id,
        company: stored.company,
        origin: stored.origin,
        model: stored.model,
        body: stored.body,
        created_at: stored.created_at,
    })))
}

/// `POST /api/reports/:company`: generate, store and return a fresh report.
pub async fn create_report(
    State(state): State<AppState>,
    Path(company): Path<String>,
) -> ApiResult<ReportResponse> {
    let company = state.company(&company)?;
    let top = state.settings.report.top_sources;
    let payload = state
        .with_db(move |conn| report::build_payload(conn, &company, top))
        .await?;

    let generated = state.reporter.generate(&payload).await;

    let reporter = Arc::clone(&state.reporter);
    let saved = generated.clone();
    let (id, _) = state
        .with_db(move |conn| reporter.save(conn, &saved))
        .await?;

    Ok(Json(ApiResponse::ok(ReportResponse {
        id,
        company: generated.company,
        origin: generated.origin.as_str().to_string(),
        model: generated.model,
        body: generated.body,
        created_at: generated.generated_at.to_rfc3339(),
    })))
}

/// `GET /api/stats`
pub async fn stats(State(state): State<AppState>) -> ApiResult<Stats> {
    let stats = state.with_db(db::get_stats).await?;
    Ok(Json(ApiResponse::ok(stats)))
}
