use serde::{Deserialize, Serialize};

use crate::dimension::Dimension;
use crate::scoring::{ContentCategory, Sentiment};

/// Envelope wrapping every response body.
#[derive(Debug, Serialize, Deserialize)]
pub struct ApiResponse<T> {
    pub success: bool,
    pub data: Option<T>,
    pub error: Option<String>,
}

impl<T> ApiResponse<T> {
    pub fn ok(data: T) -> Self {
        ApiResponse {
            success: true,
            data: Some(data),
            error: None,
        }
    }

    pub fn failure(message: impl Into<String>) -> Self {
        ApiResponse {
            success: false,
            data: None,
            error: Some(message.into()),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    pub llm_model: String,
}

#[derive(Debug, Serialize)]
pub struct CompanyInfo {
    pub name: String,
    pub slug: String,
    pub source_count: usize,
}

#[derive(Debug, Serialize)]
pub struct DimensionInfo {
    pub name: Dimension,
    pub keywords: Vec<String>,
}

#[derive(Debug, Deserialize)]
pub struct ItemsQuery {
    pub company: Option<String>,
    pub dimension: Option<String>,
    pub limit: Option<usize>,
}

#[derive(Debug, Serialize)]
pub struct DimensionScore {
    pub dimension: Dimension,
    pub mean_relevance: f64,
    pub relevance_pct: f64,
    pub mean_confidence: f64,
    pub item_count: usize,
}

#[derive(Debug, Serialize)]
pub struct CompanyScores {
    pub company: String,
    pub name: String,
    pub dimensions: Vec<DimensionScore>,
}

#[derive(Debug, Deserialize)]
pub struct ScoreRequest {
    pub text: String,
    pub dimension: String,
    /// Used only to classify the content.
    pub url: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct ScoreResponse {
    pub dimension: String,
    pub relevance: f64,
    pub relevance_pct: f64,
    pub confidence: f64,
    pub keyword_matches: usize,
    pub total_keywords: usize,
    pub sentiment: Sentiment,
    pub rating: Option<f64>,
    pub category: ContentCategory,
}

#[derive(Debug, Serialize)]
pub struct ReportResponse {
    pub id: i64,
    pub company: String,
    pub origin: String,
    pub model: Option<String>,
    pub body: String,
    pub created_at: String,
}
