//! JSON API over the scored store, built on Axum.
//!
//! Every response uses the `{success, data, error}` envelope. Store access
//! runs on the blocking pool with a connection per request.

/// API error types mapped to HTTP status codes.
pub mod errors;
/// HTTP request handlers and application state.
pub mod handlers;
/// Request and response data transfer objects.
pub mod models;

use anyhow::{Context, Result};
use axum::routing::{get, post};
use axum::Router;
use tracing::info;

use handlers::AppState;

use crate::db;

pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/api/health", get(handlers::health))
        .route("/api/companies", get(handlers::list_companies))
        .route("/api/dimensions", get(handlers::list_dimensions))
        .route("/api/items", get(handlers::list_items))
        .route("/api/companies/:company/scores", get(handlers::company_scores))
        .route(
            "/api/companies/:company/scores/:dimension",
            get(handlers::dimension_score),
        )
        .route("/api/score", post(handlers::score_text))
        .route(
            "/api/reports/:company",
            get(handlers::get_report).post(handlers::create_report),
        )
        .route("/api/stats", get(handlers::stats))
        .with_state(state)
}

/// Make sure the schema exists, then serve until the process is stopped.
pub async fn serve(state: AppState, bind: &str) -> Result<()> {
    let conn = db::connect(&state.settings.database.path)?;
    db::init_schema(&conn)?;
    drop(conn);

    let listener = tokio::net::TcpListener::bind(bind)
        .await
        .with_context(|| format!("Failed to bind {}", bind))?;
    info!("Listening on http://{}", listener.local_addr()?);
    axum::serve(listener, create_router(state)).await?;
    Ok(())
}

// ── Tests ──

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use serde_json::{json, Value};

    use crate::config::{LlmProvider, Settings};
    use crate::db::tests::item;
    use crate::dimension::Dimension;
    use crate::llm::HttpGenerator;
    use crate::model::Company;
    use crate::report::Reporter;

    struct TestServer {
        base: String,
        client: reqwest::Client,
        _dir: tempfile::TempDir,
    }

    impl TestServer {
        async fn get(&self, path: &str) -> (u16, Value) {
            let resp = self
                .client
                .get(format!("{}{}", self.base, path))
                .send()
                .await
                .unwrap();
            (resp.status().as_u16(), resp.json().await.unwrap())
        }

        async fn post(&self, path: &str, body: Value) -> (u16, Value) {
            let resp = self
                .client
                .post(format!("{}{}", self.base, path))
                .json(&body)
                .send()
                .await
                .unwrap();
            (resp.status().as_u16(), resp.json().await.unwrap())
        }
    }

    async fn start() -> TestServer {
        let dir = tempfile::tempdir().unwrap();
        let mut settings = Settings::default();
        settings.database.path = dir.path().join("intel.sqlite");
        settings.report.output_dir = None;
        settings.llm.provider = LlmProvider::None;
        settings.llm.max_retries = 0;
        settings.companies = vec![Company {
            name: "Acme".into(),
            slug: "acme".into(),
            sources: vec![],
        }];

        let conn = db::connect(&settings.database.path).unwrap();
        db::init_schema(&conn).unwrap();
        db::replace_items(
            &conn,
            &[],
            &[
                item("acme", Dimension::ApiFirstArchitecture, "https://a/1", 0.5),
                item("acme", Dimension::ApiFirstArchitecture, "https://a/2", 1.0),
                item("acme", Dimension::PricingModel, "https://a/3", 0.25),
            ],
        )
        .unwrap();
        drop(conn);

        let generator = Arc::new(HttpGenerator::new(&settings.llm).unwrap());
        let reporter = Reporter::new(generator, &settings.llm, &settings.report);
        let state = AppState::new(settings, reporter);

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, create_router(state)).await.unwrap();
        });

        TestServer {
            base: format!("http://{}", addr),
            client: reqwest::Client::new(),
            _dir: dir,
        }
    }

    #[tokio::test]
    async fn health_and_listings() {
        let srv = start().await;
        let (status, body) = srv.get("/api/health").await;
        assert_eq!(status, 200);
        assert_eq!(body["success"], true);
        assert_eq!(body["data"]["status"], "ok");
        assert!(body["error"].is_null());

        let (_, body) = srv.get("/api/companies").await;
        assert_eq!(body["data"][0]["slug"], "acme");

        let (_, body) = srv.get("/api/dimensions").await;
        assert_eq!(body["data"].as_array().unwrap().len(), Dimension::ALL.len());
        assert_eq!(body["data"][0]["name"], "api_first_architecture");
    }

    #[tokio::test]
    async fn scores_are_means() {
        let srv = start().await;
        let (status, body) = srv
            .get("/api/companies/acme/scores/api_first_architecture")
            .await;
        assert_eq!(status, 200);
        assert_eq!(body["data"]["item_count"], 2);
        assert_eq!(body["data"]["mean_relevance"], 0.75);

        let (_, body) = srv.get("/api/companies/ACME/scores").await;
        let dims = body["data"]["dimensions"].as_array().unwrap();
        assert_eq!(dims.len(), Dimension::ALL.len());
        let collab = dims
            .iter()
            .find(|d| d["dimension"] == "collaboration")
            .unwrap();
        assert_eq!(collab["item_count"], 0);
        assert_eq!(collab["mean_relevance"], 0.0);
    }

    #[tokio::test]
    async fn unknown_company_and_dimension() {
        let srv = start().await;
        let (status, body) = srv.get("/api/companies/lotus/scores").await;
        assert_eq!(status, 404);
        assert_eq!(body["success"], false);
        assert!(body["data"].is_null());
        assert!(body["error"].as_str().unwrap().contains("lotus"));

        let (status, body) = srv.get("/api/companies/acme/scores/vibes").await;
        assert_eq!(status, 400);
        assert_eq!(body["success"], false);
    }

    #[tokio::test]
    async fn items_are_filtered_and_ordered() {
        let srv = start().await;
        let (_, body) = srv
            .get("/api/items?company=acme&dimension=api_first_architecture&limit=1")
            .await;
        let items = body["data"].as_array().unwrap();
        assert_eq!(items.len(), 1);
        assert_eq!(items[0]["source_url"], "https://a/2");

        let (_, body) = srv.get("/api/items").await;
        assert_eq!(body["data"].as_array().unwrap().len(), 3);
    }

    #[tokio::test]
    async fn ad_hoc_scoring() {
        let srv = start().await;
        let (status, body) = srv
            .post(
                "/api/score",
                json!({
                    "text": "Our REST API has a GraphQL endpoint and an SDK.",
                    "dimension": "api_first_architecture"
                }),
            )
            .await;
        assert_eq!(status, 200);
        let data = &body["data"];
        assert_eq!(data["keyword_matches"], 5);
        assert_eq!(data["total_keywords"], 6);
        let c = data["confidence"].as_f64().unwrap();
        assert!(c > 0.0 && c < 1.0);

        let (status, body) = srv
            .post("/api/score", json!({"text": "anything", "dimension": "vibes"}))
            .await;
        assert_eq!(status, 200);
        assert_eq!(body["data"]["relevance"], 0.0);
        assert_eq!(body["data"]["confidence"], 0.0);
    }

    #[tokio::test]
    async fn reports_fall_back_without_llm() {
        let srv = start().await;
        let (status, _) = srv.get("/api/reports/acme").await;
        assert_eq!(status, 404);

        let (status, body) = srv.post("/api/reports/acme", json!({})).await;
        assert_eq!(status, 200);
        assert_eq!(body["data"]["origin"], "fallback");
        assert!(body["data"]["body"]
            .as_str()
            .unwrap()
            .contains("api_first_architecture"));

        let (status, body) = srv.get("/api/reports/acme").await;
        assert_eq!(status, 200);
        assert_eq!(body["data"]["origin"], "fallback");

        let (_, body) = srv.get("/api/stats").await;
        assert_eq!(body["data"]["reports"], 1);
        assert_eq!(body["data"]["items"], 3);
    }
}
