//! Router configuration for the web server.

use axum::{routing::get, Router};
use tower_http::cors::CorsLayer;

use super::handlers;
use super::AppState;

pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(handlers::health))
        .route("/api/apod/today", get(handlers::today))
        .route("/api/apod/date/:date", get(handlers::by_date))
        .route("/api/apod/random", get(handlers::random))
        .route("/api/apod/history", get(handlers::history))
        .route("/api/admin/status", get(handlers::status))
        .layer(CorsLayer::permissive())
        .with_state(state)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::time::Duration;

    use axum::body::{to_bytes, Body};
    use axum::http::{Request, StatusCode};
    use serde_json::Value;
    use tempfile::TempDir;
    use tower::ServiceExt;

    use crate::config::PacingConfig;
    use crate::db::Repository;
    use crate::services::CacheService;
    use crate::upstream::testing::{date, default_response, status_response, FakeTransport};
    use crate::upstream::{ApodClient, ApodQuery, RateLimiter, RateLimits};

    async fn app(transport: FakeTransport) -> (Router, TempDir) {
        let dir = TempDir::new().expect("Failed to create temp directory");
        let path = dir.path().join("apod.db");
        let repository = Repository::new(path.to_str().unwrap()).await.unwrap();
        let limiter = RateLimiter::new(RateLimits {
            hourly: 10_000,
            daily: 10_000,
            min_interval: Duration::ZERO,
        });
        let client = ApodClient::new(Arc::new(transport), limiter);
        let service = CacheService::new(repository, client, 90, PacingConfig::immediate());
        (create_router(AppState::new(Arc::new(service))), dir)
    }

    async fn get(router: &Router, uri: &str) -> (StatusCode, Value) {
        let response = router
            .clone()
            .oneshot(Request::get(uri).body(Body::empty()).unwrap())
            .await
            .unwrap();
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let body = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap()
        };
        (status, body)
    }

    #[tokio::test]
    async fn health_is_ok() {
        let (router, _dir) = app(FakeTransport::serving_all_dates()).await;
        let (status, _) = get(&router, "/health").await;
        assert_eq!(status, StatusCode::OK);
    }

    #[tokio::test]
    async fn date_route_returns_camel_case_record() {
        let (router, _dir) = app(FakeTransport::serving_all_dates()).await;
        let (status, body) = get(&router, "/api/apod/date/2010-03-04").await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["date"], "2010-03-04");
        assert_eq!(body["mediaKind"], "image");
        assert_eq!(body["attribution"], "Someone");
        assert!(body["primaryUrl"].as_str().unwrap().ends_with("2010-03-04.jpg"));
    }

    #[tokio::test]
    async fn bad_date_is_a_json_400() {
        let (router, _dir) = app(FakeTransport::serving_all_dates()).await;
        let (status, body) = get(&router, "/api/apod/date/1990-01-01").await;

        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["status"], 400);
        assert!(body["message"].as_str().unwrap().contains("1995-06-16"));
    }

    #[tokio::test]
    async fn upstream_missing_day_is_404() {
        let missing = date("2012-02-02");
        let transport = FakeTransport::new(move |query| match query {
            ApodQuery::Date(d) if d == missing => status_response(404),
            other => default_response(other),
        });
        let (router, _dir) = app(transport).await;

        let (status, body) = get(&router, "/api/apod/date/2012-02-02").await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["status"], 404);
    }

    #[tokio::test]
    async fn rate_limited_today_without_fallback_is_429() {
        let (router, _dir) = app(FakeTransport::new(|_| status_response(429))).await;

        let (status, body) = get(&router, "/api/apod/today").await;
        assert_eq!(status, StatusCode::TOO_MANY_REQUESTS);
        assert_eq!(body["status"], 429);
    }

    #[tokio::test]
    async fn upstream_failure_is_502() {
        let (router, _dir) = app(FakeTransport::new(|_| status_response(500))).await;

        let (status, _) = get(&router, "/api/apod/random").await;
        assert_eq!(status, StatusCode::BAD_GATEWAY);
    }

    #[tokio::test]
    async fn history_uses_defaults_and_backfills_empty_cache() {
        let (router, _dir) = app(FakeTransport::serving_all_dates()).await;

        let (status, body) = get(&router, "/api/apod/history").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["page"], 1);
        assert_eq!(body["pageSize"], 10);
        assert_eq!(body["totalItems"], 31);
        assert_eq!(body["totalPages"], 4);
        assert_eq!(body["items"].as_array().unwrap().len(), 10);

        let (status, body) = get(&router, "/api/apod/history?page=4&pageSize=10").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["items"].as_array().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn history_rejects_oversized_pages() {
        let (router, _dir) = app(FakeTransport::serving_all_dates()).await;

        let (status, body) = get(&router, "/api/apod/history?pageSize=101").await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["status"], 400);
    }

    #[tokio::test]
    async fn negative_page_is_a_json_400() {
        let (router, _dir) = app(FakeTransport::serving_all_dates()).await;

        let (status, body) = get(&router, "/api/apod/history?page=-1").await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["status"], 400);
        assert!(body["message"].as_str().unwrap().contains("Page"));
    }

    #[tokio::test]
    async fn non_numeric_paging_falls_back_to_defaults() {
        let (router, _dir) = app(FakeTransport::serving_all_dates()).await;

        let (status, body) = get(&router, "/api/apod/history?page=abc&pageSize=lots").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["page"], 1);
        assert_eq!(body["pageSize"], 10);
    }

    #[tokio::test]
    async fn status_reports_cache_and_limiter() {
        let (router, _dir) = app(FakeTransport::serving_all_dates()).await;
        get(&router, "/api/apod/date/2010-03-04").await;

        let (status, body) = get(&router, "/api/admin/status").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["cachedRecords"], 1);
        assert_eq!(body["lastMaintenance"], Value::Null);
        assert_eq!(body["rateLimiter"]["hourlyCount"], 1);
    }
}
