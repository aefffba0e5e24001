use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
    Json,
};
use serde::{Deserialize, Serialize};

use super::AppState;
use crate::error::Result;
use crate::models::{MaintenanceMark, Page, Record};
use crate::upstream::RateSnapshot;

/// Parameters for the history listing. Values are kept raw so that
/// anything unparseable falls back to the defaults instead of a rejection.
#[derive(Debug, Default, Deserialize)]
pub struct HistoryParams {
    pub page: Option<String>,
    #[serde(rename = "pageSize")]
    pub page_size: Option<String>,
}

const DEFAULT_PAGE: i64 = 1;
const DEFAULT_PAGE_SIZE: i64 = 10;

impl HistoryParams {
    /// Range checks are left to the service so they share its error messages.
    fn resolve(&self) -> (u32, u32) {
        (
            parse_or(self.page.as_deref(), DEFAULT_PAGE),
            parse_or(self.page_size.as_deref(), DEFAULT_PAGE_SIZE),
        )
    }
}

/// Negative values become 0 and are then rejected by the service.
fn parse_or(raw: Option<&str>, default: i64) -> u32 {
    let value = raw
        .and_then(|v| v.trim().parse::<i64>().ok())
        .unwrap_or(default);
    value.clamp(0, i64::from(u32::MAX)) as u32
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusResponse {
    pub cached_records: u64,
    pub last_maintenance: Option<MaintenanceMark>,
    /// Missing while an upstream request holds the limiter.
    pub rate_limiter: Option<RateSnapshot>,
}

pub async fn health() -> impl IntoResponse {
    StatusCode::OK
}

pub async fn today(State(state): State<AppState>) -> Result<Json<Record>> {
    Ok(Json(state.service.get_today().await?))
}

pub async fn by_date(
    State(state): State<AppState>,
    Path(date): Path<String>,
) -> Result<Json<Record>> {
    Ok(Json(state.service.get_by_date(&date).await?))
}

pub async fn random(State(state): State<AppState>) -> Result<Json<Record>> {
    Ok(Json(state.service.get_random().await?))
}

pub async fn history(
    State(state): State<AppState>,
    Query(params): Query<HistoryParams>,
) -> Result<Json<Page<Record>>> {
    let (page, page_size) = params.resolve();
    let page = state.service.get_history(page, page_size).await?;
    Ok(Json(page))
}

pub async fn status(State(state): State<AppState>) -> Result<Json<StatusResponse>> {
    let cached_records = state.service.repository().count_all().await?;
    let last_maintenance = state.service.last_maintenance().await?;
    let rate_limiter = state.service.client().limiter().snapshot();

    Ok(Json(StatusResponse {
        cached_records,
        last_maintenance,
        rate_limiter,
    }))
}
