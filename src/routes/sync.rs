//! Ingest and sync-history endpoints.

use chrono::{DateTime, Utc};
use rocket::serde::json::Json;
use rocket::{State, get, post};
use rocket_db_pools::sqlx::PgPool;
use rocket_okapi::okapi::schemars::JsonSchema;
use rocket_okapi::openapi;
use serde::{Deserialize, Serialize};

use crate::error::ApiError;
use crate::extract::Extractor;
use crate::models::{BatchResult, RawEmail, SyncRun};
use crate::sync;

/// One batch of raw emails handed over by the mail-fetching collaborator.
#[derive(Debug, Deserialize, JsonSchema)]
pub struct IngestRequest {
    /// Identifier of the inbox or feed the batch came from.
    pub source: String,
    pub emails: Vec<RawEmail>,
}

/// Reconcile a batch of raw emails: extract, dedup-insert, re-link pairs.
///
/// The batch is not all-or-nothing; per-record failures are counted in the
/// returned summary and do not block the remaining records.
#[openapi(tag = "Sync")]
#[post("/sync/ingest", data = "<request>")]
pub async fn ingest_batch(
    pool: &State<PgPool>,
    extractor: &State<Extractor>,
    request: Json<IngestRequest>,
) -> Result<Json<BatchResult>, ApiError> {
    let result = sync::run_batch(pool, extractor, &request.emails, &request.source).await?;
    Ok(Json(result))
}

/// Recent reconciliation runs, newest first.
#[openapi(tag = "Sync")]
#[get("/sync/history?<limit>")]
pub async fn get_sync_history(
    pool: &State<PgPool>,
    limit: Option<i64>,
) -> Result<Json<Vec<SyncRun>>, ApiError> {
    let runs = sync::sync_history(pool, limit.unwrap_or(10)).await?;
    Ok(Json(runs))
}

/// Watermark report for one source.
#[derive(Debug, Serialize, JsonSchema)]
pub struct SyncStatusResponse {
    pub source: String,
    /// Start time of the most recent successful run, if any.
    pub last_sync: Option<DateTime<Utc>>,
}

/// When the given source last completed a successful reconciliation.
#[openapi(tag = "Sync")]
#[get("/sync/status?<source>")]
pub async fn get_sync_status(
    pool: &State<PgPool>,
    source: String,
) -> Result<Json<SyncStatusResponse>, ApiError> {
    let last_sync = sync::last_sync_date(pool, &source).await?;
    Ok(Json(SyncStatusResponse { source, last_sync }))
}
