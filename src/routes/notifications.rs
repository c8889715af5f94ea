//! Notification listing and lookup endpoints.

use chrono::{Duration, Utc};
use rocket::serde::json::Json;
use rocket::{State, get, post};
use rocket_db_pools::sqlx::PgPool;
use rocket_okapi::okapi::schemars::JsonSchema;
use rocket_okapi::openapi;
use serde::{Deserialize, Serialize};

use crate::error::ApiError;
use crate::models::{Notification, NotificationStatus};
use crate::store;

fn parse_status(raw: &str) -> Result<NotificationStatus, ApiError> {
    match raw {
        "Open" => Ok(NotificationStatus::Open),
        "Continuing" => Ok(NotificationStatus::Continuing),
        "Resolved" => Ok(NotificationStatus::Resolved),
        other => Err(ApiError::BadRequest(format!(
            "unknown status '{}', expected Open, Continuing, or Resolved",
            other
        ))),
    }
}

/// List notifications, optionally filtered by status. Archived rows are
/// excluded unless `include_archived` is set.
#[openapi(tag = "Notifications")]
#[get("/notifications?<status>&<include_archived>")]
pub async fn list_notifications(
    pool: &State<PgPool>,
    status: Option<String>,
    include_archived: Option<bool>,
) -> Result<Json<Vec<Notification>>, ApiError> {
    let include_archived = include_archived.unwrap_or(false);

    let notifications = match status {
        Some(raw) => store::list_by_status(pool, parse_status(&raw)?, include_archived).await?,
        None => store::list_all(pool, include_archived).await?,
    };

    Ok(Json(notifications))
}

/// Fetch one notification by its upstream message identifier.
#[openapi(tag = "Notifications")]
#[get("/notifications/<external_id>")]
pub async fn get_notification(
    pool: &State<PgPool>,
    external_id: String,
) -> Result<Json<Notification>, ApiError> {
    store::find_by_external_id(pool, &external_id)
        .await?
        .map(Json)
        .ok_or_else(|| ApiError::NotFound(format!("notification '{}' not found", external_id)))
}

/// Request body for the age-based archive sweep.
#[derive(Debug, Deserialize, JsonSchema)]
pub struct ArchiveRequest {
    /// Archive notifications received more than this many days ago.
    pub days: i64,
}

/// Outcome of an archive sweep.
#[derive(Debug, Serialize, JsonSchema)]
pub struct ArchiveResponse {
    /// Number of rows newly flagged as archived.
    pub archived: u64,
}

/// Flag notifications older than the requested cutoff as archived.
/// Safe to run repeatedly.
#[openapi(tag = "Notifications")]
#[post("/notifications/archive", data = "<request>")]
pub async fn archive_notifications(
    pool: &State<PgPool>,
    request: Json<ArchiveRequest>,
) -> Result<Json<ArchiveResponse>, ApiError> {
    if request.days < 0 {
        return Err(ApiError::BadRequest("days must be non-negative".to_string()));
    }

    let cutoff = Utc::now() - Duration::days(request.days);
    let archived = store::archive_older_than(pool, cutoff).await?;

    Ok(Json(ArchiveResponse { archived }))
}
