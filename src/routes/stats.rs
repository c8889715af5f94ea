//! Aggregate statistics endpoint.

use rocket::serde::json::Json;
use rocket::{State, get};
use rocket_db_pools::sqlx::PgPool;
use rocket_okapi::openapi;

use crate::error::ApiError;
use crate::models::Stats;
use crate::store;

/// Current aggregate statistics over the notification ledger.
#[openapi(tag = "Stats")]
#[get("/stats?<include_archived>")]
pub async fn get_stats(
    pool: &State<PgPool>,
    include_archived: Option<bool>,
) -> Result<Json<Stats>, ApiError> {
    let stats = store::current_stats(pool, include_archived.unwrap_or(false)).await?;
    Ok(Json(stats))
}
