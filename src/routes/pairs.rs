//! Reconciled-pair endpoints.

use rocket::serde::json::Json;
use rocket::{State, get};
use rocket_db_pools::sqlx::PgPool;
use rocket_okapi::openapi;

use crate::error::ApiError;
use crate::models::NotificationPair;
use crate::store;

/// List all reconciled incident pairs, newest first.
#[openapi(tag = "Pairs")]
#[get("/pairs")]
pub async fn list_pairs(pool: &State<PgPool>) -> Result<Json<Vec<NotificationPair>>, ApiError> {
    Ok(Json(store::list_pairs(pool).await?))
}

/// Fetch the reconciled pair for one reference number.
#[openapi(tag = "Pairs")]
#[get("/pairs/<reference_number>")]
pub async fn get_pair(
    pool: &State<PgPool>,
    reference_number: String,
) -> Result<Json<NotificationPair>, ApiError> {
    store::find_pair(pool, &reference_number)
        .await?
        .map(Json)
        .ok_or_else(|| ApiError::NotFound(format!("no pair for '{}'", reference_number)))
}
