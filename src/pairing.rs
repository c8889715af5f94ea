//! Open/Resolved pair reconciliation.
//!
//! Links an incident's lifecycle across its emails: the earliest-received
//! Open record and the earliest-received Resolved record for a reference
//! number become the pair anchors. The pair row carries two deliberately
//! distinct metrics: `time_to_resolve_minutes` (latency between the two
//! emails arriving) and `incident_duration_minutes` (outage length declared
//! inside the resolved email, copied, never recomputed).

use rocket_db_pools::sqlx::{self, FromRow, PgPool};

use crate::models::NotificationStatus;

#[derive(Debug, FromRow)]
struct AnchorRow {
    id: i32,
    received_at: chrono::DateTime<chrono::Utc>,
    status: NotificationStatus,
    incident_duration_minutes: Option<i32>,
}

/// Link the Open/Resolved pair for one reference number.
///
/// Returns `Ok(false)` without mutating anything when the preconditions are
/// not met: fewer than two records, or either anchor missing. Steps that do
/// mutate (pair upsert, anchor update, terminal-state propagation) run in a
/// single transaction; any failure rolls the whole operation back.
///
/// Re-invocation on stable data is idempotent: the pair row is replaced on
/// conflict and the forced statuses are already terminal.
pub async fn link_pair(pool: &PgPool, reference_number: &str) -> Result<bool, sqlx::Error> {
    let mut tx = pool.begin().await?;

    let rows: Vec<AnchorRow> = sqlx::query_as(
        r#"
        SELECT id, received_at, status, incident_duration_minutes
        FROM notifications
        WHERE reference_number = $1
        ORDER BY received_at ASC, id ASC
        "#,
    )
    .bind(reference_number)
    .fetch_all(&mut *tx)
    .await?;

    if rows.len() < 2 {
        return Ok(false);
    }

    let open_anchor = rows
        .iter()
        .find(|row| row.status == NotificationStatus::Open);
    let resolved_anchor = rows
        .iter()
        .find(|row| row.status == NotificationStatus::Resolved);

    let (open_anchor, resolved_anchor) = match (open_anchor, resolved_anchor) {
        (Some(open), Some(resolved)) => (open, resolved),
        _ => return Ok(false),
    };

    // Notification latency between the two emails. Can go negative when one
    // receipt time came from a fallback clock; that is a known data-quality
    // edge case and is stored as-is.
    let time_to_resolve =
        (resolved_anchor.received_at - open_anchor.received_at).num_minutes() as i32;

    sqlx::query(
        r#"
        INSERT INTO notification_pairs (
            reference_number, open_notification_id, resolved_notification_id,
            time_to_resolve_minutes, incident_duration_minutes
        ) VALUES ($1, $2, $3, $4, $5)
        ON CONFLICT (reference_number) DO UPDATE SET
            open_notification_id = EXCLUDED.open_notification_id,
            resolved_notification_id = EXCLUDED.resolved_notification_id,
            time_to_resolve_minutes = EXCLUDED.time_to_resolve_minutes,
            incident_duration_minutes = EXCLUDED.incident_duration_minutes,
            linked_at = now()
        "#,
    )
    .bind(reference_number)
    .bind(open_anchor.id)
    .bind(resolved_anchor.id)
    .bind(time_to_resolve)
    .bind(resolved_anchor.incident_duration_minutes)
    .execute(&mut *tx)
    .await?;

    sqlx::query(
        r#"
        UPDATE notifications
        SET resolution_date = $1, time_to_resolve_minutes = $2, last_updated = now()
        WHERE id = $3
        "#,
    )
    .bind(resolved_anchor.received_at)
    .bind(time_to_resolve)
    .bind(resolved_anchor.id)
    .execute(&mut *tx)
    .await?;

    // Resolved wins: a later resolved notification must not leave stale
    // Open/Continuing duplicates visible for the same reference.
    sqlx::query(
        r#"
        UPDATE notifications
        SET status = 'Resolved', last_updated = now()
        WHERE reference_number = $1 AND status IN ('Open', 'Continuing')
        "#,
    )
    .bind(reference_number)
    .execute(&mut *tx)
    .await?;

    tx.commit().await?;

    log::info!(
        "linked pair {}: {} minutes between emails",
        reference_number,
        time_to_resolve
    );
    Ok(true)
}
