//! Deduplicated notification ledger over Postgres.
//!
//! Append-mostly: rows are created once per unique `external_id` at ingest
//! time and mutated only by the pairing engine and the archive sweep. Insert
//! collisions on `external_id` are routine under repeated polling and are
//! reported as [`InsertOutcome::Duplicate`], not as errors.

use chrono::{DateTime, Utc};
use rocket_db_pools::sqlx::{self, PgPool};

use crate::extract::ParsedNotification;
use crate::models::{
    Notification, NotificationPair, NotificationStatus, Platform, PlatformIncidentStats, Stats,
};

/// Result of a dedup-insert attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InsertOutcome {
    /// Row created; carries the new notification id.
    Stored(i32),
    /// A row with the same `external_id` already exists; nothing written.
    Duplicate,
}

/// Insert one parsed notification, deduplicating on `external_id`.
///
/// The unique constraint makes the dedup race-safe under concurrent runs;
/// `ON CONFLICT DO NOTHING` turns the collision into a duplicate signal.
pub async fn insert_notification(
    pool: &PgPool,
    parsed: &ParsedNotification,
    external_id: &str,
    thread_id: &str,
    source_label: &str,
    raw_subject: &str,
    raw_body: &str,
) -> Result<InsertOutcome, sqlx::Error> {
    let inserted: Option<i32> = sqlx::query_scalar(
        r#"
        INSERT INTO notifications (
            external_id, thread_id, source_label, reference_number,
            received_at, platform, event_type, status,
            scheduled_date, scheduled_time, duration_text, affected_services,
            summary, raw_subject, raw_body,
            incident_start_time, incident_end_time, incident_duration_minutes
        ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16, $17, $18)
        ON CONFLICT (external_id) DO NOTHING
        RETURNING id
        "#,
    )
    .bind(external_id)
    .bind(thread_id)
    .bind(source_label)
    .bind(&parsed.reference_number)
    .bind(parsed.received_at)
    .bind(parsed.platform)
    .bind(&parsed.event_type)
    .bind(parsed.status)
    .bind(&parsed.scheduled_date)
    .bind(&parsed.scheduled_time)
    .bind(&parsed.duration_text)
    .bind(&parsed.affected_services)
    .bind(&parsed.summary)
    .bind(raw_subject)
    .bind(raw_body)
    .bind(parsed.incident_start_time)
    .bind(parsed.incident_end_time)
    .bind(parsed.incident_duration_minutes)
    .fetch_optional(pool)
    .await?;

    match inserted {
        Some(id) => {
            log::info!(
                "stored notification {} ({})",
                external_id,
                if parsed.reference_number.is_empty() {
                    "no reference"
                } else {
                    parsed.reference_number.as_str()
                }
            );
            Ok(InsertOutcome::Stored(id))
        }
        None => {
            log::debug!("skipping duplicate notification {}", external_id);
            Ok(InsertOutcome::Duplicate)
        }
    }
}

pub async fn find_by_external_id(
    pool: &PgPool,
    external_id: &str,
) -> Result<Option<Notification>, sqlx::Error> {
    sqlx::query_as::<_, Notification>("SELECT * FROM notifications WHERE external_id = $1")
        .bind(external_id)
        .fetch_optional(pool)
        .await
}

/// All notifications for one reference number, ordered by receipt time
/// ascending. This is the ordering the pairing engine scans in.
pub async fn find_by_reference(
    pool: &PgPool,
    reference_number: &str,
) -> Result<Vec<Notification>, sqlx::Error> {
    sqlx::query_as::<_, Notification>(
        "SELECT * FROM notifications WHERE reference_number = $1 ORDER BY received_at ASC, id ASC",
    )
    .bind(reference_number)
    .fetch_all(pool)
    .await
}

pub async fn list_all(
    pool: &PgPool,
    include_archived: bool,
) -> Result<Vec<Notification>, sqlx::Error> {
    sqlx::query_as::<_, Notification>(
        "SELECT * FROM notifications WHERE ($1 OR NOT is_archived) ORDER BY received_at DESC",
    )
    .bind(include_archived)
    .fetch_all(pool)
    .await
}

/// Notifications in one status, newest first. Archived rows are excluded
/// unless explicitly requested.
pub async fn list_by_status(
    pool: &PgPool,
    status: NotificationStatus,
    include_archived: bool,
) -> Result<Vec<Notification>, sqlx::Error> {
    sqlx::query_as::<_, Notification>(
        r#"
        SELECT * FROM notifications
        WHERE status = $1 AND ($2 OR NOT is_archived)
        ORDER BY received_at DESC
        "#,
    )
    .bind(status)
    .bind(include_archived)
    .fetch_all(pool)
    .await
}

/// Flip `is_archived` on every unarchived row received before the cutoff.
/// Idempotent: already-archived rows are untouched. Returns the number of
/// rows flipped. Archived rows remain eligible for pairing.
pub async fn archive_older_than(
    pool: &PgPool,
    cutoff: DateTime<Utc>,
) -> Result<u64, sqlx::Error> {
    let result = sqlx::query(
        r#"
        UPDATE notifications
        SET is_archived = TRUE, last_updated = now()
        WHERE received_at < $1 AND NOT is_archived
        "#,
    )
    .bind(cutoff)
    .execute(pool)
    .await?;

    let flipped = result.rows_affected();
    log::info!("archived {} notifications older than {}", flipped, cutoff);
    Ok(flipped)
}

pub async fn find_pair(
    pool: &PgPool,
    reference_number: &str,
) -> Result<Option<NotificationPair>, sqlx::Error> {
    sqlx::query_as::<_, NotificationPair>(
        "SELECT * FROM notification_pairs WHERE reference_number = $1",
    )
    .bind(reference_number)
    .fetch_optional(pool)
    .await
}

pub async fn list_pairs(pool: &PgPool) -> Result<Vec<NotificationPair>, sqlx::Error> {
    sqlx::query_as::<_, NotificationPair>("SELECT * FROM notification_pairs ORDER BY id DESC")
        .fetch_all(pool)
        .await
}

/// Build the aggregate statistics view.
///
/// Archived rows are excluded by default from every projection except the
/// resolved-reference subquery inside the open count: a reference resolved
/// by a now-archived record is still not open.
pub async fn current_stats(pool: &PgPool, include_archived: bool) -> Result<Stats, sqlx::Error> {
    let total: i64 = sqlx::query_scalar(
        "SELECT COUNT(*) FROM notifications WHERE ($1 OR NOT is_archived)",
    )
    .bind(include_archived)
    .fetch_one(pool)
    .await?;

    let status_counts: Vec<(NotificationStatus, i64)> = sqlx::query_as(
        r#"
        SELECT status, COUNT(*) FROM notifications
        WHERE ($1 OR NOT is_archived)
        GROUP BY status
        "#,
    )
    .bind(include_archived)
    .fetch_all(pool)
    .await?;

    let platform_counts: Vec<(Platform, i64)> = sqlx::query_as(
        r#"
        SELECT platform, COUNT(*) FROM notifications
        WHERE ($1 OR NOT is_archived)
        GROUP BY platform
        "#,
    )
    .bind(include_archived)
    .fetch_all(pool)
    .await?;

    let event_counts: Vec<(String, i64)> = sqlx::query_as(
        r#"
        SELECT event_type, COUNT(*) FROM notifications
        WHERE ($1 OR NOT is_archived)
        GROUP BY event_type
        "#,
    )
    .bind(include_archived)
    .fetch_all(pool)
    .await?;

    let avg_resolution: f64 = sqlx::query_scalar(
        r#"
        SELECT COALESCE(AVG(time_to_resolve_minutes), 0)::FLOAT8
        FROM notifications
        WHERE time_to_resolve_minutes IS NOT NULL AND ($1 OR NOT is_archived)
        "#,
    )
    .bind(include_archived)
    .fetch_one(pool)
    .await?;

    let avg_incident: f64 = sqlx::query_scalar(
        r#"
        SELECT COALESCE(AVG(incident_duration_minutes), 0)::FLOAT8
        FROM notifications
        WHERE incident_duration_minutes IS NOT NULL
          AND status = 'Resolved'
          AND ($1 OR NOT is_archived)
        "#,
    )
    .bind(include_archived)
    .fetch_one(pool)
    .await?;

    let platform_incidents: Vec<(Platform, i64, f64, i64)> = sqlx::query_as(
        r#"
        SELECT
            platform,
            COUNT(*),
            COALESCE(AVG(incident_duration_minutes), 0)::FLOAT8,
            COALESCE(SUM(incident_duration_minutes), 0)::BIGINT
        FROM notifications
        WHERE incident_duration_minutes IS NOT NULL
          AND status = 'Resolved'
          AND ($1 OR NOT is_archived)
        GROUP BY platform
        "#,
    )
    .bind(include_archived)
    .fetch_all(pool)
    .await?;

    // A reference number counts as open only while no Resolved record for it
    // exists anywhere, archived or not.
    let truly_open: i64 = sqlx::query_scalar(
        r#"
        SELECT COUNT(DISTINCT reference_number)
        FROM notifications
        WHERE status IN ('Open', 'Continuing')
          AND ($1 OR NOT is_archived)
          AND reference_number NOT IN (
              SELECT reference_number FROM notifications WHERE status = 'Resolved'
          )
        "#,
    )
    .bind(include_archived)
    .fetch_one(pool)
    .await?;

    let status_of = |wanted: NotificationStatus| {
        status_counts
            .iter()
            .find(|(status, _)| *status == wanted)
            .map(|(_, count)| *count)
            .unwrap_or(0)
    };

    Ok(Stats {
        total_notifications: total,
        open_count: truly_open,
        resolved_count: status_of(NotificationStatus::Resolved),
        continuing_count: status_of(NotificationStatus::Continuing),
        platform_breakdown: platform_counts
            .into_iter()
            .map(|(platform, count)| (platform.as_str().to_string(), count))
            .collect(),
        event_type_breakdown: event_counts.into_iter().collect(),
        platform_incident_stats: platform_incidents
            .into_iter()
            .map(|(platform, count, avg, total)| {
                (
                    platform.as_str().to_string(),
                    PlatformIncidentStats {
                        count,
                        avg_duration_minutes: round2(avg),
                        total_duration_minutes: total,
                    },
                )
            })
            .collect(),
        avg_resolution_time_minutes: round2(avg_resolution),
        avg_incident_duration_minutes: round2(avg_incident),
    })
}

fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}
