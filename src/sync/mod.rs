//! Batch reconciliation of raw service-status emails.
//!
//! One reconciliation run takes an ordered batch of raw emails from the
//! mail-fetching collaborator and drives them through the pipeline:
//!
//! 1. **Extract**: each email becomes a structured notification
//!    (infallible and best-effort, see [`crate::extract`])
//! 2. **Dedup-insert**: stored, duplicate, or error per record; one
//!    record's failure never blocks the rest of the batch
//! 3. **Pairing**: every distinct reference number touched by a stored
//!    record is re-linked through [`crate::pairing::link_pair`]
//! 4. **History**: the run is recorded in `sync_history`, whose latest
//!    successful row per source acts as the watermark for the next batch
//!
//! Runs are designed to be repeated: re-ingesting the same batch produces
//! only duplicate signals and idempotent re-links.

pub mod migration;

use chrono::{DateTime, Utc};
use rocket_db_pools::sqlx::{self, PgPool};
use std::collections::BTreeSet;

use crate::extract::Extractor;
use crate::models::{BatchResult, RawEmail, SyncRun};
use crate::pairing;
use crate::store::{self, InsertOutcome};

pub use migration::run_migrations;

/// Extract, dedup-insert, and re-pair one batch of raw emails.
///
/// Extraction never throws; only storage failures count as errors, and each
/// is isolated to its record. Pairing failures are likewise isolated to the
/// reference number in progress.
pub async fn reconcile(
    pool: &PgPool,
    extractor: &Extractor,
    batch: &[RawEmail],
    source_label: &str,
) -> BatchResult {
    let mut result = BatchResult::default();
    let mut touched_references: BTreeSet<String> = BTreeSet::new();

    for email in batch {
        let parsed = extractor.extract(
            &email.body,
            &email.subject,
            email.received_at_header.as_deref(),
        );

        match store::insert_notification(
            pool,
            &parsed,
            &email.external_id,
            &email.thread_id,
            source_label,
            &email.subject,
            &email.body,
        )
        .await
        {
            Ok(InsertOutcome::Stored(_)) => {
                result.stored += 1;
                if !parsed.reference_number.is_empty() {
                    touched_references.insert(parsed.reference_number.clone());
                }
            }
            Ok(InsertOutcome::Duplicate) => result.duplicates += 1,
            Err(err) => {
                log::error!("failed to store notification {}: {}", email.external_id, err);
                result.errors += 1;
            }
        }
    }

    for reference in &touched_references {
        match pairing::link_pair(pool, reference).await {
            Ok(true) => result.pairs_linked += 1,
            Ok(false) => {}
            Err(err) => {
                log::error!("failed to link pair {}: {}", reference, err);
            }
        }
    }

    log::info!(
        "reconciled batch from {}: {} stored, {} duplicates, {} errors, {} pairs linked",
        source_label,
        result.stored,
        result.duplicates,
        result.errors,
        result.pairs_linked
    );
    result
}

/// Run one reconciliation batch and record it in `sync_history`.
///
/// The history row is the durable outcome report: operators can tell
/// "nothing new happened" from "something failed" by the counts and status.
/// An error-free run is `success`; a run where every record failed to
/// store is `failed`; anything in between is `partial`. Only `success`
/// runs advance the watermark.
pub async fn run_batch(
    pool: &PgPool,
    extractor: &Extractor,
    batch: &[RawEmail],
    source_label: &str,
) -> Result<BatchResult, sqlx::Error> {
    let run_id = log_sync_start(pool, source_label).await?;

    let result = reconcile(pool, extractor, batch, source_label).await;

    let status = if result.errors == 0 {
        "success"
    } else if result.stored == 0 && result.duplicates == 0 {
        "failed"
    } else {
        "partial"
    };
    let error_log = if result.errors > 0 {
        Some(format!(
            "{} of {} records failed to store",
            result.errors,
            batch.len()
        ))
    } else {
        None
    };
    log_sync_complete(pool, run_id, batch.len(), &result, status, error_log.as_deref()).await?;

    Ok(result)
}

/// Record the start of a reconciliation run, returning its history id.
pub async fn log_sync_start(pool: &PgPool, source_label: &str) -> Result<i32, sqlx::Error> {
    sqlx::query_scalar("INSERT INTO sync_history (source_label) VALUES ($1) RETURNING id")
        .bind(source_label)
        .fetch_one(pool)
        .await
}

/// Record the completion of a reconciliation run.
pub async fn log_sync_complete(
    pool: &PgPool,
    run_id: i32,
    fetched: usize,
    result: &BatchResult,
    status: &str,
    error_log: Option<&str>,
) -> Result<(), sqlx::Error> {
    sqlx::query(
        r#"
        UPDATE sync_history
        SET finished_at = now(),
            emails_fetched = $1,
            emails_stored = $2,
            duplicates = $3,
            errors_count = $4,
            pairs_linked = $5,
            status = $6,
            error_log = $7
        WHERE id = $8
        "#,
    )
    .bind(fetched as i32)
    .bind(result.stored as i32)
    .bind(result.duplicates as i32)
    .bind(result.errors as i32)
    .bind(result.pairs_linked as i32)
    .bind(status)
    .bind(error_log)
    .bind(run_id)
    .execute(pool)
    .await?;
    Ok(())
}

/// Watermark for the next batch: start time of the most recent successful
/// run for one source.
pub async fn last_sync_date(
    pool: &PgPool,
    source_label: &str,
) -> Result<Option<DateTime<Utc>>, sqlx::Error> {
    sqlx::query_scalar(
        r#"
        SELECT started_at FROM sync_history
        WHERE source_label = $1 AND status = 'success'
        ORDER BY started_at DESC
        LIMIT 1
        "#,
    )
    .bind(source_label)
    .fetch_optional(pool)
    .await
}

/// Recent reconciliation runs, newest first.
pub async fn sync_history(pool: &PgPool, limit: i64) -> Result<Vec<SyncRun>, sqlx::Error> {
    sqlx::query_as::<_, SyncRun>(
        "SELECT * FROM sync_history ORDER BY started_at DESC LIMIT $1",
    )
    .bind(limit)
    .fetch_all(pool)
    .await
}
