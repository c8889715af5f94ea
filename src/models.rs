use chrono::{DateTime, NaiveDateTime, Utc};
use rocket_db_pools::sqlx::{self, FromRow};
use rocket_okapi::okapi::schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

// ===== Classification Enums =====

/// Service platform a notification applies to.
///
/// Derived from subject keywords, with an explicit `Platform:` body line
/// taking precedence when present.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Serialize,
    Deserialize,
    JsonSchema,
    sqlx::Type,
)]
#[sqlx(type_name = "platform")]
pub enum Platform {
    #[sqlx(rename = "IDP")]
    #[serde(rename = "IDP")]
    Idp,
    #[sqlx(rename = "OGx")]
    #[serde(rename = "OGx")]
    Ogx,
    #[sqlx(rename = "OGWS")]
    #[serde(rename = "OGWS")]
    Ogws,
    Unknown,
}

impl Platform {
    pub fn as_str(&self) -> &'static str {
        match self {
            Platform::Idp => "IDP",
            Platform::Ogx => "OGx",
            Platform::Ogws => "OGWS",
            Platform::Unknown => "Unknown",
        }
    }

    /// Map a free-text `Platform:` body value onto the known set.
    pub fn from_label(label: &str) -> Platform {
        match label.trim() {
            "IDP" => Platform::Idp,
            "OGx" | "OGX" => Platform::Ogx,
            "OGWS" => Platform::Ogws,
            _ => Platform::Unknown,
        }
    }
}

/// Lifecycle state of a notification. `Resolved` is terminal: once any
/// record for a reference number is resolved, pairing forces the rest of
/// that reference's records to `Resolved` as well.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Serialize,
    Deserialize,
    JsonSchema,
    sqlx::Type,
)]
#[sqlx(type_name = "notification_status")]
pub enum NotificationStatus {
    Open,
    Continuing,
    Resolved,
}

impl NotificationStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            NotificationStatus::Open => "Open",
            NotificationStatus::Continuing => "Continuing",
            NotificationStatus::Resolved => "Resolved",
        }
    }
}

// ===== Core Data Models =====

/// One parsed service-status email, as persisted.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, FromRow)]
pub struct Notification {
    pub id: i32,
    /// Opaque upstream message identifier; dedup key, immutable.
    pub external_id: String,
    pub thread_id: String,
    pub source_label: String,
    /// Business key grouping one incident's lifecycle (e.g. `S-003141`).
    /// Empty when the subject carried no reference pattern; such records
    /// stay orphans and are never paired.
    pub reference_number: String,
    pub received_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
    pub last_updated: DateTime<Utc>,
    pub platform: Platform,
    pub event_type: String,
    pub status: NotificationStatus,
    pub scheduled_date: String,
    pub scheduled_time: String,
    pub duration_text: String,
    pub affected_services: String,
    pub summary: String,
    pub raw_subject: String,
    pub raw_body: String,
    pub resolution_date: Option<DateTime<Utc>>,
    /// Minutes between the open and resolved emails arriving. Measures
    /// notification latency, not outage length.
    pub time_to_resolve_minutes: Option<i32>,
    pub incident_start_time: Option<NaiveDateTime>,
    pub incident_end_time: Option<NaiveDateTime>,
    /// Minutes between the declared incident start and end. Measures the
    /// actual outage length, distinct from `time_to_resolve_minutes`.
    pub incident_duration_minutes: Option<i32>,
    pub is_archived: bool,
}

/// One reconciled incident lifecycle: the earliest-received open and
/// resolved notifications for a reference number, with both duration
/// metrics.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, FromRow)]
pub struct NotificationPair {
    pub id: i32,
    pub reference_number: String,
    pub open_notification_id: i32,
    pub resolved_notification_id: i32,
    pub time_to_resolve_minutes: i32,
    pub incident_duration_minutes: Option<i32>,
    pub linked_at: DateTime<Utc>,
}

/// One recorded reconciliation run for a source.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, FromRow)]
pub struct SyncRun {
    pub id: i32,
    pub source_label: String,
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
    pub emails_fetched: Option<i32>,
    pub emails_stored: Option<i32>,
    pub duplicates: Option<i32>,
    pub errors_count: Option<i32>,
    pub pairs_linked: Option<i32>,
    pub status: Option<String>,
    pub error_log: Option<String>,
}

// ===== Ingest Boundary =====

/// Raw email record as delivered by the mail-fetching collaborator.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct RawEmail {
    /// Stable upstream message identifier (dedup key).
    pub external_id: String,
    #[serde(default)]
    pub thread_id: String,
    #[serde(default)]
    pub subject: String,
    /// Plain text or HTML fragment body.
    #[serde(default)]
    pub body: String,
    /// Raw `Date:` header value, when the fetcher preserved it.
    #[serde(default)]
    pub received_at_header: Option<String>,
}

/// Outcome summary of one reconciliation batch.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct BatchResult {
    pub stored: usize,
    pub duplicates: usize,
    pub errors: usize,
    pub pairs_linked: usize,
}

// ===== Statistics Projections =====

/// Per-platform incident duration rollup over resolved notifications.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct PlatformIncidentStats {
    pub count: i64,
    pub avg_duration_minutes: f64,
    pub total_duration_minutes: i64,
}

/// Read-only aggregate view over the notification and pair tables.
///
/// `open_count` counts distinct reference numbers still in Open/Continuing
/// that have never seen a Resolved record; this encodes business meaning,
/// not just a table scan.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct Stats {
    pub total_notifications: i64,
    pub open_count: i64,
    pub resolved_count: i64,
    pub continuing_count: i64,
    pub platform_breakdown: BTreeMap<String, i64>,
    pub event_type_breakdown: BTreeMap<String, i64>,
    pub platform_incident_stats: BTreeMap<String, PlatformIncidentStats>,
    pub avg_resolution_time_minutes: f64,
    pub avg_incident_duration_minutes: f64,
}
