//! Text extraction for service-status notification emails.
//!
//! Turns one email (subject + body, optional declared `Date:` header) into a
//! structured [`ParsedNotification`]. Extraction is best-effort and never
//! fails: every field that a pattern does not match falls back to its empty
//! or absent representation. A notification carrying only a reference number
//! and defaults is still a valid, storable record.
//!
//! The pattern tables are compiled once at construction and the [`Extractor`]
//! holds them as immutable configuration; `extract` is a pure function of its
//! inputs. Parse misses are logged at `debug`, parse failures on
//! present-but-malformed values at `warn`, through the `log` facade.

use chrono::{DateTime, NaiveDateTime, Utc};
use regex::Regex;

use crate::models::{NotificationStatus, Platform};

/// Fixed vocabulary probed against the summary text. Matches are reported in
/// vocabulary order, joined with `"; "`.
const SERVICE_VOCABULARY: &[&str] = &[
    "Partner-Support",
    "VAPP",
    "OGWS",
    "Gateway",
    "API",
    "Portal",
    "satellite",
    "modem",
];

/// Structured representation of one extracted email.
///
/// Field semantics mirror the persisted notification row; string fields are
/// empty (never null) when the pattern missed, timestamp fields are `None`.
#[derive(Debug, Clone, PartialEq)]
pub struct ParsedNotification {
    pub reference_number: String,
    pub received_at: DateTime<Utc>,
    /// True when `received_at` came from the declared date header, false
    /// when it fell back to processing time. The fallback is a policy, not
    /// silent data loss; callers needing strict provenance check this.
    pub declared_date_honored: bool,
    pub platform: Platform,
    pub event_type: String,
    pub status: NotificationStatus,
    pub summary: String,
    pub scheduled_date: String,
    pub scheduled_time: String,
    pub duration_text: String,
    pub affected_services: String,
    pub incident_start_time: Option<NaiveDateTime>,
    pub incident_end_time: Option<NaiveDateTime>,
    pub incident_duration_minutes: Option<i32>,
}

/// Stateless notification extractor holding its compiled pattern set.
pub struct Extractor {
    reference: Regex,
    summary_marker: Regex,
    scheduled_dates: [Regex; 3],
    scheduled_time: Regex,
    duration: Regex,
    incident_start: Regex,
    incident_end: Regex,
}

impl Default for Extractor {
    fn default() -> Self {
        Self::new()
    }
}

impl Extractor {
    pub fn new() -> Self {
        // Patterns are fixed at compile time, so construction cannot fail.
        Self {
            reference: Regex::new(r"([A-Z]-\d{6})").expect("valid reference pattern"),
            summary_marker: Regex::new(r"(?i)summary:").expect("valid summary pattern"),
            scheduled_dates: [
                // "November 5th", "Nov 5"
                Regex::new(r"(\w+\s+\d{1,2}(?:st|nd|rd|th)?)").expect("valid date pattern"),
                // "11/5/2024"
                Regex::new(r"(\d{1,2}/\d{1,2}/\d{4})").expect("valid date pattern"),
                // "2024-11-05"
                Regex::new(r"(\d{4}-\d{2}-\d{2})").expect("valid date pattern"),
            ],
            scheduled_time: Regex::new(r"(\d{1,2}:\d{2}\s*(?:UTC|GMT|EST|PST|[AP]M)?)")
                .expect("valid time pattern"),
            duration: Regex::new(r"(?i)(?:last|duration|take|approximately)\s+(\d+)\s+(hour|minute|day)s?")
                .expect("valid duration pattern"),
            incident_start: Regex::new(r"<b>Start Time:</b>\s*(?:&nbsp;)?\s*([^<]+)")
                .expect("valid start-time pattern"),
            incident_end: Regex::new(r"<b>End Time:</b>\s*(?:&nbsp;)?\s*([^<]+)")
                .expect("valid end-time pattern"),
        }
    }

    /// Extract a structured notification from one email.
    ///
    /// `declared_date` is the raw `Date:` header value when the fetcher
    /// preserved it; on absence or parse failure, `received_at` falls back
    /// to the current processing time.
    pub fn extract(
        &self,
        body: &str,
        subject: &str,
        declared_date: Option<&str>,
    ) -> ParsedNotification {
        let (received_at, declared_date_honored) = parse_declared_date(declared_date);

        let mut parsed = ParsedNotification {
            reference_number: String::new(),
            received_at,
            declared_date_honored,
            platform: Platform::Unknown,
            event_type: String::new(),
            status: NotificationStatus::Open,
            summary: String::new(),
            scheduled_date: String::new(),
            scheduled_time: String::new(),
            duration_text: String::new(),
            affected_services: String::new(),
            incident_start_time: None,
            incident_end_time: None,
            incident_duration_minutes: None,
        };

        self.extract_from_subject(subject, &mut parsed);
        self.extract_from_body(body, &mut parsed);

        if parsed.status == NotificationStatus::Resolved {
            self.extract_incident_window(body, &mut parsed);
        }

        parsed
    }

    fn extract_from_subject(&self, subject: &str, parsed: &mut ParsedNotification) {
        if subject.is_empty() {
            return;
        }

        if let Some(m) = self.reference.captures(subject) {
            parsed.reference_number = m[1].to_string();
        } else {
            log::debug!("no reference number in subject: {}", subject);
        }

        let lowered = subject.to_lowercase();
        parsed.status = if ["resolved", "completed", "restored"]
            .iter()
            .any(|kw| lowered.contains(kw))
        {
            NotificationStatus::Resolved
        } else if lowered.contains("open") {
            NotificationStatus::Open
        } else if lowered.contains("continuing") {
            NotificationStatus::Continuing
        } else {
            NotificationStatus::Open
        };

        parsed.platform = if subject.contains("IDP") {
            Platform::Idp
        } else if subject.contains("OGx") || subject.contains("OGX") {
            Platform::Ogx
        } else if subject.contains("OGWS") {
            Platform::Ogws
        } else {
            Platform::Unknown
        };
    }

    fn extract_from_body(&self, body: &str, parsed: &mut ParsedNotification) {
        for line in body.lines() {
            let line = line.trim();
            let lowered = line.to_lowercase();

            if lowered.starts_with("platform:") {
                // An explicit body line overrides a subject-derived platform.
                if let Some((_, value)) = line.split_once(':') {
                    parsed.platform = Platform::from_label(value);
                }
            } else if lowered.starts_with("event:") {
                if let Some((_, value)) = line.split_once(':') {
                    parsed.event_type = value.trim().to_string();
                }
            } else if lowered.starts_with("summary:") {
                // The narrative is everything after the first marker,
                // retained in full; truncation is a presentation concern.
                // The marker is located on the original text: lowercasing
                // can change UTF-8 byte widths, so an offset found in a
                // lowercased copy is not a valid slice point here.
                if let Some(m) = self.summary_marker.find(body) {
                    parsed.summary = body[m.end()..].trim().to_string();
                    self.extract_from_summary(&parsed.summary.clone(), parsed);
                }
            }
        }
    }

    fn extract_from_summary(&self, summary: &str, parsed: &mut ParsedNotification) {
        for pattern in &self.scheduled_dates {
            if let Some(m) = pattern.captures(summary) {
                parsed.scheduled_date = m[1].to_string();
                break;
            }
        }

        if let Some(m) = self.scheduled_time.captures(summary) {
            parsed.scheduled_time = m[1].to_string();
        }

        if let Some(m) = self.duration.captures(summary) {
            parsed.duration_text = format!("{} {}(s)", &m[1], &m[2]);
        }

        let lowered = summary.to_lowercase();
        let services: Vec<&str> = SERVICE_VOCABULARY
            .iter()
            .filter(|kw| lowered.contains(&kw.to_lowercase()))
            .copied()
            .collect();
        parsed.affected_services = services.join("; ");
    }

    /// Scan a resolved body for the HTML-tagged incident window.
    ///
    /// Only the literal `GMT` suffix is stripped before parsing; other zone
    /// tokens are left in place and will fail the parse, yielding an absent
    /// field. The duration is computed only when both ends parsed.
    fn extract_incident_window(&self, body: &str, parsed: &mut ParsedNotification) {
        let reference = if parsed.reference_number.is_empty() {
            "UNKNOWN".to_string()
        } else {
            parsed.reference_number.clone()
        };

        parsed.incident_start_time =
            match_incident_timestamp(&self.incident_start, body, &reference, "start");
        parsed.incident_end_time =
            match_incident_timestamp(&self.incident_end, body, &reference, "end");

        match (parsed.incident_start_time, parsed.incident_end_time) {
            (Some(start), Some(end)) => {
                let minutes = (end - start).num_minutes();
                parsed.incident_duration_minutes = Some(minutes as i32);
                log::info!("[{}] incident duration: {} minutes", reference, minutes);
            }
            (Some(_), None) | (None, Some(_)) => {
                log::warn!(
                    "[{}] incomplete incident times - start: {:?}, end: {:?}",
                    reference,
                    parsed.incident_start_time,
                    parsed.incident_end_time
                );
            }
            (None, None) => {}
        }
    }
}

fn match_incident_timestamp(
    pattern: &Regex,
    body: &str,
    reference: &str,
    which: &str,
) -> Option<NaiveDateTime> {
    let raw = match pattern.captures(body) {
        Some(m) => m[1].trim().to_string(),
        None => {
            log::debug!(
                "[{}] no incident {} time in resolved notification (older format)",
                reference,
                which
            );
            return None;
        }
    };

    let stripped = raw.replace(" GMT", "");
    match NaiveDateTime::parse_from_str(stripped.trim(), "%Y-%m-%d %H:%M") {
        Ok(ts) => Some(ts),
        Err(err) => {
            log::warn!(
                "[{}] failed to parse incident {} time '{}': {}",
                reference,
                which,
                raw,
                err
            );
            None
        }
    }
}

/// Parse a raw email `Date:` header (RFC 2822, e.g.
/// `"Tue, 29 Oct 2024 10:30:45 -0700"`), falling back to the current
/// processing time when absent or malformed.
fn parse_declared_date(declared: Option<&str>) -> (DateTime<Utc>, bool) {
    if let Some(raw) = declared {
        match dateparser::parse(raw) {
            Ok(ts) => return (ts.with_timezone(&Utc), true),
            Err(err) => {
                log::warn!("unparseable date header '{}', using current time: {}", raw, err);
            }
        }
    }
    (Utc::now(), false)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{NaiveDate, TimeZone};

    fn naive(y: i32, mo: u32, d: u32, h: u32, mi: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(y, mo, d)
            .unwrap()
            .and_hms_opt(h, mi, 0)
            .unwrap()
    }

    #[test]
    fn extracts_reference_number_from_subject() {
        let extractor = Extractor::new();
        let parsed = extractor.extract("", "Service Notification [S-003141] IDP - OPEN", None);
        assert_eq!(parsed.reference_number, "S-003141");
        assert_eq!(parsed.status, NotificationStatus::Open);
        assert_eq!(parsed.platform, Platform::Idp);
    }

    #[test]
    fn missing_reference_number_leaves_field_empty() {
        let extractor = Extractor::new();
        let parsed = extractor.extract("", "Service Notification - OPEN", None);
        assert_eq!(parsed.reference_number, "");
    }

    #[test]
    fn first_reference_match_wins() {
        let extractor = Extractor::new();
        let parsed = extractor.extract("", "[S-000001] supersedes [M-000002]", None);
        assert_eq!(parsed.reference_number, "S-000001");
    }

    #[test]
    fn resolved_keywords_take_priority() {
        let extractor = Extractor::new();
        for subject in [
            "[S-000010] IDP - RESOLVED",
            "[S-000010] Maintenance completed",
            "[S-000010] Service restored",
        ] {
            let parsed = extractor.extract("", subject, None);
            assert_eq!(parsed.status, NotificationStatus::Resolved, "{}", subject);
        }
    }

    #[test]
    fn continuing_keyword_detected() {
        let extractor = Extractor::new();
        let parsed = extractor.extract("", "[S-000010] OGx - CONTINUING", None);
        assert_eq!(parsed.status, NotificationStatus::Continuing);
    }

    #[test]
    fn status_defaults_to_open() {
        let extractor = Extractor::new();
        let parsed = extractor.extract("", "[S-000010] IDP degradation", None);
        assert_eq!(parsed.status, NotificationStatus::Open);
    }

    #[test]
    fn body_platform_line_overrides_subject() {
        let extractor = Extractor::new();
        let parsed = extractor.extract("Platform: OGx\nEvent: Maintenance", "[M-003147] IDP - OPEN", None);
        assert_eq!(parsed.platform, Platform::Ogx);
        assert_eq!(parsed.event_type, "Maintenance");
    }

    #[test]
    fn summary_fields_extracted_in_pattern_order() {
        let extractor = Extractor::new();
        let body = "Platform: IDP\n\
                    Event: Maintenance\n\
                    Summary: We will be conducting scheduled maintenance of the \
                    Partner-Support page and VAPP interface on November 5th at 15:00 UTC. \
                    The maintenance window is expected to last 1 hour.";
        let parsed = extractor.extract(body, "[M-003147] IDP - OPEN", None);

        assert_eq!(parsed.scheduled_time, "15:00 UTC");
        assert_eq!(parsed.duration_text, "1 hour(s)");
        assert_eq!(parsed.affected_services, "Partner-Support; VAPP");
        assert!(parsed.summary.starts_with("We will be conducting"));
    }

    #[test]
    fn summary_survives_width_changing_characters() {
        // U+0130 grows from two to three bytes under lowercasing; the
        // marker offset must come from the original text, not a
        // lowercased copy, or the slice lands mid-character.
        let extractor = Extractor::new();
        let parsed = extractor.extract("İ\nSummary:é", "[S-000001] IDP - OPEN", None);
        assert_eq!(parsed.summary, "é");

        let parsed = extractor.extract(
            "İstanbul region notice İİİ\nSummary: Gateway degradation in the İstanbul region.",
            "[S-000002] OGx - OPEN",
            None,
        );
        assert_eq!(
            parsed.summary,
            "Gateway degradation in the İstanbul region."
        );
        assert_eq!(parsed.affected_services, "Gateway");
    }

    #[test]
    fn affected_services_keep_vocabulary_order() {
        let extractor = Extractor::new();
        let body = "Summary: The modem fleet, the Portal, and the Gateway are affected.";
        let parsed = extractor.extract(body, "[S-000099] OGWS - OPEN", None);
        assert_eq!(parsed.affected_services, "Gateway; Portal; modem");
    }

    #[test]
    fn resolved_body_yields_incident_window() {
        let extractor = Extractor::new();
        let subject = "ORBCOMM Service Notification [S-003141] IDP - RESOLVED";
        let body = "<html><body>\
                    <p><b>Platform:</b>&nbsp;IDP</p>\
                    <p><b>Status:</b>&nbsp;Resolved</p>\
                    <p><b>Summary:</b> Service outage resolved</p>\
                    <p><b>Start Time:</b>&nbsp;2025-10-22 15:05 GMT</p>\
                    <p><b>End Time:</b>&nbsp;2025-10-23 00:37 GMT</p>\
                    </body></html>";

        let parsed = extractor.extract(body, subject, None);

        assert_eq!(parsed.reference_number, "S-003141");
        assert_eq!(parsed.status, NotificationStatus::Resolved);
        assert_eq!(parsed.platform, Platform::Idp);
        assert_eq!(parsed.incident_start_time, Some(naive(2025, 10, 22, 15, 5)));
        assert_eq!(parsed.incident_end_time, Some(naive(2025, 10, 23, 0, 37)));
        assert_eq!(parsed.incident_duration_minutes, Some(572));
    }

    #[test]
    fn incident_window_spans_multiple_days() {
        let extractor = Extractor::new();
        let body = "<b>Start Time:</b>&nbsp;2025-10-20 10:00 GMT\
                    <b>End Time:</b>&nbsp;2025-10-23 10:30 GMT";
        let parsed = extractor.extract(body, "[S-000050] IDP - RESOLVED", None);
        assert_eq!(parsed.incident_duration_minutes, Some(3 * 24 * 60 + 30));
    }

    #[test]
    fn open_status_skips_incident_window() {
        let extractor = Extractor::new();
        let body = "<b>Start Time:</b>&nbsp;2025-10-22 15:05 GMT\
                    <b>End Time:</b>&nbsp;2025-10-23 00:37 GMT";
        let parsed = extractor.extract(body, "[S-003100] IDP - OPEN", None);
        assert_eq!(parsed.incident_start_time, None);
        assert_eq!(parsed.incident_end_time, None);
        assert_eq!(parsed.incident_duration_minutes, None);
    }

    #[test]
    fn malformed_start_time_leaves_duration_absent() {
        let extractor = Extractor::new();
        let body = "<b>Start Time:</b>&nbsp;INVALID FORMAT\
                    <b>End Time:</b>&nbsp;2025-10-20 14:00 GMT";
        let parsed = extractor.extract(body, "[S-003200] IDP - RESOLVED", None);
        assert_eq!(parsed.incident_start_time, None);
        assert_eq!(parsed.incident_end_time, Some(naive(2025, 10, 20, 14, 0)));
        assert_eq!(parsed.incident_duration_minutes, None);
    }

    #[test]
    fn non_gmt_zone_tokens_are_not_stripped() {
        // Only the literal GMT suffix is removed before parsing; other zone
        // abbreviations fail the parse and the field stays absent.
        let extractor = Extractor::new();
        let body = "<b>Start Time:</b>&nbsp;2025-10-22 15:05 EST\
                    <b>End Time:</b>&nbsp;2025-10-23 00:37 GMT";
        let parsed = extractor.extract(body, "[S-003300] IDP - RESOLVED", None);
        assert_eq!(parsed.incident_start_time, None);
        assert_eq!(parsed.incident_end_time, Some(naive(2025, 10, 23, 0, 37)));
        assert_eq!(parsed.incident_duration_minutes, None);
    }

    #[test]
    fn incident_markers_without_nbsp_still_match() {
        let extractor = Extractor::new();
        let body = "<b>Start Time:</b> 2025-10-22 15:05 GMT\
                    <b>End Time:</b> 2025-10-22 16:05 GMT";
        let parsed = extractor.extract(body, "[S-003400] IDP - RESOLVED", None);
        assert_eq!(parsed.incident_duration_minutes, Some(60));
    }

    #[test]
    fn declared_date_header_is_honored() {
        let extractor = Extractor::new();
        let parsed = extractor.extract("", "[S-000001] IDP - OPEN", Some("Tue, 29 Oct 2024 10:30:45 -0700"));
        assert!(parsed.declared_date_honored);
        assert_eq!(
            parsed.received_at,
            Utc.with_ymd_and_hms(2024, 10, 29, 17, 30, 45).unwrap()
        );
    }

    #[test]
    fn malformed_declared_date_falls_back_to_now() {
        let extractor = Extractor::new();
        let before = Utc::now();
        let parsed = extractor.extract("", "[S-000001] IDP - OPEN", Some("not a date"));
        assert!(!parsed.declared_date_honored);
        assert!(parsed.received_at >= before);
    }

    #[test]
    fn empty_inputs_produce_default_record() {
        let extractor = Extractor::new();
        let parsed = extractor.extract("", "", None);
        assert_eq!(parsed.reference_number, "");
        assert_eq!(parsed.status, NotificationStatus::Open);
        assert_eq!(parsed.platform, Platform::Unknown);
        assert_eq!(parsed.summary, "");
        assert_eq!(parsed.affected_services, "");
        assert_eq!(parsed.incident_duration_minutes, None);
    }
}
