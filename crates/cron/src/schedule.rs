//! Cron expression parsing and next-occurrence computation.

use {
    anyhow::Result,
    chrono::{DateTime, Utc},
    chrono_tz::Tz,
    cron::Schedule,
    tracing::warn,
};

/// Timezone applied when a skill's schedule names none.
pub const FALLBACK_TZ: Tz = chrono_tz::Asia::Seoul;

/// Parse a cron expression, accepting both the 5-field form people write
/// (min hour dom month dow) and the 7-field form the `cron` crate requires
/// (sec min hour dom month dow year).
pub fn parse_cron(expr: &str) -> Result<Schedule> {
    expr.parse()
        .or_else(|_| {
            let padded = format!("0 {expr} *");
            padded.parse::<Schedule>()
        })
        .map_err(|e| anyhow::anyhow!("invalid cron expression '{expr}': {e}"))
}

/// Resolve a configured timezone name, warning and falling back on an
/// unknown one. Used for the host-wide default; a skill naming an unknown
/// timezone is rejected at registration instead.
pub fn resolve_tz(name: Option<&str>, fallback: Tz) -> Tz {
    match name {
        None => fallback,
        Some(tz_name) => tz_name.parse().unwrap_or_else(|_| {
            warn!(tz = tz_name, fallback = %fallback, "unknown timezone, using fallback");
            fallback
        }),
    }
}

/// Next occurrence strictly after `after`, evaluated in the given timezone.
pub fn next_occurrence(schedule: &Schedule, tz: Tz, after: DateTime<Utc>) -> Option<DateTime<Utc>> {
    schedule
        .after(&after.with_timezone(&tz))
        .next()
        .map(|dt| dt.with_timezone(&Utc))
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use {super::*, chrono::TimeZone};

    #[test]
    fn five_field_expressions_are_padded() {
        assert!(parse_cron("0 9 * * 1-5").is_ok());
        assert!(parse_cron("30 8 1 * *").is_ok());
    }

    #[test]
    fn seven_field_expressions_parse_directly() {
        assert!(parse_cron("0 0 9 * * * *").is_ok());
    }

    #[test]
    fn garbage_is_rejected() {
        assert!(parse_cron("not a schedule").is_err());
        assert!(parse_cron("").is_err());
    }

    #[test]
    fn unknown_tz_falls_back() {
        assert_eq!(resolve_tz(Some("Mars/Olympus"), FALLBACK_TZ), FALLBACK_TZ);
        assert_eq!(
            resolve_tz(Some("Europe/Paris"), FALLBACK_TZ),
            chrono_tz::Europe::Paris
        );
        assert_eq!(resolve_tz(None, FALLBACK_TZ), FALLBACK_TZ);
    }

    #[test]
    fn next_occurrence_respects_timezone() {
        let schedule = parse_cron("0 9 * * *").unwrap();
        let after = Utc.with_ymd_and_hms(2024, 2, 1, 0, 0, 0).unwrap();

        // 9:00 Paris = 08:00 UTC in winter.
        let paris = next_occurrence(&schedule, chrono_tz::Europe::Paris, after).unwrap();
        assert_eq!(paris.format("%H:%M").to_string(), "08:00");

        // 9:00 Seoul = 00:00 UTC.
        let seoul = next_occurrence(&schedule, FALLBACK_TZ, after).unwrap();
        assert_eq!(seoul.format("%H:%M").to_string(), "00:00");
    }
}
