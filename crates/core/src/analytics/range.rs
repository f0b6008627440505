use chrono::{DateTime, Duration, NaiveDate, NaiveTime, Utc};
use serde::{Deserialize, Serialize};

use crate::analytics::start_of_day;
use crate::format::format_date;

/// Query bounds; `None` means open-ended.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeRange {
    pub start: Option<DateTime<Utc>>,
    pub end: Option<DateTime<Utc>>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RangePreset {
    Last7Days,
    Last30Days,
    Last90Days,
    Last365Days,
    AllTime,
}

impl RangePreset {
    pub const ALL: [RangePreset; 5] =
        [Self::Last7Days, Self::Last30Days, Self::Last90Days, Self::Last365Days, Self::AllTime];

    pub fn key(&self) -> &'static str {
        match self {
            Self::Last7Days => "last_7_days",
            Self::Last30Days => "last_30_days",
            Self::Last90Days => "last_90_days",
            Self::Last365Days => "last_365_days",
            Self::AllTime => "all_time",
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Self::Last7Days => "Last 7 Days",
            Self::Last30Days => "Last 30 Days",
            Self::Last90Days => "Last 90 Days",
            Self::Last365Days => "Last 365 Days",
            Self::AllTime => "All Time",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|preset| preset.key() == raw.trim())
    }

    /// The window ending today: today plus the preceding `n - 1` days, from midnight.
    pub fn range(&self, now: DateTime<Utc>) -> TimeRange {
        let days_back = match self {
            Self::Last7Days => 6,
            Self::Last30Days => 29,
            Self::Last90Days => 89,
            Self::Last365Days => 364,
            Self::AllTime => return TimeRange::default(),
        };

        TimeRange { start: Some(start_of_day(now - Duration::days(days_back))), end: None }
    }

    pub fn option(&self, now: DateTime<Utc>) -> RangeOption {
        RangeOption { label: self.label().to_string(), range: self.range(now) }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RangeOption {
    pub label: String,
    pub range: TimeRange,
}

/// Resolves a chart's query parameters. A preset key wins; without one both
/// `from` and `to` must parse. Returns `None` for anything unusable.
pub fn range_option(
    preset: Option<&str>,
    from: Option<&str>,
    to: Option<&str>,
    now: DateTime<Utc>,
) -> Option<RangeOption> {
    if let Some(preset) = preset {
        return RangePreset::parse(preset).map(|preset| preset.option(now));
    }

    let start = parse_timestamp(from?)?;
    let end = parse_timestamp(to?)?;

    Some(RangeOption {
        label: format!("{} - {}", format_date(start.date_naive()), format_date(end.date_naive())),
        range: TimeRange { start: Some(start), end: Some(end) },
    })
}

/// Like [`range_option`], falling back to `default` instead of failing.
pub fn range_option_or(
    preset: Option<&str>,
    from: Option<&str>,
    to: Option<&str>,
    default: RangePreset,
    now: DateTime<Utc>,
) -> RangeOption {
    range_option(preset, from, to, now).unwrap_or_else(|| default.option(now))
}

/// Accepts RFC 3339 timestamps and bare `YYYY-MM-DD` dates (midnight UTC).
pub fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    let raw = raw.trim();
    if raw.is_empty() {
        return None;
    }

    if let Ok(parsed) = DateTime::parse_from_rfc3339(raw) {
        return Some(parsed.with_timezone(&Utc));
    }

    NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .ok()
        .map(|date| date.and_time(NaiveTime::MIN).and_utc())
}

#[cfg(test)]
mod tests {
    use chrono::{TimeZone, Utc};

    use super::{parse_timestamp, range_option, range_option_or, RangePreset, TimeRange};

    #[test]
    fn presets_start_at_midnight_and_stay_open_ended() {
        let now = Utc.with_ymd_and_hms(2026, 10, 16, 15, 30, 0).unwrap();

        let last_7 = RangePreset::Last7Days.range(now);
        assert_eq!(last_7.start, Some(Utc.with_ymd_and_hms(2026, 10, 10, 0, 0, 0).unwrap()));
        assert_eq!(last_7.end, None);

        let last_365 = RangePreset::Last365Days.range(now);
        assert_eq!(last_365.start, Some(Utc.with_ymd_and_hms(2025, 10, 17, 0, 0, 0).unwrap()));

        assert_eq!(RangePreset::AllTime.range(now), TimeRange::default());
    }

    #[test]
    fn preset_keys_round_trip() {
        for preset in RangePreset::ALL {
            assert_eq!(RangePreset::parse(preset.key()), Some(preset));
        }
        assert_eq!(RangePreset::parse("last_week"), None);
    }

    #[test]
    fn explicit_dates_produce_labelled_range() {
        let now = Utc::now();
        let option = range_option(None, Some("2026-01-05T00:00:00Z"), Some("2026-02-01"), now)
            .expect("valid explicit range");

        assert_eq!(option.label, "Jan 5, 2026 - Feb 1, 2026");
        assert_eq!(option.range.start, Some(Utc.with_ymd_and_hms(2026, 1, 5, 0, 0, 0).unwrap()));
        assert_eq!(option.range.end, Some(Utc.with_ymd_and_hms(2026, 2, 1, 0, 0, 0).unwrap()));
    }

    #[test]
    fn unparseable_dates_fall_back_to_default_preset() {
        let now = Utc.with_ymd_and_hms(2026, 10, 16, 9, 0, 0).unwrap();

        assert_eq!(range_option(None, Some("not-a-date"), Some("2026-02-01"), now), None);
        assert_eq!(range_option(None, Some("2026-01-01"), None, now), None);

        let fallback =
            range_option_or(None, Some("garbage"), Some("junk"), RangePreset::Last7Days, now);
        assert_eq!(fallback.label, "Last 7 Days");
        assert_eq!(fallback.range, RangePreset::Last7Days.range(now));

        let unknown = range_option_or(Some("forever"), None, None, RangePreset::AllTime, now);
        assert_eq!(unknown.label, "All Time");
    }

    #[test]
    fn preset_key_wins_over_explicit_dates() {
        let now = Utc::now();
        let option = range_option(Some("last_30_days"), Some("2020-01-01"), Some("2020-02-01"), now)
            .expect("preset");
        assert_eq!(option.label, "Last 30 Days");
    }

    #[test]
    fn parses_offsets_into_utc() {
        let parsed = parse_timestamp("2026-03-01T10:00:00+02:00").expect("rfc3339");
        assert_eq!(parsed, Utc.with_ymd_and_hms(2026, 3, 1, 8, 0, 0).unwrap());
        assert_eq!(parse_timestamp("   "), None);
    }
}
