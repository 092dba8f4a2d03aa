use std::collections::BTreeSet;

use chrono::{DateTime, Duration, NaiveDate, NaiveDateTime, TimeZone, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

use crate::dates::{local_midnight, DateKey};

/// One stored completion. Older documents carry epoch-seconds timestamps or free-form
/// date strings instead of date keys; anything unrecognised is kept verbatim so a single
/// bad record never prevents an entity from loading.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum CompletionRecord {
    Day(DateKey),
    Timestamp {
        #[serde(alias = "_seconds")]
        seconds: i64,
        #[serde(default, alias = "_nanoseconds")]
        nanoseconds: u32,
    },
    EpochMillis(i64),
    Text(String),
    Opaque(Value),
}

impl CompletionRecord {
    pub fn instant<Tz: TimeZone>(&self, tz: &Tz) -> Option<DateTime<Tz>> {
        match self {
            Self::Day(key) => Some(local_midnight(tz, key.date())),
            Self::Timestamp {
                seconds,
                nanoseconds,
            } => DateTime::from_timestamp(*seconds, *nanoseconds)
                .map(|utc| utc.with_timezone(tz)),
            Self::EpochMillis(millis) => {
                DateTime::from_timestamp_millis(*millis).map(|utc| utc.with_timezone(tz))
            }
            Self::Text(raw) => parse_text(raw, tz),
            Self::Opaque(_) => None,
        }
    }

    /// Local calendar day of the record. Date keys are taken as-is, without a timezone shift.
    pub fn local_day<Tz: TimeZone>(&self, tz: &Tz) -> Option<NaiveDate> {
        match self {
            Self::Day(key) => Some(key.date()),
            _ => self.instant(tz).map(|instant| instant.date_naive()),
        }
    }

    pub fn is_day(&self, key: DateKey) -> bool {
        matches!(self, Self::Day(existing) if *existing == key)
    }
}

impl From<DateKey> for CompletionRecord {
    fn from(key: DateKey) -> Self {
        Self::Day(key)
    }
}

pub fn parse_completion_record<Tz: TimeZone>(
    record: &CompletionRecord,
    tz: &Tz,
) -> Option<DateTime<Tz>> {
    record.instant(tz)
}

fn parse_text<Tz: TimeZone>(raw: &str, tz: &Tz) -> Option<DateTime<Tz>> {
    let trimmed = raw.trim();
    if let Ok(key) = trimmed.parse::<DateKey>() {
        return Some(local_midnight(tz, key.date()));
    }
    if let Ok(parsed) = DateTime::parse_from_rfc3339(trimmed) {
        return Some(parsed.with_timezone(tz));
    }
    NaiveDateTime::parse_from_str(trimmed, "%Y-%m-%dT%H:%M:%S%.f")
        .ok()
        .and_then(|naive| tz.from_local_datetime(&naive).earliest())
}

pub fn completion_days<'a, Tz: TimeZone>(
    records: impl IntoIterator<Item = &'a CompletionRecord>,
    tz: &Tz,
) -> BTreeSet<NaiveDate> {
    let mut days = BTreeSet::new();
    for record in records {
        match record.local_day(tz) {
            Some(day) => {
                days.insert(day);
            }
            None => tracing::debug!(?record, "skipping unparseable completion record"),
        }
    }
    days
}

pub fn contains_day<'a, Tz: TimeZone>(
    records: impl IntoIterator<Item = &'a CompletionRecord>,
    tz: &Tz,
    day: NaiveDate,
) -> bool {
    records
        .into_iter()
        .any(|record| record.local_day(tz) == Some(day))
}

/// Creation time for documents whose timestamp is missing or unreadable: one year ago.
pub fn fallback_created_at() -> DateTime<Utc> {
    Utc::now() - Duration::days(365)
}

pub(crate) fn deserialize_created_at<'de, D>(deserializer: D) -> Result<DateTime<Utc>, D::Error>
where
    D: Deserializer<'de>,
{
    let record = CompletionRecord::deserialize(deserializer)?;
    Ok(record.instant(&Utc).unwrap_or_else(|| {
        tracing::debug!(?record, "unreadable creation time, assuming one year ago");
        fallback_created_at()
    }))
}
