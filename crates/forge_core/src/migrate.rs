use chrono::{Duration, TimeZone};

use crate::dates::DateKey;
use crate::model::Challenge;

/// Returns whether anything changed. Completion dates are synthesized as consecutive
/// days from the creation date, one per entry in `days_completed`.
pub fn migrate_challenge<Tz: TimeZone>(challenge: &mut Challenge, tz: &Tz) -> bool {
    let mut changed = false;

    if challenge.completion_dates.is_empty() && !challenge.days_completed.is_empty() {
        let start = challenge.created_on(tz);
        challenge.completion_dates = (0..challenge.days_completed.len())
            .map(|offset| DateKey::new(start + Duration::days(offset as i64)).into())
            .collect();
        tracing::debug!(
            challenge = %challenge.id,
            days = challenge.completion_dates.len(),
            "synthesized completion dates from legacy day counter"
        );
        changed = true;
    }

    if !challenge.is_completed {
        if let Some(current_day) = challenge.current_day {
            if current_day > challenge.total_days {
                challenge.is_completed = true;
                challenge.is_active = false;
                changed = true;
            }
        }
    }

    changed
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::records::CompletionRecord;
    use chrono::{NaiveDate, Utc};
    use serde_json::json;

    fn legacy(current_day: u32, days: &[u32]) -> Challenge {
        serde_json::from_value(json!({
            "id": "c1",
            "name": "Cold Shower",
            "totalDays": 21,
            "createdAt": { "seconds": 1704096000, "nanoseconds": 0 },
            "currentDay": current_day,
            "daysCompleted": days,
        }))
        .expect("legacy challenge")
    }

    #[test]
    fn synthesizes_consecutive_dates_from_creation() {
        let mut challenge = legacy(4, &[1, 2, 3]);
        assert!(migrate_challenge(&mut challenge, &Utc));
        let start = NaiveDate::from_ymd_opt(2024, 1, 1).unwrap();
        let expected: Vec<CompletionRecord> = (0..3)
            .map(|offset| DateKey::new(start + Duration::days(offset)).into())
            .collect();
        assert_eq!(challenge.completion_dates, expected);
        assert!(!challenge.is_completed);
    }

    #[test]
    fn derives_completion_from_day_counter() {
        let days: Vec<u32> = (1..=21).collect();
        let mut challenge = legacy(22, &days);
        assert!(migrate_challenge(&mut challenge, &Utc));
        assert!(challenge.is_completed);
        assert!(!challenge.is_active);
    }

    #[test]
    fn migration_is_idempotent() {
        let mut challenge = legacy(22, &[1, 2]);
        migrate_challenge(&mut challenge, &Utc);
        let once = challenge.clone();
        assert!(!migrate_challenge(&mut challenge, &Utc));
        assert_eq!(challenge, once);
    }
}
