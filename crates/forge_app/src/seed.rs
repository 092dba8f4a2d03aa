use chrono::{DateTime, Duration, TimeZone, Utc};

use forge_core::dates::{local_midnight, DateKey, Week};
use forge_core::model::DEFAULT_WEEKLY_GOAL;
use forge_core::NewHabit;

pub const HISTORY_WEEKS: i64 = 42;

/// Day offsets from Sunday. Every pattern meets the default weekly goal.
const WEEK_PATTERNS: [&[i64]; 3] = [&[1, 3, 5], &[0, 2, 4, 6], &[1, 2, 3, 5, 6]];

/// History ends the Saturday before `now`, so the streak is exactly [`HISTORY_WEEKS`].
pub fn exercise_habit<Tz: TimeZone>(now: &DateTime<Tz>) -> NewHabit {
    let tz = now.timezone();
    let current = Week::containing(now.date_naive());
    let start = current.first_day() - Duration::weeks(HISTORY_WEEKS);

    let mut habit = NewHabit::new("💪 Exercise", DEFAULT_WEEKLY_GOAL)
        .with_icon("💪")
        .with_category("Health & Fitness")
        .with_color("emerald");
    let mut week = Week::containing(start);
    for index in 0..HISTORY_WEEKS {
        let pattern = WEEK_PATTERNS[index as usize % WEEK_PATTERNS.len()];
        for offset in pattern {
            let day = week.first_day() + Duration::days(*offset);
            habit.completion_dates.push(DateKey::new(day).into());
        }
        week = week.next();
    }
    habit.created_at = Some(local_midnight(&tz, start).with_timezone(&Utc));
    habit
}
