use serde::{Deserialize, Serialize};

use crate::grid::{ContributionGrid, GridCell};

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContributionStats {
    pub completion_rate: f64,
    pub current_streak: u32,
    pub longest_streak: u32,
    pub total_completed: u32,
}

impl ContributionStats {
    pub fn completion_percent(&self) -> u32 {
        (self.completion_rate * 100.0).round() as u32
    }
}

fn is_eligible(cell: &GridCell) -> bool {
    !cell.is_future && !cell.is_before_creation
}

/// Totals over the days of a grid that have already happened since the habit began.
pub fn compute_statistics(grid: &ContributionGrid) -> ContributionStats {
    let eligible: Vec<&GridCell> = grid.cells().filter(|cell| is_eligible(cell)).collect();

    let mut total_completed = 0u32;
    let mut longest_streak = 0u32;
    let mut run = 0u32;
    for cell in &eligible {
        if cell.completed {
            total_completed += 1;
            run += 1;
            longest_streak = longest_streak.max(run);
        } else {
            run = 0;
        }
    }

    let current_streak = eligible
        .iter()
        .rev()
        .take_while(|cell| cell.completed)
        .count() as u32;

    let completion_rate = if eligible.is_empty() {
        0.0
    } else {
        f64::from(total_completed) / eligible.len() as f64
    };

    ContributionStats {
        completion_rate,
        current_streak,
        longest_streak,
        total_completed,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dates::DateKey;
    use crate::grid::generate_contribution_grid;
    use crate::model::{EntityId, NewHabit};
    use chrono::{Duration, NaiveDate, TimeZone, Utc};

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn grid_for(days: &[NaiveDate], today: NaiveDate) -> ContributionGrid {
        let created = Utc.with_ymd_and_hms(2024, 1, 1, 6, 0, 0).unwrap();
        let mut habit = NewHabit::new("Walk", 3).into_habit(EntityId::new("h"), created);
        habit.completion_dates = days.iter().map(|day| DateKey::new(*day).into()).collect();
        let now = Utc.from_utc_datetime(&today.and_hms_opt(18, 0, 0).unwrap());
        generate_contribution_grid(&habit, &[], &now)
    }

    #[test]
    fn folds_only_elapsed_days_since_creation() {
        // Ten eligible days: Jan 1 through Jan 10.
        let days = [
            date(2024, 1, 1),
            date(2024, 1, 2),
            date(2024, 1, 3),
            date(2024, 1, 5),
            date(2024, 1, 9),
            date(2024, 1, 10),
        ];
        let stats = compute_statistics(&grid_for(&days, date(2024, 1, 10)));
        assert_eq!(stats.total_completed, 6);
        assert_eq!(stats.completion_percent(), 60);
        assert_eq!(stats.longest_streak, 3);
        assert_eq!(stats.current_streak, 2);
    }

    #[test]
    fn current_streak_is_zero_when_today_is_missed() {
        let days = [date(2024, 1, 8), date(2024, 1, 9)];
        let stats = compute_statistics(&grid_for(&days, date(2024, 1, 10)));
        assert_eq!(stats.current_streak, 0);
        assert_eq!(stats.longest_streak, 2);
    }

    #[test]
    fn future_completions_are_ignored() {
        let today = date(2024, 1, 4);
        let days: Vec<NaiveDate> = (0..10).map(|offset| date(2024, 1, 1) + Duration::days(offset)).collect();
        let stats = compute_statistics(&grid_for(&days, today));
        assert_eq!(stats.total_completed, 4);
        assert_eq!(stats.current_streak, 4);
        assert_eq!(stats.completion_percent(), 100);
    }

    #[test]
    fn empty_grid_has_zero_rate() {
        let grid = ContributionGrid {
            today: date(2024, 1, 1),
            weeks: Vec::new(),
        };
        assert_eq!(compute_statistics(&grid), ContributionStats::default());
    }
}
