use std::collections::BTreeSet;

use chrono::{DateTime, NaiveDate, TimeZone};
use serde::{Deserialize, Serialize};

use crate::dates::{one_year_after, Week};
use crate::model::{Challenge, Habit, DEFAULT_WEEKLY_GOAL};

pub const MAX_GRID_WEEKS: usize = 104;
pub const MAX_INTENSITY: u8 = 4;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GridCell {
    pub date: NaiveDate,
    pub completed: bool,
    pub intensity: u8,
    pub is_today: bool,
    pub is_future: bool,
    pub is_before_creation: bool,
    pub is_challenge_day: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GridWeek {
    pub start: NaiveDate,
    pub days: Vec<GridCell>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContributionGrid {
    pub today: NaiveDate,
    pub weeks: Vec<GridWeek>,
}

impl ContributionGrid {
    pub fn cells(&self) -> impl Iterator<Item = &GridCell> {
        self.weeks.iter().flat_map(|week| week.days.iter())
    }

    pub fn cell(&self, date: NaiveDate) -> Option<&GridCell> {
        self.cells().find(|cell| cell.date == date)
    }

    pub fn first_day(&self) -> Option<NaiveDate> {
        self.weeks.first().map(|week| week.start)
    }

    pub fn last_day(&self) -> Option<NaiveDate> {
        self.weeks
            .last()
            .and_then(|week| week.days.last())
            .map(|cell| cell.date)
    }
}

/// Days completed by one of `related` challenges are always drawn at full intensity.
pub fn generate_contribution_grid<Tz: TimeZone>(
    habit: &Habit,
    related: &[&Challenge],
    now: &DateTime<Tz>,
) -> ContributionGrid {
    let tz = now.timezone();
    let today = now.date_naive();
    let created = habit.created_on(&tz);
    let goal = if habit.weekly_goal == 0 {
        DEFAULT_WEEKLY_GOAL
    } else {
        habit.weekly_goal
    };

    let challenge_days: BTreeSet<NaiveDate> = related
        .iter()
        .flat_map(|challenge| challenge.completion_days(&tz))
        .collect();
    let mut merged = habit.completion_days(&tz);
    merged.extend(challenge_days.iter().copied());

    let end = one_year_after(today);
    let mut start = Week::containing(created);
    // Inclusive of `end` itself.
    let span_days = (end - start.first_day()).num_days().max(0) + 1;
    let mut week_count = usize::try_from((span_days + 6) / 7).unwrap_or(MAX_GRID_WEEKS);
    if week_count > MAX_GRID_WEEKS {
        for _ in 0..(week_count - MAX_GRID_WEEKS) {
            start = start.next();
        }
        week_count = MAX_GRID_WEEKS;
    }

    let mut weeks = Vec::with_capacity(week_count);
    let mut week = start;
    for _ in 0..week_count {
        let week_completions = merged
            .range(week.first_day()..=week.last_day())
            .count();
        let days = week
            .days()
            .map(|date| {
                let is_before_creation = date < created;
                let completed = !is_before_creation && merged.contains(&date);
                let is_challenge_day = completed && challenge_days.contains(&date);
                let intensity = if !completed {
                    0
                } else if is_challenge_day {
                    MAX_INTENSITY
                } else {
                    intensity_for(week_completions, goal)
                };
                GridCell {
                    date,
                    completed,
                    intensity,
                    is_today: date == today,
                    is_future: date > today,
                    is_before_creation,
                    is_challenge_day,
                }
            })
            .collect();
        weeks.push(GridWeek {
            start: week.first_day(),
            days,
        });
        week = week.next();
    }

    ContributionGrid { today, weeks }
}

fn intensity_for(week_completions: usize, goal: u32) -> u8 {
    let ratio = (week_completions as f64 / f64::from(goal)).min(1.0);
    ((ratio * f64::from(MAX_INTENSITY)).ceil() as u8).max(1)
}
