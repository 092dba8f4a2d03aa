use std::collections::BTreeSet;

use chrono::{DateTime, NaiveDate, TimeZone};
use serde::{Deserialize, Serialize};

use crate::dates::Week;
use crate::model::{Challenge, Habit};

pub const MAX_WEEKS_WALKED: u32 = 104;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HabitProgress {
    pub completed: u32,
    pub current_streak: u32,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChallengeProgress {
    pub current_streak: u32,
    pub is_completed: bool,
}

pub fn weekly_count(days: &BTreeSet<NaiveDate>, week: Week, created: NaiveDate) -> u32 {
    let from = week.first_day().max(created);
    if from > week.last_day() {
        return 0;
    }
    days.range(from..=week.last_day()).count() as u32
}

/// The current week adds one only once it meets the goal; while short it neither extends
/// nor breaks the streak.
pub fn weekly_streak(
    days: &BTreeSet<NaiveDate>,
    weekly_goal: u32,
    created: NaiveDate,
    today: NaiveDate,
) -> u32 {
    let goal = weekly_goal.max(1);
    let current = Week::containing(today);
    let creation_week = Week::containing(created);

    let mut streak = u32::from(weekly_count(days, current, created) >= goal);
    let mut week = current.previous();
    for _ in 0..MAX_WEEKS_WALKED {
        if week < creation_week || weekly_count(days, week, created) < goal {
            break;
        }
        streak += 1;
        week = week.previous();
    }
    streak
}

/// Consecutive completed days ending at `today`. A missed today means zero.
pub fn daily_streak(days: &BTreeSet<NaiveDate>, created: NaiveDate, today: NaiveDate) -> u32 {
    let mut streak = 0;
    let mut day = today;
    while day >= created && days.contains(&day) {
        streak += 1;
        match day.pred_opt() {
            Some(previous) => day = previous,
            None => break,
        }
    }
    streak
}

pub fn longest_daily_run(days: &BTreeSet<NaiveDate>, created: NaiveDate, today: NaiveDate) -> u32 {
    if created > today {
        return 0;
    }
    let mut longest = 0;
    let mut run = 0;
    let mut previous: Option<NaiveDate> = None;
    for day in days.range(created..=today) {
        run = match previous {
            Some(prev) if prev.succ_opt() == Some(*day) => run + 1,
            _ => 1,
        };
        longest = longest.max(run);
        previous = Some(*day);
    }
    longest
}

/// True once `total_days` consecutive completed days exist, ending on or before `today`.
/// The number of completions alone never counts.
pub fn challenge_is_complete(
    days: &BTreeSet<NaiveDate>,
    total_days: u32,
    created: NaiveDate,
    today: NaiveDate,
) -> bool {
    longest_daily_run(days, created, today) >= total_days.max(1)
}

pub fn habit_progress<Tz: TimeZone>(habit: &Habit, now: &DateTime<Tz>) -> HabitProgress {
    let tz = now.timezone();
    let today = now.date_naive();
    let created = habit.created_on(&tz);
    let days = habit.completion_days(&tz);
    HabitProgress {
        completed: weekly_count(&days, Week::containing(today), created),
        current_streak: weekly_streak(&days, habit.weekly_goal, created, today),
    }
}

pub fn challenge_progress<Tz: TimeZone>(challenge: &Challenge, now: &DateTime<Tz>) -> ChallengeProgress {
    let tz = now.timezone();
    let today = now.date_naive();
    let created = challenge.created_on(&tz);
    let days = challenge.completion_days(&tz);
    ChallengeProgress {
        current_streak: daily_streak(&days, created, today),
        is_completed: challenge_is_complete(&days, challenge.total_days, created, today),
    }
}

impl Habit {
    pub fn apply_progress(&mut self, progress: HabitProgress) {
        self.completed = progress.completed;
        self.current_streak = progress.current_streak;
    }
}

impl Challenge {
    /// Completion is terminal: once set it stays set.
    pub fn apply_progress(&mut self, progress: ChallengeProgress) {
        self.current_streak = progress.current_streak;
        self.is_completed = self.is_completed || progress.is_completed;
        if self.is_completed {
            self.is_active = false;
        }
    }
}
