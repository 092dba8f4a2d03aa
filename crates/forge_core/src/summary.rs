use serde::{Deserialize, Serialize};

use crate::model::{Challenge, Habit};

/// Share of this week's goal already done, capped at 100.
pub fn habit_progress_percent(habit: &Habit) -> f64 {
    if habit.weekly_goal == 0 {
        return 0.0;
    }
    (f64::from(habit.completed) / f64::from(habit.weekly_goal) * 100.0).min(100.0)
}

pub fn challenge_progress_percent(challenge: &Challenge) -> f64 {
    if challenge.total_days == 0 {
        return 0.0;
    }
    (f64::from(challenge.current_streak) / f64::from(challenge.total_days) * 100.0).min(100.0)
}

pub fn is_challenge_finished(challenge: &Challenge) -> bool {
    challenge.is_completed || challenge.current_streak >= challenge.total_days.max(1)
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DashboardSummary {
    pub habit_count: usize,
    pub total_habit_streaks: u32,
    pub weekly_completed: u32,
    pub weekly_goal_total: u32,
    pub average_habit_progress: u32,
    pub active_challenges: usize,
    pub completed_challenges: usize,
    pub average_challenge_progress: u32,
    pub total_challenge_days: u32,
}

/// Archived challenges are left out entirely.
pub fn summarize(habits: &[Habit], challenges: &[Challenge]) -> DashboardSummary {
    let visible: Vec<&Challenge> = challenges.iter().filter(|c| !c.is_archived).collect();
    let active: Vec<&Challenge> = visible.iter().copied().filter(|c| c.is_active).collect();

    let average_habit_progress = rounded_mean(habits.iter().map(habit_progress_percent));
    let average_challenge_progress =
        rounded_mean(active.iter().map(|c| challenge_progress_percent(c)));

    DashboardSummary {
        habit_count: habits.len(),
        total_habit_streaks: habits.iter().map(|h| h.current_streak).sum(),
        weekly_completed: habits.iter().map(|h| h.completed).sum(),
        weekly_goal_total: habits.iter().map(|h| h.weekly_goal).sum(),
        average_habit_progress,
        active_challenges: active.len(),
        completed_challenges: visible.iter().filter(|c| is_challenge_finished(c)).count(),
        average_challenge_progress,
        total_challenge_days: active.iter().map(|c| c.current_streak).sum(),
    }
}

fn rounded_mean(values: impl Iterator<Item = f64>) -> u32 {
    let (sum, count) = values.fold((0.0, 0u32), |(sum, count), v| (sum + v, count + 1));
    if count == 0 {
        0
    } else {
        (sum / f64::from(count)).round() as u32
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DayState {
    Completed,
    Current,
    Upcoming,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DayBoardCell {
    pub day: u32,
    pub state: DayState,
}

pub fn challenge_day_board(challenge: &Challenge) -> Vec<DayBoardCell> {
    let streak = challenge.current_streak;
    let total = challenge.total_days;
    (1..=total)
        .map(|day| {
            let state = if day <= streak {
                DayState::Completed
            } else if day == streak + 1 && streak < total {
                DayState::Current
            } else {
                DayState::Upcoming
            };
            DayBoardCell { day, state }
        })
        .collect()
}
