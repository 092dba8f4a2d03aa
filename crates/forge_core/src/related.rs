use chrono::Duration;

use crate::model::{Challenge, Habit};

pub const RELATED_WINDOW_DAYS: i64 = 30;

/// Best-effort guess whether a challenge belongs to a habit's history.
///
/// Matches on the provenance link, on the habit's name fragment appearing in the
/// challenge name, or on both being created within [`RELATED_WINDOW_DAYS`] of each other.
pub fn is_related_challenge(habit: &Habit, challenge: &Challenge) -> bool {
    if habit.original_challenge_id.as_ref() == Some(&challenge.id) {
        return true;
    }
    if let Some(fragment) = name_fragment(&habit.name) {
        if challenge.name.to_lowercase().contains(&fragment) {
            return true;
        }
    }
    let gap = challenge.created_at - habit.created_at;
    gap.num_seconds().abs() < Duration::days(RELATED_WINDOW_DAYS).num_seconds()
}

pub fn find_related_challenges<'a>(habit: &Habit, challenges: &'a [Challenge]) -> Vec<&'a Challenge> {
    challenges
        .iter()
        .filter(|challenge| is_related_challenge(habit, challenge))
        .collect()
}

/// Names are stored as "<icon> <words>", so the second word is usually the meaningful one.
fn name_fragment(name: &str) -> Option<String> {
    let lower = name.to_lowercase();
    let fragment = lower
        .split(' ')
        .nth(1)
        .filter(|word| !word.is_empty())
        .unwrap_or(lower.as_str())
        .trim();
    (!fragment.is_empty()).then(|| fragment.to_string())
}
