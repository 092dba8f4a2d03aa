pub mod dates;
pub mod grid;
pub mod migrate;
pub mod model;
pub mod records;
pub mod related;
pub mod stats;
pub mod streak;
pub mod summary;

pub use crate::dates::{local_date_key, week_bounds, DateKey, Week, WeekBounds};
pub use crate::grid::{generate_contribution_grid, ContributionGrid, GridCell, GridWeek};
pub use crate::model::{
    Challenge, EntityId, EntityKey, EntityKind, Habit, NewChallenge, NewHabit, ValidationError,
};
pub use crate::records::{parse_completion_record, CompletionRecord};
pub use crate::related::find_related_challenges;
pub use crate::stats::{compute_statistics, ContributionStats};
pub use crate::streak::{challenge_progress, habit_progress, ChallengeProgress, HabitProgress};
pub use crate::summary::{summarize, DashboardSummary};
