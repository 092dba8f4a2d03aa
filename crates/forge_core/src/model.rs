use std::collections::BTreeSet;
use std::fmt;

use chrono::{DateTime, NaiveDate, TimeZone, Utc};
use serde::{Deserialize, Serialize};

use crate::records::{
    completion_days, deserialize_created_at, fallback_created_at, CompletionRecord,
};

pub const DEFAULT_WEEKLY_GOAL: u32 = 3;
pub const DEFAULT_CHALLENGE_DAYS: u32 = 21;
pub const CONVERTED_WEEKLY_GOAL: u32 = 7;
pub const CONVERTED_CATEGORY: &str = "Health & Fitness";
pub const CONVERTED_COLOR: &str = "purple";

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EntityId(String);

impl EntityId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for EntityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for EntityId {
    fn from(id: &str) -> Self {
        Self::new(id)
    }
}

impl From<String> for EntityId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntityKind {
    Habit,
    Challenge,
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Habit => f.write_str("habit"),
            Self::Challenge => f.write_str("challenge"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct EntityKey {
    pub kind: EntityKind,
    pub id: EntityId,
}

impl EntityKey {
    pub fn habit(id: EntityId) -> Self {
        Self {
            kind: EntityKind::Habit,
            id,
        }
    }

    pub fn challenge(id: EntityId) -> Self {
        Self {
            kind: EntityKind::Challenge,
            id,
        }
    }
}

impl fmt::Display for EntityKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} `{}`", self.kind, self.id)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ValidationError {
    #[error("name must not be empty")]
    EmptyName,
    #[error("weekly goal must be at least 1, got {0}")]
    WeeklyGoal(u32),
    #[error("challenge length must be at least 1 day, got {0}")]
    TotalDays(u32),
    #[error("challenge `{0}` is no longer active")]
    ChallengeClosed(EntityId),
}

fn default_weekly_goal() -> u32 {
    DEFAULT_WEEKLY_GOAL
}

fn default_challenge_days() -> u32 {
    DEFAULT_CHALLENGE_DAYS
}

fn default_true() -> bool {
    true
}

fn or_default(value: &str, fallback: &str) -> String {
    if value.trim().is_empty() {
        fallback.to_string()
    } else {
        value.to_string()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Habit {
    pub id: EntityId,
    pub name: String,
    #[serde(default)]
    pub icon: String,
    #[serde(default)]
    pub category: String,
    #[serde(default)]
    pub color: String,
    #[serde(default = "default_weekly_goal")]
    pub weekly_goal: u32,
    #[serde(default)]
    pub completion_dates: Vec<CompletionRecord>,
    #[serde(default)]
    pub completed: u32,
    #[serde(default)]
    pub current_streak: u32,
    #[serde(default = "fallback_created_at", deserialize_with = "deserialize_created_at")]
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub converted_from_challenge: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub original_challenge_id: Option<EntityId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_completed_at: Option<DateTime<Utc>>,
}

impl Habit {
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.weekly_goal == 0 {
            return Err(ValidationError::WeeklyGoal(self.weekly_goal));
        }
        Ok(())
    }

    pub fn created_on<Tz: TimeZone>(&self, tz: &Tz) -> NaiveDate {
        self.created_at.with_timezone(tz).date_naive()
    }

    pub fn completion_days<Tz: TimeZone>(&self, tz: &Tz) -> BTreeSet<NaiveDate> {
        completion_days(&self.completion_dates, tz)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Challenge {
    pub id: EntityId,
    pub name: String,
    #[serde(default)]
    pub icon: String,
    #[serde(default)]
    pub category: String,
    #[serde(default)]
    pub color: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub reward: String,
    #[serde(default = "default_challenge_days")]
    pub total_days: u32,
    #[serde(default)]
    pub completion_dates: Vec<CompletionRecord>,
    #[serde(default)]
    pub current_streak: u32,
    #[serde(default = "default_true")]
    pub is_active: bool,
    #[serde(default)]
    pub is_completed: bool,
    #[serde(default)]
    pub is_archived: bool,
    #[serde(default = "fallback_created_at", deserialize_with = "deserialize_created_at")]
    pub created_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_completed_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub archived_at: Option<DateTime<Utc>>,
    /// Day counter from documents written before completion dates were tracked.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub current_day: Option<u32>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub days_completed: Vec<u32>,
}

impl Challenge {
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.total_days == 0 {
            return Err(ValidationError::TotalDays(self.total_days));
        }
        Ok(())
    }

    pub fn is_open(&self) -> bool {
        !self.is_archived && !self.is_completed
    }

    pub fn created_on<Tz: TimeZone>(&self, tz: &Tz) -> NaiveDate {
        self.created_at.with_timezone(tz).date_naive()
    }

    pub fn completion_days<Tz: TimeZone>(&self, tz: &Tz) -> BTreeSet<NaiveDate> {
        completion_days(&self.completion_dates, tz)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewHabit {
    pub name: String,
    #[serde(default)]
    pub icon: String,
    #[serde(default)]
    pub category: String,
    #[serde(default)]
    pub color: String,
    pub weekly_goal: u32,
    #[serde(default)]
    pub completion_dates: Vec<CompletionRecord>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub converted_from_challenge: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub original_challenge_id: Option<EntityId>,
}

impl NewHabit {
    pub fn new(name: impl Into<String>, weekly_goal: u32) -> Self {
        Self {
            name: name.into(),
            icon: String::new(),
            category: String::new(),
            color: String::new(),
            weekly_goal,
            completion_dates: Vec::new(),
            created_at: None,
            converted_from_challenge: false,
            original_challenge_id: None,
        }
    }

    pub fn with_icon(mut self, icon: impl Into<String>) -> Self {
        self.icon = icon.into();
        self
    }

    pub fn with_category(mut self, category: impl Into<String>) -> Self {
        self.category = category.into();
        self
    }

    pub fn with_color(mut self, color: impl Into<String>) -> Self {
        self.color = color.into();
        self
    }

    pub fn from_challenge(challenge: &Challenge, weekly_goal: u32) -> Self {
        Self {
            name: challenge.name.clone(),
            icon: challenge.icon.clone(),
            category: or_default(&challenge.category, CONVERTED_CATEGORY),
            color: or_default(&challenge.color, CONVERTED_COLOR),
            weekly_goal,
            completion_dates: challenge.completion_dates.clone(),
            created_at: Some(challenge.created_at),
            converted_from_challenge: true,
            original_challenge_id: Some(challenge.id.clone()),
        }
    }

    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.name.trim().is_empty() {
            return Err(ValidationError::EmptyName);
        }
        if self.weekly_goal == 0 {
            return Err(ValidationError::WeeklyGoal(self.weekly_goal));
        }
        Ok(())
    }

    pub fn into_habit(self, id: EntityId, fallback_created_at: DateTime<Utc>) -> Habit {
        Habit {
            id,
            name: self.name,
            icon: self.icon,
            category: self.category,
            color: self.color,
            weekly_goal: self.weekly_goal,
            completion_dates: self.completion_dates,
            completed: 0,
            current_streak: 0,
            created_at: self.created_at.unwrap_or(fallback_created_at),
            converted_from_challenge: self.converted_from_challenge,
            original_challenge_id: self.original_challenge_id,
            last_completed_at: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewChallenge {
    pub name: String,
    #[serde(default)]
    pub icon: String,
    #[serde(default)]
    pub category: String,
    #[serde(default)]
    pub color: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub reward: String,
    /// Left unset to take the configured challenge length.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub total_days: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime<Utc>>,
}

impl NewChallenge {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            icon: String::new(),
            category: String::new(),
            color: String::new(),
            description: String::new(),
            reward: String::new(),
            total_days: None,
            created_at: None,
        }
    }

    pub fn with_icon(mut self, icon: impl Into<String>) -> Self {
        self.icon = icon.into();
        self
    }

    pub fn with_category(mut self, category: impl Into<String>) -> Self {
        self.category = category.into();
        self
    }

    pub fn with_reward(mut self, reward: impl Into<String>) -> Self {
        self.reward = reward.into();
        self
    }

    pub fn with_total_days(mut self, total_days: u32) -> Self {
        self.total_days = Some(total_days);
        self
    }

    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.name.trim().is_empty() {
            return Err(ValidationError::EmptyName);
        }
        if self.total_days == Some(0) {
            return Err(ValidationError::TotalDays(0));
        }
        Ok(())
    }

    pub fn into_challenge(self, id: EntityId, fallback_created_at: DateTime<Utc>) -> Challenge {
        Challenge {
            id,
            name: self.name,
            icon: self.icon,
            category: self.category,
            color: self.color,
            description: self.description,
            reward: self.reward,
            total_days: self.total_days.unwrap_or(DEFAULT_CHALLENGE_DAYS),
            completion_dates: Vec::new(),
            current_streak: 0,
            is_active: true,
            is_completed: false,
            is_archived: false,
            created_at: self.created_at.unwrap_or(fallback_created_at),
            last_completed_at: None,
            archived_at: None,
            current_day: None,
            days_completed: Vec::new(),
        }
    }
}
