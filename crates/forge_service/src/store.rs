use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

use forge_core::{
    Challenge, ChallengeProgress, DateKey, EntityId, EntityKey, EntityKind, Habit,
    HabitProgress, NewChallenge, NewHabit,
};

use crate::error::StoreError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum DerivedState {
    Habit(HabitProgress),
    Challenge(ChallengeProgress),
}

impl DerivedState {
    pub fn kind(&self) -> EntityKind {
        match self {
            Self::Habit(_) => EntityKind::Habit,
            Self::Challenge(_) => EntityKind::Challenge,
        }
    }
}

/// `append_completion` must be atomic: it rejects the write with
/// [`StoreError::Conflict`] when the day is already recorded, and otherwise stores the
/// day and the derived state together.
#[async_trait::async_trait]
pub trait EntityStore: Send + Sync {
    async fn load_habit(&self, id: &EntityId) -> Result<Option<Habit>, StoreError>;

    async fn load_challenge(&self, id: &EntityId) -> Result<Option<Challenge>, StoreError>;

    async fn append_completion(
        &self,
        key: &EntityKey,
        day: DateKey,
        completed_at: DateTime<Utc>,
        derived: DerivedState,
    ) -> Result<(), StoreError>;

    async fn create_habit(
        &self,
        habit: NewHabit,
        created_at: DateTime<Utc>,
    ) -> Result<Habit, StoreError>;

    async fn create_habit_from_challenge(
        &self,
        habit: NewHabit,
        created_at: DateTime<Utc>,
    ) -> Result<EntityId, StoreError> {
        self.create_habit(habit, created_at).await.map(|habit| habit.id)
    }

    async fn create_challenge(
        &self,
        challenge: NewChallenge,
        created_at: DateTime<Utc>,
    ) -> Result<Challenge, StoreError>;

    async fn set_archived(&self, id: &EntityId, at: DateTime<Utc>) -> Result<(), StoreError>;

    async fn update_derived(&self, key: &EntityKey, derived: DerivedState)
        -> Result<(), StoreError>;

    /// Overwrites a stored challenge wholesale. Used by legacy migration only.
    async fn replace_challenge(&self, challenge: Challenge) -> Result<(), StoreError>;

    async fn list_habits(&self) -> Result<Vec<Habit>, StoreError>;

    async fn list_challenges(&self) -> Result<Vec<Challenge>, StoreError>;
}

#[derive(Debug, Clone, Default)]
pub(crate) struct Collections {
    pub(crate) habits: BTreeMap<EntityId, Habit>,
    pub(crate) challenges: BTreeMap<EntityId, Challenge>,
}

impl Collections {
    pub(crate) fn from_lists(habits: Vec<Habit>, challenges: Vec<Challenge>) -> Self {
        Self {
            habits: habits.into_iter().map(|h| (h.id.clone(), h)).collect(),
            challenges: challenges.into_iter().map(|c| (c.id.clone(), c)).collect(),
        }
    }

    fn next_id(&self, kind: EntityKind) -> EntityId {
        let mut n = match kind {
            EntityKind::Habit => self.habits.len(),
            EntityKind::Challenge => self.challenges.len(),
        } + 1;
        loop {
            let candidate = EntityId::new(format!("{kind}-{n}"));
            let taken = match kind {
                EntityKind::Habit => self.habits.contains_key(&candidate),
                EntityKind::Challenge => self.challenges.contains_key(&candidate),
            };
            if !taken {
                return candidate;
            }
            n += 1;
        }
    }

    pub(crate) fn append_completion(
        &mut self,
        key: &EntityKey,
        day: DateKey,
        completed_at: DateTime<Utc>,
        derived: DerivedState,
    ) -> Result<(), StoreError> {
        check_kind(key, &derived)?;
        let not_found = || StoreError::NotFound(key.clone());
        let conflict = || StoreError::Conflict {
            key: key.clone(),
            day,
        };
        match key.kind {
            EntityKind::Habit => {
                let habit = self.habits.get_mut(&key.id).ok_or_else(not_found)?;
                if habit.completion_dates.iter().any(|r| r.is_day(day)) {
                    return Err(conflict());
                }
                habit.completion_dates.push(day.into());
                habit.last_completed_at = Some(completed_at);
            }
            EntityKind::Challenge => {
                let challenge = self.challenges.get_mut(&key.id).ok_or_else(not_found)?;
                if challenge.completion_dates.iter().any(|r| r.is_day(day)) {
                    return Err(conflict());
                }
                challenge.completion_dates.push(day.into());
                challenge.last_completed_at = Some(completed_at);
            }
        }
        self.update_derived(key, derived)
    }

    pub(crate) fn create_habit(&mut self, new: NewHabit, created_at: DateTime<Utc>) -> Habit {
        let id = self.next_id(EntityKind::Habit);
        let habit = new.into_habit(id.clone(), created_at);
        self.habits.insert(id, habit.clone());
        habit
    }

    pub(crate) fn create_challenge(
        &mut self,
        new: NewChallenge,
        created_at: DateTime<Utc>,
    ) -> Challenge {
        let id = self.next_id(EntityKind::Challenge);
        let challenge = new.into_challenge(id.clone(), created_at);
        self.challenges.insert(id, challenge.clone());
        challenge
    }

    pub(crate) fn set_archived(
        &mut self,
        id: &EntityId,
        at: DateTime<Utc>,
    ) -> Result<(), StoreError> {
        let challenge = self
            .challenges
            .get_mut(id)
            .ok_or_else(|| StoreError::NotFound(EntityKey::challenge(id.clone())))?;
        if !challenge.is_archived {
            challenge.is_archived = true;
            challenge.is_active = false;
            challenge.archived_at = Some(at);
        }
        Ok(())
    }

    pub(crate) fn update_derived(
        &mut self,
        key: &EntityKey,
        derived: DerivedState,
    ) -> Result<(), StoreError> {
        let not_found = || StoreError::NotFound(key.clone());
        match (key.kind, derived) {
            (EntityKind::Habit, DerivedState::Habit(progress)) => {
                self.habits
                    .get_mut(&key.id)
                    .ok_or_else(not_found)?
                    .apply_progress(progress);
            }
            (EntityKind::Challenge, DerivedState::Challenge(progress)) => {
                self.challenges
                    .get_mut(&key.id)
                    .ok_or_else(not_found)?
                    .apply_progress(progress);
            }
            (_, derived) => check_kind(key, &derived)?,
        }
        Ok(())
    }

    pub(crate) fn replace_challenge(&mut self, challenge: Challenge) -> Result<(), StoreError> {
        match self.challenges.get_mut(&challenge.id) {
            Some(existing) => {
                *existing = challenge;
                Ok(())
            }
            None => Err(StoreError::NotFound(EntityKey::challenge(challenge.id))),
        }
    }
}

fn check_kind(key: &EntityKey, derived: &DerivedState) -> Result<(), StoreError> {
    if derived.kind() == key.kind {
        Ok(())
    } else {
        Err(StoreError::KindMismatch {
            key: key.clone(),
            derived: derived.kind(),
        })
    }
}

#[derive(Debug, Default)]
pub struct InMemoryStore {
    collections: RwLock<Collections>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_entities(habits: Vec<Habit>, challenges: Vec<Challenge>) -> Self {
        Self {
            collections: RwLock::new(Collections::from_lists(habits, challenges)),
        }
    }
}

#[async_trait::async_trait]
impl EntityStore for InMemoryStore {
    async fn load_habit(&self, id: &EntityId) -> Result<Option<Habit>, StoreError> {
        Ok(self.collections.read().habits.get(id).cloned())
    }

    async fn load_challenge(&self, id: &EntityId) -> Result<Option<Challenge>, StoreError> {
        Ok(self.collections.read().challenges.get(id).cloned())
    }

    async fn append_completion(
        &self,
        key: &EntityKey,
        day: DateKey,
        completed_at: DateTime<Utc>,
        derived: DerivedState,
    ) -> Result<(), StoreError> {
        self.collections
            .write()
            .append_completion(key, day, completed_at, derived)
    }

    async fn create_habit(
        &self,
        habit: NewHabit,
        created_at: DateTime<Utc>,
    ) -> Result<Habit, StoreError> {
        Ok(self.collections.write().create_habit(habit, created_at))
    }

    async fn create_challenge(
        &self,
        challenge: NewChallenge,
        created_at: DateTime<Utc>,
    ) -> Result<Challenge, StoreError> {
        Ok(self.collections.write().create_challenge(challenge, created_at))
    }

    async fn set_archived(&self, id: &EntityId, at: DateTime<Utc>) -> Result<(), StoreError> {
        self.collections.write().set_archived(id, at)
    }

    async fn update_derived(
        &self,
        key: &EntityKey,
        derived: DerivedState,
    ) -> Result<(), StoreError> {
        self.collections.write().update_derived(key, derived)
    }

    async fn replace_challenge(&self, challenge: Challenge) -> Result<(), StoreError> {
        self.collections.write().replace_challenge(challenge)
    }

    async fn list_habits(&self) -> Result<Vec<Habit>, StoreError> {
        Ok(self.collections.read().habits.values().cloned().collect())
    }

    async fn list_challenges(&self) -> Result<Vec<Challenge>, StoreError> {
        Ok(self.collections.read().challenges.values().cloned().collect())
    }
}
