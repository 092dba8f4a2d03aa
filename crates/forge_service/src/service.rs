use std::collections::HashSet;
use std::sync::Arc;

use chrono::Utc;
use parking_lot::Mutex;
use tracing::{debug, info, instrument};

use forge_core::migrate::migrate_challenge;
use forge_core::records::contains_day;
use forge_core::summary::{challenge_day_board, DayBoardCell};
use forge_core::{
    challenge_progress, compute_statistics, find_related_challenges, generate_contribution_grid,
    habit_progress, local_date_key, summarize, Challenge, ContributionGrid, ContributionStats,
    DashboardSummary, EntityId, EntityKey, Habit, NewChallenge, NewHabit, ValidationError,
};

use crate::clock::{Clock, SystemClock};
use crate::config::ForgeConfig;
use crate::conversion::{convert_challenge, ConversionPolicy, ConversionQueue};
use crate::error::{Result, TrackerError};
use crate::sink::ConversionSink;
use crate::store::{DerivedState, EntityStore, InMemoryStore};

pub struct ForgeService {
    config: ForgeConfig,
    store: Arc<dyn EntityStore>,
    clock: Arc<dyn Clock>,
    in_flight: InFlight,
    conversions: ConversionQueue,
}

pub struct ForgeServiceBuilder {
    config: ForgeConfig,
    store: Option<Arc<dyn EntityStore>>,
    clock: Option<Arc<dyn Clock>>,
    conversion_sink: Option<Arc<dyn ConversionSink>>,
}

impl ForgeServiceBuilder {
    pub fn new() -> Self {
        Self {
            config: ForgeConfig::default(),
            store: None,
            clock: None,
            conversion_sink: None,
        }
    }

    pub fn with_config(mut self, config: ForgeConfig) -> Self {
        self.config = config;
        self
    }

    pub fn with_store(mut self, store: Arc<dyn EntityStore>) -> Self {
        self.store = Some(store);
        self
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = Some(clock);
        self
    }

    pub fn with_conversion_sink(mut self, sink: Arc<dyn ConversionSink>) -> Self {
        self.conversion_sink = Some(sink);
        self
    }

    /// Spawns the conversion worker, so this has to run inside a tokio runtime.
    pub fn build(self) -> Result<ForgeService> {
        let store: Arc<dyn EntityStore> = match self.store {
            Some(store) => store,
            None => Arc::new(InMemoryStore::new()),
        };
        let clock: Arc<dyn Clock> = match self.clock {
            Some(clock) => clock,
            None => Arc::new(SystemClock),
        };
        let conversions = ConversionQueue::start(
            Arc::clone(&store),
            Arc::clone(&clock),
            ConversionPolicy::from(&self.config),
            self.conversion_sink,
        )?;
        Ok(ForgeService {
            config: self.config,
            store,
            clock,
            in_flight: InFlight::default(),
            conversions,
        })
    }
}

impl Default for ForgeServiceBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl ForgeService {
    pub fn builder() -> ForgeServiceBuilder {
        ForgeServiceBuilder::new()
    }

    pub fn config(&self) -> &ForgeConfig {
        &self.config
    }

    #[instrument(skip(self), fields(habit = %id))]
    pub async fn complete_habit(&self, id: &EntityId) -> Result<Habit> {
        let key = EntityKey::habit(id.clone());
        let _guard = self.in_flight.acquire(&key)?;

        let mut habit = self
            .store
            .load_habit(id)
            .await?
            .ok_or_else(|| TrackerError::EntityNotFound(key.clone()))?;
        habit.validate()?;

        let now = self.clock.now();
        let day = local_date_key(&now);
        if contains_day(&habit.completion_dates, &now.timezone(), day.date()) {
            return Err(TrackerError::DuplicateCompletion { key, day });
        }

        habit.completion_dates.push(day.into());
        let progress = habit_progress(&habit, &now);
        let completed_at = now.with_timezone(&Utc);
        self.store
            .append_completion(&key, day, completed_at, DerivedState::Habit(progress))
            .await?;
        habit.apply_progress(progress);
        habit.last_completed_at = Some(completed_at);

        info!(
            %day,
            completed = progress.completed,
            streak = progress.current_streak,
            "habit completed"
        );
        Ok(habit)
    }

    /// Finishing the challenge queues its conversion; the outcome never affects this call.
    #[instrument(skip(self), fields(challenge = %id))]
    pub async fn complete_challenge_day(&self, id: &EntityId) -> Result<Challenge> {
        let key = EntityKey::challenge(id.clone());
        let _guard = self.in_flight.acquire(&key)?;

        let mut challenge = self
            .store
            .load_challenge(id)
            .await?
            .ok_or_else(|| TrackerError::EntityNotFound(key.clone()))?;
        challenge.validate()?;
        if !challenge.is_open() {
            return Err(ValidationError::ChallengeClosed(id.clone()).into());
        }

        let now = self.clock.now();
        let day = local_date_key(&now);
        if contains_day(&challenge.completion_dates, &now.timezone(), day.date()) {
            return Err(TrackerError::DuplicateCompletion { key, day });
        }

        challenge.completion_dates.push(day.into());
        let progress = challenge_progress(&challenge, &now);
        let completed_at = now.with_timezone(&Utc);
        self.store
            .append_completion(&key, day, completed_at, DerivedState::Challenge(progress))
            .await?;
        challenge.apply_progress(progress);
        challenge.last_completed_at = Some(completed_at);

        info!(
            %day,
            streak = progress.current_streak,
            completed = progress.is_completed,
            "challenge day completed"
        );
        if progress.is_completed {
            self.conversions.enqueue(id.clone());
        }
        Ok(challenge)
    }

    #[instrument(skip(self, habit), fields(name = %habit.name))]
    pub async fn create_habit(&self, habit: NewHabit) -> Result<Habit> {
        habit.validate()?;
        let now = self.clock.now();
        let mut created = self.store.create_habit(habit, now.with_timezone(&Utc)).await?;
        let progress = habit_progress(&created, &now);
        if progress.completed != 0 || progress.current_streak != 0 {
            self.store
                .update_derived(&EntityKey::habit(created.id.clone()), DerivedState::Habit(progress))
                .await?;
        }
        created.apply_progress(progress);
        info!(habit = %created.id, "habit created");
        Ok(created)
    }

    #[instrument(skip(self, challenge), fields(name = %challenge.name))]
    pub async fn create_challenge(&self, mut challenge: NewChallenge) -> Result<Challenge> {
        challenge.total_days.get_or_insert(self.config.challenge_days);
        challenge.validate()?;
        let now = self.clock.now();
        let created = self
            .store
            .create_challenge(challenge, now.with_timezone(&Utc))
            .await?;
        info!(challenge = %created.id, total_days = created.total_days, "challenge created");
        Ok(created)
    }

    #[instrument(skip(self))]
    pub async fn archive_challenge(&self, id: &EntityId) -> Result<()> {
        let now = self.clock.now().with_timezone(&Utc);
        self.store.set_archived(id, now).await?;
        info!(challenge = %id, "challenge archived");
        Ok(())
    }

    /// Converts right away instead of waiting for the background worker. A conversion of
    /// the same challenge already underway finishes first.
    #[instrument(skip(self))]
    pub async fn convert_challenge_to_habit(&self, id: &EntityId) -> Result<EntityId> {
        let _lock = self.conversions.lock(id).await;
        let result = convert_challenge(
            self.store.as_ref(),
            self.clock.as_ref(),
            id,
            self.config.converted_weekly_goal,
        )
        .await;
        match result {
            Ok(habit_id) => Ok(habit_id),
            Err(err @ TrackerError::EntityNotFound(_)) => Err(err),
            Err(err) => Err(TrackerError::ConversionFailure {
                challenge_id: id.clone(),
                attempts: 1,
                reason: err.to_string(),
            }),
        }
    }

    /// Returns how many entities changed. A week rollover resets `completed` here.
    #[instrument(skip(self))]
    pub async fn refresh_derived(&self) -> Result<usize> {
        let now = self.clock.now();
        let mut changed = 0;

        for habit in self.store.list_habits().await? {
            let progress = habit_progress(&habit, &now);
            if progress.completed != habit.completed
                || progress.current_streak != habit.current_streak
            {
                self.store
                    .update_derived(&EntityKey::habit(habit.id.clone()), DerivedState::Habit(progress))
                    .await?;
                changed += 1;
            }
        }

        for challenge in self.store.list_challenges().await? {
            if !challenge.is_open() {
                continue;
            }
            let progress = challenge_progress(&challenge, &now);
            if progress.current_streak != challenge.current_streak
                || progress.is_completed != challenge.is_completed
            {
                self.store
                    .update_derived(
                        &EntityKey::challenge(challenge.id.clone()),
                        DerivedState::Challenge(progress),
                    )
                    .await?;
                changed += 1;
                if progress.is_completed {
                    self.conversions.enqueue(challenge.id.clone());
                }
            }
        }

        debug!(changed, "derived counters refreshed");
        Ok(changed)
    }

    #[instrument(skip(self))]
    pub async fn migrate_legacy(&self) -> Result<usize> {
        let tz = self.clock.now().timezone();
        let mut migrated = 0;
        for mut challenge in self.store.list_challenges().await? {
            if migrate_challenge(&mut challenge, &tz) {
                self.store.replace_challenge(challenge).await?;
                migrated += 1;
            }
        }
        if migrated > 0 {
            info!(migrated, "migrated legacy challenges");
        }
        Ok(migrated)
    }

    pub async fn habit(&self, id: &EntityId) -> Result<Habit> {
        self.store
            .load_habit(id)
            .await?
            .ok_or_else(|| TrackerError::EntityNotFound(EntityKey::habit(id.clone())))
    }

    pub async fn challenge(&self, id: &EntityId) -> Result<Challenge> {
        self.store
            .load_challenge(id)
            .await?
            .ok_or_else(|| TrackerError::EntityNotFound(EntityKey::challenge(id.clone())))
    }

    pub async fn habits(&self) -> Result<Vec<Habit>> {
        Ok(self.store.list_habits().await?)
    }

    /// Challenges that have not been archived, finished ones included.
    pub async fn active_challenges(&self) -> Result<Vec<Challenge>> {
        let mut challenges = self.store.list_challenges().await?;
        challenges.retain(|challenge| !challenge.is_archived);
        Ok(challenges)
    }

    pub async fn contribution_grid(&self, habit_id: &EntityId) -> Result<ContributionGrid> {
        let habit = self.habit(habit_id).await?;
        let challenges = self.active_challenges().await?;
        let related = find_related_challenges(&habit, &challenges);
        Ok(generate_contribution_grid(&habit, &related, &self.clock.now()))
    }

    pub async fn statistics(&self, habit_id: &EntityId) -> Result<ContributionStats> {
        let grid = self.contribution_grid(habit_id).await?;
        Ok(compute_statistics(&grid))
    }

    pub async fn dashboard(&self) -> Result<DashboardSummary> {
        let habits = self.store.list_habits().await?;
        let challenges = self.store.list_challenges().await?;
        Ok(summarize(&habits, &challenges))
    }

    pub async fn day_board(&self, challenge_id: &EntityId) -> Result<Vec<DayBoardCell>> {
        let challenge = self.challenge(challenge_id).await?;
        Ok(challenge_day_board(&challenge))
    }
}

#[derive(Debug, Default)]
struct InFlight {
    keys: Mutex<HashSet<EntityKey>>,
}

impl InFlight {
    fn acquire(&self, key: &EntityKey) -> Result<InFlightGuard<'_>> {
        if !self.keys.lock().insert(key.clone()) {
            return Err(TrackerError::OperationInProgress(key.clone()));
        }
        Ok(InFlightGuard {
            owner: self,
            key: key.clone(),
        })
    }
}

struct InFlightGuard<'a> {
    owner: &'a InFlight,
    key: EntityKey,
}

impl Drop for InFlightGuard<'_> {
    fn drop(&mut self) {
        self.owner.keys.lock().remove(&self.key);
    }
}
