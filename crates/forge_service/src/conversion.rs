use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::runtime::Handle;
use tokio::sync::{mpsc, Mutex as AsyncMutex, OwnedMutexGuard};
use tracing::{debug, error, info, instrument, warn};

use forge_core::{habit_progress, EntityId, EntityKey, NewHabit};

use crate::clock::Clock;
use crate::config::ForgeConfig;
use crate::error::{Result, TrackerError};
use crate::sink::{ConversionOutcome, ConversionSink};
use crate::store::{DerivedState, EntityStore};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConversionPolicy {
    pub weekly_goal: u32,
    pub max_attempts: u32,
    pub initial_delay: Duration,
    pub retry_delay: Duration,
}

impl From<&ForgeConfig> for ConversionPolicy {
    fn from(config: &ForgeConfig) -> Self {
        Self {
            weekly_goal: config.converted_weekly_goal,
            max_attempts: config.conversion_max_attempts.max(1),
            initial_delay: config.conversion_delay,
            retry_delay: config.conversion_retry_delay,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConversionJob {
    pub challenge_id: EntityId,
}

#[derive(Debug, Default)]
pub(crate) struct ConversionLocks {
    locks: parking_lot::Mutex<HashMap<EntityId, Arc<AsyncMutex<()>>>>,
}

impl ConversionLocks {
    pub(crate) async fn lock(&self, challenge_id: &EntityId) -> OwnedMutexGuard<()> {
        let lock = Arc::clone(self.locks.lock().entry(challenge_id.clone()).or_default());
        lock.lock_owned().await
    }
}

/// Sending half of the conversion worker. The worker stops once this is dropped.
#[derive(Debug, Clone)]
pub(crate) struct ConversionQueue {
    sender: mpsc::UnboundedSender<ConversionJob>,
    locks: Arc<ConversionLocks>,
}

struct Worker {
    store: Arc<dyn EntityStore>,
    clock: Arc<dyn Clock>,
    policy: ConversionPolicy,
    sink: Option<Arc<dyn ConversionSink>>,
    locks: Arc<ConversionLocks>,
}

impl ConversionQueue {
    pub(crate) fn start(
        store: Arc<dyn EntityStore>,
        clock: Arc<dyn Clock>,
        policy: ConversionPolicy,
        sink: Option<Arc<dyn ConversionSink>>,
    ) -> Result<Self> {
        let handle = Handle::try_current().map_err(|_| TrackerError::Runtime)?;
        let (sender, receiver) = mpsc::unbounded_channel();
        let locks = Arc::new(ConversionLocks::default());
        let worker = Arc::new(Worker {
            store,
            clock,
            policy,
            sink,
            locks: Arc::clone(&locks),
        });
        handle.spawn(run(receiver, worker));
        Ok(Self { sender, locks })
    }

    pub(crate) async fn lock(&self, challenge_id: &EntityId) -> OwnedMutexGuard<()> {
        self.locks.lock(challenge_id).await
    }

    pub(crate) fn enqueue(&self, challenge_id: EntityId) {
        debug!(challenge = %challenge_id, "queueing challenge conversion");
        if let Err(err) = self.sender.send(ConversionJob { challenge_id }) {
            error!(challenge = %err.0.challenge_id, "conversion worker is gone, job dropped");
        }
    }
}

async fn run(mut receiver: mpsc::UnboundedReceiver<ConversionJob>, worker: Arc<Worker>) {
    while let Some(job) = receiver.recv().await {
        let worker = Arc::clone(&worker);
        tokio::spawn(async move {
            let outcome = worker.process(job).await;
            if let Some(sink) = &worker.sink {
                sink.report(outcome);
            }
        });
    }
    debug!("conversion queue closed");
}

impl Worker {
    #[instrument(skip(self, job), fields(challenge = %job.challenge_id))]
    async fn process(&self, job: ConversionJob) -> ConversionOutcome {
        tokio::time::sleep(self.policy.initial_delay).await;
        let mut attempts = 0;
        loop {
            attempts += 1;
            let result = {
                let _lock = self.locks.lock(&job.challenge_id).await;
                convert_challenge(
                    self.store.as_ref(),
                    self.clock.as_ref(),
                    &job.challenge_id,
                    self.policy.weekly_goal,
                )
                .await
            };
            match result {
                Ok(habit_id) => {
                    info!(habit = %habit_id, attempts, "challenge converted to habit");
                    return ConversionOutcome::Converted {
                        challenge_id: job.challenge_id,
                        habit_id,
                        attempts,
                    };
                }
                Err(err) if attempts < self.policy.max_attempts => {
                    warn!(%err, attempts, "conversion attempt failed, retrying");
                    tokio::time::sleep(self.policy.retry_delay).await;
                }
                Err(err) => {
                    error!(%err, attempts, "giving up on challenge conversion");
                    return ConversionOutcome::Failed {
                        challenge_id: job.challenge_id,
                        attempts,
                        reason: err.to_string(),
                    };
                }
            }
        }
    }
}

/// A habit already linked to the challenge is reused instead of creating another one.
pub async fn convert_challenge(
    store: &dyn EntityStore,
    clock: &dyn Clock,
    challenge_id: &EntityId,
    weekly_goal: u32,
) -> Result<EntityId> {
    let challenge = store
        .load_challenge(challenge_id)
        .await?
        .ok_or_else(|| TrackerError::EntityNotFound(EntityKey::challenge(challenge_id.clone())))?;
    let now = clock.now();

    let existing = store
        .list_habits()
        .await?
        .into_iter()
        .find(|habit| habit.original_challenge_id.as_ref() == Some(challenge_id));

    let habit_id = match existing {
        Some(habit) => {
            debug!(habit = %habit.id, "reusing habit from an earlier attempt");
            habit.id
        }
        None => {
            let new = NewHabit::from_challenge(&challenge, weekly_goal);
            new.validate()?;
            let id = store
                .create_habit_from_challenge(new, now.with_timezone(&Utc))
                .await?;
            if let Some(habit) = store.load_habit(&id).await? {
                let progress = habit_progress(&habit, &now);
                store
                    .update_derived(&EntityKey::habit(id.clone()), DerivedState::Habit(progress))
                    .await?;
            }
            id
        }
    };

    if !challenge.is_archived {
        store
            .set_archived(challenge_id, now.with_timezone(&Utc))
            .await?;
    }
    Ok(habit_id)
}
