use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration as StdDuration;

use chrono::{DateTime, Duration, FixedOffset, TimeZone, Utc};
use forge_core::{
    Challenge, CompletionRecord, DateKey, EntityId, EntityKey, Habit, NewChallenge, NewHabit,
};
use forge_service::{
    ConversionOutcome, DerivedState, EntityStore, FixedClock, ForgeConfig, ForgeService,
    InMemoryStore, JsonFileStore, StoreError, TrackerError,
};
use serde_json::json;
use tempfile::tempdir;
use tokio::sync::{mpsc, Notify};

fn local(y: i32, m: u32, d: u32, h: u32) -> DateTime<FixedOffset> {
    FixedOffset::west_opt(8 * 3600)
        .unwrap()
        .with_ymd_and_hms(y, m, d, h, 0, 0)
        .unwrap()
}

fn fast_config() -> ForgeConfig {
    ForgeConfig {
        conversion_delay: StdDuration::from_millis(0),
        conversion_retry_delay: StdDuration::from_millis(5),
        conversion_max_attempts: 2,
        ..ForgeConfig::default()
    }
}

async fn next_outcome(rx: &mut mpsc::UnboundedReceiver<ConversionOutcome>) -> ConversionOutcome {
    tokio::time::timeout(StdDuration::from_secs(5), rx.recv())
        .await
        .expect("conversion finished in time")
        .expect("outcome channel open")
}

/// Wraps the in-memory store with switches for stalling and failing calls.
#[derive(Default)]
struct ScriptedStore {
    inner: InMemoryStore,
    stall_next_load: AtomicBool,
    loading: Notify,
    release: Notify,
    create_habit_failures: AtomicU32,
    archive_failures: AtomicU32,
}

impl ScriptedStore {
    fn take_failure(counter: &AtomicU32) -> bool {
        counter
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
    }

    fn injected() -> StoreError {
        StoreError::Io(std::io::Error::new(
            std::io::ErrorKind::Other,
            "injected failure",
        ))
    }
}

#[async_trait::async_trait]
impl EntityStore for ScriptedStore {
    async fn load_habit(&self, id: &EntityId) -> Result<Option<Habit>, StoreError> {
        if self.stall_next_load.swap(false, Ordering::SeqCst) {
            self.loading.notify_one();
            self.release.notified().await;
        }
        self.inner.load_habit(id).await
    }

    async fn load_challenge(&self, id: &EntityId) -> Result<Option<Challenge>, StoreError> {
        self.inner.load_challenge(id).await
    }

    async fn append_completion(
        &self,
        key: &EntityKey,
        day: DateKey,
        completed_at: DateTime<Utc>,
        derived: DerivedState,
    ) -> Result<(), StoreError> {
        self.inner
            .append_completion(key, day, completed_at, derived)
            .await
    }

    async fn create_habit(
        &self,
        habit: NewHabit,
        created_at: DateTime<Utc>,
    ) -> Result<Habit, StoreError> {
        if Self::take_failure(&self.create_habit_failures) {
            return Err(Self::injected());
        }
        self.inner.create_habit(habit, created_at).await
    }

    async fn create_challenge(
        &self,
        challenge: NewChallenge,
        created_at: DateTime<Utc>,
    ) -> Result<Challenge, StoreError> {
        self.inner.create_challenge(challenge, created_at).await
    }

    async fn set_archived(&self, id: &EntityId, at: DateTime<Utc>) -> Result<(), StoreError> {
        if Self::take_failure(&self.archive_failures) {
            return Err(Self::injected());
        }
        self.inner.set_archived(id, at).await
    }

    async fn update_derived(
        &self,
        key: &EntityKey,
        derived: DerivedState,
    ) -> Result<(), StoreError> {
        self.inner.update_derived(key, derived).await
    }

    async fn replace_challenge(&self, challenge: Challenge) -> Result<(), StoreError> {
        self.inner.replace_challenge(challenge).await
    }

    async fn list_habits(&self) -> Result<Vec<Habit>, StoreError> {
        self.inner.list_habits().await
    }

    async fn list_challenges(&self) -> Result<Vec<Challenge>, StoreError> {
        self.inner.list_challenges().await
    }
}

fn build(
    store: Arc<dyn EntityStore>,
    clock: Arc<FixedClock>,
) -> (ForgeService, mpsc::UnboundedReceiver<ConversionOutcome>) {
    let (tx, rx) = mpsc::unbounded_channel();
    let service = ForgeService::builder()
        .with_config(fast_config())
        .with_store(store)
        .with_clock(clock)
        .with_conversion_sink(Arc::new(tx))
        .build()
        .expect("build forge service");
    (service, rx)
}

#[tokio::test]
async fn twenty_one_day_challenge_converts_into_a_habit_on_disk() {
    let temp = tempdir().expect("tempdir");
    let clock = Arc::new(FixedClock::new(local(2024, 1, 1, 7)));
    let store = Arc::new(JsonFileStore::open(temp.path()).expect("open store"));
    let (service, mut outcomes) = build(store, Arc::clone(&clock));

    let challenge = service
        .create_challenge(NewChallenge::new("🚿 Cold Shower").with_category("Wellness"))
        .await
        .expect("create challenge");

    for day in 1..=20 {
        let updated = service
            .complete_challenge_day(&challenge.id)
            .await
            .expect("complete day");
        assert_eq!(updated.current_streak, day);
        assert!(!updated.is_completed);
        clock.advance(Duration::days(1));
    }
    let finished = service
        .complete_challenge_day(&challenge.id)
        .await
        .expect("final day");
    assert_eq!(finished.current_streak, 21);
    assert!(finished.is_completed);
    assert!(!finished.is_active);

    let habit_id = match next_outcome(&mut outcomes).await {
        ConversionOutcome::Converted {
            challenge_id,
            habit_id,
            attempts,
        } => {
            assert_eq!(challenge_id, challenge.id);
            assert_eq!(attempts, 1);
            habit_id
        }
        other => panic!("unexpected outcome {other:?}"),
    };
    drop(service);

    let reopened = JsonFileStore::open(temp.path()).expect("reopen store");
    let habit = reopened
        .load_habit(&habit_id)
        .await
        .expect("load habit")
        .expect("habit persisted");
    assert_eq!(habit.weekly_goal, 7);
    assert_eq!(habit.completion_dates.len(), 21);
    assert_eq!(habit.original_challenge_id.as_ref(), Some(&challenge.id));
    assert_eq!(habit.category, "Wellness");

    let archived = reopened
        .load_challenge(&challenge.id)
        .await
        .expect("load challenge")
        .expect("challenge persisted");
    assert!(archived.is_archived);
    assert!(archived.is_completed);
    assert_eq!(archived.completion_dates.len(), 21);
}

#[tokio::test]
async fn missed_day_resets_the_challenge_run() {
    let clock = Arc::new(FixedClock::new(local(2024, 3, 1, 9)));
    let (service, _outcomes) = build(Arc::new(InMemoryStore::new()), Arc::clone(&clock));
    let challenge = service
        .create_challenge(NewChallenge::new("Meditate"))
        .await
        .unwrap();

    for _ in 0..5 {
        service.complete_challenge_day(&challenge.id).await.unwrap();
        clock.advance(Duration::days(1));
    }
    clock.advance(Duration::days(1));
    let resumed = service.complete_challenge_day(&challenge.id).await.unwrap();
    assert_eq!(resumed.current_streak, 1);
    assert_eq!(resumed.completion_dates.len(), 6);
}

#[tokio::test]
async fn january_habit_scenario_keeps_one_week() {
    let clock = Arc::new(FixedClock::new(local(2024, 1, 1, 8)));
    let (service, _outcomes) = build(Arc::new(InMemoryStore::new()), Arc::clone(&clock));
    let habit = service
        .create_habit(NewHabit::new("💪 Exercise", 3))
        .await
        .unwrap();

    for day in [3, 10, 11, 12] {
        clock.set(local(2024, 1, day, 19));
        service.complete_habit(&habit.id).await.unwrap();
    }
    clock.set(local(2024, 1, 15, 9));
    service.refresh_derived().await.unwrap();

    let stored = service.habit(&habit.id).await.unwrap();
    assert_eq!(stored.current_streak, 1);
    assert_eq!(stored.completed, 0);

    let stats = service.statistics(&habit.id).await.unwrap();
    assert_eq!(stats.total_completed, 4);
    assert_eq!(stats.longest_streak, 3);
    assert_eq!(stats.current_streak, 0);
}

#[tokio::test]
async fn legacy_timestamp_on_today_blocks_completion() {
    // 2024-01-10 20:00 UTC is noon on Jan 10 at UTC-8.
    let raw = json!({
        "id": "legacy",
        "name": "Read",
        "weeklyGoal": 3,
        "createdAt": { "seconds": 1704067200, "nanoseconds": 0 },
        "completionDates": [{ "seconds": 1704916800, "nanoseconds": 0 }]
    });
    let habit: Habit = serde_json::from_value(raw).expect("legacy habit");
    assert!(matches!(
        habit.completion_dates[0],
        CompletionRecord::Timestamp { .. }
    ));

    let clock = Arc::new(FixedClock::new(local(2024, 1, 10, 21)));
    let store = Arc::new(InMemoryStore::with_entities(vec![habit], Vec::new()));
    let (service, _outcomes) = build(store, clock);

    let err = service
        .complete_habit(&EntityId::new("legacy"))
        .await
        .expect_err("already done today");
    assert!(matches!(err, TrackerError::DuplicateCompletion { .. }));
    let stored = service.habit(&EntityId::new("legacy")).await.unwrap();
    assert_eq!(stored.completion_dates.len(), 1);
}

#[tokio::test]
async fn concurrent_completion_fails_fast() {
    let store = Arc::new(ScriptedStore::default());
    let clock = Arc::new(FixedClock::new(local(2024, 1, 10, 9)));
    let (service, _outcomes) = build(store.clone(), clock);
    let habit = service.create_habit(NewHabit::new("Read", 3)).await.unwrap();

    store.stall_next_load.store(true, Ordering::SeqCst);
    let first = service.complete_habit(&habit.id);
    let second = async {
        store.loading.notified().await;
        let result = service.complete_habit(&habit.id).await;
        store.release.notify_one();
        result
    };
    let (first, second) = tokio::join!(first, second);

    assert!(first.is_ok());
    assert!(matches!(
        second,
        Err(TrackerError::OperationInProgress(_))
    ));
    assert_eq!(
        service.habit(&habit.id).await.unwrap().completion_dates.len(),
        1
    );
}

#[tokio::test]
async fn failed_conversion_keeps_the_completion() {
    let store = Arc::new(ScriptedStore::default());
    store.create_habit_failures.store(u32::MAX, Ordering::SeqCst);
    let clock = Arc::new(FixedClock::new(local(2024, 2, 1, 9)));
    let (service, mut outcomes) = build(store.clone(), Arc::clone(&clock));

    let challenge = service
        .create_challenge(NewChallenge::new("Sprint").with_total_days(3))
        .await
        .unwrap();
    for _ in 0..3 {
        service.complete_challenge_day(&challenge.id).await.unwrap();
        clock.advance(Duration::days(1));
    }

    match next_outcome(&mut outcomes).await {
        ConversionOutcome::Failed {
            challenge_id,
            attempts,
            ..
        } => {
            assert_eq!(challenge_id, challenge.id);
            assert_eq!(attempts, 2);
        }
        other => panic!("unexpected outcome {other:?}"),
    }

    let stored = service.challenge(&challenge.id).await.unwrap();
    assert!(stored.is_completed);
    assert!(!stored.is_archived);
    assert_eq!(stored.completion_dates.len(), 3);
    assert!(service.habits().await.unwrap().is_empty());

    let manual = service
        .convert_challenge_to_habit(&challenge.id)
        .await
        .expect_err("still failing");
    assert!(matches!(manual, TrackerError::ConversionFailure { .. }));
}

#[tokio::test]
async fn retried_conversion_does_not_duplicate_the_habit() {
    let store = Arc::new(ScriptedStore::default());
    store.archive_failures.store(1, Ordering::SeqCst);
    let clock = Arc::new(FixedClock::new(local(2024, 2, 1, 9)));
    let (service, mut outcomes) = build(store.clone(), Arc::clone(&clock));

    let challenge = service
        .create_challenge(NewChallenge::new("Sprint").with_total_days(2))
        .await
        .unwrap();
    service.complete_challenge_day(&challenge.id).await.unwrap();
    clock.advance(Duration::days(1));
    service.complete_challenge_day(&challenge.id).await.unwrap();

    match next_outcome(&mut outcomes).await {
        ConversionOutcome::Converted { attempts, .. } => assert_eq!(attempts, 2),
        other => panic!("unexpected outcome {other:?}"),
    }
    let habits = service.habits().await.unwrap();
    assert_eq!(habits.len(), 1);
    assert!(habits[0].converted_from_challenge);
    assert!(service.active_challenges().await.unwrap().is_empty());

    let summary = service.dashboard().await.unwrap();
    assert_eq!(summary.habit_count, 1);
    assert_eq!(summary.active_challenges, 0);
}

#[tokio::test]
async fn manual_conversion_waits_for_the_background_one() {
    let store = Arc::new(ScriptedStore::default());
    let clock = Arc::new(FixedClock::new(local(2024, 3, 1, 9)));
    let (service, mut outcomes) = build(store.clone(), Arc::clone(&clock));

    let challenge = service
        .create_challenge(NewChallenge::new("Sprint").with_total_days(2))
        .await
        .unwrap();
    service.complete_challenge_day(&challenge.id).await.unwrap();
    clock.advance(Duration::days(1));

    // The background conversion stalls after creating its habit.
    store.stall_next_load.store(true, Ordering::SeqCst);
    service.complete_challenge_day(&challenge.id).await.unwrap();
    store.loading.notified().await;

    let blocked = tokio::time::timeout(
        StdDuration::from_millis(50),
        service.convert_challenge_to_habit(&challenge.id),
    )
    .await;
    assert!(blocked.is_err(), "manual conversion ran alongside the worker");

    store.release.notify_one();
    let background = match next_outcome(&mut outcomes).await {
        ConversionOutcome::Converted { habit_id, .. } => habit_id,
        other => panic!("unexpected outcome {other:?}"),
    };
    let manual = service
        .convert_challenge_to_habit(&challenge.id)
        .await
        .expect("manual conversion");
    assert_eq!(manual, background);
    assert_eq!(service.habits().await.unwrap().len(), 1);
}

#[tokio::test]
async fn legacy_challenges_are_migrated_in_place() {
    let raw = json!({
        "id": "old",
        "name": "Cold Shower",
        "createdAt": { "seconds": 1704096000, "nanoseconds": 0 },
        "currentDay": 4,
        "daysCompleted": [1, 2, 3]
    });
    let challenge: Challenge = serde_json::from_value(raw).expect("legacy challenge");
    let store = Arc::new(InMemoryStore::with_entities(Vec::new(), vec![challenge]));
    let clock = Arc::new(FixedClock::new(local(2024, 1, 4, 9)));
    let (service, _outcomes) = build(store, clock);

    assert_eq!(service.migrate_legacy().await.unwrap(), 1);
    assert_eq!(service.migrate_legacy().await.unwrap(), 0);
    let migrated = service.challenge(&EntityId::new("old")).await.unwrap();
    assert_eq!(migrated.completion_dates.len(), 3);

    service.refresh_derived().await.unwrap();
    let board = service.day_board(&EntityId::new("old")).await.unwrap();
    assert_eq!(board.len(), 21);
    let refreshed = service.challenge(&EntityId::new("old")).await.unwrap();
    assert_eq!(refreshed.current_streak, 0);
}
