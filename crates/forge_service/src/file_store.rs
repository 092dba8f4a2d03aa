use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::de::DeserializeOwned;
use tempfile::NamedTempFile;

use forge_core::{Challenge, DateKey, EntityId, EntityKey, Habit, NewChallenge, NewHabit};

use crate::error::StoreError;
use crate::store::{Collections, DerivedState, EntityStore};

const HABITS_FILE: &str = "habits.json";
const CHALLENGES_FILE: &str = "challenges.json";

/// Mutations apply to a copy that becomes visible only after the changed collection's
/// document has been replaced by renaming a fully written temp file over it.
#[derive(Debug)]
pub struct JsonFileStore {
    root: PathBuf,
    collections: Mutex<Collections>,
}

impl JsonFileStore {
    pub fn open(root: impl AsRef<Path>) -> Result<Self, StoreError> {
        let root = root.as_ref().to_path_buf();
        fs::create_dir_all(&root)?;
        let habits: Vec<Habit> = read_collection(&root.join(HABITS_FILE))?;
        let challenges: Vec<Challenge> = read_collection(&root.join(CHALLENGES_FILE))?;
        tracing::info!(
            root = %root.display(),
            habits = habits.len(),
            challenges = challenges.len(),
            "opened json store"
        );
        Ok(Self {
            root,
            collections: Mutex::new(Collections::from_lists(habits, challenges)),
        })
    }

    fn mutate<T>(
        &self,
        apply: impl FnOnce(&mut Collections) -> Result<T, StoreError>,
    ) -> Result<T, StoreError> {
        let mut current = self.collections.lock();
        let mut next = current.clone();
        let value = apply(&mut next)?;
        self.persist(&current, &next)?;
        *current = next;
        Ok(value)
    }

    fn persist(&self, current: &Collections, next: &Collections) -> Result<(), StoreError> {
        let mut pending = Vec::with_capacity(2);
        if next.habits != current.habits {
            let habits: Vec<&Habit> = next.habits.values().collect();
            pending.push((HABITS_FILE, serde_json::to_string_pretty(&habits)?));
        }
        if next.challenges != current.challenges {
            let challenges: Vec<&Challenge> = next.challenges.values().collect();
            pending.push((CHALLENGES_FILE, serde_json::to_string_pretty(&challenges)?));
        }
        for (name, contents) in pending {
            self.replace_file(name, &contents)?;
        }
        Ok(())
    }

    fn replace_file(&self, name: &str, contents: &str) -> Result<(), StoreError> {
        let mut file = NamedTempFile::new_in(&self.root)?;
        file.write_all(contents.as_bytes())?;
        file.as_file().sync_all()?;
        file.persist(self.root.join(name)).map_err(|err| err.error)?;
        Ok(())
    }
}

fn read_collection<T: DeserializeOwned>(path: &Path) -> Result<Vec<T>, StoreError> {
    if !path.exists() {
        return Ok(Vec::new());
    }
    let raw = fs::read_to_string(path)?;
    if raw.trim().is_empty() {
        return Ok(Vec::new());
    }
    Ok(serde_json::from_str(&raw)?)
}

#[async_trait::async_trait]
impl EntityStore for JsonFileStore {
    async fn load_habit(&self, id: &EntityId) -> Result<Option<Habit>, StoreError> {
        Ok(self.collections.lock().habits.get(id).cloned())
    }

    async fn load_challenge(&self, id: &EntityId) -> Result<Option<Challenge>, StoreError> {
        Ok(self.collections.lock().challenges.get(id).cloned())
    }

    async fn append_completion(
        &self,
        key: &EntityKey,
        day: DateKey,
        completed_at: DateTime<Utc>,
        derived: DerivedState,
    ) -> Result<(), StoreError> {
        self.mutate(|c| c.append_completion(key, day, completed_at, derived))
    }

    async fn create_habit(
        &self,
        habit: NewHabit,
        created_at: DateTime<Utc>,
    ) -> Result<Habit, StoreError> {
        self.mutate(|c| Ok(c.create_habit(habit, created_at)))
    }

    async fn create_challenge(
        &self,
        challenge: NewChallenge,
        created_at: DateTime<Utc>,
    ) -> Result<Challenge, StoreError> {
        self.mutate(|c| Ok(c.create_challenge(challenge, created_at)))
    }

    async fn set_archived(&self, id: &EntityId, at: DateTime<Utc>) -> Result<(), StoreError> {
        self.mutate(|c| c.set_archived(id, at))
    }

    async fn update_derived(
        &self,
        key: &EntityKey,
        derived: DerivedState,
    ) -> Result<(), StoreError> {
        self.mutate(|c| c.update_derived(key, derived))
    }

    async fn replace_challenge(&self, challenge: Challenge) -> Result<(), StoreError> {
        self.mutate(|c| c.replace_challenge(challenge))
    }

    async fn list_habits(&self) -> Result<Vec<Habit>, StoreError> {
        Ok(self.collections.lock().habits.values().cloned().collect())
    }

    async fn list_challenges(&self) -> Result<Vec<Challenge>, StoreError> {
        Ok(self.collections.lock().challenges.values().cloned().collect())
    }
}
