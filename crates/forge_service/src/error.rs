use forge_core::{DateKey, EntityKey, EntityKind, ValidationError};

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("{key} already has a completion on {day}")]
    Conflict { key: EntityKey, day: DateKey },
    #[error("{0} does not exist")]
    NotFound(EntityKey),
    #[error("{key} cannot take {derived} counters")]
    KindMismatch { key: EntityKey, derived: EntityKind },
    #[error("store I/O failed: {0}")]
    Io(#[from] std::io::Error),
    #[error("store document is malformed: {0}")]
    Serialization(#[from] serde_json::Error),
}

#[derive(Debug, thiserror::Error)]
pub enum TrackerError {
    #[error("{key} was already completed on {day}")]
    DuplicateCompletion { key: EntityKey, day: DateKey },
    #[error("a completion for {0} is already in progress")]
    OperationInProgress(EntityKey),
    #[error("{0} does not exist")]
    EntityNotFound(EntityKey),
    #[error("converting challenge `{challenge_id}` failed after {attempts} attempt(s): {reason}")]
    ConversionFailure {
        challenge_id: forge_core::EntityId,
        attempts: u32,
        reason: String,
    },
    #[error(transparent)]
    Validation(#[from] ValidationError),
    #[error(transparent)]
    Store(StoreError),
    #[error("the tracker must be built inside a tokio runtime")]
    Runtime,
}

impl From<StoreError> for TrackerError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::NotFound(key) => Self::EntityNotFound(key),
            StoreError::Conflict { key, day } => Self::DuplicateCompletion { key, day },
            other => Self::Store(other),
        }
    }
}

pub type Result<T, E = TrackerError> = std::result::Result<T, E>;

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use forge_core::EntityId;

    #[test]
    fn store_conflicts_surface_as_duplicates() {
        let key = EntityKey::habit(EntityId::new("h1"));
        let day = DateKey::new(NaiveDate::from_ymd_opt(2024, 1, 3).unwrap());
        let err = TrackerError::from(StoreError::Conflict {
            key: key.clone(),
            day,
        });
        assert!(matches!(err, TrackerError::DuplicateCompletion { .. }));
        assert_eq!(
            err.to_string(),
            "habit `h1` was already completed on 2024-01-03"
        );

        let missing = TrackerError::from(StoreError::NotFound(key));
        assert!(matches!(missing, TrackerError::EntityNotFound(_)));
    }

    #[test]
    fn io_failures_stay_store_errors() {
        let io = std::io::Error::new(std::io::ErrorKind::Other, "disk full");
        let err = TrackerError::from(StoreError::from(io));
        assert!(matches!(err, TrackerError::Store(StoreError::Io(_))));
    }
}
