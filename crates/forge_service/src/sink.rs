use forge_core::EntityId;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc::UnboundedSender;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "camelCase", rename_all_fields = "camelCase")]
pub enum ConversionOutcome {
    Converted {
        challenge_id: EntityId,
        habit_id: EntityId,
        attempts: u32,
    },
    Failed {
        challenge_id: EntityId,
        attempts: u32,
        reason: String,
    },
}

pub trait ConversionSink: Send + Sync {
    fn report(&self, outcome: ConversionOutcome);
}

impl ConversionSink for UnboundedSender<ConversionOutcome> {
    fn report(&self, outcome: ConversionOutcome) {
        if self.send(outcome).is_err() {
            tracing::debug!("conversion outcome dropped, receiver is gone");
        }
    }
}
