pub mod clock;
pub mod config;
pub mod conversion;
pub mod error;
pub mod file_store;
pub mod service;
pub mod sink;
pub mod store;

pub use crate::clock::{Clock, FixedClock, SystemClock};
pub use crate::config::ForgeConfig;
pub use crate::error::{Result, StoreError, TrackerError};
pub use crate::file_store::JsonFileStore;
pub use crate::service::{ForgeService, ForgeServiceBuilder};
pub use crate::sink::{ConversionOutcome, ConversionSink};
pub use crate::store::{DerivedState, EntityStore, InMemoryStore};
