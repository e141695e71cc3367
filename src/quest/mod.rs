//! Quest System Module
//!
//! Immutable quest definitions published through a reloadable catalog, and the
//! per-player quest log state machine that gameplay events drive.

pub mod catalog;
pub mod definition;
pub mod error;
pub mod events;
pub mod flags;
pub mod log;
pub mod reward;
pub mod sessions;
pub mod state;

pub use catalog::{CatalogSnapshot, HotReloadEvent, LoadReport, QuestCatalog, QuestRef};
pub use definition::{Quest, QuestBuilder, QuestFlags, RawQuestRecord, SpecialFlags, MAX_QUEST_LOG_SIZE};
pub use error::{DataFileError, QuestError};
pub use events::{QuestEvent, QuestEventResult};
pub use log::{EligibilityCheck, PendingWrites, PreValidated, ProgressUpdate, QuestLog, ResetPeriod};
pub use reward::{QuestReward, RewardCalculator, RewardSettings};
pub use sessions::QuestSessions;
pub use state::{FailReason, ObjectiveTarget, QuestProgress, QuestStatus, QuestUpdateState};
