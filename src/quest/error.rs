//! Quest Errors
//!
//! Every failure in the quest core is a local, recoverable condition that is
//! handed back to the caller. Nothing here aborts a player session.

use std::path::{Path, PathBuf};

use thiserror::Error;

/// Errors returned by catalog and quest log operations
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum QuestError {
    /// Unknown quest id, or a handle whose definition was reloaded away
    #[error("quest {0} not found")]
    NotFound(u32),

    #[error("already on quest {0}")]
    AlreadyOnQuest(u32),

    #[error("quest log is full")]
    LogFull,

    /// Gating failed or the definition is inactive
    #[error("not eligible for quest {0}")]
    NotEligible(u32),

    #[error("quest {0} is not complete")]
    NotComplete(u32),

    #[error("quest {0} is deactivated")]
    Inactive(u32),

    /// Another timed quest is already running
    #[error("only one timed quest at a time (rejected {0})")]
    OnlyOneTimed(u32),

    /// No open quest log for this player
    #[error("no quest session for player {0}")]
    NoSession(u64),

    #[error("invalid reward choice {choice} for quest {quest_id}")]
    InvalidChoice { quest_id: u32, choice: usize },

    /// Malformed record or dangling reference; the quest is skipped
    #[error("failed to load quest {quest_id}: {reason}")]
    Load { quest_id: u32, reason: String },
}

impl QuestError {
    pub fn load(quest_id: u32, reason: impl Into<String>) -> Self {
        QuestError::Load {
            quest_id,
            reason: reason.into(),
        }
    }
}

/// Errors from reading quest data files
#[derive(Debug, Error)]
pub enum DataFileError {
    #[error("failed to read {path:?}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse {path:?}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },
}

impl DataFileError {
    pub fn path(&self) -> &Path {
        match self {
            DataFileError::Read { path, .. } | DataFileError::Parse { path, .. } => path,
        }
    }
}

/// Errors from the progress store
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("invalid counter column: {0}")]
    Counters(#[from] serde_json::Error),

    #[error("invalid stored row for quest {quest_id}: {reason}")]
    InvalidRow { quest_id: u32, reason: String },
}

/// Errors from reading the server configuration
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_messages() {
        assert_eq!(QuestError::LogFull.to_string(), "quest log is full");
        assert_eq!(
            QuestError::load(7, "dangling prev quest 9").to_string(),
            "failed to load quest 7: dangling prev quest 9"
        );
    }
}
