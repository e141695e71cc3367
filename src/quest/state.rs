//! Quest State Tracking
//!
//! Per-player, per-quest progress records and their persistence markers.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::definition::{Quest, QUEST_ITEM_OBJECTIVES_COUNT, QUEST_OBJECTIVES_COUNT};

/// Status of a quest for a player
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum QuestStatus {
    /// Not in the log
    None,
    /// Objectives done, ready to turn in
    Complete,
    Unavailable,
    Incomplete,
    /// Repeatable quest that can be taken again
    Available,
    Failed,
}

impl QuestStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            QuestStatus::None => "none",
            QuestStatus::Complete => "complete",
            QuestStatus::Unavailable => "unavailable",
            QuestStatus::Incomplete => "incomplete",
            QuestStatus::Available => "available",
            QuestStatus::Failed => "failed",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "none" => Some(QuestStatus::None),
            "complete" => Some(QuestStatus::Complete),
            "unavailable" => Some(QuestStatus::Unavailable),
            "incomplete" => Some(QuestStatus::Incomplete),
            "available" => Some(QuestStatus::Available),
            "failed" => Some(QuestStatus::Failed),
            _ => None,
        }
    }

    /// Wire value shared with clients
    pub fn as_u8(&self) -> u8 {
        match self {
            QuestStatus::None => 0,
            QuestStatus::Complete => 1,
            QuestStatus::Unavailable => 2,
            QuestStatus::Incomplete => 3,
            QuestStatus::Available => 4,
            QuestStatus::Failed => 5,
        }
    }
}

/// Whether a progress record must be written
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum QuestUpdateState {
    Unchanged,
    Changed,
    New,
}

/// Why a quest failed; supplied by the caller
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FailReason {
    /// Time limit ran out
    TimeLimit,
    /// Player died or escort target was lost
    StayAlive,
}

/// What a gameplay event progressed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ObjectiveTarget {
    Item(u32),
    /// Positive creature entry, negative game object entry
    CreatureOrObject(i32),
    /// Spell cast credited to the objective it is attached to
    Spell(u32),
}

/// Progress of one quest for one player
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QuestProgress {
    pub quest_id: u32,
    pub status: QuestStatus,
    pub rewarded: bool,
    pub explored: bool,
    /// Remaining milliseconds for a timed quest; 0 when untimed or expired
    pub timer_ms: u32,
    pub item_counts: [u32; QUEST_ITEM_OBJECTIVES_COUNT],
    pub creature_counts: [u32; QUEST_OBJECTIVES_COUNT],
    pub accepted_at: Option<DateTime<Utc>>,
    pub rewarded_at: Option<DateTime<Utc>>,
    update_state: QuestUpdateState,
    /// Bumped on every mutation so a finished write can tell if it is stale
    #[serde(skip)]
    revision: u64,
    /// A store may hold a row for this record
    #[serde(skip)]
    persisted: bool,
}

impl QuestProgress {
    pub fn new(quest_id: u32) -> Self {
        Self {
            quest_id,
            status: QuestStatus::None,
            rewarded: false,
            explored: false,
            timer_ms: 0,
            item_counts: [0; QUEST_ITEM_OBJECTIVES_COUNT],
            creature_counts: [0; QUEST_OBJECTIVES_COUNT],
            accepted_at: None,
            rewarded_at: None,
            update_state: QuestUpdateState::New,
            revision: 0,
            persisted: false,
        }
    }

    /// Rebuild a record read back from storage
    pub fn restored(mut self) -> Self {
        self.update_state = QuestUpdateState::Unchanged;
        self.persisted = true;
        self
    }

    pub fn update_state(&self) -> QuestUpdateState {
        self.update_state
    }

    pub fn revision(&self) -> u64 {
        self.revision
    }

    /// Handed to a write at least once, so removing it needs a delete
    pub fn is_persisted(&self) -> bool {
        self.persisted
    }

    pub(crate) fn mark_persisted(&mut self) {
        self.persisted = true;
    }

    pub fn is_dirty(&self) -> bool {
        self.update_state != QuestUpdateState::Unchanged
    }

    /// Record a mutation; a record not yet written stays NEW
    pub(crate) fn mark_changed(&mut self) {
        if self.update_state != QuestUpdateState::New {
            self.update_state = QuestUpdateState::Changed;
        }
        self.revision += 1;
    }

    /// Called by the store once the write for `revision` succeeded
    pub(crate) fn mark_saved(&mut self, revision: u64) -> bool {
        if self.revision != revision {
            return false;
        }
        self.update_state = QuestUpdateState::Unchanged;
        true
    }

    pub(crate) fn reset_counters(&mut self) {
        self.item_counts = [0; QUEST_ITEM_OBJECTIVES_COUNT];
        self.creature_counts = [0; QUEST_OBJECTIVES_COUNT];
        self.explored = false;
        self.timer_ms = 0;
    }

    /// Every populated objective has reached its required count
    pub fn objectives_satisfied(&self, quest: &Quest) -> bool {
        let objectives = quest.objectives();

        let items_done = objectives
            .items
            .iter()
            .enumerate()
            .all(|(i, slot)| self.item_counts[i] >= slot.count);
        let creatures_done = objectives
            .creatures
            .iter()
            .enumerate()
            .all(|(i, slot)| self.creature_counts[i] >= slot.count);
        let explored = !quest.requires_exploration() || self.explored;

        items_done && creatures_done && explored
    }

    /// True when the record is a valid combination for its definition
    pub fn is_consistent(&self, quest: &Quest) -> bool {
        let objectives = quest.objectives();

        let items_capped = self.item_counts.iter().enumerate().all(|(i, &count)| {
            count <= objectives.items.get(i).map_or(0, |slot| slot.count)
        });
        let creatures_capped = self.creature_counts.iter().enumerate().all(|(i, &count)| {
            count <= objectives.creatures.get(i).map_or(0, |slot| slot.count)
        });
        let complete_ok = self.status != QuestStatus::Complete
            || quest.is_auto_complete()
            || self.objectives_satisfied(quest);

        items_capped && creatures_capped && complete_ok
    }

    /// Serialize counters to JSON for database storage
    pub fn counters_to_json(&self) -> Result<(String, String), serde_json::Error> {
        Ok((
            serde_json::to_string(&self.item_counts)?,
            serde_json::to_string(&self.creature_counts)?,
        ))
    }
}
