//! Quest Event Types
//!
//! Gameplay events that drive a player's quest log.

use serde::{Deserialize, Serialize};

use super::log::ProgressUpdate;
use super::reward::QuestReward;
use super::state::{FailReason, QuestStatus};

/// Events that can change quest state
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum QuestEvent {
    /// Player took a quest from a giver
    Accept { quest_id: u32 },

    /// Player looted or received an item
    ItemLooted { item_id: u32, count: u32 },

    /// An item left the player's inventory
    ItemRemoved { item_id: u32, count: u32 },

    /// Player killed a creature (positive entry)
    CreatureKilled { entry: u32 },

    /// Player used a game object (positive entry)
    GameObjectUsed { entry: u32 },

    /// Player cast a spell on an objective target
    SpellCast { spell_id: u32 },

    /// Player reached an exploration area or triggered the scripted event
    AreaExplored { quest_id: u32 },

    /// Time elapsed for timed quests
    Tick { elapsed_ms: u64 },

    /// Player died
    Died,

    /// Player turned a quest in at its ender
    TurnIn {
        quest_id: u32,
        player_level: u32,
        /// Index into the reward-choice items
        choice: Option<usize>,
    },

    /// Player abandoned a quest
    Abandon { quest_id: u32 },
}

impl QuestEvent {
    /// Get event type as string (for logging/debugging)
    pub fn event_type(&self) -> &'static str {
        match self {
            QuestEvent::Accept { .. } => "accept",
            QuestEvent::ItemLooted { .. } => "item_looted",
            QuestEvent::ItemRemoved { .. } => "item_removed",
            QuestEvent::CreatureKilled { .. } => "creature_killed",
            QuestEvent::GameObjectUsed { .. } => "game_object_used",
            QuestEvent::SpellCast { .. } => "spell_cast",
            QuestEvent::AreaExplored { .. } => "area_explored",
            QuestEvent::Tick { .. } => "tick",
            QuestEvent::Died => "died",
            QuestEvent::TurnIn { .. } => "turn_in",
            QuestEvent::Abandon { .. } => "abandon",
        }
    }
}

/// Result of processing a quest event
#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum QuestEventResult {
    Accepted { quest_id: u32, status: QuestStatus },
    Progress(Vec<ProgressUpdate>),
    Explored { quest_id: u32, status: QuestStatus },
    Failed { quest_ids: Vec<u32>, reason: FailReason },
    Rewarded(QuestReward),
    Abandoned { quest_id: u32 },
    NoChange,
}

impl QuestEventResult {
    pub fn is_change(&self) -> bool {
        match self {
            QuestEventResult::NoChange => false,
            QuestEventResult::Progress(updates) => !updates.is_empty(),
            QuestEventResult::Failed { quest_ids, .. } => !quest_ids.is_empty(),
            _ => true,
        }
    }
}
