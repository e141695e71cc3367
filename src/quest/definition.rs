//! Quest Definition Structures
//!
//! Raw records are deserialized from TOML quest files. A [`QuestBuilder`]
//! turns one record into an immutable [`Quest`], which the catalog shares
//! behind an `Arc` for the lifetime of one catalog generation.

use std::ops::{BitOr, BitOrAssign};
use std::sync::atomic::{AtomicBool, Ordering};

use serde::{Deserialize, Serialize};
use tracing::warn;

use super::catalog::QuestRef;
use super::error::QuestError;
use super::flags;

pub const MAX_QUEST_LOG_SIZE: usize = 25;

pub const QUEST_OBJECTIVES_COUNT: usize = 4;
pub const QUEST_ITEM_OBJECTIVES_COUNT: usize = QUEST_OBJECTIVES_COUNT;
pub const QUEST_SOURCE_ITEM_IDS_COUNT: usize = 4;
pub const QUEST_REWARD_CHOICES_COUNT: usize = 6;
pub const QUEST_REWARDS_COUNT: usize = 4;
pub const QUEST_REPUTATIONS_COUNT: usize = 5;
pub const QUEST_EMOTE_COUNT: usize = 4;

/// Quest method 0 completes on accept without objectives
pub const QUEST_METHOD_AUTO_COMPLETE: u32 = 0;
pub const QUEST_METHOD_DEFAULT: u32 = 2;

// ============================================================================
// Raw Record (as it appears in TOML)
// ============================================================================

/// A quest data file: any number of `[[quest]]` tables
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RawQuestFile {
    #[serde(default)]
    pub quest: Vec<RawQuestRecord>,
}

/// One quest record, field by field
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct RawQuestRecord {
    pub entry: u32,
    #[serde(default = "default_method")]
    pub method: u32,
    pub zone_or_sort: i32,
    pub min_level: u32,
    pub max_level: u32,
    pub quest_level: i32,
    #[serde(rename = "type")]
    pub quest_type: u32,
    pub required_classes: u32,
    pub required_races: u32,
    pub required_skill: u32,
    pub required_skill_value: u32,
    pub required_condition: u32,
    pub rep_objective_faction: u32,
    pub rep_objective_value: i32,
    pub required_min_rep_faction: u32,
    pub required_min_rep_value: i32,
    pub required_max_rep_faction: u32,
    pub required_max_rep_value: i32,
    pub suggested_players: u32,
    /// Seconds; 0 means untimed
    pub limit_time: u32,
    pub quest_flags: u32,
    pub special_flags: u32,
    pub char_title_id: u32,
    pub prev_quest_id: i32,
    pub next_quest_id: i32,
    pub exclusive_group: i32,
    pub breadcrumb_for_quest_id: u32,
    pub next_quest_in_chain: u32,
    pub src_item_id: u32,
    pub src_item_count: u32,
    pub src_spell: u32,
    pub title: String,
    pub details: String,
    pub objectives: String,
    pub offer_reward_text: String,
    pub request_items_text: String,
    pub end_text: String,
    pub objective_text: Vec<String>,
    pub req_item_id: Vec<u32>,
    pub req_item_count: Vec<u32>,
    pub req_source_id: Vec<u32>,
    pub req_source_count: Vec<u32>,
    /// >0 creature, <0 game object
    pub req_creature_or_go_id: Vec<i32>,
    pub req_creature_or_go_count: Vec<u32>,
    pub req_spell: Vec<u32>,
    pub rew_choice_item_id: Vec<u32>,
    pub rew_choice_item_count: Vec<u32>,
    pub rew_item_id: Vec<u32>,
    pub rew_item_count: Vec<u32>,
    pub rew_rep_faction: Vec<u32>,
    pub rew_rep_value: Vec<i32>,
    pub rew_max_rep_value: Vec<i32>,
    pub rew_honorable_kills: u32,
    /// Negative values cost money instead of paying it
    pub rew_or_req_money: i32,
    pub rew_money_max_level: u32,
    pub rew_spell: u32,
    pub rew_spell_cast: u32,
    pub rew_mail_template_id: u32,
    pub rew_mail_delay_secs: u32,
    pub point_map_id: u32,
    pub point_x: f32,
    pub point_y: f32,
    pub point_opt: u32,
    pub details_emote: Vec<u32>,
    pub details_emote_delay: Vec<u32>,
    pub offer_reward_emote: Vec<u32>,
    pub offer_reward_emote_delay: Vec<u32>,
    pub incomplete_emote: u32,
    pub incomplete_emote_delay: u32,
    pub complete_emote: u32,
    pub complete_emote_delay: u32,
    pub start_script: u32,
    pub complete_script: u32,
    pub reputation_spillover_mask: u32,
}

fn default_method() -> u32 {
    QUEST_METHOD_DEFAULT
}

impl RawQuestRecord {
    /// Empty record with the default (non auto-complete) method
    pub fn new(entry: u32) -> Self {
        Self {
            entry,
            method: QUEST_METHOD_DEFAULT,
            ..Default::default()
        }
    }
}

// ============================================================================
// Flags
// ============================================================================

/// Quest types, from the client's quest info table
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum QuestType {
    Elite,
    Life,
    Pvp,
    Raid,
    Dungeon,
    WorldEvent,
    Legendary,
    Escort,
    Heroic,
}

impl QuestType {
    pub fn from_u32(value: u32) -> Option<Self> {
        match value {
            1 => Some(QuestType::Elite),
            21 => Some(QuestType::Life),
            41 => Some(QuestType::Pvp),
            62 => Some(QuestType::Raid),
            81 => Some(QuestType::Dungeon),
            82 => Some(QuestType::WorldEvent),
            83 => Some(QuestType::Legendary),
            84 => Some(QuestType::Escort),
            85 => Some(QuestType::Heroic),
            _ => None,
        }
    }

    pub fn as_u32(&self) -> u32 {
        match self {
            QuestType::Elite => 1,
            QuestType::Life => 21,
            QuestType::Pvp => 41,
            QuestType::Raid => 62,
            QuestType::Dungeon => 81,
            QuestType::WorldEvent => 82,
            QuestType::Legendary => 83,
            QuestType::Escort => 84,
            QuestType::Heroic => 85,
        }
    }
}

/// Database-sourced quest flags, also sent to clients
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct QuestFlags(u32);

impl QuestFlags {
    pub const NONE: Self = Self(0x0000);
    /// Failed on death
    pub const STAY_ALIVE: Self = Self(0x0001);
    pub const PARTY_ACCEPT: Self = Self(0x0002);
    pub const EXPLORATION: Self = Self(0x0004);
    pub const SHARABLE: Self = Self(0x0008);
    pub const EPIC: Self = Self(0x0020);
    pub const RAID: Self = Self(0x0040);
    pub const TBC: Self = Self(0x0080);
    pub const NO_MONEY_FROM_XP: Self = Self(0x0100);
    pub const HIDDEN_REWARDS: Self = Self(0x0200);
    /// Rewarded on completion, never shown in the client's log
    pub const AUTO_REWARDED: Self = Self(0x0400);
    pub const TBC_RACES: Self = Self(0x0800);
    pub const DAILY: Self = Self(0x1000);
    pub const FLAGS_PVP: Self = Self(0x2000);
    pub const UNAVAILABLE: Self = Self(0x4000);
    pub const WEEKLY: Self = Self(0x8000);

    pub const fn from_bits(bits: u32) -> Self {
        Self(bits)
    }

    pub const fn bits(self) -> u32 {
        self.0
    }

    pub const fn contains(self, other: Self) -> bool {
        self.0 & other.0 == other.0
    }

    pub const fn intersects(self, other: Self) -> bool {
        self.0 & other.0 != 0
    }
}

impl BitOr for QuestFlags {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self {
        Self(self.0 | rhs.0)
    }
}

/// Server-side classification flags.
///
/// The low three bits may come from the database. The rest are computed by
/// [`flags::derive_objective_flags`] at load and cannot be set from a record.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct SpecialFlags(u32);

impl SpecialFlags {
    pub const NONE: Self = Self(0x000);
    pub const REPEATABLE: Self = Self(0x001);
    /// Area explore, quest-complete spell or scripted event
    pub const EXPLORATION_OR_EVENT: Self = Self(0x002);
    pub const MONTHLY: Self = Self(0x004);
    pub const DELIVER: Self = Self(0x008);
    pub const SPEAKTO: Self = Self(0x010);
    pub const KILL_OR_CAST: Self = Self(0x020);
    pub const TIMED: Self = Self(0x040);

    pub const DB_ALLOWED: Self =
        Self(Self::REPEATABLE.0 | Self::EXPLORATION_OR_EVENT.0 | Self::MONTHLY.0);

    /// Keeps only the bits a record may carry; returns the rejected remainder
    pub const fn from_db(raw: u32) -> (Self, u32) {
        (Self(raw & Self::DB_ALLOWED.0), raw & !Self::DB_ALLOWED.0)
    }

    pub const fn bits(self) -> u32 {
        self.0
    }

    pub const fn contains(self, other: Self) -> bool {
        self.0 & other.0 == other.0
    }
}

impl BitOr for SpecialFlags {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self {
        Self(self.0 | rhs.0)
    }
}

impl BitOrAssign for SpecialFlags {
    fn bitor_assign(&mut self, rhs: Self) {
        self.0 |= rhs.0;
    }
}

// ============================================================================
// Fixed-capacity slot arrays
// ============================================================================

/// An entry in a fixed-capacity array whose populated prefix ends at the
/// first empty entry
pub trait Slot: Copy + Default {
    fn is_empty(&self) -> bool;
}

/// Fixed array plus the length of its populated prefix, counted once at load
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Slots<T, const N: usize> {
    entries: [T; N],
    len: usize,
}

impl<T: Slot, const N: usize> Slots<T, N> {
    pub const CAPACITY: usize = N;

    /// Counts entries up to (not including) the first empty one
    pub fn scan(entries: [T; N]) -> Self {
        let len = entries.iter().position(Slot::is_empty).unwrap_or(N);
        Self { entries, len }
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// The populated prefix
    pub fn as_slice(&self) -> &[T] {
        &self.entries[..self.len]
    }

    pub fn iter(&self) -> std::slice::Iter<'_, T> {
        self.as_slice().iter()
    }

    /// Slot within the populated prefix
    pub fn get(&self, index: usize) -> Option<&T> {
        self.as_slice().get(index)
    }

    /// Every entry including any after the terminator
    pub fn raw(&self) -> &[T; N] {
        &self.entries
    }
}

impl<T: Slot, const N: usize> Default for Slots<T, N> {
    fn default() -> Self {
        Self::scan([T::default(); N])
    }
}

/// Item id and count (requirements, source items, rewards)
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ItemSlot {
    pub item_id: u32,
    pub count: u32,
}

impl Slot for ItemSlot {
    fn is_empty(&self) -> bool {
        self.item_id == 0
    }
}

/// Creature (positive) or game object (negative) objective
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CreatureSlot {
    pub target: i32,
    pub count: u32,
    /// Spell that must be cast on the target instead of killing it
    pub spell: u32,
}

impl CreatureSlot {
    pub fn is_game_object(&self) -> bool {
        self.target < 0
    }
}

impl Slot for CreatureSlot {
    fn is_empty(&self) -> bool {
        self.target == 0
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReputationSlot {
    pub faction: u32,
    pub value: i32,
    pub max_value: i32,
}

impl Slot for ReputationSlot {
    fn is_empty(&self) -> bool {
        self.faction == 0
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct EmoteSlot {
    pub emote: u32,
    pub delay: u32,
}

impl Slot for EmoteSlot {
    fn is_empty(&self) -> bool {
        self.emote == 0
    }
}

// ============================================================================
// Resolved Quest Structures
// ============================================================================

/// Data an external eligibility checker gates on
#[derive(Debug, Clone, Default)]
pub struct QuestRequirements {
    pub classes: u32,
    pub races: u32,
    pub skill: u32,
    pub skill_value: u32,
    pub condition: u32,
    pub rep_objective_faction: u32,
    pub rep_objective_value: i32,
    pub min_rep_faction: u32,
    pub min_rep_value: i32,
    pub max_rep_faction: u32,
    pub max_rep_value: i32,
    pub suggested_players: u32,
}

/// Chain links from the record plus the reverse links computed by the catalog
#[derive(Debug, Clone, Default)]
pub struct QuestChain {
    pub prev_quest_id: i32,
    pub next_quest_id: i32,
    pub exclusive_group: i32,
    pub breadcrumb_for: u32,
    pub next_in_chain: u32,
    /// Negative id: that quest must NOT have been completed
    pub prev_quests: Vec<i32>,
    pub prev_chain_quests: Vec<u32>,
    pub dependent_breadcrumbs: Vec<u32>,
}

/// Item and spell handed to the player on accept
#[derive(Debug, Clone, Copy, Default)]
pub struct SourceGrant {
    pub item_id: u32,
    pub item_count: u32,
    pub spell: u32,
}

#[derive(Debug, Clone, Default)]
pub struct QuestText {
    pub title: String,
    pub details: String,
    pub objectives: String,
    pub offer_reward: String,
    pub request_items: String,
    pub end: String,
    pub objective_text: [String; QUEST_OBJECTIVES_COUNT],
}

#[derive(Debug, Clone, Default)]
pub struct QuestObjectives {
    pub items: Slots<ItemSlot, QUEST_ITEM_OBJECTIVES_COUNT>,
    pub sources: Slots<ItemSlot, QUEST_SOURCE_ITEM_IDS_COUNT>,
    pub creatures: Slots<CreatureSlot, QUEST_OBJECTIVES_COUNT>,
}

#[derive(Debug, Clone, Default)]
pub struct QuestRewards {
    pub choice_items: Slots<ItemSlot, QUEST_REWARD_CHOICES_COUNT>,
    pub items: Slots<ItemSlot, QUEST_REWARDS_COUNT>,
    pub reputation: Slots<ReputationSlot, QUEST_REPUTATIONS_COUNT>,
    pub honorable_kills: u32,
    pub or_req_money: i32,
    pub money_max_level: u32,
    pub spell: u32,
    pub spell_cast: u32,
    pub mail_template_id: u32,
    pub mail_delay_secs: u32,
}

/// Where the quest is turned in
#[derive(Debug, Clone, Copy, Default)]
pub struct QuestPoint {
    pub map_id: u32,
    pub x: f32,
    pub y: f32,
    pub opt: u32,
}

#[derive(Debug, Clone, Default)]
pub struct QuestEmotes {
    pub incomplete: u32,
    pub incomplete_delay: u32,
    pub complete: u32,
    pub complete_delay: u32,
    pub details: Slots<EmoteSlot, QUEST_EMOTE_COUNT>,
    pub offer_reward: Slots<EmoteSlot, QUEST_EMOTE_COUNT>,
}

/// A fully resolved, immutable quest definition.
///
/// Only [`QuestBuilder::build`] creates one. The activation toggle is the
/// single piece of state that can change after construction.
#[derive(Debug)]
pub struct Quest {
    id: u32,
    method: u32,
    zone_or_sort: i32,
    min_level: u32,
    max_level: u32,
    quest_level: i32,
    quest_type: u32,
    requirements: QuestRequirements,
    limit_time: u32,
    quest_flags: QuestFlags,
    special_flags: SpecialFlags,
    chain: QuestChain,
    source: SourceGrant,
    char_title_id: u32,
    text: QuestText,
    objectives: QuestObjectives,
    rewards: QuestRewards,
    point: QuestPoint,
    emotes: QuestEmotes,
    start_script: u32,
    complete_script: u32,
    reputation_spillover_mask: u32,
    generation: u64,
    active: AtomicBool,
}

impl Quest {
    pub fn id(&self) -> u32 {
        self.id
    }

    pub fn method(&self) -> u32 {
        self.method
    }

    pub fn zone_or_sort(&self) -> i32 {
        self.zone_or_sort
    }

    pub fn min_level(&self) -> u32 {
        self.min_level
    }

    pub fn max_level(&self) -> u32 {
        self.max_level
    }

    /// Negative or zero means the quest scales to the player
    pub fn quest_level(&self) -> i32 {
        self.quest_level
    }

    pub fn quest_type(&self) -> u32 {
        self.quest_type
    }

    pub fn kind(&self) -> Option<QuestType> {
        QuestType::from_u32(self.quest_type)
    }

    pub fn requirements(&self) -> &QuestRequirements {
        &self.requirements
    }

    /// Seconds; 0 means untimed
    pub fn limit_time(&self) -> u32 {
        self.limit_time
    }

    pub fn quest_flags(&self) -> QuestFlags {
        self.quest_flags
    }

    pub fn has_quest_flag(&self, flag: QuestFlags) -> bool {
        self.quest_flags.intersects(flag)
    }

    pub fn special_flags(&self) -> SpecialFlags {
        self.special_flags
    }

    pub fn has_special_flag(&self, flag: SpecialFlags) -> bool {
        self.special_flags.contains(flag)
    }

    pub fn chain(&self) -> &QuestChain {
        &self.chain
    }

    pub fn source(&self) -> &SourceGrant {
        &self.source
    }

    pub fn char_title_id(&self) -> u32 {
        self.char_title_id
    }

    pub fn text(&self) -> &QuestText {
        &self.text
    }

    pub fn objectives(&self) -> &QuestObjectives {
        &self.objectives
    }

    pub fn rewards(&self) -> &QuestRewards {
        &self.rewards
    }

    pub fn point(&self) -> &QuestPoint {
        &self.point
    }

    pub fn emotes(&self) -> &QuestEmotes {
        &self.emotes
    }

    pub fn start_script(&self) -> u32 {
        self.start_script
    }

    pub fn complete_script(&self) -> u32 {
        self.complete_script
    }

    pub fn reputation_spillover_mask(&self) -> u32 {
        self.reputation_spillover_mask
    }

    pub fn req_items_count(&self) -> usize {
        self.objectives.items.len()
    }

    pub fn req_creature_or_go_count(&self) -> usize {
        self.objectives.creatures.len()
    }

    pub fn rew_choice_items_count(&self) -> usize {
        self.rewards.choice_items.len()
    }

    pub fn rew_items_count(&self) -> usize {
        self.rewards.items.len()
    }

    pub fn details_emote_count(&self) -> usize {
        self.emotes.details.len()
    }

    pub fn is_repeatable(&self) -> bool {
        self.has_special_flag(SpecialFlags::REPEATABLE)
    }

    pub fn is_auto_complete(&self) -> bool {
        self.method == QUEST_METHOD_AUTO_COMPLETE
    }

    pub fn is_daily(&self) -> bool {
        self.has_quest_flag(QuestFlags::DAILY)
    }

    pub fn is_weekly(&self) -> bool {
        self.has_quest_flag(QuestFlags::WEEKLY)
    }

    pub fn is_monthly(&self) -> bool {
        self.has_special_flag(SpecialFlags::MONTHLY)
    }

    pub fn is_daily_or_weekly(&self) -> bool {
        self.has_quest_flag(QuestFlags::DAILY | QuestFlags::WEEKLY)
    }

    pub fn is_timed(&self) -> bool {
        self.has_special_flag(SpecialFlags::TIMED)
    }

    pub fn requires_exploration(&self) -> bool {
        self.has_special_flag(SpecialFlags::EXPLORATION_OR_EVENT)
    }

    pub fn is_active(&self) -> bool {
        self.active.load(Ordering::Acquire)
    }

    pub(crate) fn set_active(&self, state: bool) {
        self.active.store(state, Ordering::Release);
    }

    /// Catalog generation this definition was built in
    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Non-owning handle that stops resolving once this definition is reloaded away
    pub fn handle(&self) -> QuestRef {
        QuestRef::new(self.id, self.generation)
    }
}

// ============================================================================
// Builder
// ============================================================================

/// One-shot builder: validated from a record, linked by the catalog, then
/// consumed into an immutable [`Quest`]
#[derive(Debug)]
pub struct QuestBuilder {
    quest: Quest,
    db_special_flags: u32,
}

impl QuestBuilder {
    /// Validate a raw record. Arrays longer than their capacity are rejected.
    pub fn from_record(raw: &RawQuestRecord) -> Result<Self, QuestError> {
        let id = raw.entry;
        if id == 0 {
            return Err(QuestError::load(0, "quest entry 0 is reserved"));
        }

        if raw.objective_text.len() > QUEST_OBJECTIVES_COUNT {
            return Err(capacity_error(id, "objective_text", raw.objective_text.len(), QUEST_OBJECTIVES_COUNT));
        }

        let objectives = QuestObjectives {
            items: item_slots(id, "req_item", &raw.req_item_id, &raw.req_item_count)?,
            sources: item_slots(id, "req_source", &raw.req_source_id, &raw.req_source_count)?,
            creatures: {
                let targets: [i32; QUEST_OBJECTIVES_COUNT] =
                    fill(id, "req_creature_or_go_id", &raw.req_creature_or_go_id)?;
                let counts: [u32; QUEST_OBJECTIVES_COUNT] =
                    fill(id, "req_creature_or_go_count", &raw.req_creature_or_go_count)?;
                let spells: [u32; QUEST_OBJECTIVES_COUNT] = fill(id, "req_spell", &raw.req_spell)?;
                Slots::scan(std::array::from_fn(|i| CreatureSlot {
                    target: targets[i],
                    count: counts[i],
                    spell: spells[i],
                }))
            },
        };

        for slot in objectives.items.iter().filter(|s| s.count == 0) {
            warn!("Quest {} requires item {} with count 0", id, slot.item_id);
        }

        if raw.max_level > 0 && raw.min_level > raw.max_level {
            warn!(
                "Quest {} has min_level {} above max_level {}",
                id, raw.min_level, raw.max_level
            );
        }

        let rewards = QuestRewards {
            choice_items: item_slots(id, "rew_choice_item", &raw.rew_choice_item_id, &raw.rew_choice_item_count)?,
            items: item_slots(id, "rew_item", &raw.rew_item_id, &raw.rew_item_count)?,
            reputation: {
                let factions: [u32; QUEST_REPUTATIONS_COUNT] = fill(id, "rew_rep_faction", &raw.rew_rep_faction)?;
                let values: [i32; QUEST_REPUTATIONS_COUNT] = fill(id, "rew_rep_value", &raw.rew_rep_value)?;
                let caps: [i32; QUEST_REPUTATIONS_COUNT] = fill(id, "rew_max_rep_value", &raw.rew_max_rep_value)?;
                Slots::scan(std::array::from_fn(|i| ReputationSlot {
                    faction: factions[i],
                    value: values[i],
                    max_value: caps[i],
                }))
            },
            honorable_kills: raw.rew_honorable_kills,
            or_req_money: raw.rew_or_req_money,
            money_max_level: raw.rew_money_max_level,
            spell: raw.rew_spell,
            spell_cast: raw.rew_spell_cast,
            mail_template_id: raw.rew_mail_template_id,
            mail_delay_secs: raw.rew_mail_delay_secs,
        };

        let emotes = QuestEmotes {
            incomplete: raw.incomplete_emote,
            incomplete_delay: raw.incomplete_emote_delay,
            complete: raw.complete_emote,
            complete_delay: raw.complete_emote_delay,
            details: emote_slots(id, "details_emote", &raw.details_emote, &raw.details_emote_delay)?,
            offer_reward: emote_slots(id, "offer_reward_emote", &raw.offer_reward_emote, &raw.offer_reward_emote_delay)?,
        };

        let quest = Quest {
            id,
            method: raw.method,
            zone_or_sort: raw.zone_or_sort,
            min_level: raw.min_level,
            max_level: raw.max_level,
            quest_level: raw.quest_level,
            quest_type: raw.quest_type,
            requirements: QuestRequirements {
                classes: raw.required_classes,
                races: raw.required_races,
                skill: raw.required_skill,
                skill_value: raw.required_skill_value,
                condition: raw.required_condition,
                rep_objective_faction: raw.rep_objective_faction,
                rep_objective_value: raw.rep_objective_value,
                min_rep_faction: raw.required_min_rep_faction,
                min_rep_value: raw.required_min_rep_value,
                max_rep_faction: raw.required_max_rep_faction,
                max_rep_value: raw.required_max_rep_value,
                suggested_players: raw.suggested_players,
            },
            limit_time: raw.limit_time,
            quest_flags: QuestFlags::from_bits(raw.quest_flags),
            special_flags: SpecialFlags::NONE,
            chain: QuestChain {
                prev_quest_id: raw.prev_quest_id,
                next_quest_id: raw.next_quest_id,
                exclusive_group: raw.exclusive_group,
                breadcrumb_for: raw.breadcrumb_for_quest_id,
                next_in_chain: raw.next_quest_in_chain,
                ..Default::default()
            },
            source: SourceGrant {
                item_id: raw.src_item_id,
                item_count: raw.src_item_count,
                spell: raw.src_spell,
            },
            char_title_id: raw.char_title_id,
            text: QuestText {
                title: raw.title.clone(),
                details: raw.details.clone(),
                objectives: raw.objectives.clone(),
                offer_reward: raw.offer_reward_text.clone(),
                request_items: raw.request_items_text.clone(),
                end: raw.end_text.clone(),
                objective_text: std::array::from_fn(|i| {
                    raw.objective_text.get(i).cloned().unwrap_or_default()
                }),
            },
            objectives,
            rewards,
            point: QuestPoint {
                map_id: raw.point_map_id,
                x: raw.point_x,
                y: raw.point_y,
                opt: raw.point_opt,
            },
            emotes,
            start_script: raw.start_script,
            complete_script: raw.complete_script,
            reputation_spillover_mask: raw.reputation_spillover_mask,
            generation: 0,
            active: AtomicBool::new(true),
        };

        Ok(Self {
            quest,
            db_special_flags: raw.special_flags,
        })
    }

    pub fn id(&self) -> u32 {
        self.quest.id
    }

    pub fn chain(&self) -> &QuestChain {
        &self.quest.chain
    }

    pub fn add_prev_quest(&mut self, quest_id: i32) {
        self.quest.chain.prev_quests.push(quest_id);
    }

    pub fn add_prev_chain_quest(&mut self, quest_id: u32) {
        self.quest.chain.prev_chain_quests.push(quest_id);
    }

    pub fn add_dependent_breadcrumb(&mut self, quest_id: u32) {
        self.quest.chain.dependent_breadcrumbs.push(quest_id);
    }

    pub fn active(mut self, state: bool) -> Self {
        self.quest.active = AtomicBool::new(state);
        self
    }

    /// Derive the special flags and freeze the definition
    pub fn build(mut self, generation: u64) -> Quest {
        self.quest.special_flags = flags::resolve_special_flags(
            self.quest.id,
            self.db_special_flags,
            self.quest.quest_flags,
            &self.quest.objectives,
            self.quest.limit_time,
        );
        self.quest.generation = generation;
        self.quest
    }
}

fn capacity_error(quest_id: u32, field: &str, len: usize, capacity: usize) -> QuestError {
    QuestError::load(
        quest_id,
        format!("{} has {} entries, capacity is {}", field, len, capacity),
    )
}

/// Copy a record list into a zero-padded fixed array
fn fill<T: Copy + Default, const N: usize>(
    quest_id: u32,
    field: &str,
    values: &[T],
) -> Result<[T; N], QuestError> {
    if values.len() > N {
        return Err(capacity_error(quest_id, field, values.len(), N));
    }
    let mut out = [T::default(); N];
    out[..values.len()].copy_from_slice(values);
    Ok(out)
}

fn item_slots<const N: usize>(
    quest_id: u32,
    field: &str,
    ids: &[u32],
    counts: &[u32],
) -> Result<Slots<ItemSlot, N>, QuestError> {
    let ids: [u32; N] = fill(quest_id, &format!("{}_id", field), ids)?;
    let counts: [u32; N] = fill(quest_id, &format!("{}_count", field), counts)?;
    Ok(Slots::scan(std::array::from_fn(|i| ItemSlot {
        item_id: ids[i],
        count: counts[i],
    })))
}

fn emote_slots(
    quest_id: u32,
    field: &str,
    emotes: &[u32],
    delays: &[u32],
) -> Result<Slots<EmoteSlot, QUEST_EMOTE_COUNT>, QuestError> {
    let emotes: [u32; QUEST_EMOTE_COUNT] = fill(quest_id, field, emotes)?;
    let delays: [u32; QUEST_EMOTE_COUNT] = fill(quest_id, &format!("{}_delay", field), delays)?;
    Ok(Slots::scan(std::array::from_fn(|i| EmoteSlot {
        emote: emotes[i],
        delay: delays[i],
    })))
}
