//! Quest reward values.
//!
//! Computes what a quest pays out; granting it to the player is the caller's
//! job. Every function here is pure.
//!
//! Experience is derived from the max-level money value:
//! - full XP = money_max_level / divisor, divisor chosen by quest level
//! - full XP while the player is at most 5 levels above the quest
//! - then 80%, 60%, 40%, 20% per extra level, and a 10% floor after that

use serde::{Deserialize, Serialize};

use super::definition::{Quest, QuestFlags, QuestType};
use super::error::QuestError;

/// Divisor applied to the max-level money value for quests of at least `min_quest_level`
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LevelDivisor {
    pub min_quest_level: u32,
    pub divisor: f32,
}

/// XP multiplier while the player is at most `max_gap` levels above the quest
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GapBucket {
    pub max_gap: u32,
    pub multiplier: f32,
}

/// Level-difference bucket table for quest experience
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct XpCurve {
    pub level_divisors: Vec<LevelDivisor>,
    pub gap_buckets: Vec<GapBucket>,
    /// Multiplier once the gap is past every bucket
    pub floor_multiplier: f32,
}

impl Default for XpCurve {
    fn default() -> Self {
        let divisor = |min_quest_level, divisor| LevelDivisor { min_quest_level, divisor };
        let bucket = |max_gap, multiplier| GapBucket { max_gap, multiplier };
        Self {
            level_divisors: vec![
                divisor(65, 6.0),
                divisor(64, 4.8),
                divisor(63, 3.6),
                divisor(62, 2.4),
                divisor(61, 1.2),
                divisor(1, 0.6),
            ],
            gap_buckets: vec![
                bucket(5, 1.0),
                bucket(6, 0.8),
                bucket(7, 0.6),
                bucket(8, 0.4),
                bucket(9, 0.2),
            ],
            floor_multiplier: 0.1,
        }
    }
}

impl XpCurve {
    fn divisor(&self, quest_level: u32) -> Option<f32> {
        self.level_divisors
            .iter()
            .filter(|d| quest_level >= d.min_quest_level)
            .max_by_key(|d| d.min_quest_level)
            .map(|d| d.divisor)
    }

    fn multiplier(&self, gap: u32) -> f32 {
        self.gap_buckets
            .iter()
            .filter(|b| gap <= b.max_gap)
            .min_by_key(|b| b.max_gap)
            .map_or(self.floor_multiplier, |b| b.multiplier)
    }
}

/// Rates and limits the calculator applies
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RewardSettings {
    pub xp_rate: f32,
    pub money_rate: f32,
    pub max_player_level: u32,
    /// Allow every quest to progress inside a raid group
    pub ignore_raid_restriction: bool,
    pub xp_curve: XpCurve,
}

impl Default for RewardSettings {
    fn default() -> Self {
        Self {
            xp_rate: 1.0,
            money_rate: 1.0,
            max_player_level: 60,
            ignore_raid_restriction: false,
            xp_curve: XpCurve::default(),
        }
    }
}

/// An item handed out by a reward
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ItemGrant {
    pub item_id: u32,
    pub count: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReputationGrant {
    pub faction: u32,
    pub value: i32,
    /// Standing the reward will not push past; 0 for no cap
    pub max_value: i32,
}

/// Everything a quest pays out for one turn-in
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct QuestReward {
    pub quest_id: u32,
    pub xp: u32,
    /// Negative when the quest costs money
    pub money: i64,
    pub items: Vec<ItemGrant>,
    pub choice: Option<ItemGrant>,
    pub reputation: Vec<ReputationGrant>,
    pub spell: u32,
    pub spell_cast: u32,
    pub honorable_kills: u32,
    pub title_id: u32,
    pub mail_template_id: u32,
    pub mail_delay_secs: u32,
}

#[derive(Debug, Clone, Default)]
pub struct RewardCalculator {
    settings: RewardSettings,
}

impl RewardCalculator {
    pub fn new(settings: RewardSettings) -> Self {
        Self { settings }
    }

    pub fn settings(&self) -> &RewardSettings {
        &self.settings
    }

    /// Experience for turning `quest` in at `player_level`
    pub fn xp_value(&self, quest: &Quest, player_level: u32) -> u32 {
        let money_max_level = quest.rewards().money_max_level;
        if money_max_level == 0 {
            return 0;
        }

        // Non-positive quest levels scale with the player
        let quest_level = u32::try_from(quest.quest_level())
            .ok()
            .filter(|&level| level > 0)
            .unwrap_or(player_level);

        let curve = &self.settings.xp_curve;
        let Some(divisor) = curve.divisor(quest_level).filter(|&d| d > 0.0) else {
            return 0;
        };
        let full_xp = money_max_level as f32 / divisor;
        let gap = player_level.saturating_sub(quest_level);

        (full_xp * curve.multiplier(gap) * self.settings.xp_rate).ceil() as u32
    }

    /// Money paid (positive, rate-scaled) or required (negative, unscaled)
    pub fn rew_or_req_money(&self, quest: &Quest) -> i32 {
        let money = quest.rewards().or_req_money;
        if money <= 0 {
            return money;
        }
        (money as f32 * self.settings.money_rate) as i32
    }

    /// Money paid instead of experience at max level
    pub fn rew_money_max_level(&self, quest: &Quest) -> u32 {
        if quest.has_quest_flag(QuestFlags::NO_MONEY_FROM_XP) {
            return 0;
        }
        (quest.rewards().money_max_level as f32 * self.settings.money_rate) as u32
    }

    /// Whether the quest can be shared and progressed inside a raid group
    pub fn is_allowed_in_raid(&self, quest: &Quest) -> bool {
        quest.kind() == Some(QuestType::Raid) || self.settings.ignore_raid_restriction
    }

    /// Full payout. `choice` indexes the reward-choice items and is required
    /// when the quest offers any.
    pub fn compute(
        &self,
        quest: &Quest,
        player_level: u32,
        choice: Option<usize>,
    ) -> Result<QuestReward, QuestError> {
        let rewards = quest.rewards();

        let choice = match (rewards.choice_items.is_empty(), choice) {
            (true, _) => None,
            (false, Some(index)) => match rewards.choice_items.get(index) {
                Some(slot) => Some(ItemGrant {
                    item_id: slot.item_id,
                    count: slot.count,
                }),
                None => {
                    return Err(QuestError::InvalidChoice {
                        quest_id: quest.id(),
                        choice: index,
                    });
                }
            },
            (false, None) => {
                return Err(QuestError::InvalidChoice {
                    quest_id: quest.id(),
                    choice: usize::MAX,
                });
            }
        };

        let mut money = self.rew_or_req_money(quest) as i64;
        let xp = if player_level >= self.settings.max_player_level {
            money += self.rew_money_max_level(quest) as i64;
            0
        } else {
            self.xp_value(quest, player_level)
        };

        Ok(QuestReward {
            quest_id: quest.id(),
            xp,
            money,
            items: rewards
                .items
                .iter()
                .map(|slot| ItemGrant {
                    item_id: slot.item_id,
                    count: slot.count,
                })
                .collect(),
            choice,
            reputation: rewards
                .reputation
                .iter()
                .map(|slot| ReputationGrant {
                    faction: slot.faction,
                    value: slot.value,
                    max_value: slot.max_value,
                })
                .collect(),
            spell: rewards.spell,
            spell_cast: rewards.spell_cast,
            honorable_kills: rewards.honorable_kills,
            title_id: quest.char_title_id(),
            mail_template_id: rewards.mail_template_id,
            mail_delay_secs: rewards.mail_delay_secs,
        })
    }
}
