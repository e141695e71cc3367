//! Player Quest Log
//!
//! Bounded, ordered collection of one player's quest progress and the status
//! transitions gameplay drives through it. Every operation leaves each entry
//! in exactly one valid status.

use std::time::Duration;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use super::catalog::CatalogSnapshot;
use super::definition::{MAX_QUEST_LOG_SIZE, Quest, QuestFlags};
use super::error::QuestError;
use super::reward::{QuestReward, RewardCalculator};
use super::state::{FailReason, ObjectiveTarget, QuestProgress, QuestStatus};

/// Gating the log cannot decide itself (level, race, class, prerequisites)
pub trait EligibilityCheck {
    fn is_eligible(&self, quest: &Quest, log: &QuestLog) -> bool;
}

impl<F> EligibilityCheck for F
where
    F: Fn(&Quest, &QuestLog) -> bool,
{
    fn is_eligible(&self, quest: &Quest, log: &QuestLog) -> bool {
        self(quest, log)
    }
}

/// For callers that have already run the eligibility checks
#[derive(Debug, Clone, Copy, Default)]
pub struct PreValidated;

impl EligibilityCheck for PreValidated {
    fn is_eligible(&self, _quest: &Quest, _log: &QuestLog) -> bool {
        true
    }
}

/// Server-wide reset intervals for periodic quests
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ResetPeriod {
    Daily,
    Weekly,
    Monthly,
}

impl ResetPeriod {
    fn matches(&self, quest: &Quest) -> bool {
        match self {
            ResetPeriod::Daily => quest.is_daily(),
            ResetPeriod::Weekly => quest.is_weekly(),
            ResetPeriod::Monthly => quest.is_monthly(),
        }
    }
}

fn is_periodic(quest: &Quest) -> bool {
    quest.is_daily_or_weekly() || quest.is_monthly()
}

/// A counter that moved
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ProgressUpdate {
    pub quest_id: u32,
    pub target: ObjectiveTarget,
    pub slot: usize,
    pub count: u32,
    pub required: u32,
    pub status: QuestStatus,
}

/// Rows a store must write to catch up with the log
#[derive(Debug, Clone, Default)]
pub struct PendingWrites {
    /// Log position, record, and the revision it was taken at
    pub upserts: Vec<(usize, QuestProgress)>,
    pub deletes: Vec<u32>,
}

impl PendingWrites {
    pub fn is_empty(&self) -> bool {
        self.upserts.is_empty() && self.deletes.is_empty()
    }
}

#[derive(Debug, Clone, Default)]
pub struct QuestLog {
    entries: Vec<QuestProgress>,
    /// Persisted entries removed since the last write
    removed: Vec<u32>,
}

impl QuestLog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Rebuild a log from stored records, in log order
    pub fn restore(entries: Vec<QuestProgress>) -> Self {
        let mut log = Self::new();
        for entry in entries {
            if log.entries.len() >= MAX_QUEST_LOG_SIZE {
                warn!("Dropping stored quest {} beyond log capacity", entry.quest_id);
                continue;
            }
            if log.contains(entry.quest_id) {
                warn!("Dropping duplicate stored quest {}", entry.quest_id);
                continue;
            }
            log.entries.push(entry.restored());
        }
        log
    }

    // ------------------------------------------------------------------
    // Queries
    // ------------------------------------------------------------------

    pub fn get(&self, quest_id: u32) -> Option<&QuestProgress> {
        self.entries.iter().find(|e| e.quest_id == quest_id)
    }

    fn position(&self, quest_id: u32) -> Option<usize> {
        self.entries.iter().position(|e| e.quest_id == quest_id)
    }

    fn entry_mut(&mut self, quest_id: u32) -> Option<&mut QuestProgress> {
        self.entries.iter_mut().find(|e| e.quest_id == quest_id)
    }

    /// `None` when the quest is not in the log
    pub fn status(&self, quest_id: u32) -> QuestStatus {
        self.get(quest_id).map_or(QuestStatus::None, |e| e.status)
    }

    pub fn contains(&self, quest_id: u32) -> bool {
        self.position(quest_id).is_some()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn is_full(&self) -> bool {
        self.entries.len() >= MAX_QUEST_LOG_SIZE
    }

    pub fn iter(&self) -> impl Iterator<Item = &QuestProgress> {
        self.entries.iter()
    }

    pub fn is_rewarded(&self, quest_id: u32) -> bool {
        self.get(quest_id).is_some_and(|e| e.rewarded)
    }

    /// Complete and waiting to be turned in
    pub fn can_reward(&self, quest_id: u32) -> bool {
        self.get(quest_id)
            .is_some_and(|e| e.status == QuestStatus::Complete && !e.rewarded)
    }

    /// The running timed quest, if any
    pub fn timed_quest(&self) -> Option<u32> {
        self.entries
            .iter()
            .find(|e| e.status == QuestStatus::Incomplete && e.timer_ms > 0)
            .map(|e| e.quest_id)
    }

    // ------------------------------------------------------------------
    // Transitions
    // ------------------------------------------------------------------

    /// Take a quest. A repeatable quest that is AVAILABLE again is re-taken in place.
    pub fn accept<E: EligibilityCheck + ?Sized>(
        &mut self,
        quest: &Quest,
        eligibility: &E,
    ) -> Result<&QuestProgress, QuestError> {
        let quest_id = quest.id();
        let existing = self.position(quest_id);

        match existing.map(|index| &self.entries[index]) {
            Some(entry) if entry.status != QuestStatus::Available => {
                return Err(QuestError::AlreadyOnQuest(quest_id));
            }
            // Periodic quests wait for the server reset
            Some(entry) if entry.rewarded && is_periodic(quest) => {
                return Err(QuestError::NotEligible(quest_id));
            }
            Some(_) => {}
            None if self.is_full() => return Err(QuestError::LogFull),
            None => {}
        }

        if !quest.is_active() || !eligibility.is_eligible(quest, self) {
            return Err(QuestError::NotEligible(quest_id));
        }

        if quest.is_timed() && self.timed_quest().is_some_and(|id| id != quest_id) {
            return Err(QuestError::OnlyOneTimed(quest_id));
        }

        let index = match existing {
            Some(index) => index,
            None => {
                let mut entry = QuestProgress::new(quest_id);
                // Taken again before its delete was written; the old row is still there
                if self.removed.contains(&quest_id) {
                    self.removed.retain(|&id| id != quest_id);
                    entry.mark_persisted();
                }
                self.entries.push(entry);
                self.entries.len() - 1
            }
        };

        let entry = &mut self.entries[index];
        entry.reset_counters();
        entry.status = QuestStatus::Incomplete;
        // A new turn-in cycle for a repeatable quest
        entry.rewarded = false;
        entry.timer_ms = if quest.is_timed() {
            quest.limit_time().saturating_mul(1000)
        } else {
            0
        };
        entry.accepted_at = Some(Utc::now());
        entry.mark_changed();
        Self::refresh_entry(entry, quest);

        debug!("Quest {} accepted with status {:?}", quest_id, entry.status);
        debug_assert!(entry.is_consistent(quest));
        Ok(&self.entries[index])
    }

    /// Re-check completion; INCOMPLETE becomes COMPLETE once everything is satisfied
    fn refresh_entry(entry: &mut QuestProgress, quest: &Quest) {
        if entry.status == QuestStatus::Incomplete
            && (quest.is_auto_complete() || entry.objectives_satisfied(quest))
        {
            entry.status = QuestStatus::Complete;
            entry.timer_ms = 0;
            entry.mark_changed();
        }
    }

    /// Re-check completion of one quest, e.g. when its ender is spoken to
    pub fn refresh(&mut self, quest: &Quest) -> QuestStatus {
        match self.entry_mut(quest.id()) {
            Some(entry) => {
                Self::refresh_entry(entry, quest);
                entry.status
            }
            None => QuestStatus::None,
        }
    }

    /// Credit an item, kill/use, or spell cast to the first matching objective
    /// that still needs it. Only INCOMPLETE quests progress.
    pub fn record_objective_progress(
        &mut self,
        quest: &Quest,
        target: ObjectiveTarget,
        delta: u32,
    ) -> Option<ProgressUpdate> {
        let entry = self.entry_mut(quest.id())?;
        if entry.status != QuestStatus::Incomplete || delta == 0 {
            return None;
        }

        let objectives = quest.objectives();
        let (slot, required, counter) = match target {
            ObjectiveTarget::Item(item_id) => {
                let (slot, required) = objectives
                    .items
                    .iter()
                    .enumerate()
                    .find(|(i, s)| s.item_id == item_id && entry.item_counts[*i] < s.count)
                    .map(|(i, s)| (i, s.count))?;
                (slot, required, &mut entry.item_counts[slot])
            }
            ObjectiveTarget::CreatureOrObject(creature) => {
                let (slot, required) = objectives
                    .creatures
                    .iter()
                    .enumerate()
                    .find(|(i, s)| {
                        s.target == creature && s.spell == 0 && entry.creature_counts[*i] < s.count
                    })
                    .map(|(i, s)| (i, s.count))?;
                (slot, required, &mut entry.creature_counts[slot])
            }
            ObjectiveTarget::Spell(spell) => {
                let (slot, required) = objectives
                    .creatures
                    .iter()
                    .enumerate()
                    .find(|(i, s)| s.spell != 0 && s.spell == spell && entry.creature_counts[*i] < s.count)
                    .map(|(i, s)| (i, s.count))?;
                (slot, required, &mut entry.creature_counts[slot])
            }
        };

        *counter = counter.saturating_add(delta).min(required);
        let count = *counter;
        entry.mark_changed();
        Self::refresh_entry(entry, quest);
        debug_assert!(entry.is_consistent(quest));

        Some(ProgressUpdate {
            quest_id: quest.id(),
            target,
            slot,
            count,
            required,
            status: entry.status,
        })
    }

    /// An objective item left the inventory; may drop COMPLETE back to INCOMPLETE
    pub fn remove_item(&mut self, quest: &Quest, item_id: u32, count: u32) -> Option<ProgressUpdate> {
        let entry = self.entry_mut(quest.id())?;
        if !matches!(entry.status, QuestStatus::Incomplete | QuestStatus::Complete)
            || entry.rewarded
            || count == 0
        {
            return None;
        }

        let (slot, required) = quest
            .objectives()
            .items
            .iter()
            .enumerate()
            .find(|(i, s)| s.item_id == item_id && entry.item_counts[*i] > 0)
            .map(|(i, s)| (i, s.count))?;

        entry.item_counts[slot] = entry.item_counts[slot].saturating_sub(count);
        if entry.status == QuestStatus::Complete
            && !quest.is_auto_complete()
            && !entry.objectives_satisfied(quest)
        {
            entry.status = QuestStatus::Incomplete;
        }
        entry.mark_changed();
        debug_assert!(entry.is_consistent(quest));

        Some(ProgressUpdate {
            quest_id: quest.id(),
            target: ObjectiveTarget::Item(item_id),
            slot,
            count: entry.item_counts[slot],
            required,
            status: entry.status,
        })
    }

    /// Satisfy the exploration/event objective. Returns the new status if anything changed.
    pub fn mark_explored(&mut self, quest: &Quest) -> Option<QuestStatus> {
        if !quest.requires_exploration() {
            return None;
        }
        let entry = self.entry_mut(quest.id())?;
        if entry.status != QuestStatus::Incomplete || entry.explored {
            return None;
        }

        entry.explored = true;
        entry.mark_changed();
        Self::refresh_entry(entry, quest);
        Some(entry.status)
    }

    /// Advance a timed quest's clock. When it runs out while INCOMPLETE the
    /// quest fails with the caller's reason.
    pub fn tick(&mut self, quest: &Quest, elapsed: Duration, reason: FailReason) -> Option<FailReason> {
        if !quest.is_timed() {
            return None;
        }
        let entry = self.entry_mut(quest.id())?;
        if entry.status != QuestStatus::Incomplete || entry.timer_ms == 0 {
            return None;
        }

        let elapsed_ms = u32::try_from(elapsed.as_millis()).unwrap_or(u32::MAX);
        entry.timer_ms = entry.timer_ms.saturating_sub(elapsed_ms);
        // Remaining time is stored, so every decrement is a change
        entry.mark_changed();
        if entry.timer_ms > 0 {
            return None;
        }

        entry.status = QuestStatus::Failed;
        debug!("Quest {} failed: {:?}", quest.id(), reason);
        Some(reason)
    }

    /// Advance every running timer; returns the quests whose time ran out
    pub fn tick_all(&mut self, elapsed: Duration) -> Vec<u32> {
        let elapsed_ms = u32::try_from(elapsed.as_millis()).unwrap_or(u32::MAX);
        let mut failed = Vec::new();

        for entry in self
            .entries
            .iter_mut()
            .filter(|e| e.status == QuestStatus::Incomplete && e.timer_ms > 0)
        {
            entry.timer_ms = entry.timer_ms.saturating_sub(elapsed_ms);
            entry.mark_changed();
            if entry.timer_ms == 0 {
                entry.status = QuestStatus::Failed;
                failed.push(entry.quest_id);
            }
        }

        failed
    }

    /// Fail a quest that has not been turned in
    pub fn fail(&mut self, quest_id: u32, reason: FailReason) -> bool {
        let Some(entry) = self.entry_mut(quest_id) else {
            return false;
        };
        if !matches!(entry.status, QuestStatus::Incomplete | QuestStatus::Complete) || entry.rewarded {
            return false;
        }

        entry.status = QuestStatus::Failed;
        entry.timer_ms = 0;
        entry.mark_changed();
        debug!("Quest {} failed: {:?}", quest_id, reason);
        true
    }

    /// Fail every open quest that requires the player to stay alive
    pub fn fail_on_death(&mut self, snapshot: &CatalogSnapshot) -> Vec<u32> {
        let stay_alive: Vec<u32> = self
            .entries
            .iter()
            .filter(|e| matches!(e.status, QuestStatus::Incomplete | QuestStatus::Complete) && !e.rewarded)
            .filter(|e| {
                snapshot
                    .get(e.quest_id)
                    .is_ok_and(|q| q.has_quest_flag(QuestFlags::STAY_ALIVE))
            })
            .map(|e| e.quest_id)
            .collect();

        stay_alive
            .into_iter()
            .filter(|&id| self.fail(id, FailReason::StayAlive))
            .collect()
    }

    /// Turn in a COMPLETE quest and compute its payout.
    ///
    /// Repeatable quests go back to AVAILABLE with cleared counters,
    /// auto-rewarded ones leave the log, everything else stays as rewarded.
    pub fn reward(
        &mut self,
        quest: &Quest,
        player_level: u32,
        calculator: &RewardCalculator,
        choice: Option<usize>,
    ) -> Result<QuestReward, QuestError> {
        let quest_id = quest.id();
        let index = self.position(quest_id).ok_or(QuestError::NotComplete(quest_id))?;

        let entry = &self.entries[index];
        if entry.status != QuestStatus::Complete {
            return Err(QuestError::NotComplete(quest_id));
        }
        if entry.rewarded {
            return Err(QuestError::NotEligible(quest_id));
        }

        let reward = calculator.compute(quest, player_level, choice)?;

        let entry = &mut self.entries[index];
        entry.rewarded = true;
        entry.rewarded_at = Some(Utc::now());
        entry.mark_changed();

        if quest.is_repeatable() {
            entry.reset_counters();
            entry.status = QuestStatus::Available;
        } else if quest.has_quest_flag(QuestFlags::AUTO_REWARDED) {
            self.remove_at(index);
        }

        debug!("Quest {} rewarded: {} xp, {} money", quest_id, reward.xp, reward.money);
        Ok(reward)
    }

    /// Drop a quest regardless of status
    pub fn abandon(&mut self, quest_id: u32) -> Option<QuestProgress> {
        let index = self.position(quest_id)?;
        Some(self.remove_at(index))
    }

    fn remove_at(&mut self, index: usize) -> QuestProgress {
        let entry = self.entries.remove(index);
        // Entries never handed to a write have no row to delete
        if entry.is_persisted() && !self.removed.contains(&entry.quest_id) {
            self.removed.push(entry.quest_id);
        }
        entry
    }

    /// Server reset: repeatable periodic quests rewarded this period can be taken again
    pub fn reset_periodic(&mut self, snapshot: &CatalogSnapshot, period: ResetPeriod) -> usize {
        let mut reset = 0;
        for entry in self
            .entries
            .iter_mut()
            .filter(|e| e.rewarded && e.status == QuestStatus::Available)
        {
            let matches = snapshot
                .get(entry.quest_id)
                .is_ok_and(|q| q.is_repeatable() && period.matches(q));
            if matches {
                entry.rewarded = false;
                entry.mark_changed();
                reset += 1;
            }
        }
        reset
    }

    /// Drop entries whose definition was deactivated or is gone from the catalog
    pub fn purge_inactive(&mut self, snapshot: &CatalogSnapshot) -> Vec<u32> {
        let stale: Vec<u32> = self
            .entries
            .iter()
            .filter(|e| snapshot.get(e.quest_id).map_or(true, |q| !q.is_active()))
            .map(|e| e.quest_id)
            .collect();

        for &quest_id in &stale {
            if let Some(index) = self.position(quest_id) {
                self.remove_at(index);
                debug!("Quest {} removed from log: definition inactive or missing", quest_id);
            }
        }
        stale
    }

    /// Credit `target` to every INCOMPLETE quest in the log
    pub fn record_for_all(
        &mut self,
        snapshot: &CatalogSnapshot,
        target: ObjectiveTarget,
        delta: u32,
    ) -> Vec<ProgressUpdate> {
        let open: Vec<u32> = self
            .entries
            .iter()
            .filter(|e| e.status == QuestStatus::Incomplete)
            .map(|e| e.quest_id)
            .collect();

        open.into_iter()
            .filter_map(|id| {
                let quest = snapshot.get(id).ok()?;
                self.record_objective_progress(quest, target, delta)
            })
            .collect()
    }

    // ------------------------------------------------------------------
    // Persistence
    // ------------------------------------------------------------------

    /// Snapshot of dirty entries and pending deletes. Deletes are handed over.
    pub fn pending_writes(&mut self) -> PendingWrites {
        PendingWrites {
            upserts: self
                .entries
                .iter_mut()
                .enumerate()
                .filter(|(_, e)| e.is_dirty())
                .map(|(slot, e)| {
                    e.mark_persisted();
                    (slot, e.clone())
                })
                .collect(),
            deletes: std::mem::take(&mut self.removed),
        }
    }

    /// Clear update state for entries that did not change during the write
    pub fn mark_saved(&mut self, written: &PendingWrites) -> usize {
        written
            .upserts
            .iter()
            .filter(|(_, saved)| {
                self.entry_mut(saved.quest_id)
                    .is_some_and(|entry| entry.mark_saved(saved.revision()))
            })
            .count()
    }

    /// Put deletes back after a failed write
    pub fn requeue_deletes(&mut self, written: PendingWrites) {
        for quest_id in written.deletes {
            if !self.contains(quest_id) && !self.removed.contains(&quest_id) {
                self.removed.push(quest_id);
            }
        }
    }
}
