//! Player Quest Sessions
//!
//! Live quest logs for connected players, keyed by character id. Each log is
//! mutated under its map entry lock; no lock is held across an await.

use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use tracing::{debug, info, warn};

use crate::db::QuestStore;

use super::catalog::QuestCatalog;
use super::error::{QuestError, StoreError};
use super::events::{QuestEvent, QuestEventResult};
use super::log::{EligibilityCheck, PreValidated, QuestLog};
use super::reward::RewardCalculator;
use super::state::{FailReason, ObjectiveTarget, QuestStatus};

pub struct QuestSessions {
    logs: DashMap<u64, QuestLog>,
    catalog: Arc<QuestCatalog>,
    calculator: RewardCalculator,
    eligibility: Arc<dyn EligibilityCheck + Send + Sync>,
}

impl QuestSessions {
    pub fn new(catalog: Arc<QuestCatalog>, calculator: RewardCalculator) -> Self {
        Self::with_eligibility(catalog, calculator, Arc::new(PreValidated))
    }

    pub fn with_eligibility(
        catalog: Arc<QuestCatalog>,
        calculator: RewardCalculator,
        eligibility: Arc<dyn EligibilityCheck + Send + Sync>,
    ) -> Self {
        Self {
            logs: DashMap::new(),
            catalog,
            calculator,
            eligibility,
        }
    }

    pub fn catalog(&self) -> &Arc<QuestCatalog> {
        &self.catalog
    }

    /// Install a player's log, replacing any previous one
    pub fn open(&self, character_id: u64, log: QuestLog) {
        debug!("Quest session opened for character {} ({} entries)", character_id, log.len());
        self.logs.insert(character_id, log);
    }

    /// Load a player's log from the store and install it. Entries for
    /// inactive or missing quests are dropped and queued for deletion.
    pub async fn open_from_store(&self, character_id: u64, store: &QuestStore) -> Result<usize, StoreError> {
        let mut log = store.load_log(character_id).await?;
        let snapshot = self.catalog.snapshot().await;
        let purged = log.purge_inactive(&snapshot);
        if !purged.is_empty() {
            info!("Dropped {} stale quest(s) from character {}", purged.len(), character_id);
        }
        let len = log.len();
        self.open(character_id, log);
        Ok(len)
    }

    pub fn close(&self, character_id: u64) -> Option<QuestLog> {
        self.logs.remove(&character_id).map(|(_, log)| log)
    }

    pub fn is_open(&self, character_id: u64) -> bool {
        self.logs.contains_key(&character_id)
    }

    pub fn len(&self) -> usize {
        self.logs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.logs.is_empty()
    }

    /// Another player's status for a quest, e.g. when a quest is shared
    pub fn status_of(&self, character_id: u64, quest_id: u32) -> QuestStatus {
        self.logs
            .get(&character_id)
            .map_or(QuestStatus::None, |log| log.status(quest_id))
    }

    /// Run `f` against a player's log under its entry lock
    pub fn with_log<R>(&self, character_id: u64, f: impl FnOnce(&mut QuestLog) -> R) -> Result<R, QuestError> {
        let mut log = self
            .logs
            .get_mut(&character_id)
            .ok_or(QuestError::NoSession(character_id))?;
        Ok(f(&mut log))
    }

    /// Apply a gameplay event to a player's log
    pub async fn handle_event(&self, character_id: u64, event: QuestEvent) -> Result<QuestEventResult, QuestError> {
        // One consistent catalog view for the whole event
        let snapshot = self.catalog.snapshot().await;
        debug!("Character {} quest event: {}", character_id, event.event_type());

        self.with_log(character_id, |log| -> Result<QuestEventResult, QuestError> {
            let result = match event {
                QuestEvent::Accept { quest_id } => {
                    let quest = snapshot.get(quest_id)?;
                    let entry = log.accept(quest, &*self.eligibility)?;
                    QuestEventResult::Accepted {
                        quest_id,
                        status: entry.status,
                    }
                }
                QuestEvent::ItemLooted { item_id, count } => {
                    QuestEventResult::Progress(log.record_for_all(&snapshot, ObjectiveTarget::Item(item_id), count))
                }
                QuestEvent::ItemRemoved { item_id, count } => {
                    let ids: Vec<u32> = log.iter().map(|e| e.quest_id).collect();
                    let updates = ids
                        .into_iter()
                        .filter_map(|id| {
                            let quest = snapshot.get(id).ok()?;
                            log.remove_item(quest, item_id, count)
                        })
                        .collect();
                    QuestEventResult::Progress(updates)
                }
                QuestEvent::CreatureKilled { entry } => match i32::try_from(entry) {
                    Ok(target) => QuestEventResult::Progress(log.record_for_all(
                        &snapshot,
                        ObjectiveTarget::CreatureOrObject(target),
                        1,
                    )),
                    Err(_) => QuestEventResult::NoChange,
                },
                QuestEvent::GameObjectUsed { entry } => match i32::try_from(entry) {
                    Ok(target) => QuestEventResult::Progress(log.record_for_all(
                        &snapshot,
                        ObjectiveTarget::CreatureOrObject(-target),
                        1,
                    )),
                    Err(_) => QuestEventResult::NoChange,
                },
                QuestEvent::SpellCast { spell_id } => {
                    QuestEventResult::Progress(log.record_for_all(&snapshot, ObjectiveTarget::Spell(spell_id), 1))
                }
                QuestEvent::AreaExplored { quest_id } => {
                    let quest = snapshot.get(quest_id)?;
                    match log.mark_explored(quest) {
                        Some(status) => QuestEventResult::Explored { quest_id, status },
                        None => QuestEventResult::NoChange,
                    }
                }
                QuestEvent::Tick { elapsed_ms } => QuestEventResult::Failed {
                    quest_ids: log.tick_all(Duration::from_millis(elapsed_ms)),
                    reason: FailReason::TimeLimit,
                },
                QuestEvent::Died => QuestEventResult::Failed {
                    quest_ids: log.fail_on_death(&snapshot),
                    reason: FailReason::StayAlive,
                },
                QuestEvent::TurnIn {
                    quest_id,
                    player_level,
                    choice,
                } => {
                    let quest = snapshot.get(quest_id)?;
                    QuestEventResult::Rewarded(log.reward(quest, player_level, &self.calculator, choice)?)
                }
                QuestEvent::Abandon { quest_id } => match log.abandon(quest_id) {
                    Some(_) => QuestEventResult::Abandoned { quest_id },
                    None => QuestEventResult::NoChange,
                },
            };
            Ok(result)
        })?
    }

    /// Remove entries whose definition is inactive or gone, e.g. after a reload.
    /// Returns (character, quest) pairs that were removed.
    pub async fn purge_inactive(&self) -> Vec<(u64, u32)> {
        let snapshot = self.catalog.snapshot().await;
        let mut purged = Vec::new();
        for mut log in self.logs.iter_mut() {
            let character_id = *log.key();
            purged.extend(log.purge_inactive(&snapshot).into_iter().map(|quest_id| (character_id, quest_id)));
        }
        purged
    }

    /// Globally disable a quest and drop it from every open log
    pub async fn deactivate_quest(&self, quest_id: u32) -> Result<usize, QuestError> {
        self.catalog.deactivate(quest_id).await?;
        Ok(self.purge_inactive().await.len())
    }

    /// Advance timers for every open log. Returns (character, quest) pairs that failed.
    pub fn tick_all(&self, elapsed: Duration) -> Vec<(u64, u32)> {
        let mut failed = Vec::new();
        for mut log in self.logs.iter_mut() {
            let character_id = *log.key();
            failed.extend(log.tick_all(elapsed).into_iter().map(|quest_id| (character_id, quest_id)));
        }
        failed
    }

    /// Write every dirty log to the store. Returns the number of entries saved.
    pub async fn flush(&self, store: &QuestStore) -> usize {
        let characters: Vec<u64> = self.logs.iter().map(|entry| *entry.key()).collect();
        let mut saved = 0;

        for character_id in characters {
            // Take the pending rows and release the entry before awaiting
            let Some(pending) = self
                .logs
                .get_mut(&character_id)
                .map(|mut log| log.pending_writes())
            else {
                continue;
            };
            if pending.is_empty() {
                continue;
            }

            match store.write(character_id, &pending).await {
                Ok(()) => {
                    if let Some(mut log) = self.logs.get_mut(&character_id) {
                        saved += log.mark_saved(&pending);
                    }
                }
                Err(e) => {
                    warn!("Failed to save quest log for character {}: {}", character_id, e);
                    if let Some(mut log) = self.logs.get_mut(&character_id) {
                        log.requeue_deletes(pending);
                    }
                }
            }
        }

        if saved > 0 {
            info!("Saved {} quest log entries", saved);
        }
        saved
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::quest::definition::{QuestFlags, RawQuestRecord};
    use crate::quest::reward::RewardSettings;

    async fn sessions(records: Vec<RawQuestRecord>) -> QuestSessions {
        let dir = tempfile::tempdir().unwrap();
        let catalog = Arc::new(QuestCatalog::new(dir.path()));
        catalog.load(records).await;
        QuestSessions::new(catalog, RewardCalculator::new(RewardSettings::default()))
    }

    fn kill_quest(id: u32, creature: i32, count: u32) -> RawQuestRecord {
        RawQuestRecord {
            req_creature_or_go_id: vec![creature],
            req_creature_or_go_count: vec![count],
            rew_money_max_level: 300,
            quest_level: 10,
            ..RawQuestRecord::new(id)
        }
    }

    #[tokio::test]
    async fn test_event_flow() {
        let sessions = sessions(vec![kill_quest(1, 448, 2)]).await;
        sessions.open(7, QuestLog::new());

        let accepted = sessions.handle_event(7, QuestEvent::Accept { quest_id: 1 }).await.unwrap();
        assert_eq!(
            accepted,
            QuestEventResult::Accepted {
                quest_id: 1,
                status: QuestStatus::Incomplete
            }
        );

        for _ in 0..2 {
            sessions
                .handle_event(7, QuestEvent::CreatureKilled { entry: 448 })
                .await
                .unwrap();
        }
        assert_eq!(sessions.status_of(7, 1), QuestStatus::Complete);

        let result = sessions
            .handle_event(
                7,
                QuestEvent::TurnIn {
                    quest_id: 1,
                    player_level: 10,
                    choice: None,
                },
            )
            .await
            .unwrap();
        match result {
            QuestEventResult::Rewarded(reward) => assert_eq!(reward.xp, 500),
            other => panic!("unexpected result {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_errors_are_returned() {
        let sessions = sessions(vec![kill_quest(1, 448, 2)]).await;
        assert_eq!(
            sessions.handle_event(9, QuestEvent::Died).await.unwrap_err(),
            QuestError::NoSession(9)
        );

        sessions.open(9, QuestLog::new());
        assert_eq!(
            sessions
                .handle_event(9, QuestEvent::Accept { quest_id: 404 })
                .await
                .unwrap_err(),
            QuestError::NotFound(404)
        );
        assert_eq!(
            sessions
                .handle_event(9, QuestEvent::TurnIn { quest_id: 1, player_level: 10, choice: None })
                .await
                .unwrap_err(),
            QuestError::NotComplete(1)
        );
    }

    #[tokio::test]
    async fn test_game_object_uses_negative_target() {
        let sessions = sessions(vec![kill_quest(2, -55, 1)]).await;
        sessions.open(1, QuestLog::new());
        sessions.handle_event(1, QuestEvent::Accept { quest_id: 2 }).await.unwrap();

        let result = sessions
            .handle_event(1, QuestEvent::CreatureKilled { entry: 55 })
            .await
            .unwrap();
        assert!(!result.is_change());

        sessions
            .handle_event(1, QuestEvent::GameObjectUsed { entry: 55 })
            .await
            .unwrap();
        assert_eq!(sessions.status_of(1, 2), QuestStatus::Complete);
    }

    #[tokio::test]
    async fn test_death_fails_stay_alive_quests() {
        let mut escort = kill_quest(3, 10, 1);
        escort.quest_flags = QuestFlags::STAY_ALIVE.bits();
        let sessions = sessions(vec![escort, kill_quest(4, 10, 5)]).await;
        sessions.open(1, QuestLog::new());
        for quest_id in [3, 4] {
            sessions.handle_event(1, QuestEvent::Accept { quest_id }).await.unwrap();
        }

        let result = sessions.handle_event(1, QuestEvent::Died).await.unwrap();
        assert_eq!(
            result,
            QuestEventResult::Failed {
                quest_ids: vec![3],
                reason: FailReason::StayAlive
            }
        );
        assert_eq!(sessions.status_of(1, 4), QuestStatus::Incomplete);
    }

    #[tokio::test]
    async fn test_eligibility_hook() {
        let dir = tempfile::tempdir().unwrap();
        let catalog = Arc::new(QuestCatalog::new(dir.path()));
        catalog.load(vec![kill_quest(5, 10, 1)]).await;
        let refuse_all = |_: &crate::quest::Quest, _: &QuestLog| false;
        let sessions = QuestSessions::with_eligibility(catalog, RewardCalculator::default(), Arc::new(refuse_all));
        sessions.open(1, QuestLog::new());

        assert_eq!(
            sessions
                .handle_event(1, QuestEvent::Accept { quest_id: 5 })
                .await
                .unwrap_err(),
            QuestError::NotEligible(5)
        );
    }

    #[tokio::test]
    async fn test_deactivate_removes_from_open_logs() {
        let store = QuestStore::connect("sqlite::memory:", 1).await.unwrap();
        let sessions = sessions(vec![kill_quest(20, 10, 1), kill_quest(21, 10, 1)]).await;
        sessions.open(2, QuestLog::new());
        for quest_id in [20, 21] {
            sessions.handle_event(2, QuestEvent::Accept { quest_id }).await.unwrap();
        }
        sessions.flush(&store).await;

        assert_eq!(sessions.deactivate_quest(20).await.unwrap(), 1);
        assert_eq!(sessions.status_of(2, 20), QuestStatus::None);
        assert_eq!(sessions.status_of(2, 21), QuestStatus::Incomplete);

        sessions.flush(&store).await;
        sessions.close(2);
        assert_eq!(sessions.open_from_store(2, &store).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_open_from_store_drops_missing_quests() {
        let store = QuestStore::connect("sqlite::memory:", 1).await.unwrap();
        let sessions = sessions(vec![kill_quest(22, 10, 1)]).await;
        let stale = crate::quest::QuestBuilder::from_record(&kill_quest(99, 10, 1)).unwrap().build(1);

        let mut log = QuestLog::new();
        log.accept(&stale, &PreValidated).unwrap();
        store.save_log(3, &mut log).await.unwrap();

        assert_eq!(sessions.open_from_store(3, &store).await.unwrap(), 0);
        sessions.flush(&store).await;
        assert!(store.load_log(3).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_flush_saves_dirty_logs() {
        let store = QuestStore::connect("sqlite::memory:", 1).await.unwrap();
        let sessions = sessions(vec![kill_quest(6, 10, 3)]).await;
        sessions.open(11, QuestLog::new());
        sessions.handle_event(11, QuestEvent::Accept { quest_id: 6 }).await.unwrap();

        assert_eq!(sessions.flush(&store).await, 1);
        assert_eq!(sessions.flush(&store).await, 0);

        sessions.close(11);
        assert_eq!(sessions.open_from_store(11, &store).await.unwrap(), 1);
        assert_eq!(sessions.status_of(11, 6), QuestStatus::Incomplete);
    }
}
