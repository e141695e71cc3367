use chrono::{DateTime, Utc};
use sqlx::sqlite::{SqlitePool, SqlitePoolOptions};
use sqlx::Row;

use crate::quest::error::StoreError;
use crate::quest::{PendingWrites, QuestLog, QuestProgress, QuestStatus};

/// Persistent per-character quest progress
pub struct QuestStore {
    pool: SqlitePool,
}

impl QuestStore {
    pub async fn connect(database_url: &str, max_connections: u32) -> Result<Self, StoreError> {
        let pool = SqlitePoolOptions::new()
            .max_connections(max_connections)
            .connect(database_url)
            .await?;

        // Run migrations
        Self::migrate(&pool).await?;

        Ok(Self { pool })
    }

    async fn migrate(pool: &SqlitePool) -> Result<(), sqlx::Error> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS character_queststatus (
                character_id INTEGER NOT NULL,
                quest_id INTEGER NOT NULL,
                slot INTEGER NOT NULL DEFAULT 0,
                status TEXT NOT NULL DEFAULT 'incomplete',
                rewarded INTEGER NOT NULL DEFAULT 0,
                explored INTEGER NOT NULL DEFAULT 0,
                timer INTEGER NOT NULL DEFAULT 0,
                item_counts TEXT NOT NULL DEFAULT '[0,0,0,0]',
                creature_counts TEXT NOT NULL DEFAULT '[0,0,0,0]',
                accepted_at TEXT,
                rewarded_at TEXT,
                PRIMARY KEY(character_id, quest_id)
            )
            "#,
        )
        .execute(pool)
        .await?;

        tracing::info!("Database migrations complete");
        Ok(())
    }

    /// Read a character's quest log in log order
    pub async fn load_log(&self, character_id: u64) -> Result<QuestLog, StoreError> {
        let rows = sqlx::query(
            r#"SELECT quest_id, status, rewarded, explored, timer, item_counts, creature_counts,
                      accepted_at, rewarded_at
               FROM character_queststatus WHERE character_id = ? ORDER BY slot, quest_id"#,
        )
        .bind(character_id as i64)
        .fetch_all(&self.pool)
        .await?;

        let mut entries = Vec::with_capacity(rows.len());
        for row in rows {
            let quest_id = u32::try_from(row.get::<i64, _>("quest_id")).map_err(|_| StoreError::InvalidRow {
                quest_id: 0,
                reason: "quest id out of range".to_string(),
            })?;

            let status_str: String = row.get("status");
            let status = QuestStatus::from_str(&status_str).ok_or_else(|| StoreError::InvalidRow {
                quest_id,
                reason: format!("unknown status '{}'", status_str),
            })?;

            let mut progress = QuestProgress::new(quest_id);
            progress.status = status;
            progress.rewarded = row.get::<i64, _>("rewarded") != 0;
            progress.explored = row.get::<i64, _>("explored") != 0;
            progress.timer_ms = u32::try_from(row.get::<i64, _>("timer")).unwrap_or(0);
            progress.item_counts = serde_json::from_str(&row.get::<String, _>("item_counts"))?;
            progress.creature_counts = serde_json::from_str(&row.get::<String, _>("creature_counts"))?;
            progress.accepted_at = parse_timestamp(row.get("accepted_at"));
            progress.rewarded_at = parse_timestamp(row.get("rewarded_at"));
            entries.push(progress);
        }

        tracing::debug!("Loaded {} quest entries for character {}", entries.len(), character_id);
        Ok(QuestLog::restore(entries))
    }

    /// Apply pending upserts and deletes in one transaction
    pub async fn write(&self, character_id: u64, pending: &PendingWrites) -> Result<(), StoreError> {
        let mut tx = self.pool.begin().await?;

        for quest_id in &pending.deletes {
            sqlx::query("DELETE FROM character_queststatus WHERE character_id = ? AND quest_id = ?")
                .bind(character_id as i64)
                .bind(*quest_id as i64)
                .execute(&mut *tx)
                .await?;
        }

        for (slot, progress) in &pending.upserts {
            let (item_counts, creature_counts) = progress.counters_to_json()?;
            sqlx::query(
                r#"INSERT INTO character_queststatus
                   (character_id, quest_id, slot, status, rewarded, explored, timer,
                    item_counts, creature_counts, accepted_at, rewarded_at)
                   VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
                   ON CONFLICT(character_id, quest_id) DO UPDATE SET
                       slot = excluded.slot,
                       status = excluded.status,
                       rewarded = excluded.rewarded,
                       explored = excluded.explored,
                       timer = excluded.timer,
                       item_counts = excluded.item_counts,
                       creature_counts = excluded.creature_counts,
                       accepted_at = excluded.accepted_at,
                       rewarded_at = excluded.rewarded_at"#,
            )
            .bind(character_id as i64)
            .bind(progress.quest_id as i64)
            .bind(*slot as i64)
            .bind(progress.status.as_str())
            .bind(progress.rewarded)
            .bind(progress.explored)
            .bind(progress.timer_ms as i64)
            .bind(item_counts)
            .bind(creature_counts)
            .bind(progress.accepted_at.map(|t| t.to_rfc3339()))
            .bind(progress.rewarded_at.map(|t| t.to_rfc3339()))
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        Ok(())
    }

    /// Write everything pending in `log` and mark what was written as saved
    pub async fn save_log(&self, character_id: u64, log: &mut QuestLog) -> Result<usize, StoreError> {
        let pending = log.pending_writes();
        if pending.is_empty() {
            return Ok(0);
        }
        match self.write(character_id, &pending).await {
            Ok(()) => Ok(log.mark_saved(&pending)),
            Err(e) => {
                log.requeue_deletes(pending);
                Err(e)
            }
        }
    }

    /// Remove all of a character's quest rows
    pub async fn delete_character(&self, character_id: u64) -> Result<u64, StoreError> {
        let result = sqlx::query("DELETE FROM character_queststatus WHERE character_id = ?")
            .bind(character_id as i64)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }
}

fn parse_timestamp(value: Option<String>) -> Option<DateTime<Utc>> {
    value
        .and_then(|s| DateTime::parse_from_rfc3339(&s).ok())
        .map(|t| t.with_timezone(&Utc))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::quest::definition::{QuestBuilder, RawQuestRecord};
    use crate::quest::{ObjectiveTarget, PreValidated, Quest, QuestUpdateState};

    async fn store() -> QuestStore {
        QuestStore::connect("sqlite::memory:", 1).await.unwrap()
    }

    fn item_quest(id: u32) -> Quest {
        QuestBuilder::from_record(&RawQuestRecord {
            req_item_id: vec![100],
            req_item_count: vec![5],
            ..RawQuestRecord::new(id)
        })
        .unwrap()
        .build(1)
    }

    #[tokio::test]
    async fn test_save_and_load_log() {
        let store = store().await;
        let first = item_quest(1);
        let second = item_quest(2);

        let mut log = QuestLog::new();
        log.accept(&first, &PreValidated).unwrap();
        log.accept(&second, &PreValidated).unwrap();
        log.record_objective_progress(&second, ObjectiveTarget::Item(100), 3);

        assert_eq!(store.save_log(42, &mut log).await.unwrap(), 2);
        assert!(log.iter().all(|e| !e.is_dirty()));

        let loaded = store.load_log(42).await.unwrap();
        let ids: Vec<u32> = loaded.iter().map(|e| e.quest_id).collect();
        assert_eq!(ids, vec![1, 2]);

        let entry = loaded.get(2).unwrap();
        assert_eq!(entry.status, QuestStatus::Incomplete);
        assert_eq!(entry.item_counts, [3, 0, 0, 0]);
        assert_eq!(entry.update_state(), QuestUpdateState::Unchanged);
        assert!(entry.accepted_at.is_some());
    }

    #[tokio::test]
    async fn test_changed_entries_update_in_place() {
        let store = store().await;
        let quest = item_quest(3);
        let mut log = QuestLog::new();
        log.accept(&quest, &PreValidated).unwrap();
        store.save_log(1, &mut log).await.unwrap();

        log.record_objective_progress(&quest, ObjectiveTarget::Item(100), 5);
        assert_eq!(log.get(3).unwrap().update_state(), QuestUpdateState::Changed);
        assert_eq!(store.save_log(1, &mut log).await.unwrap(), 1);

        let loaded = store.load_log(1).await.unwrap();
        assert_eq!(loaded.len(), 1);
        assert_eq!(loaded.status(3), QuestStatus::Complete);
    }

    #[tokio::test]
    async fn test_abandon_deletes_row() {
        let store = store().await;
        let quest = item_quest(4);
        let mut log = QuestLog::new();
        log.accept(&quest, &PreValidated).unwrap();
        store.save_log(5, &mut log).await.unwrap();

        log.abandon(4);
        store.save_log(5, &mut log).await.unwrap();
        assert!(store.load_log(5).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_abandon_after_stale_write_deletes_row() {
        let store = store().await;
        let quest = item_quest(7);
        let mut log = QuestLog::new();
        log.accept(&quest, &PreValidated).unwrap();

        // Progress lands while the first write is in flight
        let pending = log.pending_writes();
        log.record_objective_progress(&quest, ObjectiveTarget::Item(100), 1);
        store.write(3, &pending).await.unwrap();
        assert_eq!(log.mark_saved(&pending), 0);

        log.abandon(7);
        store.save_log(3, &mut log).await.unwrap();
        assert!(store.load_log(3).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_timer_survives_reload() {
        let store = store().await;
        let quest = QuestBuilder::from_record(&RawQuestRecord {
            limit_time: 60,
            req_item_id: vec![100],
            req_item_count: vec![1],
            ..RawQuestRecord::new(8)
        })
        .unwrap()
        .build(1);

        let mut log = QuestLog::new();
        log.accept(&quest, &PreValidated).unwrap();
        store.save_log(4, &mut log).await.unwrap();

        log.tick_all(std::time::Duration::from_secs(45));
        assert_eq!(store.save_log(4, &mut log).await.unwrap(), 1);

        let loaded = store.load_log(4).await.unwrap();
        assert_eq!(loaded.get(8).unwrap().timer_ms, 15_000);
    }

    #[tokio::test]
    async fn test_characters_are_isolated() {
        let store = store().await;
        let quest = item_quest(6);
        let mut log = QuestLog::new();
        log.accept(&quest, &PreValidated).unwrap();
        store.save_log(1, &mut log).await.unwrap();

        assert!(store.load_log(2).await.unwrap().is_empty());
        assert_eq!(store.delete_character(1).await.unwrap(), 1);
        assert!(store.load_log(1).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_unknown_status_rejected() {
        let store = store().await;
        sqlx::query("INSERT INTO character_queststatus (character_id, quest_id, status) VALUES (1, 9, 'bogus')")
            .execute(&store.pool)
            .await
            .unwrap();

        assert!(matches!(
            store.load_log(1).await,
            Err(StoreError::InvalidRow { quest_id: 9, .. })
        ));
    }
}
