//! Special Flag Derivation
//!
//! Classifies a quest's objective shape once at load time so objective checks
//! never need to re-inspect the raw arrays.

use tracing::warn;

use super::definition::{QuestFlags, QuestObjectives, SpecialFlags};

/// Internal-only bits computed from the objective arrays and the time limit.
///
/// Pure: the same arrays always yield the same mask.
pub fn derive_objective_flags(objectives: &QuestObjectives, limit_time: u32) -> SpecialFlags {
    let mut flags = SpecialFlags::NONE;

    if objectives
        .items
        .raw()
        .iter()
        .any(|slot| slot.item_id != 0 && slot.count > 0)
    {
        flags |= SpecialFlags::DELIVER;
    }

    let creatures = objectives.creatures.raw();

    if creatures.iter().any(|slot| slot.count > 0 || slot.spell != 0) {
        flags |= SpecialFlags::KILL_OR_CAST;
    }

    // Talk-only objective: a creature target nothing has to be done to
    if creatures.iter().any(|slot| slot.target > 0 && slot.count == 0) {
        flags |= SpecialFlags::SPEAKTO;
    }

    if limit_time > 0 {
        flags |= SpecialFlags::TIMED;
    }

    flags
}

/// Full special flag mask for a definition: the DB-allowed bits of the record
/// value, REPEATABLE for daily and weekly quests, and the derived bits.
pub fn resolve_special_flags(
    quest_id: u32,
    db_value: u32,
    quest_flags: QuestFlags,
    objectives: &QuestObjectives,
    limit_time: u32,
) -> SpecialFlags {
    let (mut flags, rejected) = SpecialFlags::from_db(db_value);
    if rejected != 0 {
        warn!(
            "Quest {} has internal-only special flag bits {:#x} in its record, ignored",
            quest_id, rejected
        );
    }

    let daily_or_weekly = quest_flags.intersects(QuestFlags::DAILY | QuestFlags::WEEKLY);
    if daily_or_weekly && !flags.contains(SpecialFlags::REPEATABLE) {
        warn!("Quest {} is daily or weekly but not repeatable, marking repeatable", quest_id);
        flags |= SpecialFlags::REPEATABLE;
    }

    flags | derive_objective_flags(objectives, limit_time)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::quest::definition::{CreatureSlot, ItemSlot, Slots};

    fn objectives(items: [ItemSlot; 4], creatures: [CreatureSlot; 4]) -> QuestObjectives {
        QuestObjectives {
            items: Slots::scan(items),
            creatures: Slots::scan(creatures),
            ..Default::default()
        }
    }

    fn item(item_id: u32, count: u32) -> ItemSlot {
        ItemSlot { item_id, count }
    }

    fn creature(target: i32, count: u32, spell: u32) -> CreatureSlot {
        CreatureSlot { target, count, spell }
    }

    #[test]
    fn test_deliver_requires_id_and_count() {
        let none = [ItemSlot::default(); 4];
        let empty = [CreatureSlot::default(); 4];

        let with_items = objectives([item(100, 5), item(0, 0), item(0, 0), item(0, 0)], empty);
        assert!(derive_objective_flags(&with_items, 0).contains(SpecialFlags::DELIVER));

        let zero_count = objectives([item(100, 0), item(0, 0), item(0, 0), item(0, 0)], empty);
        assert!(!derive_objective_flags(&zero_count, 0).contains(SpecialFlags::DELIVER));

        assert_eq!(derive_objective_flags(&objectives(none, empty), 0), SpecialFlags::NONE);
    }

    #[test]
    fn test_kill_cast_and_speak_to() {
        let none = [ItemSlot::default(); 4];

        let kill = objectives(none, [creature(448, 1, 0), creature(0, 0, 0), creature(0, 0, 0), creature(0, 0, 0)]);
        let flags = derive_objective_flags(&kill, 0);
        assert!(flags.contains(SpecialFlags::KILL_OR_CAST));
        assert!(!flags.contains(SpecialFlags::SPEAKTO));

        let talk = objectives(none, [creature(1747, 0, 0), creature(0, 0, 0), creature(0, 0, 0), creature(0, 0, 0)]);
        let flags = derive_objective_flags(&talk, 0);
        assert!(flags.contains(SpecialFlags::SPEAKTO));
        assert!(!flags.contains(SpecialFlags::KILL_OR_CAST));

        // Game object with zero count is not a conversation
        let object = objectives(none, [creature(-20, 0, 0), creature(0, 0, 0), creature(0, 0, 0), creature(0, 0, 0)]);
        assert_eq!(derive_objective_flags(&object, 0), SpecialFlags::NONE);

        let cast = objectives(none, [creature(0, 0, 0), creature(0, 0, 0), creature(0, 0, 0), creature(0, 0, 9999)]);
        assert!(derive_objective_flags(&cast, 0).contains(SpecialFlags::KILL_OR_CAST));
    }

    #[test]
    fn test_flags_combine() {
        let mixed = objectives(
            [item(100, 5), item(0, 0), item(0, 0), item(0, 0)],
            [creature(448, 2, 0), creature(1747, 0, 0), creature(0, 0, 0), creature(0, 0, 0)],
        );
        let flags = derive_objective_flags(&mixed, 60);
        assert!(flags.contains(
            SpecialFlags::DELIVER | SpecialFlags::KILL_OR_CAST | SpecialFlags::SPEAKTO | SpecialFlags::TIMED
        ));
    }

    #[test]
    fn test_timed_iff_limit_time() {
        let empty = QuestObjectives::default();
        assert!(derive_objective_flags(&empty, 1).contains(SpecialFlags::TIMED));
        assert!(!derive_objective_flags(&empty, 0).contains(SpecialFlags::TIMED));
    }

    #[test]
    fn test_derivation_is_idempotent() {
        let mixed = objectives(
            [item(7, 1), item(8, 2), item(0, 0), item(0, 0)],
            [creature(-3, 4, 0), creature(5, 0, 0), creature(0, 0, 0), creature(0, 0, 0)],
        );
        let first = resolve_special_flags(1, 0x7, QuestFlags::NONE, &mixed, 30);
        let second = resolve_special_flags(1, 0x7, QuestFlags::NONE, &mixed, 30);
        assert_eq!(first, second);
    }

    #[test]
    fn test_db_bits_preserved_and_internal_bits_rejected() {
        let empty = QuestObjectives::default();
        let raw = SpecialFlags::MONTHLY.bits() | SpecialFlags::EXPLORATION_OR_EVENT.bits() | 0x78;
        let flags = resolve_special_flags(5, raw, QuestFlags::NONE, &empty, 0);
        assert_eq!(flags, SpecialFlags::MONTHLY | SpecialFlags::EXPLORATION_OR_EVENT);
    }

    #[test]
    fn test_daily_forced_repeatable() {
        let empty = QuestObjectives::default();
        let flags = resolve_special_flags(6, 0, QuestFlags::DAILY, &empty, 0);
        assert!(flags.contains(SpecialFlags::REPEATABLE));

        let flags = resolve_special_flags(7, 0, QuestFlags::WEEKLY, &empty, 0);
        assert!(flags.contains(SpecialFlags::REPEATABLE));
    }

    #[test]
    fn test_monthly_kept_verbatim() {
        let empty = QuestObjectives::default();
        let flags = resolve_special_flags(8, SpecialFlags::MONTHLY.bits(), QuestFlags::NONE, &empty, 0);
        assert_eq!(flags, SpecialFlags::MONTHLY);
    }
}
