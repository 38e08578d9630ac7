//! Quest State Rules
//!
//! Which quest states a quest may be in, and whether a synchronized quest
//! record is plausible against the catalog.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::CatalogProvider;

/// Quest progress state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[repr(u8)]
pub enum QuestState {
    /// Not available in this game.
    NotAvailable = 0,
    /// Available, not started.
    Init = 1,
    /// In progress.
    Active = 2,
    /// Finished.
    Done = 3,
    /// Hive quest, first tease.
    HiveTease1 = 4,
    /// Hive quest, second tease.
    HiveTease2 = 5,
    /// Hive quest in progress.
    HiveActive = 6,
    /// Hive quest finished.
    HiveDone = 7,
    /// Reset after a failed import.
    Invalid = 0xFF,
}

impl QuestState {
    /// Decode a wire byte.
    pub fn from_u8(value: u8) -> Option<Self> {
        match value {
            0 => Some(Self::NotAvailable),
            1 => Some(Self::Init),
            2 => Some(Self::Active),
            3 => Some(Self::Done),
            4 => Some(Self::HiveTease1),
            5 => Some(Self::HiveTease2),
            6 => Some(Self::HiveActive),
            7 => Some(Self::HiveDone),
            0xFF => Some(Self::Invalid),
            _ => None,
        }
    }
}

/// Reason a quest record is implausible.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum QuestInconsistency {
    /// No such quest.
    #[error("unknown quest")]
    UnknownQuest,
    /// State byte out of range.
    #[error("unknown quest state")]
    UnknownState,
    /// State not reachable for this quest.
    #[error("state not allowed for this quest")]
    StateNotAllowed,
    /// Log flag other than 0 or 1.
    #[error("log flag must be 0 or 1")]
    BadLogFlag,
    /// Message outside the speech table.
    #[error("message outside speech table")]
    UnknownMessage,
}

/// Check a synchronized quest record.
pub fn check_quest_record(
    catalog: &dyn CatalogProvider,
    quest: u8,
    state: u8,
    log: u8,
    message: i16,
) -> Result<(), QuestInconsistency> {
    let entry = catalog.quest(quest).ok_or(QuestInconsistency::UnknownQuest)?;
    if log > 1 {
        return Err(QuestInconsistency::BadLogFlag);
    }
    if message < 0 || message as u16 >= catalog.speech_count() {
        return Err(QuestInconsistency::UnknownMessage);
    }

    let allowed = match QuestState::from_u8(state).ok_or(QuestInconsistency::UnknownState)? {
        QuestState::NotAvailable | QuestState::Init | QuestState::Active | QuestState::Done => true,
        QuestState::HiveTease1 | QuestState::HiveTease2 | QuestState::HiveActive => entry.hive_progress,
        QuestState::HiveDone => entry.hive_done,
        QuestState::Invalid => false,
    };
    if !allowed {
        return Err(QuestInconsistency::StateNotAllowed);
    }
    Ok(())
}

// =============================================================================
// TESTS
// =============================================================================
