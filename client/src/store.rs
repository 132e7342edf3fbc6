//! Match bookkeeping that outlives a single game.

use std::collections::HashMap;
use std::fmt;
use std::sync::{Mutex, PoisonError};
use std::time::SystemTime;

use serde::{Deserialize, Serialize};
use shared::PlayerId;
use thiserror::Error;
use uuid::Uuid;

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MatchId(pub String);

impl MatchId {
    pub fn generate() -> Self {
        MatchId(Uuid::new_v4().to_string())
    }
}

impl fmt::Display for MatchId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MatchStatus {
    Waiting,
    Playing,
    Finished,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MatchRecord {
    pub id: MatchId,
    /// Short join code, also used as the channel topic.
    pub code: String,
    pub status: MatchStatus,
    pub player1_id: PlayerId,
    pub player2_id: Option<PlayerId>,
    pub winner_id: Option<PlayerId>,
    pub created_at: SystemTime,
}

/// Partial update; `None` fields are left untouched, except that a
/// `Finished` status always overwrites `winner_id` (a draw clears it).
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MatchUpdate {
    pub status: Option<MatchStatus>,
    pub player2_id: Option<PlayerId>,
    pub winner_id: Option<PlayerId>,
}

impl MatchUpdate {
    pub fn finished(winner_id: Option<PlayerId>) -> Self {
        Self {
            status: Some(MatchStatus::Finished),
            player2_id: None,
            winner_id,
        }
    }

    pub fn joined(player2_id: PlayerId) -> Self {
        Self {
            status: Some(MatchStatus::Playing),
            player2_id: Some(player2_id),
            winner_id: None,
        }
    }
}

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("match {0} not found")]
    NotFound(MatchId),
    #[error("a waiting match already uses code `{0}`")]
    DuplicateCode(String),
    #[error("store backend error: {0}")]
    Backend(String),
}

pub trait MatchStore {
    fn create_match(&self, code: &str, player1_id: PlayerId) -> Result<MatchRecord, StoreError>;

    fn find_waiting_match(&self, code: &str) -> Result<Option<MatchRecord>, StoreError>;

    fn update_match(&self, id: &MatchId, update: MatchUpdate) -> Result<MatchRecord, StoreError>;
}

#[derive(Debug, Default)]
pub struct MemoryMatchStore {
    records: Mutex<HashMap<MatchId, MatchRecord>>,
}

impl MemoryMatchStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, id: &MatchId) -> Option<MatchRecord> {
        let records = self.records.lock().unwrap_or_else(PoisonError::into_inner);
        records.get(id).cloned()
    }

    pub fn len(&self) -> usize {
        self.records
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl MatchStore for MemoryMatchStore {
    fn create_match(&self, code: &str, player1_id: PlayerId) -> Result<MatchRecord, StoreError> {
        let mut records = self.records.lock().unwrap_or_else(PoisonError::into_inner);
        if records
            .values()
            .any(|r| r.code == code && r.status == MatchStatus::Waiting)
        {
            return Err(StoreError::DuplicateCode(code.to_string()));
        }

        let record = MatchRecord {
            id: MatchId::generate(),
            code: code.to_string(),
            status: MatchStatus::Waiting,
            player1_id,
            player2_id: None,
            winner_id: None,
            created_at: SystemTime::now(),
        };
        records.insert(record.id.clone(), record.clone());
        Ok(record)
    }

    fn find_waiting_match(&self, code: &str) -> Result<Option<MatchRecord>, StoreError> {
        let records = self.records.lock().unwrap_or_else(PoisonError::into_inner);
        Ok(records
            .values()
            .filter(|r| r.code == code && r.status == MatchStatus::Waiting)
            .max_by_key(|r| r.created_at)
            .cloned())
    }

    fn update_match(&self, id: &MatchId, update: MatchUpdate) -> Result<MatchRecord, StoreError> {
        let mut records = self.records.lock().unwrap_or_else(PoisonError::into_inner);
        let record = records
            .get_mut(id)
            .ok_or_else(|| StoreError::NotFound(id.clone()))?;

        if let Some(player2_id) = update.player2_id {
            record.player2_id = Some(player2_id);
        }
        if let Some(status) = update.status {
            record.status = status;
            if status == MatchStatus::Finished {
                record.winner_id = update.winner_id;
            }
        }
        Ok(record.clone())
    }
}
