use crate::error::{Result, SettleError};
use crate::store::{MatchStore, Subscription};
use crate::wager::{Match, MatchId};
use async_trait::async_trait;
use chrono::Utc;
use rallypot_core::Storage;
use rusqlite::{params, OptionalExtension};
use std::sync::Arc;
use tokio::sync::broadcast;

const EVENT_CHANNEL_CAPACITY: usize = 64;

/// Match store on the shared sqlite database, with in-process push
/// notifications layered on top.
///
/// The broadcast channel only reaches subscribers inside this process;
/// clients in other processes see writes through their reconciliation poll.
pub struct SqliteMatchStore {
    storage: Arc<Storage>,
    events: broadcast::Sender<Match>,
}

impl SqliteMatchStore {
    pub async fn new(storage: Arc<Storage>) -> Result<Self> {
        {
            let conn = storage.get_connection().await;
            conn.execute(
                "CREATE TABLE IF NOT EXISTS matches (
                    id TEXT PRIMARY KEY,
                    revision INTEGER NOT NULL,
                    record TEXT NOT NULL,
                    updated_at TEXT NOT NULL
                )",
                [],
            )?;
        }

        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        Ok(Self { storage, events })
    }

    /// Every stored match, most recently written first.
    pub async fn list(&self) -> Result<Vec<Match>> {
        let conn = self.storage.get_connection().await;
        let mut stmt = conn.prepare("SELECT record FROM matches ORDER BY updated_at DESC")?;
        let rows = stmt.query_map([], |row| row.get::<_, String>(0))?;

        let mut matches = Vec::new();
        for record in rows {
            matches.push(serde_json::from_str(&record?)?);
        }
        Ok(matches)
    }

    fn publish(&self, record: &Match) {
        // No subscribers is fine.
        let _ = self.events.send(record.clone());
    }
}

#[async_trait]
impl MatchStore for SqliteMatchStore {
    async fn get(&self, id: &MatchId) -> Result<Match> {
        let conn = self.storage.get_connection().await;
        let record: Option<String> = conn
            .query_row(
                "SELECT record FROM matches WHERE id = ?1",
                params![id.as_str()],
                |row| row.get(0),
            )
            .optional()?;

        match record {
            Some(json) => Ok(serde_json::from_str(&json)?),
            None => Err(SettleError::MatchNotFound(id.clone())),
        }
    }

    async fn insert(&self, record: &Match) -> Result<()> {
        let json = serde_json::to_string(record)?;

        {
            let conn = self.storage.get_connection().await;
            let inserted = conn.execute(
                "INSERT OR IGNORE INTO matches (id, revision, record, updated_at)
                 VALUES (?1, ?2, ?3, ?4)",
                params![
                    record.id.as_str(),
                    record.revision as i64,
                    json,
                    Utc::now().to_rfc3339(),
                ],
            )?;
            if inserted == 0 {
                return Err(SettleError::Conflict(format!(
                    "Match code {} is already taken",
                    record.id
                )));
            }
        }

        self.publish(record);
        Ok(())
    }

    async fn update(&self, record: &Match) -> Result<Match> {
        let mut bumped = record.clone();
        bumped.revision = record.revision + 1;
        let json = serde_json::to_string(&bumped)?;

        {
            let conn = self.storage.get_connection().await;
            let updated = conn.execute(
                "UPDATE matches SET record = ?3, revision = ?4, updated_at = ?5
                 WHERE id = ?1 AND revision = ?2",
                params![
                    record.id.as_str(),
                    record.revision as i64,
                    json,
                    bumped.revision as i64,
                    Utc::now().to_rfc3339(),
                ],
            )?;

            if updated == 0 {
                // Disambiguate a missing row from a lost race.
                let exists: i64 = conn.query_row(
                    "SELECT COUNT(*) FROM matches WHERE id = ?1",
                    params![record.id.as_str()],
                    |row| row.get(0),
                )?;
                if exists == 0 {
                    return Err(SettleError::MatchNotFound(record.id.clone()));
                }
                return Err(SettleError::Conflict(format!(
                    "Match {} was modified concurrently",
                    record.id
                )));
            }
        }

        self.publish(&bumped);
        Ok(bumped)
    }

    async fn subscribe(&self, id: &MatchId) -> Result<Subscription> {
        Ok(Subscription::new(id.clone(), self.events.subscribe()))
    }
}
