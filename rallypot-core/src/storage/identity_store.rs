use crate::error::Result;
use crate::storage::Storage;
use crate::types::Address;
use chrono::Utc;
use rusqlite::params;
use serde::{Deserialize, Serialize};

/// Persisted form of a local signing identity. The secret is stored as plain
/// hex: key custody is deliberately simplistic here and is documented as a
/// known weakness of the protocol, not hardened away.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IdentityRecord {
    pub id: String,
    pub name: String,
    pub address: Address,
    pub secret_hex: String,
    pub created_at: chrono::DateTime<Utc>,
}

pub struct IdentityStore<'a> {
    storage: &'a Storage,
}

impl<'a> IdentityStore<'a> {
    pub fn new(storage: &'a Storage) -> Self {
        Self { storage }
    }

    pub async fn save_identity(&self, record: &IdentityRecord) -> Result<()> {
        let conn = self.storage.get_connection().await;

        conn.execute(
            "INSERT OR REPLACE INTO identities (id, name, address, secret_hex, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                record.id,
                record.name,
                record.address.to_hex(),
                record.secret_hex,
                record.created_at.timestamp(),
            ],
        )?;

        Ok(())
    }

    pub async fn list_identities(&self) -> Result<Vec<IdentityRecord>> {
        let conn = self.storage.get_connection().await;

        // Same-second creates tie on the timestamp, so break ties by name.
        let mut stmt = conn.prepare(
            "SELECT id, name, address, secret_hex, created_at
             FROM identities ORDER BY created_at ASC, name ASC",
        )?;

        let rows = stmt.query_map([], |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, String>(2)?,
                row.get::<_, String>(3)?,
                row.get::<_, i64>(4)?,
            ))
        })?;

        let mut records = Vec::new();
        for row in rows {
            let (id, name, address_hex, secret_hex, created_at) = row?;
            records.push(IdentityRecord {
                id,
                name,
                address: Address::from_hex(&address_hex)?,
                secret_hex,
                created_at: chrono::DateTime::from_timestamp(created_at, 0)
                    .unwrap_or_else(Utc::now),
            });
        }

        Ok(records)
    }

    pub async fn identity_exists(&self, name: &str) -> Result<bool> {
        let conn = self.storage.get_connection().await;

        let count: i64 = conn.query_row(
            "SELECT COUNT(*) FROM identities WHERE name = ?1",
            params![name],
            |row| row.get(0),
        )?;

        Ok(count > 0)
    }
}
