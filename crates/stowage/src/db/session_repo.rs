//! Backend session repository: persistence for the `backend_sessions` table.

use rusqlite::{params, OptionalExtension, Row};
use secrecy::{ExposeSecret, SecretString};

use super::{parse_timestamp, Database, DatabaseError};
use crate::model::BackendSession;

fn from_row(row: &Row<'_>) -> Result<BackendSession, rusqlite::Error> {
    let archived_at: Option<String> = row.get(4)?;
    Ok(BackendSession {
        id: row.get(0)?,
        token: SecretString::from(row.get::<_, String>(1)?),
        archived: row.get(2)?,
        created_at: parse_timestamp(3, &row.get::<_, String>(3)?)?,
        archived_at: archived_at
            .map(|raw| parse_timestamp(4, &raw))
            .transpose()?,
    })
}

/// Inserts or updates a session keyed by id.
pub fn upsert(db: &Database, session: &BackendSession) -> Result<(), DatabaseError> {
    db.with_conn(|conn| {
        conn.execute(
            "INSERT INTO backend_sessions (id, token, archived, created_at, archived_at)
             VALUES (?1, ?2, ?3, ?4, ?5)
             ON CONFLICT(id) DO UPDATE SET
               token = ?2,
               archived = ?3,
               archived_at = ?5",
            params![
                session.id,
                session.token.expose_secret(),
                session.archived,
                session.created_at.to_rfc3339(),
                session.archived_at.map(|t| t.to_rfc3339()),
            ],
        )?;
        Ok(())
    })
}

/// Returns the newest non-archived session, if any.
pub fn find_active(db: &Database) -> Result<Option<BackendSession>, DatabaseError> {
    db.with_conn(|conn| {
        let row = conn
            .query_row(
                "SELECT id, token, archived, created_at, archived_at FROM backend_sessions
                 WHERE archived = 0 ORDER BY created_at DESC, rowid DESC LIMIT 1",
                [],
                from_row,
            )
            .optional()?;
        Ok(row)
    })
}

/// Lists every session, archived ones included, oldest first.
pub fn list(db: &Database) -> Result<Vec<BackendSession>, DatabaseError> {
    db.with_conn(|conn| {
        let mut stmt = conn.prepare(
            "SELECT id, token, archived, created_at, archived_at FROM backend_sessions
             ORDER BY created_at ASC, rowid ASC",
        )?;
        let rows = stmt
            .query_map([], from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    })
}
