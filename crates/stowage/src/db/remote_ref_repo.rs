//! Remote reference repository: persistence for the `remote_references` table.

use rusqlite::{params, OptionalExtension, Row};

use super::{encode_detail, parse_detail, parse_status, parse_timestamp, Database, DatabaseError};
use crate::model::RemoteRefRecord;

const COLUMNS: &str =
    "source_url, folder_address, file_address, job_id, job_status, detail, created_at, updated_at";

fn from_row(row: &Row<'_>) -> Result<RemoteRefRecord, rusqlite::Error> {
    Ok(RemoteRefRecord {
        source_url: row.get(0)?,
        folder_address: row.get(1)?,
        file_address: row.get(2)?,
        job_id: row.get(3)?,
        job_status: parse_status(4, &row.get::<_, String>(4)?)?,
        detail: parse_detail(5, row.get(5)?)?,
        created_at: parse_timestamp(6, &row.get::<_, String>(6)?)?,
        updated_at: parse_timestamp(7, &row.get::<_, String>(7)?)?,
    })
}

/// Inserts or replaces the reference keyed by its source URL.
pub fn upsert(db: &Database, record: &RemoteRefRecord) -> Result<(), DatabaseError> {
    let detail = encode_detail(record.detail.as_ref())?;
    db.with_conn(|conn| {
        conn.execute(
            "INSERT INTO remote_references (source_url, folder_address, file_address, job_id, job_status, detail, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
             ON CONFLICT(source_url) DO UPDATE SET
               folder_address = ?2,
               file_address = ?3,
               job_id = ?4,
               job_status = ?5,
               detail = ?6,
               updated_at = ?8",
            params![
                record.source_url,
                record.folder_address,
                record.file_address,
                record.job_id,
                record.job_status.as_str(),
                detail,
                record.created_at.to_rfc3339(),
                record.updated_at.to_rfc3339(),
            ],
        )?;
        Ok(())
    })
}

/// Writes status and detail of the reference, only while it still belongs
/// to `record.job_id`. Returns `false` once the URL was resubmitted.
pub fn update_job_status(db: &Database, record: &RemoteRefRecord) -> Result<bool, DatabaseError> {
    let detail = encode_detail(record.detail.as_ref())?;
    db.with_conn(|conn| {
        let changed = conn.execute(
            "UPDATE remote_references SET job_status = ?3, detail = ?4, updated_at = ?5
             WHERE source_url = ?1 AND job_id = ?2",
            params![
                record.source_url,
                record.job_id,
                record.job_status.as_str(),
                detail,
                record.updated_at.to_rfc3339(),
            ],
        )?;
        Ok(changed == 1)
    })
}

pub fn find_by_url(db: &Database, source_url: &str) -> Result<Option<RemoteRefRecord>, DatabaseError> {
    db.with_conn(|conn| {
        let sql = format!("SELECT {} FROM remote_references WHERE source_url = ?1", COLUMNS);
        let row = conn.query_row(&sql, params![source_url], from_row).optional()?;
        Ok(row)
    })
}

/// Finds the most recently updated reference carrying the given job id.
pub fn find_by_job_id(db: &Database, job_id: &str) -> Result<Option<RemoteRefRecord>, DatabaseError> {
    db.with_conn(|conn| {
        let sql = format!(
            "SELECT {} FROM remote_references WHERE job_id = ?1 ORDER BY updated_at DESC LIMIT 1",
            COLUMNS
        );
        let row = conn.query_row(&sql, params![job_id], from_row).optional()?;
        Ok(row)
    })
}
