//! Upload repository: persistence for the `uploads` table.

use rusqlite::{params, OptionalExtension, Row};

use super::{encode_detail, parse_detail, parse_status, parse_timestamp, Database, DatabaseError};
use crate::model::UploadRecord;

const COLUMNS: &str = "content_address, job_id, job_status, original_name, size_bytes, detail, created_at, updated_at";

fn from_row(row: &Row<'_>) -> Result<UploadRecord, rusqlite::Error> {
    let size: i64 = row.get(4)?;
    Ok(UploadRecord {
        content_address: row.get(0)?,
        job_id: row.get(1)?,
        job_status: parse_status(2, &row.get::<_, String>(2)?)?,
        original_name: row.get(3)?,
        size_bytes: u64::try_from(size).map_err(|e| {
            rusqlite::Error::FromSqlConversionFailure(4, rusqlite::types::Type::Integer, Box::new(e))
        })?,
        detail: parse_detail(5, row.get(5)?)?,
        created_at: parse_timestamp(6, &row.get::<_, String>(6)?)?,
        updated_at: parse_timestamp(7, &row.get::<_, String>(7)?)?,
    })
}

/// Inserts or replaces the upload keyed by its content address.
///
/// `created_at` of an existing row is preserved.
pub fn upsert(db: &Database, record: &UploadRecord) -> Result<(), DatabaseError> {
    let detail = encode_detail(record.detail.as_ref())?;
    let size = i64::try_from(record.size_bytes).unwrap_or(i64::MAX);
    db.with_conn(|conn| {
        conn.execute(
            "INSERT INTO uploads (content_address, job_id, job_status, original_name, size_bytes, detail, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
             ON CONFLICT(content_address) DO UPDATE SET
               job_id = ?2,
               job_status = ?3,
               original_name = ?4,
               size_bytes = ?5,
               detail = ?6,
               updated_at = ?8",
            params![
                record.content_address,
                record.job_id,
                record.job_status.as_str(),
                record.original_name,
                size,
                detail,
                record.created_at.to_rfc3339(),
                record.updated_at.to_rfc3339(),
            ],
        )?;
        Ok(())
    })
}

/// Writes status and detail of the upload, only while it still belongs to
/// `record.job_id`. Returns `false` when the row was resubmitted under
/// another job (or is gone).
pub fn update_job_status(db: &Database, record: &UploadRecord) -> Result<bool, DatabaseError> {
    let detail = encode_detail(record.detail.as_ref())?;
    db.with_conn(|conn| {
        let changed = conn.execute(
            "UPDATE uploads SET job_status = ?3, detail = ?4, updated_at = ?5
             WHERE content_address = ?1 AND job_id = ?2",
            params![
                record.content_address,
                record.job_id,
                record.job_status.as_str(),
                detail,
                record.updated_at.to_rfc3339(),
            ],
        )?;
        Ok(changed == 1)
    })
}

/// Finds an upload by content address.
pub fn find_by_content_address(
    db: &Database,
    content_address: &str,
) -> Result<Option<UploadRecord>, DatabaseError> {
    db.with_conn(|conn| {
        let sql = format!("SELECT {} FROM uploads WHERE content_address = ?1", COLUMNS);
        let row = conn
            .query_row(&sql, params![content_address], from_row)
            .optional()?;
        Ok(row)
    })
}

/// Finds the most recent upload carrying the given job id.
pub fn find_by_job_id(db: &Database, job_id: &str) -> Result<Option<UploadRecord>, DatabaseError> {
    db.with_conn(|conn| {
        let sql = format!(
            "SELECT {} FROM uploads WHERE job_id = ?1 ORDER BY updated_at DESC LIMIT 1",
            COLUMNS
        );
        let row = conn.query_row(&sql, params![job_id], from_row).optional()?;
        Ok(row)
    })
}
