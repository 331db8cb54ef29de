// ==========================================
// 数控加工执行闭环 - 质量控制历史仓储
// ==========================================
// 红线: 每个检验最多一条记录（inspection_id 唯一）
// ==========================================

use crate::domain::feedback::ControlRecord;
use crate::domain::types::CorrectiveActionKind;
use crate::repository::error::{RepositoryError, RepositoryResult};
use crate::repository::row_utils::{invalid_enum, json_from_db, json_to_db, ts_from_db, ts_to_db};
use rusqlite::{params, Connection, OptionalExtension, Row};
use std::sync::{Arc, Mutex};

const SELECT_COLUMNS: &str = r#"
    SELECT record_id, loop_key, inspection_id, recorded_at,
           error, correction, action_kind, parameters_json
    FROM quality_control_history
"#;

fn map_record(row: &Row<'_>) -> rusqlite::Result<ControlRecord> {
    let kind_raw: String = row.get(6)?;
    let action_kind =
        CorrectiveActionKind::from_db_str(&kind_raw).ok_or_else(|| invalid_enum(6, &kind_raw))?;

    Ok(ControlRecord {
        record_id: row.get(0)?,
        loop_key: row.get(1)?,
        inspection_id: row.get(2)?,
        recorded_at: ts_from_db(3, &row.get::<_, String>(3)?)?,
        error: row.get(4)?,
        correction: row.get(5)?,
        action_kind,
        parameters: json_from_db(7, &row.get::<_, String>(7)?)?,
    })
}

// ==========================================
// ControlHistoryRepository - 控制历史仓储
// ==========================================
pub struct ControlHistoryRepository {
    conn: Arc<Mutex<Connection>>,
}

impl ControlHistoryRepository {
    pub fn new(conn: Arc<Mutex<Connection>>) -> Self {
        Self { conn }
    }

    fn get_conn(&self) -> RepositoryResult<std::sync::MutexGuard<Connection>> {
        self.conn
            .lock()
            .map_err(|e| RepositoryError::LockError(e.to_string()))
    }

    /// 追加记录
    ///
    /// # 错误
    /// - `RepositoryError::UniqueConstraintViolation`: 该检验已有记录
    pub fn insert(&self, record: &ControlRecord) -> RepositoryResult<()> {
        let parameters_json = json_to_db(&record.parameters)?;
        let conn = self.get_conn()?;
        conn.execute(
            r#"
            INSERT INTO quality_control_history (
                record_id, loop_key, inspection_id, recorded_at,
                error, correction, action_kind, parameters_json
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
            "#,
            params![
                record.record_id,
                record.loop_key,
                record.inspection_id,
                ts_to_db(&record.recorded_at),
                record.error,
                record.correction,
                record.action_kind.to_db_str(),
                parameters_json,
            ],
        )?;
        Ok(())
    }

    pub fn find_by_inspection(&self, inspection_id: &str) -> RepositoryResult<Option<ControlRecord>> {
        let conn = self.get_conn()?;
        let sql = format!("{} WHERE inspection_id = ?1", SELECT_COLUMNS);
        let record = conn
            .query_row(&sql, params![inspection_id], map_record)
            .optional()?;
        Ok(record)
    }

    /// 最近 `window` 条记录，按时间正序返回（最后一条为最新）
    pub fn recent_by_loop(&self, loop_key: &str, window: usize) -> RepositoryResult<Vec<ControlRecord>> {
        let conn = self.get_conn()?;
        let sql = format!(
            "{} WHERE loop_key = ?1 ORDER BY recorded_at DESC, record_id DESC LIMIT ?2",
            SELECT_COLUMNS
        );
        let mut stmt = conn.prepare(&sql)?;
        let mut records = stmt
            .query_map(params![loop_key, window as i64], map_record)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        records.reverse();
        Ok(records)
    }

    /// 回路的全部记录（按时间正序）
    pub fn list_by_loop(&self, loop_key: &str) -> RepositoryResult<Vec<ControlRecord>> {
        let conn = self.get_conn()?;
        let sql = format!(
            "{} WHERE loop_key = ?1 ORDER BY recorded_at ASC, record_id ASC",
            SELECT_COLUMNS
        );
        let mut stmt = conn.prepare(&sql)?;
        let records = stmt
            .query_map(params![loop_key], map_record)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(records)
    }
}
