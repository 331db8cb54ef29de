// ==========================================
// 数控加工执行闭环 - 刀补调整记录仓储
// ==========================================
// 红线: 只追加，不修改
// ==========================================

use crate::domain::feedback::ToolOffsetAdjustment;
use crate::domain::types::CorrectiveActionKind;
use crate::repository::error::{RepositoryError, RepositoryResult};
use crate::repository::row_utils::{invalid_enum, json_from_db, json_to_db, ts_from_db, ts_to_db};
use rusqlite::{params, Connection, Row};
use std::sync::{Arc, Mutex};

fn map_adjustment(row: &Row<'_>) -> rusqlite::Result<ToolOffsetAdjustment> {
    let kind_raw: String = row.get(3)?;
    let action_kind =
        CorrectiveActionKind::from_db_str(&kind_raw).ok_or_else(|| invalid_enum(3, &kind_raw))?;

    Ok(ToolOffsetAdjustment {
        adjustment_id: row.get(0)?,
        nc_program_id: row.get(1)?,
        inspection_id: row.get(2)?,
        action_kind,
        parameters: json_from_db(4, &row.get::<_, String>(4)?)?,
        executed_at: ts_from_db(5, &row.get::<_, String>(5)?)?,
    })
}

pub struct ToolOffsetRepository {
    conn: Arc<Mutex<Connection>>,
}

impl ToolOffsetRepository {
    pub fn new(conn: Arc<Mutex<Connection>>) -> Self {
        Self { conn }
    }

    fn get_conn(&self) -> RepositoryResult<std::sync::MutexGuard<Connection>> {
        self.conn
            .lock()
            .map_err(|e| RepositoryError::LockError(e.to_string()))
    }

    pub fn insert(&self, adjustment: &ToolOffsetAdjustment) -> RepositoryResult<()> {
        let parameters_json = json_to_db(&adjustment.parameters)?;
        let conn = self.get_conn()?;
        conn.execute(
            r#"
            INSERT INTO tool_offset_adjustments (
                adjustment_id, nc_program_id, inspection_id, action_kind,
                parameters_json, executed_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6)
            "#,
            params![
                adjustment.adjustment_id,
                adjustment.nc_program_id,
                adjustment.inspection_id,
                adjustment.action_kind.to_db_str(),
                parameters_json,
                ts_to_db(&adjustment.executed_at),
            ],
        )?;
        Ok(())
    }

    /// 按程序查询（按执行时间）
    pub fn list_by_program(&self, nc_program_id: &str) -> RepositoryResult<Vec<ToolOffsetAdjustment>> {
        let conn = self.get_conn()?;
        let mut stmt = conn.prepare(
            r#"
            SELECT adjustment_id, nc_program_id, inspection_id, action_kind,
                   parameters_json, executed_at
            FROM tool_offset_adjustments
            WHERE nc_program_id = ?1
            ORDER BY executed_at ASC, adjustment_id ASC
            "#,
        )?;
        let adjustments = stmt
            .query_map(params![nc_program_id], map_adjustment)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(adjustments)
    }
}
