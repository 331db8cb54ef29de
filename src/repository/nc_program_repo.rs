// ==========================================
// 数控加工执行闭环 - NC 程序仓储
// ==========================================
// 红线: Repository 不含业务逻辑
// 说明: 程序体写入后不再修改；补偿注记只追加，版本号后缀 .auto
// ==========================================

use crate::domain::nc_program::NcProgram;
use crate::repository::error::{RepositoryError, RepositoryResult};
use crate::repository::row_utils::{json_from_db, json_to_db, ts_from_db, ts_to_db};
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension, Row};
use std::sync::{Arc, Mutex};

const SELECT_COLUMNS: &str = r#"
    SELECT id, name, version, file_hash, content, annotations_json,
           machine_compatibility_json, created_by, created_at, updated_at
    FROM nc_programs
"#;

fn map_program(row: &Row<'_>) -> rusqlite::Result<NcProgram> {
    Ok(NcProgram {
        id: row.get(0)?,
        name: row.get(1)?,
        version: row.get(2)?,
        file_hash: row.get(3)?,
        content: row.get(4)?,
        annotations: json_from_db(5, &row.get::<_, String>(5)?)?,
        machine_compatibility: json_from_db(6, &row.get::<_, String>(6)?)?,
        created_by: row.get(7)?,
        created_at: ts_from_db(8, &row.get::<_, String>(8)?)?,
        updated_at: ts_from_db(9, &row.get::<_, String>(9)?)?,
    })
}

// ==========================================
// NcProgramRepository - NC 程序仓储
// ==========================================
pub struct NcProgramRepository {
    conn: Arc<Mutex<Connection>>,
}

impl NcProgramRepository {
    pub fn new(conn: Arc<Mutex<Connection>>) -> Self {
        Self { conn }
    }

    fn get_conn(&self) -> RepositoryResult<std::sync::MutexGuard<Connection>> {
        self.conn
            .lock()
            .map_err(|e| RepositoryError::LockError(e.to_string()))
    }

    pub fn save(&self, program: &NcProgram) -> RepositoryResult<()> {
        let annotations_json = json_to_db(&program.annotations)?;
        let compatibility_json = json_to_db(&program.machine_compatibility)?;
        let conn = self.get_conn()?;
        conn.execute(
            r#"
            INSERT INTO nc_programs (
                id, name, version, file_hash, content, annotations_json,
                machine_compatibility_json, created_by, created_at, updated_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)
            "#,
            params![
                program.id,
                program.name,
                program.version,
                program.file_hash,
                program.content,
                annotations_json,
                compatibility_json,
                program.created_by,
                ts_to_db(&program.created_at),
                ts_to_db(&program.updated_at),
            ],
        )?;
        Ok(())
    }

    pub fn find_by_id(&self, id: &str) -> RepositoryResult<Option<NcProgram>> {
        let conn = self.get_conn()?;
        let sql = format!("{} WHERE id = ?1", SELECT_COLUMNS);
        let program = conn.query_row(&sql, params![id], map_program).optional()?;
        Ok(program)
    }

    pub fn find_by_name_and_version(
        &self,
        name: &str,
        version: &str,
    ) -> RepositoryResult<Option<NcProgram>> {
        let conn = self.get_conn()?;
        let sql = format!("{} WHERE name = ?1 AND version = ?2 LIMIT 1", SELECT_COLUMNS);
        let program = conn
            .query_row(&sql, params![name, version], map_program)
            .optional()?;
        Ok(program)
    }

    /// 查询全部程序（按登记先后，保证“首个兼容”策略结果稳定）
    pub fn find_all(&self) -> RepositoryResult<Vec<NcProgram>> {
        let conn = self.get_conn()?;
        let sql = format!("{} ORDER BY created_at ASC, id ASC", SELECT_COLUMNS);
        let mut stmt = conn.prepare(&sql)?;
        let programs = stmt
            .query_map([], map_program)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(programs)
    }

    /// 追加补偿注记并提升版本
    ///
    /// 读-改-写在同一事务内完成，返回更新后的程序。
    pub fn append_annotation(
        &self,
        id: &str,
        note: &str,
        updated_at: DateTime<Utc>,
    ) -> RepositoryResult<NcProgram> {
        let mut conn = self.get_conn()?;
        let tx = conn
            .transaction()
            .map_err(|e| RepositoryError::DatabaseTransactionError(e.to_string()))?;

        let sql = format!("{} WHERE id = ?1", SELECT_COLUMNS);
        let mut program = tx
            .query_row(&sql, params![id], map_program)
            .optional()?
            .ok_or_else(|| RepositoryError::not_found("NcProgram", id))?;

        program.annotate(note);
        program.updated_at = updated_at;

        tx.execute(
            "UPDATE nc_programs SET version = ?2, annotations_json = ?3, updated_at = ?4 WHERE id = ?1",
            params![
                program.id,
                program.version,
                json_to_db(&program.annotations)?,
                ts_to_db(&program.updated_at),
            ],
        )?;
        tx.commit()
            .map_err(|e| RepositoryError::DatabaseTransactionError(e.to_string()))?;

        Ok(program)
    }

    pub fn delete(&self, id: &str) -> RepositoryResult<()> {
        let conn = self.get_conn()?;
        let rows = conn.execute("DELETE FROM nc_programs WHERE id = ?1", params![id])?;
        if rows == 0 {
            return Err(RepositoryError::not_found("NcProgram", id));
        }
        Ok(())
    }
}
