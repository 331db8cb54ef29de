// ==========================================
// 数控加工执行闭环 - 机床仓储
// ==========================================
// 红线: Repository 不含业务逻辑
// 并发: 运行状态变更以“期望旧运行状态”为条件，单条 UPDATE 完成
// ==========================================

use crate::domain::machine::{Machine, MachineStatus};
use crate::domain::types::MachineRunningState;
use crate::repository::error::{RepositoryError, RepositoryResult};
use crate::repository::row_utils::{invalid_enum, json_from_db, json_to_db, ts_from_db, ts_to_db};
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension, Row};
use std::sync::{Arc, Mutex};

const SELECT_COLUMNS: &str = r#"
    SELECT id, name, ip_address, machine_type, capabilities_json,
           running_state, current_job_id, last_heartbeat, error_message,
           created_at, updated_at
    FROM machines
"#;

fn map_machine(row: &Row<'_>) -> rusqlite::Result<Machine> {
    let state_raw: String = row.get(5)?;
    let running_state =
        MachineRunningState::from_db_str(&state_raw).ok_or_else(|| invalid_enum(5, &state_raw))?;

    Ok(Machine {
        id: row.get(0)?,
        name: row.get(1)?,
        ip_address: row.get(2)?,
        machine_type: row.get(3)?,
        capabilities: json_from_db(4, &row.get::<_, String>(4)?)?,
        status: MachineStatus {
            running_state,
            current_job_id: row.get(6)?,
            last_heartbeat: ts_from_db(7, &row.get::<_, String>(7)?)?,
            error_message: row.get(8)?,
        },
        created_at: ts_from_db(9, &row.get::<_, String>(9)?)?,
        updated_at: ts_from_db(10, &row.get::<_, String>(10)?)?,
    })
}

// ==========================================
// MachineRepository - 机床仓储
// ==========================================
pub struct MachineRepository {
    conn: Arc<Mutex<Connection>>,
}

impl MachineRepository {
    pub fn new(conn: Arc<Mutex<Connection>>) -> Self {
        Self { conn }
    }

    fn get_conn(&self) -> RepositoryResult<std::sync::MutexGuard<Connection>> {
        self.conn
            .lock()
            .map_err(|e| RepositoryError::LockError(e.to_string()))
    }

    pub fn save(&self, machine: &Machine) -> RepositoryResult<()> {
        let capabilities_json = json_to_db(&machine.capabilities)?;
        let conn = self.get_conn()?;
        conn.execute(
            r#"
            INSERT INTO machines (
                id, name, ip_address, machine_type, capabilities_json,
                running_state, current_job_id, last_heartbeat, error_message,
                created_at, updated_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)
            "#,
            params![
                machine.id,
                machine.name,
                machine.ip_address,
                machine.machine_type,
                capabilities_json,
                machine.status.running_state.to_db_str(),
                machine.status.current_job_id,
                ts_to_db(&machine.status.last_heartbeat),
                machine.status.error_message,
                ts_to_db(&machine.created_at),
                ts_to_db(&machine.updated_at),
            ],
        )?;
        Ok(())
    }

    pub fn find_by_id(&self, id: &str) -> RepositoryResult<Option<Machine>> {
        let conn = self.get_conn()?;
        let sql = format!("{} WHERE id = ?1", SELECT_COLUMNS);
        let machine = conn.query_row(&sql, params![id], map_machine).optional()?;
        Ok(machine)
    }

    pub fn find_all(&self) -> RepositoryResult<Vec<Machine>> {
        let conn = self.get_conn()?;
        let sql = format!("{} ORDER BY id ASC", SELECT_COLUMNS);
        let mut stmt = conn.prepare(&sql)?;
        let machines = stmt
            .query_map([], map_machine)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(machines)
    }

    /// 查询空闲（Stopped）机床
    pub fn find_available(&self) -> RepositoryResult<Vec<Machine>> {
        let conn = self.get_conn()?;
        let sql = format!("{} WHERE running_state = ?1 ORDER BY id ASC", SELECT_COLUMNS);
        let mut stmt = conn.prepare(&sql)?;
        let machines = stmt
            .query_map(params![MachineRunningState::Stopped.to_db_str()], map_machine)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(machines)
    }

    /// 全量更新（心跳/故障上报）
    pub fn update(&self, machine: &Machine) -> RepositoryResult<()> {
        let capabilities_json = json_to_db(&machine.capabilities)?;
        let conn = self.get_conn()?;
        let rows = conn.execute(
            r#"
            UPDATE machines
            SET name = ?2, ip_address = ?3, machine_type = ?4, capabilities_json = ?5,
                running_state = ?6, current_job_id = ?7, last_heartbeat = ?8,
                error_message = ?9, updated_at = ?10
            WHERE id = ?1
            "#,
            params![
                machine.id,
                machine.name,
                machine.ip_address,
                machine.machine_type,
                capabilities_json,
                machine.status.running_state.to_db_str(),
                machine.status.current_job_id,
                ts_to_db(&machine.status.last_heartbeat),
                machine.status.error_message,
                ts_to_db(&machine.updated_at),
            ],
        )?;
        if rows == 0 {
            return Err(RepositoryError::not_found("Machine", &machine.id));
        }
        Ok(())
    }

    /// 条件更新运行状态（CAS）
    ///
    /// 仅当库中 running_state 等于 `expected` 时写入 `status`，
    /// 检查与写入在同一条 UPDATE 中完成。
    ///
    /// # 错误
    /// - `RepositoryError::NotFound`: 机床不存在
    /// - `RepositoryError::ConditionalUpdateFailed`: 运行状态已被其他请求修改
    pub fn transition_status_if(
        &self,
        id: &str,
        expected: MachineRunningState,
        status: &MachineStatus,
        updated_at: DateTime<Utc>,
    ) -> RepositoryResult<()> {
        let conn = self.get_conn()?;
        let rows = conn.execute(
            r#"
            UPDATE machines
            SET running_state = ?3, current_job_id = ?4, last_heartbeat = ?5,
                error_message = ?6, updated_at = ?7
            WHERE id = ?1 AND running_state = ?2
            "#,
            params![
                id,
                expected.to_db_str(),
                status.running_state.to_db_str(),
                status.current_job_id,
                ts_to_db(&status.last_heartbeat),
                status.error_message,
                ts_to_db(&updated_at),
            ],
        )?;

        if rows == 0 {
            let actual: Option<String> = conn
                .query_row(
                    "SELECT running_state FROM machines WHERE id = ?1",
                    params![id],
                    |row| row.get(0),
                )
                .optional()?;
            return match actual {
                Some(actual) => Err(RepositoryError::ConditionalUpdateFailed {
                    entity: "Machine".to_string(),
                    id: id.to_string(),
                    expected: expected.to_db_str().to_string(),
                    actual,
                }),
                None => Err(RepositoryError::not_found("Machine", id)),
            };
        }
        Ok(())
    }

    pub fn delete(&self, id: &str) -> RepositoryResult<()> {
        let conn = self.get_conn()?;
        let rows = conn.execute("DELETE FROM machines WHERE id = ?1", params![id])?;
        if rows == 0 {
            return Err(RepositoryError::not_found("Machine", id));
        }
        Ok(())
    }
}
