// ==========================================
// 数控加工执行闭环 - SQLite 连接初始化
// ==========================================
// 目标:
// - 统一所有 Connection::open 的 PRAGMA 行为（外键、busy_timeout）
// - 提供幂等的建表入口，供应用启动与测试共用
// ==========================================

use rusqlite::Connection;
use rusqlite::OptionalExtension;
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// 默认 busy_timeout（毫秒）
pub const DEFAULT_BUSY_TIMEOUT_MS: u64 = 5_000;

/// 当前代码所期望的 schema_version
pub const CURRENT_SCHEMA_VERSION: i64 = 1;

/// 配置 SQLite 连接的统一 PRAGMA
///
/// 说明：
/// - foreign_keys 需要“每个连接”单独开启
/// - busy_timeout 需要“每个连接”单独配置
pub fn configure_sqlite_connection(conn: &Connection) -> rusqlite::Result<()> {
    conn.execute_batch("PRAGMA foreign_keys = ON;")?;
    conn.busy_timeout(Duration::from_millis(DEFAULT_BUSY_TIMEOUT_MS))?;
    Ok(())
}

/// 打开 SQLite 连接并应用统一配置
pub fn open_sqlite_connection(db_path: &str) -> rusqlite::Result<Connection> {
    let conn = Connection::open(db_path)?;
    configure_sqlite_connection(&conn)?;
    Ok(conn)
}

/// 打开连接、建表，并包装为仓储层共享的 `Arc<Mutex<Connection>>`
pub fn open_shared_connection(db_path: &str) -> rusqlite::Result<Arc<Mutex<Connection>>> {
    let conn = open_sqlite_connection(db_path)?;
    init_schema(&conn)?;
    Ok(Arc::new(Mutex::new(conn)))
}

/// 内存库（单元测试用）
pub fn open_in_memory_shared() -> rusqlite::Result<Arc<Mutex<Connection>>> {
    let conn = Connection::open_in_memory()?;
    configure_sqlite_connection(&conn)?;
    init_schema(&conn)?;
    Ok(Arc::new(Mutex::new(conn)))
}

/// 幂等建表
///
/// 说明：迁移工具不在本系统范围内，这里只保证核心实体所需的表存在。
pub fn init_schema(conn: &Connection) -> rusqlite::Result<()> {
    conn.execute_batch(
        r#"
        CREATE TABLE IF NOT EXISTS schema_version (
            version INTEGER PRIMARY KEY,
            applied_at TEXT NOT NULL DEFAULT (datetime('now'))
        );

        CREATE TABLE IF NOT EXISTS config_kv (
            scope_id TEXT NOT NULL,
            key TEXT NOT NULL,
            value TEXT NOT NULL,
            updated_at TEXT NOT NULL DEFAULT (datetime('now')),
            PRIMARY KEY (scope_id, key)
        );

        CREATE TABLE IF NOT EXISTS production_orders (
            id TEXT PRIMARY KEY,
            order_number TEXT NOT NULL UNIQUE,
            part_id TEXT NOT NULL,
            quantity INTEGER NOT NULL CHECK (quantity > 0),
            status TEXT NOT NULL,
            planned_start TEXT NOT NULL,
            planned_end TEXT NOT NULL,
            assigned_machines_json TEXT NOT NULL DEFAULT '[]',
            created_at TEXT NOT NULL,
            updated_at TEXT NOT NULL
        );

        CREATE TABLE IF NOT EXISTS machines (
            id TEXT PRIMARY KEY,
            name TEXT NOT NULL,
            ip_address TEXT NOT NULL,
            machine_type TEXT NOT NULL,
            capabilities_json TEXT NOT NULL DEFAULT '[]',
            running_state TEXT NOT NULL,
            current_job_id TEXT,
            last_heartbeat TEXT NOT NULL,
            error_message TEXT,
            created_at TEXT NOT NULL,
            updated_at TEXT NOT NULL
        );
        CREATE INDEX IF NOT EXISTS idx_machines_state ON machines(running_state);

        CREATE TABLE IF NOT EXISTS nc_programs (
            id TEXT PRIMARY KEY,
            name TEXT NOT NULL,
            version TEXT NOT NULL,
            file_hash TEXT NOT NULL,
            content TEXT NOT NULL,
            annotations_json TEXT NOT NULL DEFAULT '[]',
            machine_compatibility_json TEXT NOT NULL DEFAULT '[]',
            created_by TEXT NOT NULL,
            created_at TEXT NOT NULL,
            updated_at TEXT NOT NULL
        );
        CREATE INDEX IF NOT EXISTS idx_nc_programs_name_version ON nc_programs(name, version);

        CREATE TABLE IF NOT EXISTS inspections (
            id TEXT PRIMARY KEY,
            production_order_id TEXT NOT NULL,
            lot_number TEXT NOT NULL,
            inspector_id TEXT NOT NULL,
            machine_id TEXT,
            nc_program_id TEXT,
            supplied_cpk REAL,
            failure_mode TEXT,
            status TEXT NOT NULL,
            final_result TEXT,
            created_at TEXT NOT NULL,
            updated_at TEXT NOT NULL
        );
        CREATE INDEX IF NOT EXISTS idx_inspections_lot ON inspections(lot_number);
        CREATE INDEX IF NOT EXISTS idx_inspections_order ON inspections(production_order_id);

        CREATE TABLE IF NOT EXISTS measurement_results (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            inspection_id TEXT NOT NULL REFERENCES inspections(id) ON DELETE CASCADE,
            seq INTEGER NOT NULL,
            parameter_name TEXT NOT NULL,
            measured_value REAL NOT NULL,
            target_value REAL NOT NULL,
            tolerance REAL NOT NULL,
            unit TEXT NOT NULL,
            pass INTEGER NOT NULL
        );
        CREATE INDEX IF NOT EXISTS idx_measurement_results_inspection
            ON measurement_results(inspection_id, seq);

        CREATE TABLE IF NOT EXISTS tool_offset_adjustments (
            adjustment_id TEXT PRIMARY KEY,
            nc_program_id TEXT,
            inspection_id TEXT NOT NULL,
            action_kind TEXT NOT NULL,
            parameters_json TEXT NOT NULL,
            executed_at TEXT NOT NULL
        );
        CREATE INDEX IF NOT EXISTS idx_tool_offset_program
            ON tool_offset_adjustments(nc_program_id, executed_at);

        CREATE TABLE IF NOT EXISTS quality_control_history (
            record_id TEXT PRIMARY KEY,
            loop_key TEXT NOT NULL,
            inspection_id TEXT NOT NULL UNIQUE,
            recorded_at TEXT NOT NULL,
            error REAL NOT NULL,
            correction REAL NOT NULL,
            action_kind TEXT NOT NULL,
            parameters_json TEXT NOT NULL DEFAULT '{}'
        );
        CREATE INDEX IF NOT EXISTS idx_control_history_loop
            ON quality_control_history(loop_key, recorded_at);
        "#,
    )?;

    conn.execute(
        "INSERT OR IGNORE INTO schema_version (version) VALUES (?1)",
        [CURRENT_SCHEMA_VERSION],
    )?;
    Ok(())
}

/// 读取 schema_version（若表不存在则返回 None）
pub fn read_schema_version(conn: &Connection) -> rusqlite::Result<Option<i64>> {
    let has_table: bool = conn
        .query_row(
            "SELECT 1 FROM sqlite_master WHERE type='table' AND name='schema_version' LIMIT 1",
            [],
            |_row| Ok(true),
        )
        .optional()?
        .unwrap_or(false);

    if !has_table {
        return Ok(None);
    }

    let v: Option<i64> = conn.query_row("SELECT MAX(version) FROM schema_version", [], |row| row.get(0))?;
    Ok(v)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_init_schema_is_idempotent() {
        let conn = Connection::open_in_memory().unwrap();
        init_schema(&conn).unwrap();
        init_schema(&conn).unwrap();
        assert_eq!(read_schema_version(&conn).unwrap(), Some(CURRENT_SCHEMA_VERSION));
    }

    #[test]
    fn test_schema_version_missing_table() {
        let conn = Connection::open_in_memory().unwrap();
        assert_eq!(read_schema_version(&conn).unwrap(), None);
    }
}
