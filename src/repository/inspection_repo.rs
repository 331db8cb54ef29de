// ==========================================
// 数控加工执行闭环 - 检验仓储
// ==========================================
// 红线: Repository 不含业务逻辑
// 红线: 检验主记录与全部测量项在同一事务中写入
// ==========================================

use crate::domain::inspection::{Inspection, MeasurementResult};
use crate::domain::types::{FailureMode, InspectionResult, InspectionStatus};
use crate::repository::error::{RepositoryError, RepositoryResult};
use crate::repository::row_utils::{invalid_enum, ts_from_db, ts_to_db};
use rusqlite::{params, Connection, OptionalExtension, Row, Transaction};
use std::sync::{Arc, Mutex};

const SELECT_COLUMNS: &str = r#"
    SELECT id, production_order_id, lot_number, inspector_id,
           machine_id, nc_program_id, supplied_cpk, failure_mode,
           status, final_result, created_at, updated_at
    FROM inspections
"#;

/// 映射主记录（测量项另行加载）
fn map_inspection(row: &Row<'_>) -> rusqlite::Result<Inspection> {
    let failure_mode = match row.get::<_, Option<String>>(7)? {
        Some(raw) => Some(FailureMode::from_db_str(&raw).ok_or_else(|| invalid_enum(7, &raw))?),
        None => None,
    };
    let status_raw: String = row.get(8)?;
    let status =
        InspectionStatus::from_db_str(&status_raw).ok_or_else(|| invalid_enum(8, &status_raw))?;
    let final_result = match row.get::<_, Option<String>>(9)? {
        Some(raw) => Some(InspectionResult::from_db_str(&raw).ok_or_else(|| invalid_enum(9, &raw))?),
        None => None,
    };

    Ok(Inspection {
        id: row.get(0)?,
        production_order_id: row.get(1)?,
        lot_number: row.get(2)?,
        inspector_id: row.get(3)?,
        machine_id: row.get(4)?,
        nc_program_id: row.get(5)?,
        supplied_cpk: row.get(6)?,
        failure_mode,
        results: Vec::new(),
        status,
        final_result,
        created_at: ts_from_db(10, &row.get::<_, String>(10)?)?,
        updated_at: ts_from_db(11, &row.get::<_, String>(11)?)?,
    })
}

fn load_results(conn: &Connection, inspection_id: &str) -> rusqlite::Result<Vec<MeasurementResult>> {
    let mut stmt = conn.prepare(
        r#"
        SELECT parameter_name, measured_value, target_value, tolerance, unit, pass
        FROM measurement_results
        WHERE inspection_id = ?1
        ORDER BY seq ASC
        "#,
    )?;
    let results = stmt
        .query_map(params![inspection_id], |row| {
            Ok(MeasurementResult {
                parameter_name: row.get(0)?,
                measured_value: row.get(1)?,
                target_value: row.get(2)?,
                tolerance: row.get(3)?,
                unit: row.get(4)?,
                pass: row.get(5)?,
            })
        })?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    Ok(results)
}

fn insert_results(tx: &Transaction<'_>, inspection: &Inspection) -> rusqlite::Result<()> {
    let mut stmt = tx.prepare(
        r#"
        INSERT INTO measurement_results (
            inspection_id, seq, parameter_name, measured_value,
            target_value, tolerance, unit, pass
        ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
        "#,
    )?;
    for (seq, result) in inspection.results.iter().enumerate() {
        stmt.execute(params![
            inspection.id,
            seq as i64,
            result.parameter_name,
            result.measured_value,
            result.target_value,
            result.tolerance,
            result.unit,
            result.pass,
        ])?;
    }
    Ok(())
}

// ==========================================
// InspectionRepository - 检验仓储
// ==========================================
pub struct InspectionRepository {
    conn: Arc<Mutex<Connection>>,
}

impl InspectionRepository {
    pub fn new(conn: Arc<Mutex<Connection>>) -> Self {
        Self { conn }
    }

    fn get_conn(&self) -> RepositoryResult<std::sync::MutexGuard<Connection>> {
        self.conn
            .lock()
            .map_err(|e| RepositoryError::LockError(e.to_string()))
    }

    /// 写入检验及其全部测量项（单事务）
    pub fn save(&self, inspection: &Inspection) -> RepositoryResult<()> {
        let mut conn = self.get_conn()?;
        let tx = conn
            .transaction()
            .map_err(|e| RepositoryError::DatabaseTransactionError(e.to_string()))?;

        tx.execute(
            r#"
            INSERT INTO inspections (
                id, production_order_id, lot_number, inspector_id,
                machine_id, nc_program_id, supplied_cpk, failure_mode,
                status, final_result, created_at, updated_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)
            "#,
            params![
                inspection.id,
                inspection.production_order_id,
                inspection.lot_number,
                inspection.inspector_id,
                inspection.machine_id,
                inspection.nc_program_id,
                inspection.supplied_cpk,
                inspection.failure_mode.map(|m| m.to_db_str()),
                inspection.status.to_db_str(),
                inspection.final_result.map(|r| r.to_db_str()),
                ts_to_db(&inspection.created_at),
                ts_to_db(&inspection.updated_at),
            ],
        )?;
        insert_results(&tx, inspection)?;

        tx.commit()
            .map_err(|e| RepositoryError::DatabaseTransactionError(e.to_string()))?;
        Ok(())
    }

    pub fn find_by_id(&self, id: &str) -> RepositoryResult<Option<Inspection>> {
        let conn = self.get_conn()?;
        let sql = format!("{} WHERE id = ?1", SELECT_COLUMNS);
        let inspection = conn.query_row(&sql, params![id], map_inspection).optional()?;
        match inspection {
            Some(mut inspection) => {
                inspection.results = load_results(&conn, &inspection.id)?;
                Ok(Some(inspection))
            }
            None => Ok(None),
        }
    }

    /// 按批次查询（按创建时间）
    pub fn find_by_lot_number(&self, lot_number: &str) -> RepositoryResult<Vec<Inspection>> {
        self.find_where("lot_number = ?1", lot_number)
    }

    /// 按生产订单查询（按创建时间）
    pub fn find_by_production_order_id(&self, order_id: &str) -> RepositoryResult<Vec<Inspection>> {
        self.find_where("production_order_id = ?1", order_id)
    }

    fn find_where(&self, predicate: &str, value: &str) -> RepositoryResult<Vec<Inspection>> {
        let conn = self.get_conn()?;
        let sql = format!(
            "{} WHERE {} ORDER BY created_at ASC, id ASC",
            SELECT_COLUMNS, predicate
        );
        let mut stmt = conn.prepare(&sql)?;
        let mut inspections = stmt
            .query_map(params![value], map_inspection)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        for inspection in inspections.iter_mut() {
            inspection.results = load_results(&conn, &inspection.id)?;
        }
        Ok(inspections)
    }

    /// 更新主记录并整体替换测量项（单事务）
    pub fn update(&self, inspection: &Inspection) -> RepositoryResult<()> {
        let mut conn = self.get_conn()?;
        let tx = conn
            .transaction()
            .map_err(|e| RepositoryError::DatabaseTransactionError(e.to_string()))?;

        let rows = tx.execute(
            r#"
            UPDATE inspections
            SET lot_number = ?2, inspector_id = ?3, machine_id = ?4, nc_program_id = ?5,
                supplied_cpk = ?6, failure_mode = ?7, status = ?8, final_result = ?9,
                updated_at = ?10
            WHERE id = ?1
            "#,
            params![
                inspection.id,
                inspection.lot_number,
                inspection.inspector_id,
                inspection.machine_id,
                inspection.nc_program_id,
                inspection.supplied_cpk,
                inspection.failure_mode.map(|m| m.to_db_str()),
                inspection.status.to_db_str(),
                inspection.final_result.map(|r| r.to_db_str()),
                ts_to_db(&inspection.updated_at),
            ],
        )?;
        if rows == 0 {
            return Err(RepositoryError::not_found("Inspection", &inspection.id));
        }

        tx.execute(
            "DELETE FROM measurement_results WHERE inspection_id = ?1",
            params![inspection.id],
        )?;
        insert_results(&tx, inspection)?;

        tx.commit()
            .map_err(|e| RepositoryError::DatabaseTransactionError(e.to_string()))?;
        Ok(())
    }

    pub fn delete(&self, id: &str) -> RepositoryResult<()> {
        let conn = self.get_conn()?;
        let rows = conn.execute("DELETE FROM inspections WHERE id = ?1", params![id])?;
        if rows == 0 {
            return Err(RepositoryError::not_found("Inspection", id));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::open_in_memory_shared;

    fn completed_inspection(lot: &str, dia: f64) -> Inspection {
        let mut insp = Inspection::new("order-PO-1", lot, "qa-1");
        insp.nc_program_id = Some("ncprog-1234abcd".to_string());
        insp.failure_mode = Some(FailureMode::DiameterOversize);
        insp.add_measurement(MeasurementResult::evaluate("dia", dia, 10.0, 0.05, "mm"));
        insp.add_measurement(MeasurementResult::evaluate("len", 50.0, 50.0, 0.1, "mm"));
        insp.complete();
        insp
    }

    #[test]
    fn test_save_roundtrip_with_measurements() {
        let repo = InspectionRepository::new(open_in_memory_shared().unwrap());
        let insp = completed_inspection("LOT-1", 10.2);
        repo.save(&insp).unwrap();

        let loaded = repo.find_by_id(&insp.id).unwrap().unwrap();
        assert_eq!(loaded, insp);
        assert_eq!(loaded.results[0].parameter_name, "dia");
        assert!(!loaded.results[0].pass);
    }

    #[test]
    fn test_find_by_lot_and_order() {
        let repo = InspectionRepository::new(open_in_memory_shared().unwrap());
        repo.save(&completed_inspection("LOT-1", 10.0)).unwrap();
        repo.save(&completed_inspection("LOT-1", 10.01)).unwrap();
        repo.save(&completed_inspection("LOT-2", 10.0)).unwrap();

        let lot1 = repo.find_by_lot_number("LOT-1").unwrap();
        assert_eq!(lot1.len(), 2);
        assert!(lot1.iter().all(|i| i.results.len() == 2));
        assert!(repo.find_by_lot_number("LOT-404").unwrap().is_empty());
        assert_eq!(repo.find_by_production_order_id("order-PO-1").unwrap().len(), 3);
    }

    #[test]
    fn test_update_replaces_measurements() {
        let repo = InspectionRepository::new(open_in_memory_shared().unwrap());
        let mut insp = completed_inspection("LOT-1", 10.0);
        repo.save(&insp).unwrap();

        insp.results.truncate(1);
        repo.update(&insp).unwrap();
        assert_eq!(repo.find_by_id(&insp.id).unwrap().unwrap().results.len(), 1);
    }

    #[test]
    fn test_delete_cascades_measurements() {
        let shared = open_in_memory_shared().unwrap();
        let repo = InspectionRepository::new(shared.clone());
        let insp = completed_inspection("LOT-1", 10.0);
        repo.save(&insp).unwrap();
        repo.delete(&insp.id).unwrap();

        let conn = shared.lock().unwrap();
        let remaining: i64 = conn
            .query_row("SELECT COUNT(*) FROM measurement_results", [], |row| row.get(0))
            .unwrap();
        assert_eq!(remaining, 0);
    }
}
