// ==========================================
// 数控加工执行闭环 - 生产订单仓储
// ==========================================
// 红线: Repository 不含业务逻辑
// 并发: 状态转换以“期望旧状态”为条件更新
// ==========================================

use crate::domain::production_order::{ProductionOrder, Schedule};
use crate::domain::types::ProductionOrderStatus;
use crate::repository::error::{RepositoryError, RepositoryResult};
use crate::repository::row_utils::{invalid_enum, json_from_db, json_to_db, ts_from_db, ts_to_db};
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension, Row};
use std::sync::{Arc, Mutex};

const SELECT_COLUMNS: &str = r#"
    SELECT id, order_number, part_id, quantity, status,
           planned_start, planned_end, assigned_machines_json,
           created_at, updated_at
    FROM production_orders
"#;

fn map_order(row: &Row<'_>) -> rusqlite::Result<ProductionOrder> {
    let status_raw: String = row.get(4)?;
    let status = ProductionOrderStatus::from_db_str(&status_raw)
        .ok_or_else(|| invalid_enum(4, &status_raw))?;

    Ok(ProductionOrder {
        id: row.get(0)?,
        order_number: row.get(1)?,
        part_id: row.get(2)?,
        quantity: row.get(3)?,
        status,
        schedule: Schedule {
            planned_start: ts_from_db(5, &row.get::<_, String>(5)?)?,
            planned_end: ts_from_db(6, &row.get::<_, String>(6)?)?,
            assigned_machines: json_from_db(7, &row.get::<_, String>(7)?)?,
        },
        created_at: ts_from_db(8, &row.get::<_, String>(8)?)?,
        updated_at: ts_from_db(9, &row.get::<_, String>(9)?)?,
    })
}

// ==========================================
// ProductionOrderRepository - 生产订单仓储
// ==========================================
pub struct ProductionOrderRepository {
    conn: Arc<Mutex<Connection>>,
}

impl ProductionOrderRepository {
    pub fn new(conn: Arc<Mutex<Connection>>) -> Self {
        Self { conn }
    }

    fn get_conn(&self) -> RepositoryResult<std::sync::MutexGuard<Connection>> {
        self.conn
            .lock()
            .map_err(|e| RepositoryError::LockError(e.to_string()))
    }

    /// 新建订单
    pub fn save(&self, order: &ProductionOrder) -> RepositoryResult<()> {
        let machines_json = json_to_db(&order.schedule.assigned_machines)?;
        let conn = self.get_conn()?;
        conn.execute(
            r#"
            INSERT INTO production_orders (
                id, order_number, part_id, quantity, status,
                planned_start, planned_end, assigned_machines_json,
                created_at, updated_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)
            "#,
            params![
                order.id,
                order.order_number,
                order.part_id,
                order.quantity,
                order.status.to_db_str(),
                ts_to_db(&order.schedule.planned_start),
                ts_to_db(&order.schedule.planned_end),
                machines_json,
                ts_to_db(&order.created_at),
                ts_to_db(&order.updated_at),
            ],
        )?;
        Ok(())
    }

    /// 按ID查询
    ///
    /// # 返回
    /// - Ok(Some(order)): 找到
    /// - Ok(None): 未找到
    /// - Err: 数据库错误
    pub fn find_by_id(&self, id: &str) -> RepositoryResult<Option<ProductionOrder>> {
        let conn = self.get_conn()?;
        let sql = format!("{} WHERE id = ?1", SELECT_COLUMNS);
        let order = conn
            .query_row(&sql, params![id], map_order)
            .optional()?;
        Ok(order)
    }

    /// 查询全部订单（按创建时间）
    pub fn find_all(&self) -> RepositoryResult<Vec<ProductionOrder>> {
        let conn = self.get_conn()?;
        let sql = format!("{} ORDER BY created_at ASC, id ASC", SELECT_COLUMNS);
        let mut stmt = conn.prepare(&sql)?;
        let orders = stmt
            .query_map([], map_order)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(orders)
    }

    /// 全量更新
    pub fn update(&self, order: &ProductionOrder) -> RepositoryResult<()> {
        let machines_json = json_to_db(&order.schedule.assigned_machines)?;
        let conn = self.get_conn()?;
        let rows = conn.execute(
            r#"
            UPDATE production_orders
            SET part_id = ?2, quantity = ?3, status = ?4,
                planned_start = ?5, planned_end = ?6, assigned_machines_json = ?7,
                updated_at = ?8
            WHERE id = ?1
            "#,
            params![
                order.id,
                order.part_id,
                order.quantity,
                order.status.to_db_str(),
                ts_to_db(&order.schedule.planned_start),
                ts_to_db(&order.schedule.planned_end),
                machines_json,
                ts_to_db(&order.updated_at),
            ],
        )?;
        if rows == 0 {
            return Err(RepositoryError::not_found("ProductionOrder", &order.id));
        }
        Ok(())
    }

    /// 条件更新状态（CAS）
    ///
    /// 仅当库中状态等于 `expected` 时写入 `next`。
    ///
    /// # 错误
    /// - `RepositoryError::NotFound`: 订单不存在
    /// - `RepositoryError::ConditionalUpdateFailed`: 状态已被其他请求修改
    pub fn update_status_if(
        &self,
        id: &str,
        expected: ProductionOrderStatus,
        next: ProductionOrderStatus,
        updated_at: DateTime<Utc>,
    ) -> RepositoryResult<()> {
        let conn = self.get_conn()?;
        let rows = conn.execute(
            "UPDATE production_orders SET status = ?3, updated_at = ?4 WHERE id = ?1 AND status = ?2",
            params![id, expected.to_db_str(), next.to_db_str(), ts_to_db(&updated_at)],
        )?;

        if rows == 0 {
            let actual: Option<String> = conn
                .query_row(
                    "SELECT status FROM production_orders WHERE id = ?1",
                    params![id],
                    |row| row.get(0),
                )
                .optional()?;
            return match actual {
                Some(actual) => Err(RepositoryError::ConditionalUpdateFailed {
                    entity: "ProductionOrder".to_string(),
                    id: id.to_string(),
                    expected: expected.to_db_str().to_string(),
                    actual,
                }),
                None => Err(RepositoryError::not_found("ProductionOrder", id)),
            };
        }
        Ok(())
    }

    pub fn delete(&self, id: &str) -> RepositoryResult<()> {
        let conn = self.get_conn()?;
        let rows = conn.execute("DELETE FROM production_orders WHERE id = ?1", params![id])?;
        if rows == 0 {
            return Err(RepositoryError::not_found("ProductionOrder", id));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::open_in_memory_shared;
    use chrono::Duration;

    fn sample(order_number: &str) -> ProductionOrder {
        let start = Utc::now();
        ProductionOrder::new(
            order_number,
            "PART-A",
            25,
            Schedule {
                planned_start: start,
                planned_end: start + Duration::hours(4),
                assigned_machines: vec!["M-01".to_string(), "M-02".to_string()],
            },
        )
    }

    #[test]
    fn test_save_and_find() {
        let repo = ProductionOrderRepository::new(open_in_memory_shared().unwrap());
        let order = sample("PO-1");
        repo.save(&order).unwrap();

        let loaded = repo.find_by_id(&order.id).unwrap().unwrap();
        assert_eq!(loaded, order);
        assert!(repo.find_by_id("order-missing").unwrap().is_none());
    }

    #[test]
    fn test_duplicate_order_number_rejected() {
        let repo = ProductionOrderRepository::new(open_in_memory_shared().unwrap());
        repo.save(&sample("PO-1")).unwrap();
        let err = repo.save(&sample("PO-1")).unwrap_err();
        assert!(matches!(err, RepositoryError::UniqueConstraintViolation(_)));
    }

    #[test]
    fn test_update_status_if() {
        let repo = ProductionOrderRepository::new(open_in_memory_shared().unwrap());
        let order = sample("PO-1");
        repo.save(&order).unwrap();

        repo.update_status_if(
            &order.id,
            ProductionOrderStatus::Planned,
            ProductionOrderStatus::InProgress,
            Utc::now(),
        )
        .unwrap();

        let err = repo
            .update_status_if(
                &order.id,
                ProductionOrderStatus::Planned,
                ProductionOrderStatus::InProgress,
                Utc::now(),
            )
            .unwrap_err();
        assert!(matches!(err, RepositoryError::ConditionalUpdateFailed { .. }));

        let err = repo
            .update_status_if(
                "order-missing",
                ProductionOrderStatus::Planned,
                ProductionOrderStatus::InProgress,
                Utc::now(),
            )
            .unwrap_err();
        assert!(err.is_not_found());
    }

    #[test]
    fn test_find_all_and_delete() {
        let repo = ProductionOrderRepository::new(open_in_memory_shared().unwrap());
        repo.save(&sample("PO-1")).unwrap();
        repo.save(&sample("PO-2")).unwrap();
        assert_eq!(repo.find_all().unwrap().len(), 2);

        repo.delete("order-PO-1").unwrap();
        assert_eq!(repo.find_all().unwrap().len(), 1);
        assert!(repo.delete("order-PO-1").unwrap_err().is_not_found());
    }
}
