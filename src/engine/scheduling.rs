// ==========================================
// 数控加工执行闭环 - 生产排程引擎
// ==========================================
// 职责: 订单创建校验 + 订单状态机持久化
// 红线: 前置条件不满足时不写库
// 并发: 状态写入以读取时的旧状态为条件（CAS）
// ==========================================

use crate::domain::production_order::{ProductionOrder, Schedule};
use crate::domain::types::ProductionOrderStatus;
use crate::engine::error::{translate_not_found, EngineError, EngineResult};
use crate::engine::events::{OptionalEventPublisher, ProductionEvent, ProductionEventType};
use crate::repository::{ProductionOrderRepository, RepositoryError};
use chrono::{DateTime, Utc};
use std::sync::Arc;
use tracing::{info, warn};

pub struct ProductionSchedulingEngine {
    order_repo: Arc<ProductionOrderRepository>,
    publisher: OptionalEventPublisher,
}

impl ProductionSchedulingEngine {
    pub fn new(order_repo: Arc<ProductionOrderRepository>) -> Self {
        Self {
            order_repo,
            publisher: OptionalEventPublisher::none(),
        }
    }

    pub fn with_publisher(mut self, publisher: OptionalEventPublisher) -> Self {
        self.publisher = publisher;
        self
    }

    /// 创建生产订单
    ///
    /// # 错误
    /// - `InvalidQuantity`: quantity ≤ 0
    /// - `InvalidSchedule`: planned_end < planned_start
    /// - `Storage`: 订单号重复或存储失败
    pub fn schedule_production(
        &self,
        order_number: &str,
        part_id: &str,
        quantity: i64,
        planned_start: DateTime<Utc>,
        planned_end: DateTime<Utc>,
        machine_ids: Vec<String>,
    ) -> EngineResult<ProductionOrder> {
        if quantity <= 0 {
            return Err(EngineError::InvalidQuantity(quantity));
        }
        let schedule = Schedule {
            planned_start,
            planned_end,
            assigned_machines: machine_ids,
        };
        if !schedule.is_well_ordered() {
            return Err(EngineError::InvalidSchedule);
        }

        let order = ProductionOrder::new(order_number, part_id, quantity, schedule);
        self.order_repo.save(&order)?;

        info!(
            order_id = %order.id,
            part_id = %order.part_id,
            quantity = order.quantity,
            "生产订单已创建"
        );
        self.emit(&order, ProductionEventType::ProductionOrderCreated);
        Ok(order)
    }

    pub fn start_order(&self, order_id: &str) -> EngineResult<ProductionOrder> {
        self.transition(order_id, ProductionOrderStatus::InProgress)
    }

    pub fn complete_order(&self, order_id: &str) -> EngineResult<ProductionOrder> {
        self.transition(order_id, ProductionOrderStatus::Completed)
    }

    pub fn delay_order(&self, order_id: &str) -> EngineResult<ProductionOrder> {
        self.transition(order_id, ProductionOrderStatus::Delayed)
    }

    pub fn cancel_order(&self, order_id: &str) -> EngineResult<ProductionOrder> {
        self.transition(order_id, ProductionOrderStatus::Cancelled)
    }

    pub fn get_order(&self, order_id: &str) -> EngineResult<ProductionOrder> {
        self.order_repo
            .find_by_id(order_id)?
            .ok_or_else(|| EngineError::OrderNotFound(order_id.to_string()))
    }

    pub fn list_orders(&self) -> EngineResult<Vec<ProductionOrder>> {
        Ok(self.order_repo.find_all()?)
    }

    fn transition(
        &self,
        order_id: &str,
        target: ProductionOrderStatus,
    ) -> EngineResult<ProductionOrder> {
        let mut order = self.get_order(order_id)?;
        let previous = order.status;

        match target {
            ProductionOrderStatus::InProgress => order.start()?,
            ProductionOrderStatus::Completed => order.complete()?,
            ProductionOrderStatus::Delayed => order.delay()?,
            ProductionOrderStatus::Cancelled => order.cancel()?,
            ProductionOrderStatus::Planned => {
                return Err(EngineError::InvalidStateTransition {
                    from: previous,
                    to: target,
                })
            }
        }

        self.order_repo
            .update_status_if(order_id, previous, target, order.updated_at)
            .map_err(|err| match err {
                // 并发请求抢先改变了状态: 按库中实际状态报告
                RepositoryError::ConditionalUpdateFailed { actual, .. } => {
                    let from = ProductionOrderStatus::from_db_str(&actual).unwrap_or(previous);
                    warn!(order_id, %from, to = %target, "订单状态已被并发修改");
                    EngineError::InvalidStateTransition { from, to: target }
                }
                other => translate_not_found(other, || {
                    EngineError::OrderNotFound(order_id.to_string())
                }),
            })?;

        info!(order_id, from = %previous, to = %target, "订单状态变更");
        let event_type = match target {
            ProductionOrderStatus::InProgress => ProductionEventType::ProductionOrderStarted,
            ProductionOrderStatus::Completed => ProductionEventType::ProductionOrderCompleted,
            ProductionOrderStatus::Delayed => ProductionEventType::ProductionOrderDelayed,
            _ => ProductionEventType::ProductionOrderCancelled,
        };
        self.emit(&order, event_type);
        Ok(order)
    }

    fn emit(&self, order: &ProductionOrder, event_type: ProductionEventType) {
        let event = ProductionEvent::new(&order.id, &order.order_number, event_type);
        if let Err(e) = self.publisher.publish(event) {
            warn!(order_id = %order.id, error = %e, "生产事件发布失败");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::open_in_memory_shared;
    use chrono::Duration;

    fn engine() -> ProductionSchedulingEngine {
        let conn = open_in_memory_shared().unwrap();
        ProductionSchedulingEngine::new(Arc::new(ProductionOrderRepository::new(conn)))
    }

    fn schedule(engine: &ProductionSchedulingEngine, number: &str) -> ProductionOrder {
        let start = Utc::now();
        engine
            .schedule_production(
                number,
                "PART-A",
                10,
                start,
                start + Duration::hours(2),
                vec!["M-01".into()],
            )
            .unwrap()
    }

    #[test]
    fn test_invalid_quantity_persists_nothing() {
        let engine = engine();
        let start = Utc::now();
        for q in [0, -5] {
            let err = engine
                .schedule_production("PO-1", "PART-A", q, start, start, vec![])
                .unwrap_err();
            assert!(matches!(err, EngineError::InvalidQuantity(v) if v == q));
        }
        assert!(engine.list_orders().unwrap().is_empty());
    }

    #[test]
    fn test_invalid_schedule() {
        let engine = engine();
        let start = Utc::now();
        let err = engine
            .schedule_production("PO-1", "PART-A", 1, start, start - Duration::minutes(1), vec![])
            .unwrap_err();
        assert!(matches!(err, EngineError::InvalidSchedule));
        assert!(engine.get_order("order-PO-1").is_err());
    }

    #[test]
    fn test_equal_start_and_end_is_accepted() {
        let engine = engine();
        let start = Utc::now();
        let order = engine
            .schedule_production("PO-1", "PART-A", 1, start, start, vec![])
            .unwrap();
        assert_eq!(order.status, ProductionOrderStatus::Planned);
    }

    #[test]
    fn test_complete_fresh_order_rejected() {
        let engine = engine();
        let order = schedule(&engine, "PO-1");
        let err = engine.complete_order(&order.id).unwrap_err();
        assert!(matches!(
            err,
            EngineError::InvalidStateTransition {
                from: ProductionOrderStatus::Planned,
                to: ProductionOrderStatus::Completed
            }
        ));
        assert_eq!(
            engine.get_order(&order.id).unwrap().status,
            ProductionOrderStatus::Planned
        );
    }

    #[test]
    fn test_start_complete_then_start_fails() {
        let engine = engine();
        let order = schedule(&engine, "PO-1");
        assert_eq!(
            engine.start_order(&order.id).unwrap().status,
            ProductionOrderStatus::InProgress
        );
        assert_eq!(
            engine.complete_order(&order.id).unwrap().status,
            ProductionOrderStatus::Completed
        );
        // 完工只成功一次
        assert!(matches!(
            engine.complete_order(&order.id).unwrap_err(),
            EngineError::InvalidStateTransition { .. }
        ));
        assert!(matches!(
            engine.start_order(&order.id).unwrap_err(),
            EngineError::InvalidStateTransition { .. }
        ));
        assert_eq!(
            engine.get_order(&order.id).unwrap().status,
            ProductionOrderStatus::Completed
        );
    }

    #[test]
    fn test_delay_and_cancel() {
        let engine = engine();
        let order = schedule(&engine, "PO-1");
        engine.delay_order(&order.id).unwrap();
        assert!(engine.start_order(&order.id).is_err());
        engine.cancel_order(&order.id).unwrap();
        assert!(engine.cancel_order(&order.id).is_err());
    }

    #[test]
    fn test_unknown_order() {
        let engine = engine();
        assert!(matches!(
            engine.start_order("order-nope").unwrap_err(),
            EngineError::OrderNotFound(_)
        ));
    }
}
