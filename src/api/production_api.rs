// ==========================================
// 数控加工执行闭环 - 生产订单 API
// ==========================================
// 职责: 生产订单创建、状态流转、查询
// ==========================================

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::api::error::{require_non_blank, ApiResult};
use crate::domain::ProductionOrder;
use crate::engine::ProductionSchedulingEngine;

// ==========================================
// 请求 DTO
// ==========================================

/// 创建生产订单请求
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScheduleProductionRequest {
    pub order_number: String,
    pub part_id: String,
    pub quantity: i64,
    pub planned_start: DateTime<Utc>,
    pub planned_end: DateTime<Utc>,
    #[serde(default)]
    pub machine_ids: Vec<String>,
}

// ==========================================
// ProductionApi - 生产订单 API
// ==========================================

pub struct ProductionApi {
    engine: Arc<ProductionSchedulingEngine>,
}

impl ProductionApi {
    pub fn new(engine: Arc<ProductionSchedulingEngine>) -> Self {
        Self { engine }
    }

    /// 创建生产订单（初始状态 Planned）
    ///
    /// # 参数
    /// - request: 订单号、零件、数量、计划时间窗与指派机床
    ///
    /// # 返回
    /// - Ok(ProductionOrder): 已持久化的订单
    /// - Err(ApiError::InvalidQuantity / InvalidSchedule): 输入违反领域规则
    pub fn schedule_production(
        &self,
        request: ScheduleProductionRequest,
    ) -> ApiResult<ProductionOrder> {
        require_non_blank(&request.order_number, "订单号")?;
        require_non_blank(&request.part_id, "零件ID")?;

        Ok(self.engine.schedule_production(
            &request.order_number,
            &request.part_id,
            request.quantity,
            request.planned_start,
            request.planned_end,
            request.machine_ids,
        )?)
    }

    /// Planned → InProgress
    pub fn start_order(&self, order_id: &str) -> ApiResult<ProductionOrder> {
        require_non_blank(order_id, "订单ID")?;
        Ok(self.engine.start_order(order_id)?)
    }

    /// InProgress → Completed
    pub fn complete_order(&self, order_id: &str) -> ApiResult<ProductionOrder> {
        require_non_blank(order_id, "订单ID")?;
        Ok(self.engine.complete_order(order_id)?)
    }

    pub fn delay_order(&self, order_id: &str) -> ApiResult<ProductionOrder> {
        require_non_blank(order_id, "订单ID")?;
        Ok(self.engine.delay_order(order_id)?)
    }

    pub fn cancel_order(&self, order_id: &str) -> ApiResult<ProductionOrder> {
        require_non_blank(order_id, "订单ID")?;
        Ok(self.engine.cancel_order(order_id)?)
    }

    pub fn get_order(&self, order_id: &str) -> ApiResult<ProductionOrder> {
        require_non_blank(order_id, "订单ID")?;
        Ok(self.engine.get_order(order_id)?)
    }

    pub fn list_orders(&self) -> ApiResult<Vec<ProductionOrder>> {
        Ok(self.engine.list_orders()?)
    }
}
