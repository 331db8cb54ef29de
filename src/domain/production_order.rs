// ==========================================
// 数控加工执行闭环 - 生产订单领域模型
// ==========================================
// 红线: 状态只能通过状态机方法变更，前置条件不满足时对象保持原样
// ==========================================

use crate::domain::types::ProductionOrderStatus;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// 非法状态转换（领域层）
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("无效的状态转换: from={from} to={to}")]
pub struct InvalidTransition {
    pub from: ProductionOrderStatus,
    pub to: ProductionOrderStatus,
}

// ==========================================
// Schedule - 计划排程
// ==========================================
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Schedule {
    pub planned_start: DateTime<Utc>,
    pub planned_end: DateTime<Utc>,
    pub assigned_machines: Vec<String>,
}

impl Schedule {
    /// 计划结束不得早于计划开始
    pub fn is_well_ordered(&self) -> bool {
        self.planned_end >= self.planned_start
    }
}

// ==========================================
// ProductionOrder - 生产订单
// ==========================================
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProductionOrder {
    pub id: String,           // order-{order_number}
    pub order_number: String, // 业务唯一键
    pub part_id: String,
    pub quantity: i64,
    pub status: ProductionOrderStatus,
    pub schedule: Schedule,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl ProductionOrder {
    /// 由订单号派生订单ID（纯函数）
    pub fn derive_id(order_number: &str) -> String {
        format!("order-{}", order_number)
    }

    /// 创建新订单（初始状态 Planned）
    ///
    /// 说明: 数量/排程校验由排产引擎负责，这里只负责构造
    pub fn new(order_number: &str, part_id: &str, quantity: i64, schedule: Schedule) -> Self {
        let now = Utc::now();
        Self {
            id: Self::derive_id(order_number),
            order_number: order_number.to_string(),
            part_id: part_id.to_string(),
            quantity,
            status: ProductionOrderStatus::Planned,
            schedule,
            created_at: now,
            updated_at: now,
        }
    }

    /// 开工: 仅允许 Planned → InProgress
    pub fn start(&mut self) -> Result<(), InvalidTransition> {
        self.transition_to(ProductionOrderStatus::InProgress)
    }

    /// 完工: 仅允许 InProgress → Completed
    pub fn complete(&mut self) -> Result<(), InvalidTransition> {
        self.transition_to(ProductionOrderStatus::Completed)
    }

    /// 延期: Planned / InProgress → Delayed
    pub fn delay(&mut self) -> Result<(), InvalidTransition> {
        self.transition_to(ProductionOrderStatus::Delayed)
    }

    /// 取消: 任意非终态 → Cancelled
    pub fn cancel(&mut self) -> Result<(), InvalidTransition> {
        self.transition_to(ProductionOrderStatus::Cancelled)
    }

    fn transition_to(&mut self, target: ProductionOrderStatus) -> Result<(), InvalidTransition> {
        if !self.status.can_transition_to(target) {
            return Err(InvalidTransition {
                from: self.status,
                to: target,
            });
        }
        self.status = target;
        self.updated_at = Utc::now();
        Ok(())
    }
}
