// ==========================================
// 数控加工执行闭环 - 引擎层错误类型
// ==========================================
// 职责: 领域错误种类 + 存储错误透传
// 说明: 仓储层 NotFound 由各引擎翻译为对应实体的 *NotFound
// ==========================================

use crate::domain::production_order::InvalidTransition;
use crate::domain::types::ProductionOrderStatus;
use crate::repository::error::RepositoryError;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// 错误类别（调用方据此决定是否重试）
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCategory {
    /// 输入或状态不满足前置条件，需换输入
    Validation,
    /// 引用的实体不存在
    NotFound,
    /// 资源被占用
    ResourceBusy,
    /// 存储层故障，可原样重试
    Transient,
}

#[derive(Error, Debug)]
pub enum EngineError {
    // ===== 实体不存在 =====
    #[error("生产订单不存在: {0}")]
    OrderNotFound(String),

    #[error("机床不存在: {0}")]
    MachineNotFound(String),

    #[error("NC 程序不存在: {0}")]
    ProgramNotFound(String),

    #[error("检验记录不存在: {0}")]
    InspectionNotFound(String),

    // ===== 业务规则 =====
    #[error("无效的状态转换: from={from} to={to}")]
    InvalidStateTransition {
        from: ProductionOrderStatus,
        to: ProductionOrderStatus,
    },

    #[error("无效数量: {0} (必须大于 0)")]
    InvalidQuantity(i64),

    #[error("无效排程: 计划结束早于计划开始")]
    InvalidSchedule,

    #[error("机床不可用: machine_id={machine_id}, state={state}")]
    MachineNotAvailable { machine_id: String, state: String },

    #[error("程序与机床不兼容: program_id={program_id}, machine_type={machine_type}")]
    IncompatibleProgram {
        program_id: String,
        machine_type: String,
    },

    #[error("无效测量数据: {0}")]
    InvalidMeasurement(String),

    #[error("无效机床状态上报: machine_id={machine_id}, {reason}")]
    InvalidMachineStatus { machine_id: String, reason: String },

    // ===== 存储透传 =====
    #[error("存储失败: {0}")]
    Storage(#[from] RepositoryError),
}

impl From<InvalidTransition> for EngineError {
    fn from(err: InvalidTransition) -> Self {
        EngineError::InvalidStateTransition {
            from: err.from,
            to: err.to,
        }
    }
}

impl EngineError {
    pub fn category(&self) -> ErrorCategory {
        match self {
            EngineError::OrderNotFound(_)
            | EngineError::MachineNotFound(_)
            | EngineError::ProgramNotFound(_)
            | EngineError::InspectionNotFound(_) => ErrorCategory::NotFound,
            EngineError::InvalidStateTransition { .. }
            | EngineError::InvalidQuantity(_)
            | EngineError::InvalidSchedule
            | EngineError::IncompatibleProgram { .. }
            | EngineError::InvalidMeasurement(_)
            | EngineError::InvalidMachineStatus { .. } => ErrorCategory::Validation,
            EngineError::MachineNotAvailable { .. } => ErrorCategory::ResourceBusy,
            EngineError::Storage(RepositoryError::NotFound { .. }) => ErrorCategory::NotFound,
            EngineError::Storage(_) => ErrorCategory::Transient,
        }
    }
}

/// 将仓储 NotFound 翻译为指定的领域错误，其余透传
pub(crate) fn translate_not_found(
    err: RepositoryError,
    on_missing: impl FnOnce() -> EngineError,
) -> EngineError {
    if err.is_not_found() {
        on_missing()
    } else {
        EngineError::Storage(err)
    }
}

/// Result 类型别名
pub type EngineResult<T> = Result<T, EngineError>;
