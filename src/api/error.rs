// ==========================================
// 数控加工执行闭环 - API层错误类型
// ==========================================
// 职责: 定义API层错误类型，转换引擎/仓储错误为调用方可判别的错误
// 说明: 每个错误都带类别，调用方据此决定换输入、报不存在、稍后再试或原样重试
// ==========================================

use crate::engine::error::{EngineError, ErrorCategory};
use crate::repository::error::RepositoryError;
use thiserror::Error;

/// API层错误类型
#[derive(Error, Debug)]
pub enum ApiError {
    // ==========================================
    // 实体不存在
    // ==========================================
    #[error("生产订单不存在: {0}")]
    OrderNotFound(String),

    #[error("机床不存在: {0}")]
    MachineNotFound(String),

    #[error("NC 程序不存在: {0}")]
    ProgramNotFound(String),

    #[error("检验记录不存在: {0}")]
    InspectionNotFound(String),

    #[error("资源未找到: {0}")]
    NotFound(String),

    // ==========================================
    // 业务规则错误
    // ==========================================
    #[error("无效输入: {0}")]
    InvalidInput(String),

    #[error("无效的状态转换: from={from} to={to}")]
    InvalidStateTransition { from: String, to: String },

    #[error("无效数量: {0}")]
    InvalidQuantity(i64),

    #[error("无效排程: 计划结束早于计划开始")]
    InvalidSchedule,

    #[error("无效测量数据: {0}")]
    InvalidMeasurement(String),

    #[error("程序与机床不兼容: program_id={program_id}, machine_type={machine_type}")]
    IncompatibleProgram {
        program_id: String,
        machine_type: String,
    },

    #[error("业务规则违反: {0}")]
    BusinessRuleViolation(String),

    // ==========================================
    // 资源占用 / 并发控制错误
    // ==========================================
    #[error("机床不可用: machine_id={machine_id}, state={state}")]
    MachineNotAvailable { machine_id: String, state: String },

    #[error("条件更新冲突: {0}")]
    ConcurrentModification(String),

    // ==========================================
    // 数据访问错误
    // ==========================================
    #[error("数据库错误: {0}")]
    DatabaseError(String),

    #[error("数据库连接失败: {0}")]
    DatabaseConnectionError(String),

    #[error("数据库事务失败: {0}")]
    DatabaseTransactionError(String),

    // ==========================================
    // 通用错误
    // ==========================================
    #[error("内部错误: {0}")]
    InternalError(String),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl ApiError {
    pub fn category(&self) -> ErrorCategory {
        match self {
            ApiError::OrderNotFound(_)
            | ApiError::MachineNotFound(_)
            | ApiError::ProgramNotFound(_)
            | ApiError::InspectionNotFound(_)
            | ApiError::NotFound(_) => ErrorCategory::NotFound,
            ApiError::InvalidInput(_)
            | ApiError::InvalidStateTransition { .. }
            | ApiError::InvalidQuantity(_)
            | ApiError::InvalidSchedule
            | ApiError::InvalidMeasurement(_)
            | ApiError::IncompatibleProgram { .. }
            | ApiError::BusinessRuleViolation(_) => ErrorCategory::Validation,
            ApiError::MachineNotAvailable { .. } | ApiError::ConcurrentModification(_) => {
                ErrorCategory::ResourceBusy
            }
            ApiError::DatabaseError(_)
            | ApiError::DatabaseConnectionError(_)
            | ApiError::DatabaseTransactionError(_)
            | ApiError::InternalError(_)
            | ApiError::Other(_) => ErrorCategory::Transient,
        }
    }
}

// ==========================================
// 从 RepositoryError 转换
// ==========================================
impl From<RepositoryError> for ApiError {
    fn from(err: RepositoryError) -> Self {
        match err {
            RepositoryError::ConditionalUpdateFailed {
                entity,
                id,
                expected,
                actual,
            } => ApiError::ConcurrentModification(format!(
                "{}(id={})已被其他请求修改（期望={}，实际={}）",
                entity, id, expected, actual
            )),
            RepositoryError::NotFound { entity, id } => {
                ApiError::NotFound(format!("{}(id={})不存在", entity, id))
            }
            RepositoryError::DatabaseConnectionError(msg) => ApiError::DatabaseConnectionError(msg),
            RepositoryError::DatabaseTransactionError(msg) => {
                ApiError::DatabaseTransactionError(msg)
            }
            RepositoryError::LockError(msg) => {
                ApiError::DatabaseConnectionError(format!("数据库锁获取失败: {}", msg))
            }
            RepositoryError::DatabaseQueryError(msg) => ApiError::DatabaseError(msg),
            RepositoryError::UniqueConstraintViolation(msg) => {
                ApiError::BusinessRuleViolation(format!("唯一约束违反: {}", msg))
            }
            RepositoryError::ForeignKeyViolation(msg) => {
                ApiError::BusinessRuleViolation(format!("外键约束违反: {}", msg))
            }
            RepositoryError::FieldValueError { field, message } => {
                ApiError::InvalidInput(format!("字段{}错误: {}", field, message))
            }
            RepositoryError::SerializationError(msg) => ApiError::InternalError(msg),
            RepositoryError::Other(err) => ApiError::Other(err),
        }
    }
}

// ==========================================
// 从 EngineError 转换
// ==========================================
impl From<EngineError> for ApiError {
    fn from(err: EngineError) -> Self {
        match err {
            EngineError::OrderNotFound(id) => ApiError::OrderNotFound(id),
            EngineError::MachineNotFound(id) => ApiError::MachineNotFound(id),
            EngineError::ProgramNotFound(id) => ApiError::ProgramNotFound(id),
            EngineError::InspectionNotFound(id) => ApiError::InspectionNotFound(id),
            EngineError::InvalidStateTransition { from, to } => ApiError::InvalidStateTransition {
                from: from.to_string(),
                to: to.to_string(),
            },
            EngineError::InvalidQuantity(q) => ApiError::InvalidQuantity(q),
            EngineError::InvalidSchedule => ApiError::InvalidSchedule,
            EngineError::MachineNotAvailable { machine_id, state } => {
                ApiError::MachineNotAvailable { machine_id, state }
            }
            EngineError::IncompatibleProgram {
                program_id,
                machine_type,
            } => ApiError::IncompatibleProgram {
                program_id,
                machine_type,
            },
            EngineError::InvalidMeasurement(msg) => ApiError::InvalidMeasurement(msg),
            EngineError::InvalidMachineStatus { machine_id, reason } => {
                ApiError::InvalidInput(format!("机床 {} 状态上报无效: {}", machine_id, reason))
            }
            EngineError::Storage(repo_err) => repo_err.into(),
        }
    }
}

/// Result 类型别名
pub type ApiResult<T> = Result<T, ApiError>;

/// 必填字符串校验
pub(crate) fn require_non_blank(value: &str, field: &str) -> ApiResult<()> {
    if value.trim().is_empty() {
        return Err(ApiError::InvalidInput(format!("{}不能为空", field)));
    }
    Ok(())
}
