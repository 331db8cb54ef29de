// ==========================================
// 数控加工执行闭环 - 领域模型层
// ==========================================
// 职责: 定义领域实体、类型、状态机规则
// 红线: 不含数据访问逻辑,不含引擎逻辑
// ==========================================

pub mod feedback;
pub mod inspection;
pub mod machine;
pub mod nc_program;
pub mod production_order;
pub mod types;

// 重导出核心类型
pub use feedback::{
    ControlRecord, CorrectiveAction, FeedbackOutcome, PidGains, ToolOffsetAdjustment,
};
pub use inspection::{DefectAnalysis, Inspection, MeasurementResult, TraceabilityReport};
pub use machine::{Machine, MachineStatus};
pub use nc_program::NcProgram;
pub use production_order::{InvalidTransition, ProductionOrder, Schedule};
pub use types::{
    CorrectiveActionKind, FailureMode, InspectionResult, InspectionStatus, MachineRunningState,
    ProductionOrderStatus,
};
