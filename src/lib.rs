// ==========================================
// 数控加工执行闭环 - 核心库
// ==========================================
// 闭环: 排产 → 程序下发 → 检验 → 质量反馈 → 程序补偿
// 技术栈: Rust + SQLite
// ==========================================

// ==========================================
// 模块声明
// ==========================================

// 领域层 - 实体与类型
pub mod domain;

// 数据仓储层 - 数据访问
pub mod repository;

// 引擎层 - 业务规则
pub mod engine;

// 配置层 - 系统配置
pub mod config;

// 数据库基础设施（连接初始化/PRAGMA 统一/建表）
pub mod db;

// 日志系统
pub mod logging;

// API 层 - 业务接口
pub mod api;

// 应用层 - 状态装配
pub mod app;

// ==========================================
// 重导出核心类型
// ==========================================

// 领域类型
pub use domain::types::{
    CorrectiveActionKind, FailureMode, InspectionResult, InspectionStatus, MachineRunningState,
    ProductionOrderStatus,
};

// 领域实体
pub use domain::{
    ControlRecord, CorrectiveAction, FeedbackOutcome, Inspection, Machine, MachineStatus,
    NcProgram, ProductionOrder, ToolOffsetAdjustment,
};

// 引擎
pub use engine::{
    InspectionEngine, NcTransferEngine, ProductionSchedulingEngine, QualityFeedbackController,
};

// API
pub use api::{ApiError, ApiResult, FeedbackApi, NcApi, ProductionApi, QualityApi};

// ==========================================
// 常量定义
// ==========================================

// 系统版本
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

// 系统名称
pub const APP_NAME: &str = "数控加工执行闭环";
