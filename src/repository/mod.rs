// ==========================================
// 数控加工执行闭环 - 数据仓储层
// ==========================================
// 红线: Repository 不含业务逻辑
// ==========================================
// 职责: 提供数据访问接口,屏蔽数据库细节
// 约束: 所有查询使用参数化,防止 SQL 注入
// ==========================================

pub mod control_history_repo;
pub mod error;
pub mod inspection_repo;
pub mod machine_repo;
pub mod nc_program_repo;
pub mod production_order_repo;
pub mod row_utils;
pub mod tool_offset_repo;

// 重导出核心仓储
pub use control_history_repo::ControlHistoryRepository;
pub use error::{RepositoryError, RepositoryResult};
pub use inspection_repo::InspectionRepository;
pub use machine_repo::MachineRepository;
pub use nc_program_repo::NcProgramRepository;
pub use production_order_repo::ProductionOrderRepository;
pub use tool_offset_repo::ToolOffsetRepository;
