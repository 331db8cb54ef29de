// ==========================================
// 数控加工执行闭环 - 应用层
// ==========================================
// 职责: 装配共享连接、引擎与 API
// ==========================================

pub mod state;

// 重导出
pub use state::{get_default_db_path, AppState};
