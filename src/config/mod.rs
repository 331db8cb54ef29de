// ==========================================
// 数控加工执行闭环 - 配置层
// ==========================================
// 职责: 系统配置管理（全局覆写，缺省回退到内置默认值）
// 存储: config_kv 表
// ==========================================

pub mod config_manager;
pub mod feedback_config_trait;

// 重导出核心配置管理器
pub use config_manager::{config_keys, ConfigManager};
pub use feedback_config_trait::FeedbackConfigReader;
