// ==========================================
// 数控加工执行闭环 - API 层
// ==========================================
// 职责: 对外业务接口，校验输入并把引擎错误转换为 ApiError
// ==========================================

pub mod error;
pub mod feedback_api;
pub mod nc_api;
pub mod production_api;
pub mod quality_api;

// 重导出核心类型
pub use error::{ApiError, ApiResult};
pub use feedback_api::FeedbackApi;
pub use nc_api::{NcApi, RegisterMachineRequest, RegisterProgramRequest};
pub use production_api::{ProductionApi, ScheduleProductionRequest};
pub use quality_api::{QualityApi, RecordInspectionRequest};
