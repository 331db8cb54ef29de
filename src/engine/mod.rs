// ==========================================
// 数控加工执行闭环 - 引擎层
// ==========================================
// 职责: 实现业务规则引擎,不拼 SQL
// 红线: 领域违规以类型化错误返回，不自动修正、不重试
// ==========================================

pub mod capability;
pub mod error;
pub mod events;
pub mod feedback;
pub mod feedback_dispatch;
pub mod inspection;
pub mod repositories;
pub mod scheduling;
pub mod selection;
pub mod transfer;

// 重导出核心引擎
pub use capability::{estimate_cpk, CapabilityEstimate};
pub use error::{EngineError, EngineResult, ErrorCategory};
pub use events::{
    NoOpEventPublisher, OptionalEventPublisher, ProductionEvent, ProductionEventPublisher,
    ProductionEventType,
};
pub use feedback::{FeedbackConfig, QualityFeedbackController};
pub use feedback_dispatch::{DispatchHandle, FeedbackDispatcher};
pub use inspection::{InspectionContext, InspectionEngine, MeasurementInput};
pub use repositories::FeedbackRepositories;
pub use scheduling::ProductionSchedulingEngine;
pub use selection::{FirstCompatibleStrategy, ProgramSelectionStrategy};
pub use transfer::NcTransferEngine;
