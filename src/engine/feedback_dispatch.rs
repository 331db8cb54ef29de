// ==========================================
// 数控加工执行闭环 - 质量反馈调度
// ==========================================
// 检验定案后触发反馈:
// - 处于 tokio 运行时中: 投递到 blocking pool（SQLite 调用为同步阻塞）
// - 不在运行时中: 当前线程内联执行
// 失败只记日志，不回滚检验
// ==========================================

use crate::domain::feedback::FeedbackOutcome;
use crate::engine::error::{EngineError, EngineResult};
use crate::engine::feedback::QualityFeedbackController;
use crate::repository::RepositoryError;
use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

/// 调度结果
pub enum DispatchHandle {
    Spawned(JoinHandle<EngineResult<FeedbackOutcome>>),
    Inline(EngineResult<FeedbackOutcome>),
}

impl DispatchHandle {
    /// 等待反馈结果（Inline 直接返回）
    pub async fn outcome(self) -> EngineResult<FeedbackOutcome> {
        match self {
            DispatchHandle::Inline(result) => result,
            DispatchHandle::Spawned(handle) => handle.await.map_err(|e| {
                EngineError::Storage(RepositoryError::Other(anyhow::anyhow!(
                    "反馈任务异常终止: {}",
                    e
                )))
            })?,
        }
    }

    pub fn is_spawned(&self) -> bool {
        matches!(self, DispatchHandle::Spawned(_))
    }
}

#[derive(Clone)]
pub struct FeedbackDispatcher {
    controller: Arc<QualityFeedbackController>,
}

impl FeedbackDispatcher {
    pub fn new(controller: Arc<QualityFeedbackController>) -> Self {
        Self { controller }
    }

    pub fn dispatch(&self, inspection_id: &str) -> DispatchHandle {
        let controller = self.controller.clone();
        let inspection_id = inspection_id.to_string();

        if let Ok(handle) = tokio::runtime::Handle::try_current() {
            debug!(inspection_id = %inspection_id, "质量反馈投递到 blocking pool");
            DispatchHandle::Spawned(handle.spawn_blocking(move || run_logged(&controller, &inspection_id)))
        } else {
            DispatchHandle::Inline(run_logged(&controller, &inspection_id))
        }
    }
}

fn run_logged(
    controller: &QualityFeedbackController,
    inspection_id: &str,
) -> EngineResult<FeedbackOutcome> {
    let result = controller.apply_quality_feedback(inspection_id);
    if let Err(e) = &result {
        warn!(
            inspection_id,
            category = ?e.category(),
            error = %e,
            "质量反馈执行失败（检验记录不受影响）"
        );
    }
    result
}
