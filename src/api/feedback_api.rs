// ==========================================
// 数控加工执行闭环 - 质量反馈 API
// ==========================================
// 职责: 手动触发质量反馈、查询控制历史与刀补记录
// ==========================================

use std::sync::Arc;

use crate::api::error::{require_non_blank, ApiResult};
use crate::domain::{ControlRecord, FeedbackOutcome, ToolOffsetAdjustment};
use crate::engine::{FeedbackConfig, QualityFeedbackController};

pub struct FeedbackApi {
    controller: Arc<QualityFeedbackController>,
}

impl FeedbackApi {
    pub fn new(controller: Arc<QualityFeedbackController>) -> Self {
        Self { controller }
    }

    /// 对指定检验执行质量反馈（同一检验重复调用返回既有记录）
    pub fn apply_quality_feedback(&self, inspection_id: &str) -> ApiResult<FeedbackOutcome> {
        require_non_blank(inspection_id, "检验ID")?;
        Ok(self.controller.apply_quality_feedback(inspection_id)?)
    }

    /// 控制回路历史（按记录时间升序）
    pub fn list_control_history(&self, nc_program_id: &str) -> ApiResult<Vec<ControlRecord>> {
        require_non_blank(nc_program_id, "程序ID")?;
        Ok(self.controller.list_control_history(nc_program_id)?)
    }

    pub fn list_tool_offset_adjustments(
        &self,
        nc_program_id: &str,
    ) -> ApiResult<Vec<ToolOffsetAdjustment>> {
        require_non_blank(nc_program_id, "程序ID")?;
        Ok(self.controller.list_tool_offset_adjustments(nc_program_id)?)
    }

    /// 当前生效的反馈参数
    pub fn get_feedback_config(&self) -> FeedbackConfig {
        self.controller.config().clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::error::ApiError;
    use crate::db::open_in_memory_shared;
    use crate::domain::{Inspection, MeasurementResult, NcProgram};
    use crate::engine::FeedbackRepositories;

    #[test]
    fn test_apply_and_query() {
        let repos = FeedbackRepositories::from_connection(open_in_memory_shared().unwrap());
        let program = NcProgram::new("sleeve", "1.0", "O5000\nM30\n", vec!["lathe".into()], "planner");
        repos.program_repo.save(&program).unwrap();

        let mut insp = Inspection::new("order-PO-3", "LOT-C", "qa");
        insp.nc_program_id = Some(program.id.clone());
        insp.supplied_cpk = Some(1.37);
        insp.add_measurement(MeasurementResult::evaluate("bore", 12.0, 12.0, 0.01, "mm"));
        insp.complete();
        repos.inspection_repo.save(&insp).unwrap();

        let api = FeedbackApi::new(Arc::new(QualityFeedbackController::new(
            repos,
            FeedbackConfig::default(),
        )));
        assert!(matches!(
            api.apply_quality_feedback(&insp.id).unwrap(),
            FeedbackOutcome::Applied { .. }
        ));
        assert!(matches!(
            api.apply_quality_feedback(&insp.id).unwrap(),
            FeedbackOutcome::AlreadyApplied(_)
        ));
        assert_eq!(api.list_control_history(&program.id).unwrap().len(), 1);
        assert_eq!(api.list_tool_offset_adjustments(&program.id).unwrap().len(), 1);
        assert_eq!(api.get_feedback_config(), FeedbackConfig::default());

        assert!(matches!(
            api.apply_quality_feedback("insp-missing"),
            Err(ApiError::InspectionNotFound(_))
        ));
    }
}
