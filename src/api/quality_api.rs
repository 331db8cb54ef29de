// ==========================================
// 数控加工执行闭环 - 质量检验 API
// ==========================================
// 职责: 检验记录、批次缺陷分析、追溯报告
// 说明: 配置了反馈调度器时，检验落库后自动触发质量反馈；
//       反馈失败只记日志，不影响检验结果
// ==========================================

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::api::error::{require_non_blank, ApiResult};
use crate::domain::{DefectAnalysis, FailureMode, Inspection, TraceabilityReport};
use crate::engine::{
    DispatchHandle, FeedbackDispatcher, InspectionContext, InspectionEngine, MeasurementInput,
};

// ==========================================
// 请求 DTO
// ==========================================

/// 记录检验请求
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecordInspectionRequest {
    pub production_order_id: String,
    pub lot_number: String,
    pub inspector_id: String,
    pub measurements: Vec<MeasurementInput>,
    #[serde(default)]
    pub machine_id: Option<String>,
    #[serde(default)]
    pub nc_program_id: Option<String>,
    /// 上游已计算的 Cpk（缺省时由批次数据估算）
    #[serde(default)]
    pub supplied_cpk: Option<f64>,
    #[serde(default)]
    pub failure_mode: Option<FailureMode>,
}

impl RecordInspectionRequest {
    pub fn new(
        production_order_id: &str,
        lot_number: &str,
        inspector_id: &str,
        measurements: Vec<MeasurementInput>,
    ) -> Self {
        Self {
            production_order_id: production_order_id.to_string(),
            lot_number: lot_number.to_string(),
            inspector_id: inspector_id.to_string(),
            measurements,
            machine_id: None,
            nc_program_id: None,
            supplied_cpk: None,
            failure_mode: None,
        }
    }

    fn context(&self) -> InspectionContext {
        InspectionContext {
            machine_id: self.machine_id.clone(),
            nc_program_id: self.nc_program_id.clone(),
            supplied_cpk: self.supplied_cpk,
            failure_mode: self.failure_mode,
        }
    }
}

// ==========================================
// QualityApi
// ==========================================

pub struct QualityApi {
    engine: Arc<InspectionEngine>,
    dispatcher: Option<FeedbackDispatcher>,
}

impl QualityApi {
    pub fn new(engine: Arc<InspectionEngine>) -> Self {
        Self {
            engine,
            dispatcher: None,
        }
    }

    /// 检验落库后自动触发质量反馈
    pub fn with_feedback(mut self, dispatcher: FeedbackDispatcher) -> Self {
        self.dispatcher = Some(dispatcher);
        self
    }

    /// 记录检验
    ///
    /// # 返回
    /// - Ok(Inspection): 已判定并持久化的检验（Completed）
    /// - Err(InvalidMeasurement): 测量数据非法，不写库
    pub fn record_inspection(&self, request: RecordInspectionRequest) -> ApiResult<Inspection> {
        let (inspection, _handle) = self.record_and_dispatch(request)?;
        Ok(inspection)
    }

    /// 记录检验，并返回反馈任务句柄（未配置调度器时为 None）
    ///
    /// 句柄被丢弃时，已投递的反馈任务继续执行。
    pub fn record_and_dispatch(
        &self,
        request: RecordInspectionRequest,
    ) -> ApiResult<(Inspection, Option<DispatchHandle>)> {
        require_non_blank(&request.production_order_id, "订单ID")?;
        require_non_blank(&request.lot_number, "批次号")?;
        require_non_blank(&request.inspector_id, "检验员")?;

        let context = request.context();
        let inspection = self.engine.record_inspection_with_context(
            &request.production_order_id,
            &request.lot_number,
            &request.inspector_id,
            &request.measurements,
            context,
        )?;

        let handle = self
            .dispatcher
            .as_ref()
            .map(|dispatcher| dispatcher.dispatch(&inspection.id));
        Ok((inspection, handle))
    }

    pub fn get_inspection(&self, inspection_id: &str) -> ApiResult<Inspection> {
        require_non_blank(inspection_id, "检验ID")?;
        Ok(self.engine.get_inspection(inspection_id)?)
    }

    pub fn list_inspections_by_order(&self, production_order_id: &str) -> ApiResult<Vec<Inspection>> {
        require_non_blank(production_order_id, "订单ID")?;
        Ok(self.engine.list_inspections_by_order(production_order_id)?)
    }

    pub fn list_inspections_by_lot(&self, lot_number: &str) -> ApiResult<Vec<Inspection>> {
        require_non_blank(lot_number, "批次号")?;
        Ok(self.engine.list_inspections_by_lot(lot_number)?)
    }

    /// 批次缺陷分析（合格率 + 按参数统计缺陷）
    pub fn analyze_defects(&self, lot_number: &str) -> ApiResult<DefectAnalysis> {
        require_non_blank(lot_number, "批次号")?;
        Ok(self.engine.analyze_defects(lot_number)?)
    }

    /// 批次追溯（涉及的程序、机床、订单）
    pub fn get_traceability(&self, lot_number: &str) -> ApiResult<TraceabilityReport> {
        require_non_blank(lot_number, "批次号")?;
        Ok(self.engine.get_traceability(lot_number)?)
    }
}
