// ==========================================
// 数控加工执行闭环 - 检验与缺陷分析引擎
// ==========================================
// 红线: 输入非法时不写库
// 红线: 检验主记录与测量项原子写入
// ==========================================

use crate::domain::inspection::{DefectAnalysis, Inspection, MeasurementResult, TraceabilityReport};
use crate::domain::types::FailureMode;
use crate::engine::error::{EngineError, EngineResult};
use crate::repository::InspectionRepository;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use tracing::info;

/// 单项测量输入
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MeasurementInput {
    pub parameter_name: String,
    pub measured_value: f64,
    pub target_value: f64,
    pub tolerance: f64,
    pub unit: String,
}

impl MeasurementInput {
    pub fn new(parameter_name: &str, measured: f64, target: f64, tolerance: f64, unit: &str) -> Self {
        Self {
            parameter_name: parameter_name.to_string(),
            measured_value: measured,
            target_value: target,
            tolerance,
            unit: unit.to_string(),
        }
    }

    fn validate(&self, index: usize) -> EngineResult<()> {
        if self.parameter_name.trim().is_empty() {
            return Err(EngineError::InvalidMeasurement(format!(
                "第{}项: 参数名为空",
                index + 1
            )));
        }
        if !self.measured_value.is_finite() || !self.target_value.is_finite() {
            return Err(EngineError::InvalidMeasurement(format!(
                "{}: 测量值/目标值必须为有限数",
                self.parameter_name
            )));
        }
        if !self.tolerance.is_finite() || self.tolerance < 0.0 {
            return Err(EngineError::InvalidMeasurement(format!(
                "{}: 公差必须为非负有限数 (got {})",
                self.parameter_name, self.tolerance
            )));
        }
        Ok(())
    }
}

/// 可选的追溯信息
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct InspectionContext {
    pub machine_id: Option<String>,
    pub nc_program_id: Option<String>,
    pub supplied_cpk: Option<f64>,
    pub failure_mode: Option<FailureMode>,
}

pub struct InspectionEngine {
    inspection_repo: Arc<InspectionRepository>,
}

impl InspectionEngine {
    pub fn new(inspection_repo: Arc<InspectionRepository>) -> Self {
        Self { inspection_repo }
    }

    /// 记录检验（无追溯信息）
    pub fn record_inspection(
        &self,
        production_order_id: &str,
        lot_number: &str,
        inspector_id: &str,
        measurements: &[MeasurementInput],
    ) -> EngineResult<Inspection> {
        self.record_inspection_with_context(
            production_order_id,
            lot_number,
            inspector_id,
            measurements,
            InspectionContext::default(),
        )
    }

    /// 记录检验
    ///
    /// 逐项判定 → 按输入顺序追加 → 定案 → 单事务写入
    ///
    /// # 错误
    /// - `InvalidMeasurement`: 列表为空、参数名为空、数值非有限或公差为负
    pub fn record_inspection_with_context(
        &self,
        production_order_id: &str,
        lot_number: &str,
        inspector_id: &str,
        measurements: &[MeasurementInput],
        context: InspectionContext,
    ) -> EngineResult<Inspection> {
        if measurements.is_empty() {
            return Err(EngineError::InvalidMeasurement("测量列表为空".to_string()));
        }
        if let Some(cpk) = context.supplied_cpk {
            if !cpk.is_finite() {
                return Err(EngineError::InvalidMeasurement(format!("Cpk 非有限数: {}", cpk)));
            }
        }
        for (index, m) in measurements.iter().enumerate() {
            m.validate(index)?;
        }

        let mut inspection = Inspection::new(production_order_id, lot_number, inspector_id);
        inspection.machine_id = context.machine_id;
        inspection.nc_program_id = context.nc_program_id;
        inspection.supplied_cpk = context.supplied_cpk;
        inspection.failure_mode = context.failure_mode;

        for m in measurements {
            inspection.add_measurement(MeasurementResult::evaluate(
                &m.parameter_name,
                m.measured_value,
                m.target_value,
                m.tolerance,
                &m.unit,
            ));
        }
        inspection.complete();

        self.inspection_repo.save(&inspection)?;
        info!(
            inspection_id = %inspection.id,
            lot_number,
            result = ?inspection.final_result,
            failed = inspection.failed_results().count(),
            "检验已记录"
        );
        Ok(inspection)
    }

    pub fn get_inspection(&self, inspection_id: &str) -> EngineResult<Inspection> {
        self.inspection_repo
            .find_by_id(inspection_id)?
            .ok_or_else(|| EngineError::InspectionNotFound(inspection_id.to_string()))
    }

    pub fn list_inspections_by_order(&self, production_order_id: &str) -> EngineResult<Vec<Inspection>> {
        Ok(self
            .inspection_repo
            .find_by_production_order_id(production_order_id)?)
    }

    pub fn list_inspections_by_lot(&self, lot_number: &str) -> EngineResult<Vec<Inspection>> {
        Ok(self.inspection_repo.find_by_lot_number(lot_number)?)
    }

    /// 批次缺陷分析
    ///
    /// # 错误
    /// - `InspectionNotFound`: 该批次无检验记录
    pub fn analyze_defects(&self, lot_number: &str) -> EngineResult<DefectAnalysis> {
        let inspections = self.lot_inspections(lot_number)?;
        Ok(summarize_defects(lot_number, &inspections))
    }

    /// 批次追溯报告
    pub fn get_traceability(&self, lot_number: &str) -> EngineResult<TraceabilityReport> {
        let inspections = self.lot_inspections(lot_number)?;
        let summary = summarize_defects(lot_number, &inspections);

        let nc_program_ids = distinct_ids(inspections.iter().filter_map(|i| i.nc_program_id.as_ref()));
        let machine_ids = distinct_ids(inspections.iter().filter_map(|i| i.machine_id.as_ref()));
        let production_order_ids = distinct_ids(inspections.iter().map(|i| &i.production_order_id));

        Ok(TraceabilityReport {
            lot_number: lot_number.to_string(),
            pass_rate: summary.pass_rate,
            nc_program_ids,
            machine_ids,
            production_order_ids,
            inspections,
        })
    }

    fn lot_inspections(&self, lot_number: &str) -> EngineResult<Vec<Inspection>> {
        let inspections = self.inspection_repo.find_by_lot_number(lot_number)?;
        if inspections.is_empty() {
            return Err(EngineError::InspectionNotFound(format!("lot={}", lot_number)));
        }
        Ok(inspections)
    }
}

/// 去重并排序
fn distinct_ids<'a>(ids: impl Iterator<Item = &'a String>) -> Vec<String> {
    ids.cloned().collect::<BTreeSet<_>>().into_iter().collect()
}

/// 汇总批次合格率与缺陷分布（调用方保证非空）
pub fn summarize_defects(lot_number: &str, inspections: &[Inspection]) -> DefectAnalysis {
    let total = inspections.len();
    let passed = inspections.iter().filter(|i| i.is_passed()).count();

    let mut defect_types: BTreeMap<String, usize> = BTreeMap::new();
    for inspection in inspections.iter().filter(|i| !i.is_passed()) {
        for failed in inspection.failed_results() {
            *defect_types.entry(failed.parameter_name.clone()).or_insert(0) += 1;
        }
    }

    let pass_rate = if total == 0 {
        0.0
    } else {
        passed as f64 / total as f64 * 100.0
    };

    DefectAnalysis {
        lot_number: lot_number.to_string(),
        total_samples: total,
        passed_samples: passed,
        failed_samples: total - passed,
        pass_rate,
        defect_types,
    }
}
