// ==========================================
// 数控加工执行闭环 - 检验领域模型
// ==========================================
// 红线: 最终结论 pass ⇔ 所有测量项均合格
// 红线: 定案后状态为 completed，不再回到 pending
// ==========================================

use crate::domain::types::{FailureMode, InspectionResult, InspectionStatus};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use uuid::Uuid;

// ==========================================
// MeasurementResult - 单项测量结果
// ==========================================
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MeasurementResult {
    pub parameter_name: String,
    pub measured_value: f64,
    pub target_value: f64,
    pub tolerance: f64, // 对称公差带 ±tolerance
    pub unit: String,
    pub pass: bool,
}

impl MeasurementResult {
    /// 按对称公差带判定
    ///
    /// deviation = measured − target
    /// pass = deviation ≥ −tolerance 且 deviation ≤ tolerance（闭区间）
    ///
    /// 边界比较放宽按量级缩放的浮点误差，10.05 − 10.0 这类恰在公差线上的值判合格
    pub fn evaluate(
        parameter_name: &str,
        measured_value: f64,
        target_value: f64,
        tolerance: f64,
        unit: &str,
    ) -> Self {
        let deviation = measured_value - target_value;
        let eps = 4.0 * f64::EPSILON * measured_value.abs().max(target_value.abs()).max(1.0);
        let pass = deviation >= -tolerance - eps && deviation <= tolerance + eps;
        Self {
            parameter_name: parameter_name.to_string(),
            measured_value,
            target_value,
            tolerance,
            unit: unit.to_string(),
            pass,
        }
    }

    pub fn deviation(&self) -> f64 {
        self.measured_value - self.target_value
    }
}

// ==========================================
// Inspection - 检验记录
// ==========================================
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Inspection {
    pub id: String,
    pub production_order_id: String,
    pub lot_number: String,
    pub inspector_id: String,

    // ===== 追溯信息 =====
    pub machine_id: Option<String>,
    pub nc_program_id: Option<String>,
    pub supplied_cpk: Option<f64>, // 外部已算好的 Cpk
    pub failure_mode: Option<FailureMode>,

    pub results: Vec<MeasurementResult>,
    pub status: InspectionStatus,
    pub final_result: Option<InspectionResult>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Inspection {
    /// 生成检验ID
    ///
    /// 格式: insp-{YYYYMMDDHHMMSS}-{8位随机十六进制}
    /// 随机后缀避免同一秒内并发创建的冲突
    pub fn derive_id(created_at: DateTime<Utc>) -> String {
        let tag = Uuid::new_v4().simple().to_string();
        format!("insp-{}-{}", created_at.format("%Y%m%d%H%M%S"), &tag[..8])
    }

    pub fn new(production_order_id: &str, lot_number: &str, inspector_id: &str) -> Self {
        let now = Utc::now();
        Self {
            id: Self::derive_id(now),
            production_order_id: production_order_id.to_string(),
            lot_number: lot_number.to_string(),
            inspector_id: inspector_id.to_string(),
            machine_id: None,
            nc_program_id: None,
            supplied_cpk: None,
            failure_mode: None,
            results: Vec::new(),
            status: InspectionStatus::Pending,
            final_result: None,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn add_measurement(&mut self, result: MeasurementResult) {
        self.results.push(result);
        self.updated_at = Utc::now();
    }

    /// 定案: 计算最终结论并置为 completed
    pub fn complete(&mut self) {
        let all_pass = self.results.iter().all(|r| r.pass);
        self.final_result = Some(if all_pass {
            InspectionResult::Pass
        } else {
            InspectionResult::Fail
        });
        self.status = InspectionStatus::Completed;
        self.updated_at = Utc::now();
    }

    pub fn is_passed(&self) -> bool {
        self.final_result == Some(InspectionResult::Pass)
    }

    /// 不合格的测量项
    pub fn failed_results(&self) -> impl Iterator<Item = &MeasurementResult> {
        self.results.iter().filter(|r| !r.pass)
    }
}

// ==========================================
// DefectAnalysis - 批次缺陷分析（派生，不持久化）
// ==========================================
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DefectAnalysis {
    pub lot_number: String,
    pub total_samples: usize,
    pub passed_samples: usize,
    pub failed_samples: usize,
    pub pass_rate: f64,                        // 百分比
    pub defect_types: BTreeMap<String, usize>, // 参数名 → 不合格次数
}

// ==========================================
// TraceabilityReport - 批次追溯报告
// ==========================================
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TraceabilityReport {
    pub lot_number: String,
    pub inspections: Vec<Inspection>,
    pub pass_rate: f64,
    pub nc_program_ids: Vec<String>,
    pub machine_ids: Vec<String>,
    pub production_order_ids: Vec<String>,
}
