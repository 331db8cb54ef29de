// ==========================================
// 数控加工执行闭环 - 质量反馈控制器
// ==========================================
// 流程: Cpk → 误差 → PID 修正量 → 分级措施 → 执行 → 写控制历史
// 幂等: 每个检验至多一条控制历史，重复调用返回既有记录
// 并发: 同一控制回路（NC 程序）的读-算-写串行
// 红线: 措施执行失败不影响检验记录本身
// ==========================================

pub mod action;
pub mod pid;

use crate::domain::feedback::{
    ControlRecord, CorrectiveAction, FeedbackOutcome, PidGains, ToolOffsetAdjustment,
};
use crate::domain::inspection::Inspection;
use crate::domain::types::CorrectiveActionKind;
use crate::engine::capability::estimate_cpk;
use crate::engine::error::{translate_not_found, EngineError, EngineResult};
use crate::engine::repositories::FeedbackRepositories;
use crate::repository::RepositoryError;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use tracing::{debug, info, warn};
use uuid::Uuid;

// ==========================================
// FeedbackConfig - 控制器参数
// ==========================================
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeedbackConfig {
    pub target_cpk: f64,
    pub gains: PidGains,
    pub dead_band: f64,
    pub major_threshold: f64,
    pub tool_offset_threshold: f64,
    pub history_window: usize,
    pub integral_clamp: f64,
    /// 批次样本不足时使用的 Cpk
    pub fallback_cpk: f64,
}

impl Default for FeedbackConfig {
    fn default() -> Self {
        Self {
            target_cpk: 1.67,
            gains: PidGains::default(),
            dead_band: 0.1,
            major_threshold: 0.5,
            tool_offset_threshold: 0.2,
            history_window: 50,
            integral_clamp: 5.0,
            fallback_cpk: 1.5,
        }
    }
}

// ==========================================
// QualityFeedbackController
// ==========================================
pub struct QualityFeedbackController {
    repos: FeedbackRepositories,
    config: FeedbackConfig,
    loop_locks: Mutex<HashMap<String, Arc<Mutex<()>>>>,
}

impl QualityFeedbackController {
    pub fn new(repos: FeedbackRepositories, config: FeedbackConfig) -> Self {
        Self {
            repos,
            config,
            loop_locks: Mutex::new(HashMap::new()),
        }
    }

    pub fn config(&self) -> &FeedbackConfig {
        &self.config
    }

    /// 对一条检验执行质量反馈
    ///
    /// # 返回
    /// - `WithinDeadBand`: 误差在死区内（不记历史）
    /// - `Applied`: 已执行措施并写入控制历史
    /// - `AlreadyApplied`: 该检验此前已处理
    ///
    /// # 错误
    /// - `InspectionNotFound`: 检验不存在
    /// - `ProgramNotFound`: 需要修正程序但无法确定程序
    /// - `Storage`: 存储失败
    pub fn apply_quality_feedback(&self, inspection_id: &str) -> EngineResult<FeedbackOutcome> {
        let inspection = self
            .repos
            .inspection_repo
            .find_by_id(inspection_id)?
            .ok_or_else(|| EngineError::InspectionNotFound(inspection_id.to_string()))?;

        if let Some(existing) = self.repos.history_repo.find_by_inspection(inspection_id)? {
            debug!(inspection_id, "检验已处理过，返回既有记录");
            return Ok(FeedbackOutcome::AlreadyApplied(existing));
        }

        let program_id = self.resolve_program_id(&inspection)?;
        let loop_key = match &program_id {
            Some(id) => id.clone(),
            None => format!("order:{}", inspection.production_order_id),
        };

        let loop_lock = self.loop_lock(&loop_key)?;
        let _guard = loop_lock
            .lock()
            .map_err(|e| RepositoryError::LockError(e.to_string()))?;

        // 持锁后复查，避免同一检验被并发处理两次
        if let Some(existing) = self.repos.history_repo.find_by_inspection(inspection_id)? {
            return Ok(FeedbackOutcome::AlreadyApplied(existing));
        }

        let cpk = self.current_cpk(&inspection)?;
        let error = self.config.target_cpk - cpk;

        let kind = match action::classify(error, &self.config) {
            Some(kind) => kind,
            None => {
                info!(inspection_id, cpk, error, "误差在死区内，不采取措施");
                return Ok(FeedbackOutcome::WithinDeadBand { cpk, error });
            }
        };

        let history = self
            .repos
            .history_repo
            .recent_by_loop(&loop_key, self.config.history_window)?;
        let past_errors: Vec<f64> = history.iter().map(|r| r.error).collect();
        let terms = pid::compute_terms(
            &self.config.gains,
            error,
            &past_errors,
            self.config.integral_clamp,
        );
        let correction = terms.correction();

        let action = action::build_action(kind, correction, inspection.failure_mode, program_id);
        let now = Utc::now();
        self.execute(&action, inspection_id, now)?;

        let record = ControlRecord {
            record_id: Uuid::new_v4().to_string(),
            loop_key,
            inspection_id: inspection_id.to_string(),
            recorded_at: now,
            error,
            correction,
            action_kind: action.kind,
            parameters: action.parameters.clone(),
        };
        match self.repos.history_repo.insert(&record) {
            Ok(()) => {}
            Err(RepositoryError::UniqueConstraintViolation(_)) => {
                // 其他进程已写入
                if let Some(existing) = self.repos.history_repo.find_by_inspection(inspection_id)? {
                    return Ok(FeedbackOutcome::AlreadyApplied(existing));
                }
            }
            Err(e) => return Err(e.into()),
        }

        info!(
            inspection_id,
            loop_key = %record.loop_key,
            cpk,
            error,
            p = terms.proportional,
            i = terms.integral,
            d = terms.derivative,
            correction,
            action = %action.kind,
            "质量反馈已执行"
        );
        Ok(FeedbackOutcome::Applied {
            cpk,
            error,
            correction,
            action,
        })
    }

    /// 控制回路历史（按时间正序）
    pub fn list_control_history(&self, nc_program_id: &str) -> EngineResult<Vec<ControlRecord>> {
        Ok(self.repos.history_repo.list_by_loop(nc_program_id)?)
    }

    pub fn list_tool_offset_adjustments(
        &self,
        nc_program_id: &str,
    ) -> EngineResult<Vec<ToolOffsetAdjustment>> {
        Ok(self.repos.tool_offset_repo.list_by_program(nc_program_id)?)
    }

    // ==========================================
    // 内部步骤
    // ==========================================

    /// 确定检验对应的 NC 程序
    ///
    /// 顺序: 检验登记的程序 → 检验机床的在制作业 → 订单分配机床的在制作业
    fn resolve_program_id(&self, inspection: &Inspection) -> EngineResult<Option<String>> {
        if let Some(id) = &inspection.nc_program_id {
            return Ok(Some(id.clone()));
        }

        let mut machine_ids: Vec<String> = inspection.machine_id.iter().cloned().collect();
        if let Some(order) = self
            .repos
            .order_repo
            .find_by_id(&inspection.production_order_id)?
        {
            machine_ids.extend(order.schedule.assigned_machines);
        }

        for machine_id in machine_ids {
            if let Some(machine) = self.repos.machine_repo.find_by_id(&machine_id)? {
                if let Some(job) = machine.status.current_job_id {
                    return Ok(Some(job));
                }
            }
        }
        Ok(None)
    }

    fn loop_lock(&self, loop_key: &str) -> EngineResult<Arc<Mutex<()>>> {
        let mut locks = self
            .loop_locks
            .lock()
            .map_err(|e| RepositoryError::LockError(e.to_string()))?;
        Ok(locks
            .entry(loop_key.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone())
    }

    /// 检验自带 Cpk 优先，否则按批次估算
    fn current_cpk(&self, inspection: &Inspection) -> EngineResult<f64> {
        if let Some(cpk) = inspection.supplied_cpk {
            return Ok(cpk);
        }
        let lot = self
            .repos
            .inspection_repo
            .find_by_lot_number(&inspection.lot_number)?;
        let estimate = estimate_cpk(&lot, self.config.fallback_cpk);
        if estimate.fallback {
            warn!(
                lot_number = %inspection.lot_number,
                samples = estimate.samples,
                fallback_cpk = estimate.cpk,
                "批次样本不足，使用回退 Cpk"
            );
        }
        Ok(estimate.cpk)
    }

    fn execute(
        &self,
        action: &CorrectiveAction,
        inspection_id: &str,
        now: DateTime<Utc>,
    ) -> EngineResult<()> {
        match action.kind {
            CorrectiveActionKind::MajorNcAdjustment => {
                let program_id = action.nc_program_id.as_deref().ok_or_else(|| {
                    EngineError::ProgramNotFound(format!(
                        "inspection {} 无关联 NC 程序",
                        inspection_id
                    ))
                })?;
                let updated = self
                    .repos
                    .program_repo
                    .append_annotation(program_id, &action.compensation_note(), now)
                    .map_err(|err| {
                        translate_not_found(err, || {
                            EngineError::ProgramNotFound(program_id.to_string())
                        })
                    })?;
                info!(program_id, version = %updated.version, "NC 程序已追加补偿注记");
            }
            CorrectiveActionKind::ToolOffsetAdjustment => {
                let adjustment = ToolOffsetAdjustment {
                    adjustment_id: Uuid::new_v4().to_string(),
                    nc_program_id: action.nc_program_id.clone(),
                    inspection_id: inspection_id.to_string(),
                    action_kind: action.kind,
                    parameters: action.parameters.clone(),
                    executed_at: now,
                };
                self.repos.tool_offset_repo.insert(&adjustment)?;
                info!(
                    adjustment_id = %adjustment.adjustment_id,
                    wear_offset = action.parameter("wear_offset"),
                    "刀补调整已记录"
                );
            }
            CorrectiveActionKind::CuttingConditionTuning => {
                info!(
                    inspection_id,
                    feed_rate_adjustment = action.parameter("feed_rate_adjustment"),
                    "切削条件微调建议（不自动执行）"
                );
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::open_in_memory_shared;
    use crate::domain::inspection::MeasurementResult;
    use crate::domain::nc_program::NcProgram;
    use crate::domain::types::FailureMode;

    const BODY: &str = "O5000\nG21\nT0202\nM30\n";

    fn setup() -> (QualityFeedbackController, FeedbackRepositories, NcProgram) {
        let repos = FeedbackRepositories::from_connection(open_in_memory_shared().unwrap());
        let program = NcProgram::new("bushing", "1.0", BODY, vec!["lathe".into()], "planner");
        repos.program_repo.save(&program).unwrap();
        let controller = QualityFeedbackController::new(repos.clone(), FeedbackConfig::default());
        (controller, repos, program)
    }

    fn save_inspection(
        repos: &FeedbackRepositories,
        program_id: Option<&str>,
        cpk: Option<f64>,
        failure_mode: Option<FailureMode>,
    ) -> Inspection {
        let mut insp = Inspection::new("order-PO-1", "LOT-F", "qa");
        insp.nc_program_id = program_id.map(String::from);
        insp.supplied_cpk = cpk;
        insp.failure_mode = failure_mode;
        insp.add_measurement(MeasurementResult::evaluate("dia", 20.0, 20.0, 0.02, "mm"));
        insp.complete();
        repos.inspection_repo.save(&insp).unwrap();
        insp
    }

    #[test]
    fn test_dead_band_takes_no_action() {
        let (controller, repos, program) = setup();
        for cpk in [1.6, 1.67, 1.75] {
            let insp = save_inspection(&repos, Some(&program.id), Some(cpk), None);
            let outcome = controller.apply_quality_feedback(&insp.id).unwrap();
            assert!(matches!(outcome, FeedbackOutcome::WithinDeadBand { .. }));
        }
        assert!(controller.list_control_history(&program.id).unwrap().is_empty());
    }

    #[test]
    fn test_tool_offset_with_empty_history() {
        let (controller, repos, program) = setup();
        // Cpk 1.37 → error 0.3
        let insp = save_inspection(&repos, Some(&program.id), Some(1.37), None);
        match controller.apply_quality_feedback(&insp.id).unwrap() {
            FeedbackOutcome::Applied {
                error,
                correction,
                action,
                ..
            } => {
                assert!((error - 0.3).abs() < 1e-9);
                assert!((correction - 0.15).abs() < 1e-9);
                assert_eq!(action.kind, CorrectiveActionKind::ToolOffsetAdjustment);
            }
            other => panic!("unexpected outcome: {:?}", other),
        }
        let adjustments = controller.list_tool_offset_adjustments(&program.id).unwrap();
        assert_eq!(adjustments.len(), 1);
        assert!((adjustments[0].parameters["wear_offset"] - 0.00075).abs() < 1e-9);
    }

    #[test]
    fn test_major_adjustment_annotates_program() {
        let (controller, repos, program) = setup();
        let insp = save_inspection(
            &repos,
            Some(&program.id),
            Some(1.0),
            Some(FailureMode::DiameterOversize),
        );
        let outcome = controller.apply_quality_feedback(&insp.id).unwrap();
        let action = match outcome {
            FeedbackOutcome::Applied { action, .. } => action,
            other => panic!("unexpected outcome: {:?}", other),
        };
        assert_eq!(action.kind, CorrectiveActionKind::MajorNcAdjustment);
        assert_eq!(action.parameter("diameter_compensation"), -0.01);

        let stored = repos.program_repo.find_by_id(&program.id).unwrap().unwrap();
        assert_eq!(stored.version, "1.0.auto");
        assert_eq!(stored.annotations.len(), 1);
        assert!(stored.annotations[0].starts_with("(AUTO COMPENSATION: Offset="));
        assert!(stored.verify_integrity());
    }

    #[test]
    fn test_major_without_program_fails_and_keeps_inspection() {
        let (controller, repos, _) = setup();
        let insp = save_inspection(&repos, None, Some(0.9), None);
        assert!(matches!(
            controller.apply_quality_feedback(&insp.id).unwrap_err(),
            EngineError::ProgramNotFound(_)
        ));
        assert!(repos.inspection_repo.find_by_id(&insp.id).unwrap().is_some());
        assert!(repos.history_repo.find_by_inspection(&insp.id).unwrap().is_none());
    }

    #[test]
    fn test_idempotent_per_inspection() {
        let (controller, repos, program) = setup();
        let insp = save_inspection(&repos, Some(&program.id), Some(1.37), None);
        controller.apply_quality_feedback(&insp.id).unwrap();
        let second = controller.apply_quality_feedback(&insp.id).unwrap();
        assert!(matches!(second, FeedbackOutcome::AlreadyApplied(ref r) if r.inspection_id == insp.id));
        assert_eq!(controller.list_tool_offset_adjustments(&program.id).unwrap().len(), 1);
        assert_eq!(controller.list_control_history(&program.id).unwrap().len(), 1);
    }

    #[test]
    fn test_history_feeds_integral_and_derivative() {
        let (controller, repos, program) = setup();
        let first = save_inspection(&repos, Some(&program.id), Some(1.37), None);
        controller.apply_quality_feedback(&first.id).unwrap();

        // 第二次 error = 0.4: P = 0.2, I = 0.1·0.3, D = 0.05·0.1
        let second = save_inspection(&repos, Some(&program.id), Some(1.27), None);
        match controller.apply_quality_feedback(&second.id).unwrap() {
            FeedbackOutcome::Applied { correction, .. } => {
                assert!((correction - 0.235).abs() < 1e-9);
            }
            other => panic!("unexpected outcome: {:?}", other),
        }
    }

    #[test]
    fn test_unknown_inspection() {
        let (controller, _, _) = setup();
        assert!(matches!(
            controller.apply_quality_feedback("insp-missing").unwrap_err(),
            EngineError::InspectionNotFound(_)
        ));
    }
}
