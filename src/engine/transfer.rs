// ==========================================
// 数控加工执行闭环 - 机床分配与程序下发引擎
// ==========================================
// 下发门禁（顺序固定）:
//   1. 程序存在      → ProgramNotFound（不查询机床）
//   2. 机床存在      → MachineNotFound
//   3. 机床 Stopped  → MachineNotAvailable
//   4. 机型兼容      → IncompatibleProgram
// 并发: 状态写入为 Stopped → Running 的条件更新，竞争失败同样报 MachineNotAvailable
// ==========================================

use crate::domain::machine::{Machine, MachineStatus};
use crate::domain::nc_program::NcProgram;
use crate::domain::types::MachineRunningState;
use crate::engine::error::{translate_not_found, EngineError, EngineResult};
use crate::engine::selection::{FirstCompatibleStrategy, ProgramSelectionStrategy};
use crate::repository::{MachineRepository, NcProgramRepository, RepositoryError};
use std::sync::Arc;
use tracing::{debug, info, warn};

pub struct NcTransferEngine {
    program_repo: Arc<NcProgramRepository>,
    machine_repo: Arc<MachineRepository>,
    default_strategy: Arc<dyn ProgramSelectionStrategy>,
}

impl NcTransferEngine {
    pub fn new(program_repo: Arc<NcProgramRepository>, machine_repo: Arc<MachineRepository>) -> Self {
        Self {
            program_repo,
            machine_repo,
            default_strategy: Arc::new(FirstCompatibleStrategy),
        }
    }

    pub fn with_strategy(mut self, strategy: Arc<dyn ProgramSelectionStrategy>) -> Self {
        self.default_strategy = strategy;
        self
    }

    // ==========================================
    // 登记
    // ==========================================

    /// 登记 NC 程序（ID 由程序体哈希派生）
    pub fn register_program(
        &self,
        name: &str,
        version: &str,
        content: &str,
        machine_compatibility: Vec<String>,
        created_by: &str,
    ) -> EngineResult<NcProgram> {
        let program = NcProgram::new(name, version, content, machine_compatibility, created_by);
        self.program_repo.save(&program)?;
        info!(program_id = %program.id, name, version, "NC 程序已登记");
        Ok(program)
    }

    /// 登记机床（初始 Stopped）
    pub fn register_machine(
        &self,
        id: &str,
        name: &str,
        ip_address: &str,
        machine_type: &str,
        capabilities: Vec<String>,
    ) -> EngineResult<Machine> {
        let machine = Machine::new(id, name, ip_address, machine_type, capabilities);
        self.machine_repo.save(&machine)?;
        info!(machine_id = id, machine_type, "机床已登记");
        Ok(machine)
    }

    // ==========================================
    // 下发
    // ==========================================

    /// 下发程序到机床
    ///
    /// 成功后机床 Running，current_job_id = 程序ID，心跳刷新
    pub fn transfer_program(&self, program_id: &str, machine_id: &str) -> EngineResult<Machine> {
        let program = self.get_program(program_id)?;
        let mut machine = self.get_machine(machine_id)?;

        if !machine.is_available() {
            return Err(EngineError::MachineNotAvailable {
                machine_id: machine.id,
                state: machine.status.running_state.to_db_str().to_string(),
            });
        }
        if !program.is_compatible_with(&machine.machine_type) {
            return Err(EngineError::IncompatibleProgram {
                program_id: program.id,
                machine_type: machine.machine_type,
            });
        }

        machine.start_job(&program.id);
        self.machine_repo
            .transition_status_if(
                machine_id,
                MachineRunningState::Stopped,
                &machine.status,
                machine.updated_at,
            )
            .map_err(|err| {
                if let RepositoryError::ConditionalUpdateFailed { actual, .. } = &err {
                    warn!(machine_id, actual = %actual, "下发竞争失败");
                }
                transition_error(machine_id, err)
            })?;

        info!(program_id, machine_id, "NC 程序已下发");
        Ok(machine)
    }

    /// 释放机床（作业结束）
    ///
    /// Running / Error → Stopped 并清空作业；已是 Stopped 时原样返回
    pub fn release_machine(&self, machine_id: &str) -> EngineResult<Machine> {
        let mut machine = self.get_machine(machine_id)?;
        let previous = machine.status.running_state;
        if previous == MachineRunningState::Stopped {
            debug!(machine_id, "机床已空闲，无需释放");
            return Ok(machine);
        }

        machine.stop_job();
        self.machine_repo
            .transition_status_if(machine_id, previous, &machine.status, machine.updated_at)
            .map_err(|err| transition_error(machine_id, err))?;

        info!(machine_id, from = %previous, "机床已释放");
        Ok(machine)
    }

    /// 上报机床状态（心跳/故障）
    ///
    /// - 进入 Running 只能经由 transfer_program，上报不能启动作业
    /// - 作业归属由下发/释放决定：Running/Error 沿用当前作业，Stopped 清空
    /// - 上报携带的作业ID与当前作业不符时拒绝
    /// - 以读到的运行状态做条件更新，期间被下发/释放抢先时报 MachineNotAvailable
    pub fn update_machine_status(
        &self,
        machine_id: &str,
        status: MachineStatus,
    ) -> EngineResult<Machine> {
        let mut machine = self.get_machine(machine_id)?;
        let previous = machine.status.running_state;
        let target = status.running_state;

        if target == MachineRunningState::Running && previous != MachineRunningState::Running {
            return Err(EngineError::InvalidMachineStatus {
                machine_id: machine_id.to_string(),
                reason: format!("{} → running 只能经由程序下发", previous),
            });
        }

        let current_job_id = match target {
            MachineRunningState::Stopped => None,
            MachineRunningState::Running | MachineRunningState::Error => {
                machine.status.current_job_id.clone()
            }
        };
        if let Some(reported) = status.current_job_id.as_deref() {
            if current_job_id.as_deref() != Some(reported) {
                return Err(EngineError::InvalidMachineStatus {
                    machine_id: machine_id.to_string(),
                    reason: format!(
                        "上报作业 {} 与当前作业 {} 不符",
                        reported,
                        current_job_id.as_deref().unwrap_or("-")
                    ),
                });
            }
        }

        machine.update_status(MachineStatus {
            running_state: target,
            current_job_id,
            last_heartbeat: status.last_heartbeat,
            error_message: status.error_message,
        });
        self.machine_repo
            .transition_status_if(machine_id, previous, &machine.status, machine.updated_at)
            .map_err(|err| transition_error(machine_id, err))?;

        if target == MachineRunningState::Error {
            warn!(
                machine_id,
                error = machine.status.error_message.as_deref().unwrap_or(""),
                "机床上报故障"
            );
        }
        Ok(machine)
    }

    // ==========================================
    // 选择
    // ==========================================

    /// 按默认策略选择程序
    pub fn select_optimal_program(&self, part_id: &str, machine_type: &str) -> EngineResult<NcProgram> {
        self.select_program_with(self.default_strategy.as_ref(), part_id, machine_type)
    }

    /// 按指定策略选择程序
    pub fn select_program_with(
        &self,
        strategy: &dyn ProgramSelectionStrategy,
        part_id: &str,
        machine_type: &str,
    ) -> EngineResult<NcProgram> {
        let programs = self.program_repo.find_all()?;
        let selected = strategy
            .select(part_id, machine_type, &programs)
            .cloned()
            .ok_or_else(|| {
                EngineError::ProgramNotFound(format!(
                    "no program for part={} machine_type={}",
                    part_id, machine_type
                ))
            })?;
        debug!(
            strategy = strategy.name(),
            program_id = %selected.id,
            machine_type,
            "程序已选定"
        );
        Ok(selected)
    }

    // ==========================================
    // 查询
    // ==========================================

    pub fn get_program(&self, program_id: &str) -> EngineResult<NcProgram> {
        self.program_repo
            .find_by_id(program_id)?
            .ok_or_else(|| EngineError::ProgramNotFound(program_id.to_string()))
    }

    pub fn get_machine(&self, machine_id: &str) -> EngineResult<Machine> {
        self.machine_repo
            .find_by_id(machine_id)?
            .ok_or_else(|| EngineError::MachineNotFound(machine_id.to_string()))
    }

    pub fn get_machine_status(&self, machine_id: &str) -> EngineResult<MachineStatus> {
        Ok(self.get_machine(machine_id)?.status)
    }

    pub fn list_programs(&self) -> EngineResult<Vec<NcProgram>> {
        Ok(self.program_repo.find_all()?)
    }

    pub fn list_available_machines(&self) -> EngineResult<Vec<Machine>> {
        Ok(self.machine_repo.find_available()?)
    }

    pub fn find_program_by_name_and_version(
        &self,
        name: &str,
        version: &str,
    ) -> EngineResult<NcProgram> {
        self.program_repo
            .find_by_name_and_version(name, version)?
            .ok_or_else(|| EngineError::ProgramNotFound(format!("{}@{}", name, version)))
    }
}

/// 条件更新失败 → MachineNotAvailable（带实际状态），NotFound → MachineNotFound
fn transition_error(machine_id: &str, err: RepositoryError) -> EngineError {
    match err {
        RepositoryError::ConditionalUpdateFailed { actual, .. } => EngineError::MachineNotAvailable {
            machine_id: machine_id.to_string(),
            state: actual,
        },
        other => translate_not_found(other, || EngineError::MachineNotFound(machine_id.to_string())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::open_in_memory_shared;
    use crate::engine::error::ErrorCategory;
    use chrono::Utc;

    const LATHE_BODY: &str = "O2000\nG21\nT0101\nM30\n";

    fn engine() -> NcTransferEngine {
        let conn = open_in_memory_shared().unwrap();
        NcTransferEngine::new(
            Arc::new(NcProgramRepository::new(conn.clone())),
            Arc::new(MachineRepository::new(conn)),
        )
    }

    fn seeded() -> (NcTransferEngine, NcProgram) {
        let engine = engine();
        let program = engine
            .register_program("shaft", "1.0", LATHE_BODY, vec!["lathe".into()], "planner")
            .unwrap();
        engine
            .register_machine("L-01", "Lathe 1", "10.0.0.21", "lathe", vec![])
            .unwrap();
        engine
            .register_machine("M-01", "Mill 1", "10.0.0.31", "mill", vec![])
            .unwrap();
        (engine, program)
    }

    #[test]
    fn test_transfer_success() {
        let (engine, program) = seeded();
        let machine = engine.transfer_program(&program.id, "L-01").unwrap();
        assert_eq!(machine.status.running_state, MachineRunningState::Running);
        assert_eq!(machine.status.current_job_id.as_deref(), Some(program.id.as_str()));

        let stored = engine.get_machine_status("L-01").unwrap();
        assert_eq!(stored.running_state, MachineRunningState::Running);
        assert_eq!(stored.current_job_id, Some(program.id));
    }

    #[test]
    fn test_gate_order() {
        let (engine, program) = seeded();

        // 程序不存在时不检查机床
        assert!(matches!(
            engine.transfer_program("ncprog-ffffffff", "NOPE").unwrap_err(),
            EngineError::ProgramNotFound(_)
        ));
        assert!(matches!(
            engine.transfer_program(&program.id, "NOPE").unwrap_err(),
            EngineError::MachineNotFound(_)
        ));
        assert!(matches!(
            engine.transfer_program(&program.id, "M-01").unwrap_err(),
            EngineError::IncompatibleProgram { .. }
        ));

        engine.transfer_program(&program.id, "L-01").unwrap();
        assert!(matches!(
            engine.transfer_program(&program.id, "L-01").unwrap_err(),
            EngineError::MachineNotAvailable { .. }
        ));
    }

    #[test]
    fn test_incompatible_leaves_machine_stopped() {
        let (engine, program) = seeded();
        let _ = engine.transfer_program(&program.id, "M-01");
        assert_eq!(
            engine.get_machine_status("M-01").unwrap().running_state,
            MachineRunningState::Stopped
        );
    }

    #[test]
    fn test_release_then_redeploy() {
        let (engine, program) = seeded();
        engine.transfer_program(&program.id, "L-01").unwrap();
        let released = engine.release_machine("L-01").unwrap();
        assert!(released.is_available());
        assert_eq!(released.status.current_job_id, None);
        engine.transfer_program(&program.id, "L-01").unwrap();
    }

    #[test]
    fn test_error_state_blocks_deploy() {
        let (engine, program) = seeded();
        let mut status = MachineStatus::stopped(Utc::now());
        status.running_state = MachineRunningState::Error;
        status.error_message = Some("spindle overload".into());
        engine.update_machine_status("L-01", status).unwrap();

        assert!(matches!(
            engine.transfer_program(&program.id, "L-01").unwrap_err(),
            EngineError::MachineNotAvailable { ref state, .. } if state == "error"
        ));
        let ids: Vec<String> = engine
            .list_available_machines()
            .unwrap()
            .into_iter()
            .map(|m| m.id)
            .collect();
        assert_eq!(ids, vec!["M-01".to_string()]);
    }

    #[test]
    fn test_status_report_cannot_start_job() {
        let (engine, program) = seeded();

        // 不兼容程序不能借状态上报绑定到铣床
        let mut status = MachineStatus::stopped(Utc::now());
        status.running_state = MachineRunningState::Running;
        status.current_job_id = Some(program.id.clone());
        let err = engine.update_machine_status("M-01", status).unwrap_err();
        assert!(matches!(err, EngineError::InvalidMachineStatus { .. }));
        assert_eq!(err.category(), ErrorCategory::Validation);

        let stored = engine.get_machine_status("M-01").unwrap();
        assert_eq!(stored.running_state, MachineRunningState::Stopped);
        assert_eq!(stored.current_job_id, None);
    }

    #[test]
    fn test_status_report_cannot_replace_running_job() {
        let (engine, program) = seeded();
        engine.transfer_program(&program.id, "L-01").unwrap();

        let mut status = Machine::running_status("ncprog-other", Utc::now());
        let err = engine.update_machine_status("L-01", status.clone()).unwrap_err();
        assert!(matches!(err, EngineError::InvalidMachineStatus { .. }));
        assert_eq!(
            engine.get_machine_status("L-01").unwrap().current_job_id.as_deref(),
            Some(program.id.as_str())
        );

        // 不带作业ID的心跳保留当前作业
        status.current_job_id = None;
        let machine = engine.update_machine_status("L-01", status).unwrap();
        assert_eq!(machine.status.running_state, MachineRunningState::Running);
        assert_eq!(machine.status.current_job_id.as_deref(), Some(program.id.as_str()));

        // 运行中故障：作业保留，释放后清空
        let mut fault = MachineStatus::stopped(Utc::now());
        fault.running_state = MachineRunningState::Error;
        fault.error_message = Some("coolant low".into());
        let machine = engine.update_machine_status("L-01", fault).unwrap();
        assert_eq!(machine.status.current_job_id.as_deref(), Some(program.id.as_str()));
        assert_eq!(engine.release_machine("L-01").unwrap().status.current_job_id, None);
    }

    #[test]
    fn test_status_report_loses_to_concurrent_deploy() {
        let conn = open_in_memory_shared().unwrap();
        let machine_repo = Arc::new(MachineRepository::new(conn.clone()));
        let engine = NcTransferEngine::new(
            Arc::new(NcProgramRepository::new(conn)),
            machine_repo.clone(),
        );
        engine
            .register_machine("L-01", "Lathe 1", "10.0.0.21", "lathe", vec![])
            .unwrap();

        // 上报读到 Stopped 之后、写入之前，另一路下发已抢先
        let now = Utc::now();
        machine_repo
            .transition_status_if(
                "L-01",
                MachineRunningState::Stopped,
                &Machine::running_status("ncprog-aaaa0000", now),
                now,
            )
            .unwrap();
        let mut stale = engine.get_machine("L-01").unwrap();
        stale.update_status(MachineStatus::stopped(now));
        let err = machine_repo
            .transition_status_if("L-01", MachineRunningState::Stopped, &stale.status, now)
            .map_err(|e| transition_error("L-01", e))
            .unwrap_err();
        assert!(matches!(err, EngineError::MachineNotAvailable { ref state, .. } if state == "running"));
        assert_eq!(
            engine.get_machine_status("L-01").unwrap().current_job_id.as_deref(),
            Some("ncprog-aaaa0000")
        );
    }

    #[test]
    fn test_select_optimal_program() {
        let (engine, program) = seeded();
        engine
            .register_program("plate", "1.0", "O3000\nM30\n", vec!["mill".into(), "lathe".into()], "p")
            .unwrap();
        assert_eq!(engine.select_optimal_program("PART-A", "lathe").unwrap().id, program.id);
        assert_eq!(engine.select_optimal_program("PART-A", "mill").unwrap().name, "plate");
        assert!(matches!(
            engine.select_optimal_program("PART-A", "grinder").unwrap_err(),
            EngineError::ProgramNotFound(_)
        ));
    }

    /// 名称含零件号的程序优先，否则退回首个兼容
    struct PartNameStrategy;

    impl ProgramSelectionStrategy for PartNameStrategy {
        fn select<'a>(
            &self,
            part_id: &str,
            machine_type: &str,
            candidates: &'a [NcProgram],
        ) -> Option<&'a NcProgram> {
            let mut fallback = None;
            for p in candidates.iter().filter(|p| p.is_compatible_with(machine_type)) {
                if p.name.contains(part_id) {
                    return Some(p);
                }
                fallback.get_or_insert(p);
            }
            fallback
        }

        fn name(&self) -> &str {
            "part_name"
        }
    }

    #[test]
    fn test_custom_default_strategy() {
        let (engine, program) = seeded();
        let engine = engine.with_strategy(Arc::new(PartNameStrategy));
        let flange = engine
            .register_program("flange-F20", "1.0", "O3100\nM30\n", vec!["lathe".into()], "p")
            .unwrap();

        assert_eq!(engine.select_optimal_program("F20", "lathe").unwrap().id, flange.id);
        assert_eq!(engine.select_optimal_program("X99", "lathe").unwrap().id, program.id);
        assert_eq!(
            engine
                .select_program_with(&FirstCompatibleStrategy, "F20", "lathe")
                .unwrap()
                .id,
            program.id
        );
    }

    #[test]
    fn test_find_program_by_name_and_version() {
        let (engine, program) = seeded();
        assert_eq!(
            engine.find_program_by_name_and_version("shaft", "1.0").unwrap().id,
            program.id
        );
        assert!(engine.find_program_by_name_and_version("shaft", "9.9").is_err());
    }
}
