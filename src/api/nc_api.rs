// ==========================================
// 数控加工执行闭环 - NC 程序 / 机床 API
// ==========================================
// 职责: 程序与机床登记、程序下发、机床状态查询与释放、程序选择
// 红线: 下发前依次检查 程序存在 → 机床存在 → 机床空闲 → 程序兼容
// ==========================================

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::api::error::{require_non_blank, ApiResult};
use crate::domain::{Machine, MachineStatus, NcProgram};
use crate::engine::NcTransferEngine;

// ==========================================
// 请求 DTO
// ==========================================

/// 登记 NC 程序请求
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegisterProgramRequest {
    pub name: String,
    pub version: String,
    pub content: String,
    #[serde(default)]
    pub machine_compatibility: Vec<String>,
    pub created_by: String,
}

/// 登记机床请求
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegisterMachineRequest {
    pub id: String,
    pub name: String,
    pub ip_address: String,
    pub machine_type: String,
    #[serde(default)]
    pub capabilities: Vec<String>,
}

// ==========================================
// NcApi
// ==========================================

pub struct NcApi {
    engine: Arc<NcTransferEngine>,
}

impl NcApi {
    pub fn new(engine: Arc<NcTransferEngine>) -> Self {
        Self { engine }
    }

    // ==========================================
    // 登记
    // ==========================================

    /// 登记 NC 程序
    ///
    /// 程序ID由内容摘要派生，同一内容重复登记会返回唯一约束错误。
    pub fn register_program(&self, request: RegisterProgramRequest) -> ApiResult<NcProgram> {
        require_non_blank(&request.name, "程序名")?;
        require_non_blank(&request.version, "版本")?;
        require_non_blank(&request.content, "程序内容")?;
        require_non_blank(&request.created_by, "创建人")?;

        Ok(self.engine.register_program(
            &request.name,
            &request.version,
            &request.content,
            request.machine_compatibility,
            &request.created_by,
        )?)
    }

    /// 登记机床（初始状态 Stopped）
    pub fn register_machine(&self, request: RegisterMachineRequest) -> ApiResult<Machine> {
        require_non_blank(&request.id, "机床ID")?;
        require_non_blank(&request.machine_type, "机床类型")?;

        Ok(self.engine.register_machine(
            &request.id,
            &request.name,
            &request.ip_address,
            &request.machine_type,
            request.capabilities,
        )?)
    }

    // ==========================================
    // 下发 / 释放
    // ==========================================

    /// 下发程序到机床
    ///
    /// # 参数
    /// - program_id: NC 程序ID
    /// - machine_id: 目标机床ID
    ///
    /// # 返回
    /// - Ok(Machine): 下发后的机床（Running，current_job_id = program_id）
    /// - Err(ProgramNotFound / MachineNotFound / MachineNotAvailable / IncompatibleProgram)
    pub fn deploy_program(&self, program_id: &str, machine_id: &str) -> ApiResult<Machine> {
        require_non_blank(program_id, "程序ID")?;
        require_non_blank(machine_id, "机床ID")?;

        let machine = self.engine.transfer_program(program_id, machine_id)?;
        info!(program_id, machine_id, "API: 程序下发完成");
        Ok(machine)
    }

    /// 作业结束，机床回到 Stopped
    pub fn release_machine(&self, machine_id: &str) -> ApiResult<Machine> {
        require_non_blank(machine_id, "机床ID")?;
        Ok(self.engine.release_machine(machine_id)?)
    }

    /// 上报机床状态（心跳 / 故障）
    pub fn update_machine_status(
        &self,
        machine_id: &str,
        status: MachineStatus,
    ) -> ApiResult<Machine> {
        require_non_blank(machine_id, "机床ID")?;
        Ok(self.engine.update_machine_status(machine_id, status)?)
    }

    // ==========================================
    // 查询
    // ==========================================

    pub fn get_machine_status(&self, machine_id: &str) -> ApiResult<MachineStatus> {
        require_non_blank(machine_id, "机床ID")?;
        Ok(self.engine.get_machine_status(machine_id)?)
    }

    pub fn get_program(&self, program_id: &str) -> ApiResult<NcProgram> {
        require_non_blank(program_id, "程序ID")?;
        Ok(self.engine.get_program(program_id)?)
    }

    pub fn list_programs(&self) -> ApiResult<Vec<NcProgram>> {
        Ok(self.engine.list_programs()?)
    }

    pub fn list_available_machines(&self) -> ApiResult<Vec<Machine>> {
        Ok(self.engine.list_available_machines()?)
    }

    /// 为零件和机床类型选择程序（默认策略: 第一个兼容程序）
    pub fn select_optimal_program(&self, part_id: &str, machine_type: &str) -> ApiResult<NcProgram> {
        require_non_blank(machine_type, "机床类型")?;
        Ok(self.engine.select_optimal_program(part_id, machine_type)?)
    }

    pub fn find_program_by_name_and_version(
        &self,
        name: &str,
        version: &str,
    ) -> ApiResult<NcProgram> {
        require_non_blank(name, "程序名")?;
        require_non_blank(version, "版本")?;
        Ok(self.engine.find_program_by_name_and_version(name, version)?)
    }
}
