// ==========================================
// 数控加工执行闭环 - 机床领域模型
// ==========================================
// 红线: 一台机床同一时刻最多执行一个作业
// ==========================================

use crate::domain::types::MachineRunningState;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

// ==========================================
// MachineStatus - 机床运行状态
// ==========================================
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MachineStatus {
    pub running_state: MachineRunningState,
    pub current_job_id: Option<String>,
    pub last_heartbeat: DateTime<Utc>,
    pub error_message: Option<String>,
}

impl MachineStatus {
    pub fn stopped(now: DateTime<Utc>) -> Self {
        Self {
            running_state: MachineRunningState::Stopped,
            current_job_id: None,
            last_heartbeat: now,
            error_message: None,
        }
    }
}

// ==========================================
// Machine - 机床
// ==========================================
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Machine {
    pub id: String,
    pub name: String,
    pub ip_address: String,
    pub machine_type: String, // 兼容性匹配键
    pub capabilities: Vec<String>,
    pub status: MachineStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Machine {
    /// 新机床默认处于 Stopped
    pub fn new(
        id: &str,
        name: &str,
        ip_address: &str,
        machine_type: &str,
        capabilities: Vec<String>,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: id.to_string(),
            name: name.to_string(),
            ip_address: ip_address.to_string(),
            machine_type: machine_type.to_string(),
            capabilities,
            status: MachineStatus::stopped(now),
            created_at: now,
            updated_at: now,
        }
    }

    /// 仅 Stopped 状态可接收新作业
    pub fn is_available(&self) -> bool {
        self.status.running_state == MachineRunningState::Stopped
    }

    /// 开始作业后的状态（不修改自身，供条件更新使用）
    pub fn running_status(job_id: &str, now: DateTime<Utc>) -> MachineStatus {
        MachineStatus {
            running_state: MachineRunningState::Running,
            current_job_id: Some(job_id.to_string()),
            last_heartbeat: now,
            error_message: None,
        }
    }

    /// 开始作业
    pub fn start_job(&mut self, job_id: &str) {
        let now = Utc::now();
        self.status = Self::running_status(job_id, now);
        self.updated_at = now;
    }

    /// 结束作业
    pub fn stop_job(&mut self) {
        let now = Utc::now();
        self.status = MachineStatus::stopped(now);
        self.updated_at = now;
    }

    /// 整体替换状态（心跳/故障上报）
    pub fn update_status(&mut self, status: MachineStatus) {
        self.status = status;
        self.updated_at = Utc::now();
    }
}
