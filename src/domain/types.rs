// ==========================================
// 数控加工执行闭环 - 领域类型定义
// ==========================================
// 状态枚举与数据库字符串互转
// 序列化格式: snake_case (与数据库一致)
// ==========================================

use serde::{Deserialize, Serialize};
use std::fmt;

// ==========================================
// 生产订单状态
// ==========================================
// Planned → InProgress → Completed
// Planned / InProgress → Delayed / Cancelled
// Completed / Cancelled 为终态
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProductionOrderStatus {
    Planned,
    InProgress,
    Completed,
    Delayed,
    Cancelled,
}

impl ProductionOrderStatus {
    pub fn to_db_str(&self) -> &'static str {
        match self {
            ProductionOrderStatus::Planned => "planned",
            ProductionOrderStatus::InProgress => "in_progress",
            ProductionOrderStatus::Completed => "completed",
            ProductionOrderStatus::Delayed => "delayed",
            ProductionOrderStatus::Cancelled => "cancelled",
        }
    }

    pub fn from_db_str(s: &str) -> Option<Self> {
        match s {
            "planned" => Some(ProductionOrderStatus::Planned),
            "in_progress" => Some(ProductionOrderStatus::InProgress),
            "completed" => Some(ProductionOrderStatus::Completed),
            "delayed" => Some(ProductionOrderStatus::Delayed),
            "cancelled" => Some(ProductionOrderStatus::Cancelled),
            _ => None,
        }
    }

    /// 是否终态
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            ProductionOrderStatus::Completed | ProductionOrderStatus::Cancelled
        )
    }

    /// 状态机: 当前状态能否转换到目标状态
    pub fn can_transition_to(&self, target: ProductionOrderStatus) -> bool {
        use ProductionOrderStatus::*;
        match target {
            InProgress => *self == Planned,
            Completed => *self == InProgress,
            Delayed => matches!(self, Planned | InProgress),
            Cancelled => !self.is_terminal(),
            Planned => false,
        }
    }
}

impl fmt::Display for ProductionOrderStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_db_str())
    }
}

// ==========================================
// 机床运行状态
// ==========================================
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MachineRunningState {
    Running,
    Stopped,
    Error,
}

impl MachineRunningState {
    pub fn to_db_str(&self) -> &'static str {
        match self {
            MachineRunningState::Running => "running",
            MachineRunningState::Stopped => "stopped",
            MachineRunningState::Error => "error",
        }
    }

    pub fn from_db_str(s: &str) -> Option<Self> {
        match s {
            "running" => Some(MachineRunningState::Running),
            "stopped" => Some(MachineRunningState::Stopped),
            "error" => Some(MachineRunningState::Error),
            _ => None,
        }
    }
}

impl fmt::Display for MachineRunningState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_db_str())
    }
}

// ==========================================
// 检验状态 / 检验结论
// ==========================================
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InspectionStatus {
    Pending,
    Completed,
    Failed,
}

impl InspectionStatus {
    pub fn to_db_str(&self) -> &'static str {
        match self {
            InspectionStatus::Pending => "pending",
            InspectionStatus::Completed => "completed",
            InspectionStatus::Failed => "failed",
        }
    }

    pub fn from_db_str(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(InspectionStatus::Pending),
            "completed" => Some(InspectionStatus::Completed),
            "failed" => Some(InspectionStatus::Failed),
            _ => None,
        }
    }
}

impl fmt::Display for InspectionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_db_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InspectionResult {
    Pass,
    Fail,
}

impl InspectionResult {
    pub fn to_db_str(&self) -> &'static str {
        match self {
            InspectionResult::Pass => "pass",
            InspectionResult::Fail => "fail",
        }
    }

    pub fn from_db_str(s: &str) -> Option<Self> {
        match s {
            "pass" => Some(InspectionResult::Pass),
            "fail" => Some(InspectionResult::Fail),
            _ => None,
        }
    }
}

impl fmt::Display for InspectionResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_db_str())
    }
}

// ==========================================
// 失效模式 (检验时标注)
// ==========================================
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureMode {
    DiameterOversize,       // 直径超差(偏大)
    SurfaceRoughnessExcess, // 表面粗糙度超标
    ConcentricityError,     // 同轴度误差
}

impl FailureMode {
    pub fn to_db_str(&self) -> &'static str {
        match self {
            FailureMode::DiameterOversize => "diameter_oversize",
            FailureMode::SurfaceRoughnessExcess => "surface_roughness_excess",
            FailureMode::ConcentricityError => "concentricity_error",
        }
    }

    pub fn from_db_str(s: &str) -> Option<Self> {
        match s {
            "diameter_oversize" => Some(FailureMode::DiameterOversize),
            "surface_roughness_excess" => Some(FailureMode::SurfaceRoughnessExcess),
            "concentricity_error" => Some(FailureMode::ConcentricityError),
            _ => None,
        }
    }

    /// 失效模式对应的固定补偿参数 (参数名, 补偿量)
    pub fn compensation(&self) -> (&'static str, f64) {
        match self {
            FailureMode::DiameterOversize => ("diameter_compensation", -0.01),
            FailureMode::SurfaceRoughnessExcess => ("finish_pass_adjustment", 0.05),
            FailureMode::ConcentricityError => ("alignment_correction", 0.005),
        }
    }
}

impl fmt::Display for FailureMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_db_str())
    }
}

// ==========================================
// 纠正措施类型
// ==========================================
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CorrectiveActionKind {
    MajorNcAdjustment,      // NC 程序大幅修正
    ToolOffsetAdjustment,   // 刀具磨损补偿
    CuttingConditionTuning, // 切削条件微调 (仅建议)
}

impl CorrectiveActionKind {
    pub fn to_db_str(&self) -> &'static str {
        match self {
            CorrectiveActionKind::MajorNcAdjustment => "major_nc_adjustment",
            CorrectiveActionKind::ToolOffsetAdjustment => "tool_offset_adjustment",
            CorrectiveActionKind::CuttingConditionTuning => "cutting_condition_tuning",
        }
    }

    pub fn from_db_str(s: &str) -> Option<Self> {
        match s {
            "major_nc_adjustment" => Some(CorrectiveActionKind::MajorNcAdjustment),
            "tool_offset_adjustment" => Some(CorrectiveActionKind::ToolOffsetAdjustment),
            "cutting_condition_tuning" => Some(CorrectiveActionKind::CuttingConditionTuning),
            _ => None,
        }
    }
}

impl fmt::Display for CorrectiveActionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_db_str())
    }
}
