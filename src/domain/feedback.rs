// ==========================================
// 数控加工执行闭环 - 质量反馈领域模型
// ==========================================
// 纠正措施（瞬态）、控制历史记录、刀补调整记录
// ==========================================

use crate::domain::types::CorrectiveActionKind;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// PID 增益
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PidGains {
    pub kp: f64,
    pub ki: f64,
    pub kd: f64,
}

impl Default for PidGains {
    fn default() -> Self {
        Self {
            kp: 0.5,
            ki: 0.1,
            kd: 0.05,
        }
    }
}

// ==========================================
// CorrectiveAction - 纠正措施（派生，瞬态）
// ==========================================
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CorrectiveAction {
    pub kind: CorrectiveActionKind,
    pub parameters: BTreeMap<String, f64>,
    pub nc_program_id: Option<String>,
    pub description: String,
}

impl CorrectiveAction {
    pub fn parameter(&self, name: &str) -> f64 {
        self.parameters.get(name).copied().unwrap_or(0.0)
    }

    /// 写入 NC 程序的补偿注记
    pub fn compensation_note(&self) -> String {
        let mut note = format!(
            "(AUTO COMPENSATION: Offset={:.4} Speed={:.1}%",
            self.parameter("offset_adjustment"),
            self.parameter("speed_adjustment"),
        );
        for (name, value) in &self.parameters {
            if name != "offset_adjustment" && name != "speed_adjustment" {
                note.push_str(&format!(" {}={:.4}", name, value));
            }
        }
        note.push(')');
        note
    }
}

// ==========================================
// ControlRecord - 控制历史
// ==========================================
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ControlRecord {
    pub record_id: String,
    pub loop_key: String, // 控制回路键（NC 程序ID）
    pub inspection_id: String,
    pub recorded_at: DateTime<Utc>,
    pub error: f64,
    pub correction: f64,
    pub action_kind: CorrectiveActionKind,
    pub parameters: BTreeMap<String, f64>,
}

// ==========================================
// ToolOffsetAdjustment - 刀补调整记录（独立于程序体）
// ==========================================
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolOffsetAdjustment {
    pub adjustment_id: String,
    pub nc_program_id: Option<String>,
    pub inspection_id: String,
    pub action_kind: CorrectiveActionKind,
    pub parameters: BTreeMap<String, f64>,
    pub executed_at: DateTime<Utc>,
}

// ==========================================
// FeedbackOutcome - 单次反馈结果
// ==========================================
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum FeedbackOutcome {
    /// 误差在死区内，不采取措施
    WithinDeadBand { cpk: f64, error: f64 },
    /// 已执行纠正措施
    Applied {
        cpk: f64,
        error: f64,
        correction: f64,
        action: CorrectiveAction,
    },
    /// 该检验已处理过，返回既有记录
    AlreadyApplied(ControlRecord),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_compensation_note_format() {
        let mut parameters = BTreeMap::new();
        parameters.insert("offset_adjustment".to_string(), 0.005);
        parameters.insert("speed_adjustment".to_string(), -2.5);
        parameters.insert("diameter_compensation".to_string(), -0.01);
        let action = CorrectiveAction {
            kind: CorrectiveActionKind::MajorNcAdjustment,
            parameters,
            nc_program_id: Some("ncprog-0000abcd".to_string()),
            description: String::new(),
        };
        assert_eq!(
            action.compensation_note(),
            "(AUTO COMPENSATION: Offset=0.0050 Speed=-2.5% diameter_compensation=-0.0100)"
        );
    }
}
