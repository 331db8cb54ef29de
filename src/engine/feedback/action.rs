// ==========================================
// 数控加工执行闭环 - 纠正措施分级
// ==========================================
// |e| ≤ 死区               → 不采取措施
// |e| > major_threshold    → NC 程序大幅修正
// |e| > offset_threshold   → 刀具磨损补偿
// 其余                     → 切削条件微调（建议）
// 失效模式的固定补偿叠加在分级参数之上
// ==========================================

use crate::domain::feedback::CorrectiveAction;
use crate::domain::types::{CorrectiveActionKind, FailureMode};
use crate::engine::feedback::FeedbackConfig;
use std::collections::BTreeMap;

const OFFSET_PER_CORRECTION: f64 = 0.01;
const SPEED_PER_CORRECTION: f64 = -5.0;
const WEAR_OFFSET_PER_CORRECTION: f64 = 0.005;
const FEED_RATE_PER_CORRECTION: f64 = 2.0;

/// 按误差幅度确定措施类型；死区内返回 None
pub fn classify(error: f64, config: &FeedbackConfig) -> Option<CorrectiveActionKind> {
    let magnitude = error.abs();
    if magnitude <= config.dead_band {
        None
    } else if magnitude > config.major_threshold {
        Some(CorrectiveActionKind::MajorNcAdjustment)
    } else if magnitude > config.tool_offset_threshold {
        Some(CorrectiveActionKind::ToolOffsetAdjustment)
    } else {
        Some(CorrectiveActionKind::CuttingConditionTuning)
    }
}

/// 生成纠正措施
pub fn build_action(
    kind: CorrectiveActionKind,
    correction: f64,
    failure_mode: Option<FailureMode>,
    nc_program_id: Option<String>,
) -> CorrectiveAction {
    let mut parameters = BTreeMap::new();
    let description = match kind {
        CorrectiveActionKind::MajorNcAdjustment => {
            parameters.insert(
                "offset_adjustment".to_string(),
                correction * OFFSET_PER_CORRECTION,
            );
            parameters.insert(
                "speed_adjustment".to_string(),
                correction * SPEED_PER_CORRECTION,
            );
            "Major NC program adjustment due to large quality deviation"
        }
        CorrectiveActionKind::ToolOffsetAdjustment => {
            parameters.insert(
                "wear_offset".to_string(),
                correction * WEAR_OFFSET_PER_CORRECTION,
            );
            "Tool wear offset adjustment"
        }
        CorrectiveActionKind::CuttingConditionTuning => {
            parameters.insert(
                "feed_rate_adjustment".to_string(),
                correction * FEED_RATE_PER_CORRECTION,
            );
            "Fine tuning of cutting conditions"
        }
    };

    if let Some(mode) = failure_mode {
        let (name, value) = mode.compensation();
        parameters.insert(name.to_string(), value);
    }

    CorrectiveAction {
        kind,
        parameters,
        nc_program_id,
        description: description.to_string(),
    }
}
