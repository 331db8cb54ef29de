// ==========================================
// 数控加工执行闭环 - PID 修正量
// ==========================================
// correction = Kp·e + Ki·clamp(Σ 历史误差) + Kd·(e − 上次误差)
// 历史为空时积分项与微分项为 0；当前误差不计入积分
// ==========================================

use crate::domain::feedback::PidGains;

/// 各项分量（便于日志与测试）
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PidTerms {
    pub proportional: f64,
    pub integral: f64,
    pub derivative: f64,
}

impl PidTerms {
    pub fn correction(&self) -> f64 {
        self.proportional + self.integral + self.derivative
    }
}

/// 计算 PID 分量
///
/// `past_errors` 按时间正序，最后一个为上次误差；调用方负责截取窗口
pub fn compute_terms(
    gains: &PidGains,
    error: f64,
    past_errors: &[f64],
    integral_clamp: f64,
) -> PidTerms {
    let integral_sum: f64 = past_errors.iter().sum();
    let limit = integral_clamp.abs();
    let integral_sum = integral_sum.clamp(-limit, limit);

    let derivative = match past_errors.last() {
        Some(last) => gains.kd * (error - last),
        None => 0.0,
    };

    PidTerms {
        proportional: gains.kp * error,
        integral: gains.ki * integral_sum,
        derivative,
    }
}
