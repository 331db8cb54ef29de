// ==========================================
// 数控加工执行闭环 - 质量反馈配置读取 Trait
// ==========================================
// 职责: 定义反馈控制器所需的配置读取接口（不包含实现）
// 红线: 不包含配置写入、不包含业务逻辑
// ==========================================

use crate::domain::feedback::PidGains;
use crate::engine::feedback::FeedbackConfig;
use async_trait::async_trait;
use std::error::Error;

// ==========================================
// FeedbackConfigReader Trait
// ==========================================
// 实现者: ConfigManager（从 config_kv 表读取）
#[async_trait]
pub trait FeedbackConfigReader: Send + Sync {
    /// 目标 Cpk
    ///
    /// # 默认值
    /// - 1.67
    async fn get_target_cpk(&self) -> Result<f64, Box<dyn Error>>;

    /// PID 增益 (Kp, Ki, Kd)
    ///
    /// # 默认值
    /// - (0.5, 0.1, 0.05)
    async fn get_pid_gains(&self) -> Result<PidGains, Box<dyn Error>>;

    /// 死区（|误差| 不超过该值时不采取措施）
    ///
    /// # 默认值
    /// - 0.1
    async fn get_dead_band(&self) -> Result<f64, Box<dyn Error>>;

    /// 大幅修正阈值 / 刀补阈值
    ///
    /// # 默认值
    /// - (0.5, 0.2)
    async fn get_action_thresholds(&self) -> Result<(f64, f64), Box<dyn Error>>;

    /// 积分窗口（条）
    ///
    /// # 默认值
    /// - 50
    async fn get_history_window(&self) -> Result<usize, Box<dyn Error>>;

    /// 积分限幅
    ///
    /// # 默认值
    /// - 5.0
    async fn get_integral_clamp(&self) -> Result<f64, Box<dyn Error>>;

    /// 批次样本不足时的回退 Cpk
    ///
    /// # 默认值
    /// - 1.5
    async fn get_fallback_cpk(&self) -> Result<f64, Box<dyn Error>>;

    /// 汇总为 FeedbackConfig
    async fn load_feedback_config(&self) -> Result<FeedbackConfig, Box<dyn Error>> {
        let target_cpk = self.get_target_cpk().await?;
        let gains = self.get_pid_gains().await?;
        let dead_band = self.get_dead_band().await?;
        let (major_threshold, tool_offset_threshold) = self.get_action_thresholds().await?;
        let history_window = self.get_history_window().await?;
        let integral_clamp = self.get_integral_clamp().await?;
        let fallback_cpk = self.get_fallback_cpk().await?;

        Ok(FeedbackConfig {
            target_cpk,
            gains,
            dead_band,
            major_threshold,
            tool_offset_threshold,
            history_window,
            integral_clamp,
            fallback_cpk,
        })
    }
}
