// ==========================================
// 数控加工执行闭环 - 配置管理器
// ==========================================
// 职责: 配置加载、查询、覆写管理
// 存储: config_kv 表 (key-value + scope)
// ==========================================

use crate::config::feedback_config_trait::FeedbackConfigReader;
use crate::db::open_sqlite_connection;
use crate::domain::feedback::PidGains;
use async_trait::async_trait;
use rusqlite::{params, Connection};
use serde_json::json;
use std::collections::BTreeMap;
use std::error::Error;
use std::sync::{Arc, Mutex};

const GLOBAL_SCOPE: &str = "global";

// ==========================================
// ConfigManager - 配置管理器
// ==========================================
pub struct ConfigManager {
    conn: Arc<Mutex<Connection>>,
}

impl ConfigManager {
    /// 创建新的 ConfigManager 实例
    ///
    /// # 参数
    /// - db_path: 数据库文件路径
    pub fn new(db_path: &str) -> Result<Self, Box<dyn Error>> {
        let conn = open_sqlite_connection(db_path)?;
        crate::db::init_schema(&conn)?;

        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// 从已有连接创建 ConfigManager
    ///
    /// 说明：为保证连接行为一致，会对传入连接再次应用统一 PRAGMA（幂等）。
    pub fn from_connection(conn: Arc<Mutex<Connection>>) -> Result<Self, Box<dyn Error>> {
        {
            let conn_guard = conn.lock().map_err(|e| format!("锁获取失败: {}", e))?;
            crate::db::configure_sqlite_connection(&conn_guard)?;
        }

        Ok(Self { conn })
    }

    /// 从 config_kv 表读取配置值（scope_id='global'）
    ///
    /// # 返回
    /// - Some(String): 配置值
    /// - None: 配置不存在
    fn get_config_value(&self, key: &str) -> Result<Option<String>, Box<dyn Error>> {
        let conn = self.conn.lock().map_err(|e| format!("锁获取失败: {}", e))?;

        let result = conn.query_row(
            "SELECT value FROM config_kv WHERE scope_id = ?1 AND key = ?2",
            params![GLOBAL_SCOPE, key],
            |row| row.get::<_, String>(0),
        );

        match result {
            Ok(value) => Ok(Some(value)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(Box::new(e)),
        }
    }

    /// 读取 global scope 的配置值（公开方法，供其他模块复用）
    pub fn get_global_config_value(&self, key: &str) -> Result<Option<String>, Box<dyn Error>> {
        self.get_config_value(key)
    }

    /// 写入 global scope 的配置值（UPSERT）
    pub fn set_global_config_value(&self, key: &str, value: &str) -> Result<(), Box<dyn Error>> {
        let conn = self.conn.lock().map_err(|e| format!("锁获取失败: {}", e))?;
        conn.execute(
            "INSERT INTO config_kv (scope_id, key, value, updated_at)
             VALUES (?1, ?2, ?3, datetime('now'))
             ON CONFLICT(scope_id, key) DO UPDATE SET value = ?3, updated_at = datetime('now')",
            params![GLOBAL_SCOPE, key, value],
        )?;
        Ok(())
    }

    /// 读取浮点配置；缺失取默认值，格式错误或非有限数时告警并取默认值
    fn get_f64_or_default(&self, key: &str, default: f64) -> Result<f64, Box<dyn Error>> {
        let raw = match self.get_config_value(key)? {
            Some(v) => v,
            None => return Ok(default),
        };
        match raw.trim().parse::<f64>() {
            Ok(v) if v.is_finite() => Ok(v),
            _ => {
                tracing::warn!(
                    config_key = key,
                    raw_value = %raw,
                    default,
                    "配置值格式错误，使用默认值"
                );
                Ok(default)
            }
        }
    }

    /// 获取所有配置的快照（JSON格式）
    ///
    /// # 用途
    /// - 启动日志 / 排障时记录当前生效的覆写项
    pub fn get_config_snapshot(&self) -> Result<String, Box<dyn Error>> {
        let conn = self.conn.lock().map_err(|e| format!("锁获取失败: {}", e))?;

        let mut stmt =
            conn.prepare("SELECT key, value FROM config_kv WHERE scope_id = ?1 ORDER BY key")?;

        let mut config_map: BTreeMap<String, String> = BTreeMap::new();
        let rows = stmt.query_map(params![GLOBAL_SCOPE], |row| {
            Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?))
        })?;

        for row in rows {
            let (key, value) = row?;
            config_map.insert(key, value);
        }

        Ok(serde_json::to_string(&json!(config_map))?)
    }
}

// ==========================================
// FeedbackConfigReader Trait 实现
// ==========================================
#[async_trait]
impl FeedbackConfigReader for ConfigManager {
    async fn get_target_cpk(&self) -> Result<f64, Box<dyn Error>> {
        self.get_f64_or_default(config_keys::FEEDBACK_TARGET_CPK, 1.67)
    }

    async fn get_pid_gains(&self) -> Result<PidGains, Box<dyn Error>> {
        let defaults = PidGains::default();
        Ok(PidGains {
            kp: self.get_f64_or_default(config_keys::FEEDBACK_KP, defaults.kp)?,
            ki: self.get_f64_or_default(config_keys::FEEDBACK_KI, defaults.ki)?,
            kd: self.get_f64_or_default(config_keys::FEEDBACK_KD, defaults.kd)?,
        })
    }

    async fn get_dead_band(&self) -> Result<f64, Box<dyn Error>> {
        Ok(self
            .get_f64_or_default(config_keys::FEEDBACK_DEAD_BAND, 0.1)?
            .abs())
    }

    async fn get_action_thresholds(&self) -> Result<(f64, f64), Box<dyn Error>> {
        let major = self.get_f64_or_default(config_keys::FEEDBACK_MAJOR_THRESHOLD, 0.5)?;
        let tool_offset =
            self.get_f64_or_default(config_keys::FEEDBACK_TOOL_OFFSET_THRESHOLD, 0.2)?;
        if tool_offset > major {
            tracing::warn!(major, tool_offset, "刀补阈值大于大幅修正阈值，使用默认阈值");
            return Ok((0.5, 0.2));
        }
        Ok((major, tool_offset))
    }

    async fn get_history_window(&self) -> Result<usize, Box<dyn Error>> {
        let value = self.get_config_value(config_keys::FEEDBACK_HISTORY_WINDOW)?;
        Ok(value
            .and_then(|v| v.trim().parse::<usize>().ok())
            .filter(|w| *w > 0)
            .unwrap_or(50))
    }

    async fn get_integral_clamp(&self) -> Result<f64, Box<dyn Error>> {
        Ok(self
            .get_f64_or_default(config_keys::FEEDBACK_INTEGRAL_CLAMP, 5.0)?
            .abs())
    }

    async fn get_fallback_cpk(&self) -> Result<f64, Box<dyn Error>> {
        self.get_f64_or_default(config_keys::FEEDBACK_FALLBACK_CPK, 1.5)
    }
}

// ==========================================
// 配置键常量
// ==========================================
pub mod config_keys {
    // 质量反馈
    pub const FEEDBACK_TARGET_CPK: &str = "feedback_target_cpk";
    pub const FEEDBACK_KP: &str = "feedback_kp";
    pub const FEEDBACK_KI: &str = "feedback_ki";
    pub const FEEDBACK_KD: &str = "feedback_kd";
    pub const FEEDBACK_DEAD_BAND: &str = "feedback_dead_band";
    pub const FEEDBACK_MAJOR_THRESHOLD: &str = "feedback_major_threshold";
    pub const FEEDBACK_TOOL_OFFSET_THRESHOLD: &str = "feedback_tool_offset_threshold";
    pub const FEEDBACK_HISTORY_WINDOW: &str = "feedback_history_window"; // 积分窗口（条）
    pub const FEEDBACK_INTEGRAL_CLAMP: &str = "feedback_integral_clamp";
    pub const FEEDBACK_FALLBACK_CPK: &str = "feedback_fallback_cpk";
}
