// ==========================================
// 数控加工执行闭环 - 行映射辅助
// ==========================================
// 时间戳统一以 RFC3339 文本存储；列表/映射以 JSON 文本存储
// ==========================================

use chrono::{DateTime, SecondsFormat, Utc};
use rusqlite::types::Type;
use serde::de::DeserializeOwned;
use serde::Serialize;

/// 时间戳 → 存储文本（定宽纳秒，保证文本排序与时间顺序一致）
pub fn ts_to_db(ts: &DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Nanos, true)
}

/// 存储文本 → 时间戳（用于 row 映射闭包内）
pub fn ts_from_db(idx: usize, raw: &str) -> rusqlite::Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))
}

/// 值 → JSON 文本
pub fn json_to_db<T: Serialize>(value: &T) -> serde_json::Result<String> {
    serde_json::to_string(value)
}

/// JSON 文本 → 值（用于 row 映射闭包内）
pub fn json_from_db<T: DeserializeOwned>(idx: usize, raw: &str) -> rusqlite::Result<T> {
    serde_json::from_str(raw)
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))
}

/// 枚举文本解析失败
pub fn invalid_enum(idx: usize, raw: &str) -> rusqlite::Error {
    rusqlite::Error::FromSqlConversionFailure(
        idx,
        Type::Text,
        format!("未知枚举值: {}", raw).into(),
    )
}
