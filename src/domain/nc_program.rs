// ==========================================
// 数控加工执行闭环 - NC 程序领域模型
// ==========================================
// 标识: ncprog-{SHA-256(程序体) 前8位}
// 红线: 程序体不可变，自动补偿只追加注记并在版本号后缀 .auto
// ==========================================

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// 自动补偿的版本后缀
pub const AUTO_VERSION_SUFFIX: &str = ".auto";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NcProgram {
    pub id: String,
    pub name: String,
    pub version: String,
    pub file_hash: String, // 完整 SHA-256 (hex)
    pub content: String,
    pub annotations: Vec<String>, // 自动补偿注记（只追加）
    pub machine_compatibility: Vec<String>,
    pub created_by: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// 计算程序体的 SHA-256
pub fn compute_hash(content: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(content.as_bytes());
    format!("{:x}", hasher.finalize())
}

impl NcProgram {
    /// 由程序体派生程序ID（纯函数）
    pub fn derive_id(content: &str) -> String {
        let hash = compute_hash(content);
        format!("ncprog-{}", &hash[..8])
    }

    pub fn new(
        name: &str,
        version: &str,
        content: &str,
        machine_compatibility: Vec<String>,
        created_by: &str,
    ) -> Self {
        let hash = compute_hash(content);
        let now = Utc::now();
        Self {
            id: format!("ncprog-{}", &hash[..8]),
            name: name.to_string(),
            version: version.to_string(),
            file_hash: hash,
            content: content.to_string(),
            annotations: Vec::new(),
            machine_compatibility,
            created_by: created_by.to_string(),
            created_at: now,
            updated_at: now,
        }
    }

    pub fn is_compatible_with(&self, machine_type: &str) -> bool {
        self.machine_compatibility.iter().any(|t| t == machine_type)
    }

    /// 程序体是否与登记哈希一致
    pub fn verify_integrity(&self) -> bool {
        compute_hash(&self.content) == self.file_hash
    }

    /// 是否经过自动补偿
    pub fn is_auto_adjusted(&self) -> bool {
        self.version.ends_with(AUTO_VERSION_SUFFIX)
    }

    /// 追加补偿注记并提升版本
    pub fn annotate(&mut self, note: &str) {
        self.annotations.push(note.to_string());
        self.version.push_str(AUTO_VERSION_SUFFIX);
        self.updated_at = Utc::now();
    }
}
