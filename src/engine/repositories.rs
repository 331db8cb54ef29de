// ==========================================
// 数控加工执行闭环 - 引擎层仓储聚合
// ==========================================
// 职责: 聚合质量反馈控制器所需的所有 Repository
// ==========================================

use std::sync::{Arc, Mutex};

use rusqlite::Connection;

use crate::repository::{
    ControlHistoryRepository, InspectionRepository, MachineRepository, NcProgramRepository,
    ProductionOrderRepository, ToolOffsetRepository,
};

/// 质量反馈仓储集合
///
/// # 包含的仓储
/// - `inspection_repo`: 检验（含批次查询，用于能力估算）
/// - `program_repo`: NC 程序（补偿注记）
/// - `order_repo` / `machine_repo`: 解析检验对应的在制程序
/// - `history_repo`: 控制历史
/// - `tool_offset_repo`: 刀补调整记录
#[derive(Clone)]
pub struct FeedbackRepositories {
    pub inspection_repo: Arc<InspectionRepository>,
    pub program_repo: Arc<NcProgramRepository>,
    pub order_repo: Arc<ProductionOrderRepository>,
    pub machine_repo: Arc<MachineRepository>,
    pub history_repo: Arc<ControlHistoryRepository>,
    pub tool_offset_repo: Arc<ToolOffsetRepository>,
}

impl FeedbackRepositories {
    /// 基于同一共享连接构建全部仓储
    pub fn from_connection(conn: Arc<Mutex<Connection>>) -> Self {
        Self {
            inspection_repo: Arc::new(InspectionRepository::new(conn.clone())),
            program_repo: Arc::new(NcProgramRepository::new(conn.clone())),
            order_repo: Arc::new(ProductionOrderRepository::new(conn.clone())),
            machine_repo: Arc::new(MachineRepository::new(conn.clone())),
            history_repo: Arc::new(ControlHistoryRepository::new(conn.clone())),
            tool_offset_repo: Arc::new(ToolOffsetRepository::new(conn)),
        }
    }
}
