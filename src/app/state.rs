// ==========================================
// 数控加工执行闭环 - 应用状态
// ==========================================
// 职责: 管理应用级别的共享状态和API实例
// ==========================================

use std::sync::{Arc, Mutex};

use rusqlite::Connection;

use crate::api::{FeedbackApi, NcApi, ProductionApi, QualityApi};
use crate::config::{ConfigManager, FeedbackConfigReader};
use crate::db::open_shared_connection;
use crate::engine::{
    FeedbackConfig, FeedbackDispatcher, FeedbackRepositories, InspectionEngine, NcTransferEngine,
    OptionalEventPublisher, ProductionEventPublisher, ProductionSchedulingEngine,
    QualityFeedbackController,
};

/// 应用状态
///
/// 所有 API 共享同一个 SQLite 连接
pub struct AppState {
    /// 数据库路径
    pub db_path: String,

    /// 生产订单API
    pub production_api: Arc<ProductionApi>,

    /// 程序下发 / 机床API
    pub nc_api: Arc<NcApi>,

    /// 检验API（检验落库后自动触发反馈）
    pub quality_api: Arc<QualityApi>,

    /// 质量反馈API
    pub feedback_api: Arc<FeedbackApi>,

    /// 配置管理器
    pub config_manager: Arc<ConfigManager>,

    /// 生产事件发布器
    pub event_publisher: Option<Arc<dyn ProductionEventPublisher>>,
}

impl AppState {
    /// 创建新的AppState实例
    ///
    /// # 参数
    /// - db_path: 数据库文件路径
    ///
    /// # 返回
    /// - Ok(AppState): 应用状态实例
    /// - Err(String): 初始化错误
    ///
    /// # 说明
    /// 1. 打开共享连接并建表
    /// 2. 从 config_kv 读取反馈参数（缺省项取内置默认值）
    /// 3. 构建引擎与 API
    pub async fn new(db_path: String) -> Result<Self, String> {
        Self::with_event_publisher(db_path, None).await
    }

    /// 创建AppState，生产订单事件投递给指定发布器
    pub async fn with_event_publisher(
        db_path: String,
        event_publisher: Option<Arc<dyn ProductionEventPublisher>>,
    ) -> Result<Self, String> {
        tracing::info!("初始化AppState，数据库路径: {}", db_path);

        let conn = open_shared_connection(&db_path).map_err(|e| format!("无法打开数据库: {}", e))?;

        let config_manager = Arc::new(
            ConfigManager::from_connection(conn.clone())
                .map_err(|e| format!("无法创建ConfigManager: {}", e))?,
        );
        let feedback_config = config_manager
            .load_feedback_config()
            .await
            .map_err(|e| format!("无法加载反馈配置: {}", e))?;

        Ok(Self::assemble(
            db_path,
            conn,
            config_manager,
            feedback_config,
            event_publisher,
        ))
    }

    fn assemble(
        db_path: String,
        conn: Arc<Mutex<Connection>>,
        config_manager: Arc<ConfigManager>,
        feedback_config: FeedbackConfig,
        event_publisher: Option<Arc<dyn ProductionEventPublisher>>,
    ) -> Self {
        // ==========================================
        // 初始化Repository层
        // ==========================================
        let repos = FeedbackRepositories::from_connection(conn);

        // ==========================================
        // 初始化Engine层
        // ==========================================
        let publisher = match &event_publisher {
            Some(p) => OptionalEventPublisher::with_publisher(p.clone()),
            None => OptionalEventPublisher::none(),
        };
        let scheduling_engine = Arc::new(
            ProductionSchedulingEngine::new(repos.order_repo.clone()).with_publisher(publisher),
        );
        let transfer_engine = Arc::new(NcTransferEngine::new(
            repos.program_repo.clone(),
            repos.machine_repo.clone(),
        ));
        let inspection_engine = Arc::new(InspectionEngine::new(repos.inspection_repo.clone()));

        tracing::info!(
            target_cpk = feedback_config.target_cpk,
            kp = feedback_config.gains.kp,
            ki = feedback_config.gains.ki,
            kd = feedback_config.gains.kd,
            "质量反馈参数已加载"
        );
        let controller = Arc::new(QualityFeedbackController::new(repos, feedback_config));

        // ==========================================
        // 初始化API层
        // ==========================================
        let production_api = Arc::new(ProductionApi::new(scheduling_engine));
        let nc_api = Arc::new(NcApi::new(transfer_engine));
        let quality_api = Arc::new(
            QualityApi::new(inspection_engine)
                .with_feedback(FeedbackDispatcher::new(controller.clone())),
        );
        let feedback_api = Arc::new(FeedbackApi::new(controller));

        tracing::info!("AppState初始化完成");

        Self {
            db_path,
            production_api,
            nc_api,
            quality_api,
            feedback_api,
            config_manager,
            event_publisher,
        }
    }
}

/// 获取默认数据库路径
///
/// 优先级: 环境变量 NC_MES_DB_PATH → 用户数据目录 → 当前目录
pub fn get_default_db_path() -> String {
    use std::path::PathBuf;

    if let Ok(path) = std::env::var("NC_MES_DB_PATH") {
        let trimmed = path.trim();
        if !trimmed.is_empty() {
            return trimmed.to_string();
        }
    }

    let mut path = PathBuf::from("./nc_machining_mes.db");

    if let Some(data_dir) = dirs::data_dir() {
        #[cfg(debug_assertions)]
        {
            path = data_dir.join("nc-machining-mes-dev");
        }

        #[cfg(not(debug_assertions))]
        {
            path = data_dir.join("nc-machining-mes");
        }

        if let Err(e) = std::fs::create_dir_all(&path) {
            tracing::warn!("无法创建数据目录 {}: {}，使用当前目录", path.display(), e);
            return "./nc_machining_mes.db".to_string();
        }
        path = path.join("nc_machining_mes.db");
    }

    path.to_string_lossy().to_string()
}
