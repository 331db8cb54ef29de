// ==========================================
// 数控加工执行闭环 - 主入口
// ==========================================
// 职责: 初始化日志与应用状态，输出当前车间状态摘要
// ==========================================

use anyhow::anyhow;
use nc_machining_mes::app::{get_default_db_path, AppState};
use nc_machining_mes::logging;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // NC_MES_LOG_FORMAT=json 时输出 JSON 行日志
    match std::env::var("NC_MES_LOG_FORMAT").as_deref() {
        Ok("json") => logging::init_json(),
        _ => logging::init(),
    }

    tracing::info!("==================================================");
    tracing::info!("{}", nc_machining_mes::APP_NAME);
    tracing::info!("系统版本: {}", nc_machining_mes::VERSION);
    tracing::info!("==================================================");

    let db_path = get_default_db_path();
    tracing::info!("使用数据库: {}", db_path);

    let state = AppState::new(db_path).await.map_err(|e| anyhow!(e))?;

    let orders = state.production_api.list_orders()?;
    let programs = state.nc_api.list_programs()?;
    let available = state.nc_api.list_available_machines()?;
    let overrides = state
        .config_manager
        .get_config_snapshot()
        .map_err(|e| anyhow!("读取配置快照失败: {}", e))?;

    tracing::info!(
        orders = orders.len(),
        programs = programs.len(),
        available_machines = available.len(),
        config_overrides = %overrides,
        "车间状态"
    );

    Ok(())
}
