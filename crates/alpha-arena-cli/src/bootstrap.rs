//! 应用初始化

use anyhow::Result;
use dotenv::dotenv;
use tracing::info;

use alpha_arena_core::config::settings::{get_settings, Settings};
use alpha_arena_core::database::sqlx_pool::init_db_pool;
use alpha_arena_core::logger::setup_logging;

/// 应用初始化：环境变量、日志、数据库连接池
pub async fn app_init() -> Result<&'static Settings> {
    dotenv().ok();
    setup_logging()?;

    let settings = get_settings();
    init_db_pool(&settings.database_url).await?;

    info!("应用初始化完成 (db: {})", settings.database_url);
    Ok(settings)
}
