//! migrate 子命令

use tracing::{error, info};

use alpha_arena_core::database::migrations::migrate;
use alpha_arena_core::database::sqlx_pool::get_db_pool;

use crate::exit_codes;

pub async fn run() -> anyhow::Result<u8> {
    match migrate(get_db_pool()).await {
        Ok(applied) => {
            info!("迁移完成，本次应用 {} 个", applied);
            Ok(exit_codes::OK)
        }
        Err(e) => {
            error!("迁移失败: {:#}", e);
            Ok(exit_codes::MIGRATION_FAILURE)
        }
    }
}
