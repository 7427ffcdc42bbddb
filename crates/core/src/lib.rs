//! # Alpha Arena Core
//!
//! 基础设施核心：配置加载、数据库连接池与迁移、日志、优雅关闭

pub mod config;
pub mod database;
pub mod logger;

pub use config::settings::{get_settings, init_settings, Settings};
pub use config::shutdown_manager::{ShutdownConfig, ShutdownManager};
pub use database::migrations::{migrate, Migration, MIGRATIONS};
pub use database::sqlx_pool::{close_db_pool, connect_pool, get_db_pool, init_db_pool, tx};
