//! # Alpha Arena CLI
//!
//! 交易系统主程序入口：migrate / ingest / daemon / backtest
//!
//! 退出码约定：
//! - 0 正常
//! - 1 配置错误
//! - 2 迁移失败
//! - 3 交易所重试后仍不可达
//! - 4 启动时杀开关已触发

pub mod app;
pub mod bootstrap;
pub mod commands;
pub mod scheduler;

use std::process::ExitCode;

use clap::Parser;
use tracing::error;

use app::{Cli, Commands};

/// 退出码
pub mod exit_codes {
    pub const OK: u8 = 0;
    pub const CONFIG_ERROR: u8 = 1;
    pub const MIGRATION_FAILURE: u8 = 2;
    pub const VENUE_UNREACHABLE: u8 = 3;
    pub const KILL_SWITCH: u8 = 4;
}

pub async fn run() -> ExitCode {
    let cli = Cli::parse();

    if let Err(e) = bootstrap::app_init().await {
        eprintln!("初始化失败: {}", e);
        return ExitCode::from(exit_codes::CONFIG_ERROR);
    }

    let code = match cli.command {
        Commands::Migrate => commands::migrate::run().await,
        Commands::Ingest(args) => commands::ingest::run(args).await,
        Commands::Daemon(args) => commands::daemon::run(args).await,
        Commands::Backtest(args) => commands::backtest::run(args).await,
    };
    match code {
        Ok(code) => ExitCode::from(code),
        Err(e) => {
            error!("command failed: {:#}", e);
            ExitCode::from(exit_codes::CONFIG_ERROR)
        }
    }
}
