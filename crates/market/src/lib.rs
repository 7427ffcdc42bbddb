//! # Alpha Arena Market
//!
//! 市场数据域：拉取、读取、完整性守护
//!
//! - `ingest`: 周期性拉取K线与衍生品数据，幂等落库
//! - `data_service`: 只读访问层，策略/决策/回测的唯一读路径
//! - `integrity`: 缺口/重复扫描
//! - `repair`: 修复任务工作者

pub mod data_service;
pub mod ingest;
pub mod integrity;
pub mod repair;

pub use data_service::DataService;
pub use ingest::IngestService;
pub use integrity::{IntegrityService, ScanSummary};
pub use repair::RepairWorker;
