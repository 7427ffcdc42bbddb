//! 数据完整性事件、修复任务与拉取记录

use serde::{Deserialize, Serialize};

use crate::enums::{IngestStatus, IntegrityEventType, IntegritySeverity, RepairStatus, Timeframe};

/// 完整性事件：GAP / DUPLICATE / REPAIR
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IntegrityEvent {
    pub id: i64,
    pub symbol: String,
    pub timeframe: Timeframe,
    pub event_type: IntegrityEventType,
    pub start_ts: i64,
    pub end_ts: i64,
    pub expected_bars: i64,
    pub actual_bars: i64,
    pub missing_bars: i64,
    pub duplicate_bars: i64,
    pub severity: IntegritySeverity,
    pub detected_at: i64,
    pub repair_job_id: Option<String>,
    pub details_json: Option<String>,
}

/// 修复任务，同一 (symbol, timeframe, range) 同时只允许一个活跃任务
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RepairJob {
    pub job_id: String,
    pub symbol: String,
    pub timeframe: Timeframe,
    pub start_ts: i64,
    pub end_ts: i64,
    pub status: RepairStatus,
    pub repaired_bars: i64,
    pub message: Option<String>,
    pub created_at: i64,
    pub updated_at: i64,
}

/// 数据拉取审计记录
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IngestionRun {
    pub id: i64,
    pub source: String,
    pub symbol: String,
    pub timeframe: Option<Timeframe>,
    pub data_type: String,
    pub started_at: i64,
    pub ended_at: Option<i64>,
    pub status: IngestStatus,
    pub rows_inserted: i64,
    pub error: Option<String>,
}
