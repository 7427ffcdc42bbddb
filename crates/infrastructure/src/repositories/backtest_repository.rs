//! 回测结果仓储
//!
//! 一次运行连同子表必须原子写入，禁止部分可见

use sqlx::SqlitePool;

use alpha_arena_domain::{
    BacktestDecisionRow, BacktestPositionPoint, BacktestRun, BacktestTrade, Timeframe,
};

#[derive(Clone)]
pub struct BacktestRepository {
    pool: SqlitePool,
}

/// 性能评分用的历史指标行
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct BacktestMetricsRow {
    pub params_json: String,
    pub metrics_json: Option<String>,
}

impl BacktestRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// 运行 + 成交 + 持仓轨迹 + 决策，单事务写入，返回 backtest_id
    pub async fn insert_run(
        &self,
        run: &BacktestRun,
        trades: &[BacktestTrade],
        positions: &[BacktestPositionPoint],
        decisions: &[BacktestDecisionRow],
    ) -> anyhow::Result<i64> {
        let mut transaction = self.pool.begin().await?;

        let result = sqlx::query(
            r#"
            INSERT INTO backtest_runs (run_id, created_at, symbol, timeframe, start_ts, end_ts,
                                       initial_capital, params_json, metrics_json,
                                       equity_curve_json, schema_version)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&run.run_id)
        .bind(run.created_at)
        .bind(&run.symbol)
        .bind(run.timeframe.as_str())
        .bind(run.start_ts)
        .bind(run.end_ts)
        .bind(run.initial_capital.to_string())
        .bind(&run.params_json)
        .bind(&run.metrics_json)
        .bind(&run.equity_curve_json)
        .bind(run.schema_version)
        .execute(&mut *transaction)
        .await?;
        let backtest_id = result.last_insert_rowid();

        for trade in trades {
            sqlx::query(
                r#"
                INSERT INTO backtest_trades (backtest_id, side, entry_ts, entry_price, exit_ts,
                                             exit_price, amount, fee, pnl, return_pct, reason)
                VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
                "#,
            )
            .bind(backtest_id)
            .bind(trade.side.as_str())
            .bind(trade.entry_ts)
            .bind(trade.entry_price.to_string())
            .bind(trade.exit_ts)
            .bind(trade.exit_price.to_string())
            .bind(trade.amount.to_string())
            .bind(trade.fee.to_string())
            .bind(trade.pnl.to_string())
            .bind(trade.return_pct)
            .bind(&trade.reason)
            .execute(&mut *transaction)
            .await?;
        }

        for point in positions {
            sqlx::query(
                r#"
                INSERT INTO backtest_positions (backtest_id, ts, side, size, entry_price)
                VALUES (?, ?, ?, ?, ?)
                "#,
            )
            .bind(backtest_id)
            .bind(point.ts)
            .bind(&point.side)
            .bind(point.size.to_string())
            .bind(point.entry_price.to_string())
            .execute(&mut *transaction)
            .await?;
        }

        for decision in decisions {
            sqlx::query(
                r#"
                INSERT INTO backtest_decisions (backtest_id, ts, action, confidence, reasoning)
                VALUES (?, ?, ?, ?, ?)
                "#,
            )
            .bind(backtest_id)
            .bind(decision.ts)
            .bind(&decision.action)
            .bind(decision.confidence)
            .bind(&decision.reasoning)
            .execute(&mut *transaction)
            .await?;
        }

        transaction.commit().await?;
        Ok(backtest_id)
    }

    /// 最近 limit 次运行的参数与指标（性能评分输入）
    pub async fn recent_metrics(
        &self,
        symbol: &str,
        timeframe: Timeframe,
        limit: usize,
    ) -> anyhow::Result<Vec<BacktestMetricsRow>> {
        let rows: Vec<BacktestMetricsRow> = sqlx::query_as(
            r#"
            SELECT params_json, metrics_json FROM backtest_runs
            WHERE symbol = ? AND timeframe = ?
            ORDER BY id DESC LIMIT ?
            "#,
        )
        .bind(symbol)
        .bind(timeframe.as_str())
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }

    pub async fn trade_count(&self, backtest_id: i64) -> anyhow::Result<i64> {
        let row: (i64,) =
            sqlx::query_as("SELECT COUNT(*) FROM backtest_trades WHERE backtest_id = ?")
                .bind(backtest_id)
                .fetch_one(&self.pool)
                .await?;
        Ok(row.0)
    }
}
