//! 前向迁移执行器
//!
//! 迁移编号递增、只进不退，每个迁移在独立事务内执行，
//! 已应用集合记录在 schema_version 表

use sqlx::{Connection, SqlitePool};
use tracing::info;

use alpha_arena_common::utils::time::now_s;

/// 一个已编号的迁移
#[derive(Debug, Clone, Copy)]
pub struct Migration {
    pub version: i64,
    pub name: &'static str,
    pub sql: &'static str,
}

/// 全部迁移，按版本升序
pub const MIGRATIONS: &[Migration] = &[
    Migration {
        version: 1,
        name: "market_data",
        sql: include_str!("../../migrations/001_market_data.sql"),
    },
    Migration {
        version: 2,
        name: "integrity",
        sql: include_str!("../../migrations/002_integrity.sql"),
    },
    Migration {
        version: 3,
        name: "trading",
        sql: include_str!("../../migrations/003_trading.sql"),
    },
    Migration {
        version: 4,
        name: "decisions",
        sql: include_str!("../../migrations/004_decisions.sql"),
    },
    Migration {
        version: 5,
        name: "backtests",
        sql: include_str!("../../migrations/005_backtests.sql"),
    },
];

async fn ensure_schema_version(pool: &SqlitePool) -> anyhow::Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS schema_version (
            version INTEGER PRIMARY KEY,
            name TEXT NOT NULL,
            applied_at INTEGER NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;
    Ok(())
}

async fn applied_versions(pool: &SqlitePool) -> anyhow::Result<Vec<i64>> {
    let rows: Vec<(i64,)> = sqlx::query_as("SELECT version FROM schema_version ORDER BY version")
        .fetch_all(pool)
        .await?;
    Ok(rows.into_iter().map(|r| r.0).collect())
}

/// 应用所有未执行的迁移，返回本次执行数量
pub async fn migrate(pool: &SqlitePool) -> anyhow::Result<usize> {
    ensure_schema_version(pool).await?;
    let applied = applied_versions(pool).await?;

    let mut executed = 0usize;
    for migration in MIGRATIONS {
        if applied.contains(&migration.version) {
            continue;
        }
        let mut conn = pool.acquire().await?;
        let mut transaction = conn.begin().await?;
        sqlx::raw_sql(migration.sql)
            .execute(&mut *transaction)
            .await
            .map_err(|e| {
                anyhow::anyhow!("迁移 {:03}_{} 执行失败: {}", migration.version, migration.name, e)
            })?;
        sqlx::query("INSERT INTO schema_version (version, name, applied_at) VALUES (?, ?, ?)")
            .bind(migration.version)
            .bind(migration.name)
            .bind(now_s())
            .execute(&mut *transaction)
            .await?;
        transaction.commit().await?;
        info!("applied migration {:03}_{}", migration.version, migration.name);
        executed += 1;
    }
    Ok(executed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database::sqlx_pool::connect_pool;

    #[tokio::test]
    async fn migrations_are_idempotent() {
        let pool = connect_pool("sqlite::memory:").await.unwrap();
        let first = migrate(&pool).await.unwrap();
        assert_eq!(first, MIGRATIONS.len());

        // 第二次运行不应重复执行
        let second = migrate(&pool).await.unwrap();
        assert_eq!(second, 0);

        let versions = applied_versions(&pool).await.unwrap();
        assert_eq!(versions.len(), MIGRATIONS.len());
    }

    #[tokio::test]
    async fn migrations_create_core_tables() {
        let pool = connect_pool("sqlite::memory:").await.unwrap();
        migrate(&pool).await.unwrap();

        for table in [
            "market_data",
            "funding_rates",
            "integrity_events",
            "repair_jobs",
            "orders",
            "order_lifecycle_events",
            "trades",
            "positions",
            "risk_events",
            "decisions",
            "backtest_runs",
        ] {
            let row: (i64,) = sqlx::query_as(
                "SELECT COUNT(*) FROM sqlite_master WHERE type = 'table' AND name = ?",
            )
            .bind(table)
            .fetch_one(&pool)
            .await
            .unwrap();
            assert_eq!(row.0, 1, "missing table {}", table);
        }
    }

    #[test]
    fn versions_strictly_ascending() {
        for pair in MIGRATIONS.windows(2) {
            assert!(pair[0].version < pair[1].version);
        }
    }
}
