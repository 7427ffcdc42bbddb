//! SQLx SQLite 连接池管理
//!
//! 嵌入式单文件库：WAL 模式下读并发、写序列化，
//! 跨表写必须走 [`tx`] 在单事务内完成

use std::str::FromStr;
use std::time::Duration;

use futures::future::BoxFuture;
use once_cell::sync::OnceCell;
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteSynchronous};
use sqlx::{Pool, Sqlite, SqliteConnection, SqlitePool};
use tracing::info;

static DB_POOL: OnceCell<Pool<Sqlite>> = OnceCell::new();

/// 按 URL 建立连接池（不注册到全局，供测试与一次性命令使用）
pub async fn connect_pool(database_url: &str) -> anyhow::Result<SqlitePool> {
    let options = SqliteConnectOptions::from_str(database_url)
        .map_err(|e| anyhow::anyhow!("数据库URL解析失败: {}", e))?
        .create_if_missing(true)
        .journal_mode(SqliteJournalMode::Wal)
        .synchronous(SqliteSynchronous::Normal)
        .busy_timeout(Duration::from_secs(5))
        .foreign_keys(true);

    // 内存库每条连接都是独立实例，必须限制为单连接
    let max_connections = if database_url.contains(":memory:") { 1 } else { 5 };

    let pool = SqlitePoolOptions::new()
        .max_connections(max_connections)
        .connect_with(options)
        .await
        .map_err(|e| anyhow::anyhow!("数据库连接失败: {}", e))?;
    Ok(pool)
}

/// 初始化全局数据库连接池
pub async fn init_db_pool(database_url: &str) -> anyhow::Result<()> {
    info!("正在初始化数据库连接池...");
    let pool = connect_pool(database_url).await?;
    DB_POOL
        .set(pool)
        .map_err(|_| anyhow::anyhow!("数据库连接池已初始化"))?;
    info!("✓ 数据库连接池初始化成功");
    Ok(())
}

/// 获取全局数据库连接池
pub fn get_db_pool() -> &'static Pool<Sqlite> {
    DB_POOL
        .get()
        .expect("数据库连接池未初始化，请先调用 init_db_pool()")
}

/// 关闭全局数据库连接池
pub async fn close_db_pool() -> anyhow::Result<()> {
    if let Some(pool) = DB_POOL.get() {
        info!("正在关闭数据库连接池...");
        pool.close().await;
        info!("✓ 数据库连接池已关闭");
    }
    Ok(())
}

/// 在单个事务内执行 `f`，成功提交、失败回滚
///
/// 订单+事件、回测+子表这类跨表写禁止绕过本函数
pub async fn tx<T, F>(pool: &SqlitePool, f: F) -> anyhow::Result<T>
where
    F: for<'c> FnOnce(&'c mut SqliteConnection) -> BoxFuture<'c, anyhow::Result<T>>,
{
    let mut transaction = pool.begin().await?;
    match f(&mut *transaction).await {
        Ok(value) => {
            transaction.commit().await?;
            Ok(value)
        }
        Err(err) => {
            transaction.rollback().await?;
            Err(err)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn tx_rolls_back_on_error() {
        let pool = connect_pool("sqlite::memory:").await.unwrap();
        sqlx::query("CREATE TABLE t (v INTEGER)")
            .execute(&pool)
            .await
            .unwrap();

        let result: anyhow::Result<()> = tx(&pool, |conn| {
            Box::pin(async move {
                sqlx::query("INSERT INTO t (v) VALUES (1)")
                    .execute(&mut *conn)
                    .await?;
                Err(anyhow::anyhow!("boom"))
            })
        })
        .await;
        assert!(result.is_err());

        let count: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM t")
            .fetch_one(&pool)
            .await
            .unwrap();
        assert_eq!(count.0, 0);
    }

    #[tokio::test]
    async fn tx_commits_on_success() {
        let pool = connect_pool("sqlite::memory:").await.unwrap();
        sqlx::query("CREATE TABLE t (v INTEGER)")
            .execute(&pool)
            .await
            .unwrap();

        tx(&pool, |conn| {
            Box::pin(async move {
                sqlx::query("INSERT INTO t (v) VALUES (1)")
                    .execute(&mut *conn)
                    .await?;
                Ok(())
            })
        })
        .await
        .unwrap();

        let count: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM t")
            .fetch_one(&pool)
            .await
            .unwrap();
        assert_eq!(count.0, 1);
    }
}
