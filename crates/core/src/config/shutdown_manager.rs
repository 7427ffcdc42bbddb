//! 优雅停止管理器

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use tokio::sync::RwLock;
use tracing::{error, info, warn};

/// 关闭回调函数
pub type ShutdownHook = Box<
    dyn Fn() -> std::pin::Pin<Box<dyn std::future::Future<Output = Result<()>> + Send>>
        + Send
        + Sync,
>;

/// 关闭配置
#[derive(Debug, Clone)]
pub struct ShutdownConfig {
    /// 总超时时间
    pub total_timeout: Duration,
    /// 每个钩子的超时时间
    pub hook_timeout: Duration,
}

impl Default for ShutdownConfig {
    fn default() -> Self {
        Self {
            total_timeout: Duration::from_secs(30),
            hook_timeout: Duration::from_secs(10),
        }
    }
}

/// 按注册顺序执行关闭钩子，整体受总超时约束
pub struct ShutdownManager {
    is_shutting_down: Arc<AtomicBool>,
    hooks: Arc<RwLock<Vec<(String, ShutdownHook)>>>,
    config: ShutdownConfig,
}

impl ShutdownManager {
    pub fn new(config: ShutdownConfig) -> Self {
        Self {
            is_shutting_down: Arc::new(AtomicBool::new(false)),
            hooks: Arc::new(RwLock::new(Vec::new())),
            config,
        }
    }

    pub fn new_default() -> Self {
        Self::new(ShutdownConfig::default())
    }

    pub fn is_shutting_down(&self) -> bool {
        self.is_shutting_down.load(Ordering::Acquire)
    }

    /// 获取关闭状态的原子引用（供各循环检查）
    pub fn shutdown_signal(&self) -> Arc<AtomicBool> {
        self.is_shutting_down.clone()
    }

    /// 注册关闭回调
    pub async fn register_shutdown_hook<F, Fut>(&self, name: String, hook: F)
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: std::future::Future<Output = Result<()>> + Send + 'static,
    {
        let boxed: ShutdownHook = Box::new(move || Box::pin(hook()));
        let mut hooks = self.hooks.write().await;
        info!("注册关闭回调: {}", name);
        hooks.push((name, boxed));
    }

    /// 执行优雅关闭
    pub async fn shutdown(&self) -> Result<()> {
        if self
            .is_shutting_down
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            warn!("关闭已在进行中");
            return Ok(());
        }

        info!("开始执行优雅关闭，总超时: {:?}", self.config.total_timeout);
        let result =
            tokio::time::timeout(self.config.total_timeout, self.run_hooks()).await;
        match result {
            Ok(res) => res,
            Err(_) => {
                error!("关闭超时 ({:?})", self.config.total_timeout);
                Err(anyhow::anyhow!("shutdown timed out"))
            }
        }
    }

    async fn run_hooks(&self) -> Result<()> {
        let hooks = self.hooks.read().await;
        for (name, hook) in hooks.iter() {
            match tokio::time::timeout(self.config.hook_timeout, hook()).await {
                Ok(Ok(())) => info!("关闭回调 {} 完成", name),
                Ok(Err(e)) => error!("关闭回调 {} 失败: {}", name, e),
                Err(_) => error!("关闭回调 {} 超时", name),
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    #[tokio::test]
    async fn hooks_run_in_order_once() {
        let manager = ShutdownManager::new_default();
        let counter = Arc::new(AtomicUsize::new(0));

        let c1 = counter.clone();
        manager
            .register_shutdown_hook("first".to_string(), move || {
                let c = c1.clone();
                async move {
                    c.fetch_add(1, Ordering::SeqCst);
                    Ok(())
                }
            })
            .await;

        manager.shutdown().await.unwrap();
        // 第二次调用为幂等空操作
        manager.shutdown().await.unwrap();
        assert_eq!(counter.load(Ordering::SeqCst), 1);
        assert!(manager.is_shutting_down());
    }
}
