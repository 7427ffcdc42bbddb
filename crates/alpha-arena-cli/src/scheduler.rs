//! 协作式任务调度器
//!
//! 每个循环独立计时、互不阻塞；广播关闭信号后各循环在
//! 下一个挂起点退出。

use std::collections::HashMap;

use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tokio::time::{interval, Duration};
use tracing::info;

pub struct TaskScheduler {
    periodic_tasks: HashMap<String, JoinHandle<()>>,
    shutdown_sender: broadcast::Sender<()>,
}

impl TaskScheduler {
    pub fn new() -> Self {
        let (shutdown_sender, _) = broadcast::channel(16);
        Self {
            periodic_tasks: HashMap::new(),
            shutdown_sender,
        }
    }

    /// 注册一个固定间隔的循环任务
    pub fn add_periodic_task<F, Fut>(&mut self, name: &str, every: Duration, task_fn: F)
    where
        F: Fn() -> Fut + Send + 'static,
        Fut: std::future::Future<Output = ()> + Send + 'static,
    {
        assert!(every >= Duration::from_millis(100), "minimum interval is 100ms");

        let mut interval_timer = interval(every);
        let mut shutdown_receiver = self.shutdown_sender.subscribe();
        let task_name = name.to_string();
        let handle = tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = interval_timer.tick() => {
                        task_fn().await;
                    }
                    _ = shutdown_receiver.recv() => {
                        info!("periodic task {} is shutting down", task_name);
                        break;
                    }
                }
            }
        });
        self.periodic_tasks.insert(name.to_string(), handle);
    }

    /// 广播关闭并等待全部任务退出
    pub async fn shutdown(self) {
        let _ = self.shutdown_sender.send(());
        for (_, handle) in self.periodic_tasks {
            let _ = handle.await;
        }
    }
}

impl Default for TaskScheduler {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    #[tokio::test]
    async fn periodic_task_fires_and_stops_on_shutdown() {
        let mut scheduler = TaskScheduler::new();
        let counter = Arc::new(AtomicUsize::new(0));
        let c = counter.clone();
        scheduler.add_periodic_task("tick", Duration::from_millis(100), move || {
            let c = c.clone();
            async move {
                c.fetch_add(1, Ordering::SeqCst);
            }
        });

        tokio::time::sleep(Duration::from_millis(350)).await;
        scheduler.shutdown().await;
        let ticks = counter.load(Ordering::SeqCst);
        assert!(ticks >= 2, "expected at least 2 ticks, got {}", ticks);
    }
}
