//! 优雅关闭
//!
//! 监听 Ctrl+C / SIGTERM，触发后依次执行已注册的清理任务（例如停止协调器工作线程）。

use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use crate::core::CoordinationManager;

/// 关闭信号管理器
#[derive(Clone)]
pub struct ShutdownManager {
    shutdown_token: CancellationToken,
}

/// 关闭原因
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ShutdownReason {
    /// Ctrl+C 或 quit 命令
    UserInitiated,
    /// SIGTERM
    Signal,
}

impl ShutdownManager {
    pub fn new() -> Self {
        Self {
            shutdown_token: CancellationToken::new(),
        }
    }

    /// 触发关闭；重复触发只记录一次
    pub fn shutdown(&self, reason: ShutdownReason) {
        if !self.shutdown_token.is_cancelled() {
            tracing::info!("Shutdown requested: {:?}", reason);
        }
        self.shutdown_token.cancel();
    }

    pub fn is_shutdown(&self) -> bool {
        self.shutdown_token.is_cancelled()
    }

    pub async fn wait_for_shutdown(&self) {
        self.shutdown_token.cancelled().await;
    }

    /// 安装系统信号处理器 (Ctrl+C, SIGTERM)
    pub fn install_signal_handlers(self: &Arc<Self>) {
        let manager = Arc::clone(self);
        tokio::spawn(async move {
            if let Ok(()) = tokio::signal::ctrl_c().await {
                tracing::info!("Received Ctrl+C, initiating graceful shutdown...");
                manager.shutdown(ShutdownReason::UserInitiated);
            }
        });

        #[cfg(unix)]
        {
            let manager = Arc::clone(self);
            tokio::spawn(async move {
                use tokio::signal::unix::{signal, SignalKind};
                if let Ok(mut sigterm) = signal(SignalKind::terminate()) {
                    sigterm.recv().await;
                    tracing::info!("Received SIGTERM, initiating graceful shutdown...");
                    manager.shutdown(ShutdownReason::Signal);
                }
            });
        }
    }
}

impl Default for ShutdownManager {
    fn default() -> Self {
        Self::new()
    }
}

/// 关闭时执行的清理任务
#[async_trait::async_trait]
pub trait ShutdownCleanup: Send + Sync {
    async fn cleanup(&self) -> anyhow::Result<()>;

    /// 用于日志
    fn name(&self) -> &'static str;
}

/// 按注册顺序执行清理任务，每个任务单独限时
pub struct ShutdownCoordinator {
    cleanup_tasks: Vec<Arc<dyn ShutdownCleanup>>,
    timeout_secs: u64,
}

impl ShutdownCoordinator {
    pub fn new() -> Self {
        Self {
            cleanup_tasks: Vec::new(),
            timeout_secs: 10,
        }
    }

    pub fn with_timeout(mut self, secs: u64) -> Self {
        self.timeout_secs = secs;
        self
    }

    pub fn register<T: ShutdownCleanup + 'static>(&mut self, task: T) {
        self.cleanup_tasks.push(Arc::new(task));
    }

    pub async fn run_cleanup(&self) {
        tracing::info!("Running {} cleanup tasks...", self.cleanup_tasks.len());

        let timeout = tokio::time::Duration::from_secs(self.timeout_secs);

        for task in &self.cleanup_tasks {
            let name = task.name();
            match tokio::time::timeout(timeout, task.cleanup()).await {
                Ok(Ok(())) => {
                    tracing::info!("Cleanup task '{}' completed successfully", name);
                }
                Ok(Err(e)) => {
                    tracing::warn!("Cleanup task '{}' failed: {}", name, e);
                }
                Err(_) => {
                    tracing::warn!("Cleanup task '{}' timed out after {}s", name, self.timeout_secs);
                }
            }
        }

        tracing::info!("All cleanup tasks finished");
    }
}

impl Default for ShutdownCoordinator {
    fn default() -> Self {
        Self::new()
    }
}

/// 停止协调器：拒绝新任务、取消工作线程、标记排队任务失败
pub struct CoordinationCleanup {
    coordinator: Arc<CoordinationManager>,
}

impl CoordinationCleanup {
    pub fn new(coordinator: Arc<CoordinationManager>) -> Self {
        Self { coordinator }
    }
}

#[async_trait::async_trait]
impl ShutdownCleanup for CoordinationCleanup {
    async fn cleanup(&self) -> anyhow::Result<()> {
        self.coordinator.shutdown().await;
        Ok(())
    }

    fn name(&self) -> &'static str {
        "Coordination"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::CoordinationSection;
    use std::sync::atomic::{AtomicBool, Ordering};

    #[tokio::test]
    async fn test_shutdown_wakes_waiters() {
        let manager = Arc::new(ShutdownManager::new());
        assert!(!manager.is_shutdown());

        let waiter = {
            let manager = Arc::clone(&manager);
            tokio::spawn(async move { manager.wait_for_shutdown().await })
        };
        manager.shutdown(ShutdownReason::Signal);
        manager.shutdown(ShutdownReason::UserInitiated);

        tokio::time::timeout(std::time::Duration::from_secs(1), waiter)
            .await
            .unwrap()
            .unwrap();
        assert!(manager.is_shutdown());
    }

    struct Flag(Arc<AtomicBool>);

    #[async_trait::async_trait]
    impl ShutdownCleanup for Flag {
        async fn cleanup(&self) -> anyhow::Result<()> {
            self.0.store(true, Ordering::SeqCst);
            Ok(())
        }

        fn name(&self) -> &'static str {
            "Flag"
        }
    }

    struct Failing;

    #[async_trait::async_trait]
    impl ShutdownCleanup for Failing {
        async fn cleanup(&self) -> anyhow::Result<()> {
            anyhow::bail!("disk full")
        }

        fn name(&self) -> &'static str {
            "Failing"
        }
    }

    #[tokio::test]
    async fn test_coordinator_runs_cleanups() {
        let coordination = Arc::new(CoordinationManager::new(CoordinationSection::default()));
        coordination.start();

        let mut coordinator = ShutdownCoordinator::new().with_timeout(10);
        let called = Arc::new(AtomicBool::new(false));
        coordinator.register(Failing);
        coordinator.register(Flag(Arc::clone(&called)));
        coordinator.register(CoordinationCleanup::new(Arc::clone(&coordination)));

        coordinator.run_cleanup().await;
        assert!(called.load(Ordering::SeqCst));
        assert!(coordination.is_shutdown());
    }
}
