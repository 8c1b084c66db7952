//! 协调管理器：固定数量 worker + 单一 FIFO 队列
//!
//! coordinate_task 登记任务（queued）并入队后立即返回；N 个 worker 循环从队列取出工作单元执行，
//! 成功写入 result，失败（含 panic）写入 error，worker 本身不会因单元失败而退出。
//! shutdown 通过 CancellationToken 协作取消所有 worker，宽限期后强制 abort；
//! 仍在队列中的单元不再执行，标记为 failed。

use std::collections::{HashMap, VecDeque};
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::pin::{pin, Pin};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use chrono::{DateTime, Utc};
use futures_util::future::join_all;
use futures_util::FutureExt;
use serde::Serialize;
use tokio::sync::{mpsc, Notify};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::config::{CapacityPolicy, CoordinationSection};
use crate::core::{CoordinationError, Priority};

/// 工作单元的输出
pub type WorkResult = Result<String, String>;

type WorkUnit = Pin<Box<dyn Future<Output = WorkResult> + Send>>;

pub const ABANDONED_AT_SHUTDOWN: &str = "abandoned at shutdown";
pub const CANCELLED_DURING_SHUTDOWN: &str = "cancelled during shutdown";

/// 协调任务状态
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskStatus {
    Queued,
    Running,
    Completed,
    Failed,
}

impl TaskStatus {
    pub fn is_finished(&self) -> bool {
        matches!(self, TaskStatus::Completed | TaskStatus::Failed)
    }
}

/// 被协调的任务（快照）
#[derive(Debug, Clone, Serialize)]
pub struct CoordinationTask {
    pub task_id: String,
    pub priority: Priority,
    pub status: TaskStatus,
    pub start_time: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
    pub result: Option<String>,
    pub error: Option<String>,
}

/// get_coordination_status 的输出
#[derive(Debug, Clone, Serialize)]
pub struct CoordinationSnapshot {
    pub active_tasks: usize,
    pub queued_tasks: usize,
    pub running_tasks: usize,
    pub tracked_tasks: usize,
    pub max_concurrent_tasks: usize,
    pub worker_tasks: usize,
    pub capacity_policy: CapacityPolicy,
    pub accepting: bool,
}

struct QueuedUnit {
    task_id: String,
    work: WorkUnit,
}

struct Tracker {
    tasks: HashMap<String, CoordinationTask>,
    /// 已结束任务的 id，按结束顺序
    finished: VecDeque<String>,
    accepting: bool,
}

impl Tracker {
    fn count(&self, status: TaskStatus) -> usize {
        self.tasks.values().filter(|t| t.status == status).count()
    }

    fn active(&self) -> usize {
        self.tasks.values().filter(|t| !t.status.is_finished()).count()
    }
}

struct Shared {
    tracker: Mutex<Tracker>,
    /// 每次有任务结束时唤醒等待者
    changed: Notify,
    retention: usize,
}

impl Shared {
    fn tracker(&self) -> MutexGuard<'_, Tracker> {
        self.tracker.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn mark_running(&self, task_id: &str) {
        if let Some(task) = self.tracker().tasks.get_mut(task_id) {
            task.status = TaskStatus::Running;
        }
    }

    fn finish(&self, task_id: &str, outcome: WorkResult) {
        {
            let mut tracker = self.tracker();
            let Some(task) = tracker.tasks.get_mut(task_id) else {
                return;
            };
            if task.status.is_finished() {
                return;
            }
            task.finished_at = Some(Utc::now());
            match outcome {
                Ok(result) => {
                    task.status = TaskStatus::Completed;
                    task.result = Some(result);
                }
                Err(error) => {
                    task.status = TaskStatus::Failed;
                    task.error = Some(error);
                }
            }
            tracker.finished.push_back(task_id.to_string());

            while tracker.finished.len() > self.retention {
                let Some(oldest) = tracker.finished.pop_front() else {
                    break;
                };
                // 同 id 可能已被重新提交，只淘汰已结束的条目
                if tracker.tasks.get(&oldest).is_some_and(|t| t.status.is_finished()) {
                    tracker.tasks.remove(&oldest);
                }
            }
        }
        self.changed.notify_waiters();
    }
}

/// 有界 worker 池
pub struct CoordinationManager {
    shared: Arc<Shared>,
    queue_tx: mpsc::UnboundedSender<QueuedUnit>,
    queue_rx: Arc<tokio::sync::Mutex<mpsc::UnboundedReceiver<QueuedUnit>>>,
    workers: Mutex<Vec<JoinHandle<()>>>,
    shutdown_token: CancellationToken,
    config: CoordinationSection,
}

impl CoordinationManager {
    pub fn new(config: CoordinationSection) -> Self {
        let (queue_tx, queue_rx) = mpsc::unbounded_channel();
        Self {
            shared: Arc::new(Shared {
                tracker: Mutex::new(Tracker {
                    tasks: HashMap::new(),
                    finished: VecDeque::new(),
                    accepting: true,
                }),
                changed: Notify::new(),
                retention: config.retention,
            }),
            queue_tx,
            queue_rx: Arc::new(tokio::sync::Mutex::new(queue_rx)),
            workers: Mutex::new(Vec::new()),
            shutdown_token: CancellationToken::new(),
            config,
        }
    }

    fn workers(&self) -> MutexGuard<'_, Vec<JoinHandle<()>>> {
        self.workers.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// 启动 worker；必须在 tokio runtime 内调用。重复调用无效果
    pub fn start(&self) {
        let mut workers = self.workers();
        if !workers.is_empty() || self.shutdown_token.is_cancelled() {
            tracing::warn!("Coordination manager already started or shut down");
            return;
        }
        let count = self.config.workers.max(1);
        for id in 0..count {
            workers.push(tokio::spawn(worker_loop(
                id,
                Arc::clone(&self.shared),
                Arc::clone(&self.queue_rx),
                self.shutdown_token.child_token(),
            )));
        }
        tracing::info!("Coordination manager started with {} workers", count);
    }

    /// 登记并入队一个工作单元，立即返回
    pub fn coordinate_task<F>(
        &self,
        task_id: impl Into<String>,
        work: F,
        priority: Priority,
    ) -> Result<(), CoordinationError>
    where
        F: Future<Output = WorkResult> + Send + 'static,
    {
        let task_id = task_id.into();
        let mut tracker = self.shared.tracker();
        if !tracker.accepting {
            return Err(CoordinationError::ShutDown);
        }
        if tracker
            .tasks
            .get(&task_id)
            .is_some_and(|t| !t.status.is_finished())
        {
            return Err(CoordinationError::Duplicate(task_id));
        }

        let active = tracker.active();
        let limit = self.config.max_concurrent_tasks;
        if active >= limit {
            match self.config.capacity_policy {
                CapacityPolicy::Warn => {
                    tracing::warn!("System at capacity ({}/{}), queuing task {}", active, limit, task_id);
                }
                CapacityPolicy::Reject => {
                    tracing::warn!("System at capacity ({}/{}), rejecting task {}", active, limit, task_id);
                    return Err(CoordinationError::AtCapacity { active, limit });
                }
            }
        }

        tracker.finished.retain(|id| id != &task_id);
        tracker.tasks.insert(
            task_id.clone(),
            CoordinationTask {
                task_id: task_id.clone(),
                priority,
                status: TaskStatus::Queued,
                start_time: Utc::now(),
                finished_at: None,
                result: None,
                error: None,
            },
        );
        drop(tracker);

        let unit = QueuedUnit {
            task_id: task_id.clone(),
            work: Box::pin(work),
        };
        if self.queue_tx.send(unit).is_err() {
            self.shared.finish(&task_id, Err("queue closed".to_string()));
        }
        tracing::debug!(task_id = %task_id, priority = %priority, "task queued");
        Ok(())
    }

    pub fn get_task(&self, task_id: &str) -> Option<CoordinationTask> {
        self.shared.tracker().tasks.get(task_id).cloned()
    }

    /// 等待任务结束并返回其快照；任务不存在时返回 None
    pub async fn wait_for(&self, task_id: &str) -> Option<CoordinationTask> {
        loop {
            let changed = self.shared.changed.notified();
            match self.get_task(task_id) {
                None => return None,
                Some(task) if task.status.is_finished() => return Some(task),
                Some(_) => changed.await,
            }
        }
    }

    /// 等待所有已登记任务结束
    pub async fn wait_idle(&self) {
        loop {
            let changed = self.shared.changed.notified();
            if self.shared.tracker().active() == 0 {
                return;
            }
            changed.await;
        }
    }

    /// 移除所有已结束任务，返回移除条数
    pub fn cleanup_finished(&self) -> usize {
        let mut tracker = self.shared.tracker();
        let before = tracker.tasks.len();
        tracker.tasks.retain(|_, t| !t.status.is_finished());
        tracker.finished.clear();
        before - tracker.tasks.len()
    }

    pub fn get_coordination_status(&self) -> CoordinationSnapshot {
        let worker_tasks = self.workers().iter().filter(|h| !h.is_finished()).count();
        let tracker = self.shared.tracker();
        let queued = tracker.count(TaskStatus::Queued);
        let running = tracker.count(TaskStatus::Running);
        CoordinationSnapshot {
            active_tasks: queued + running,
            queued_tasks: queued,
            running_tasks: running,
            tracked_tasks: tracker.tasks.len(),
            max_concurrent_tasks: self.config.max_concurrent_tasks,
            worker_tasks,
            capacity_policy: self.config.capacity_policy,
            accepting: tracker.accepting,
        }
    }

    /// 关闭：拒绝新任务，取消 worker 并在宽限期内等待其退出；队列中剩余单元被放弃
    pub async fn shutdown(&self) {
        self.shared.tracker().accepting = false;
        self.shutdown_token.cancel();

        let handles: Vec<JoinHandle<()>> = std::mem::take(&mut *self.workers());
        let aborts: Vec<_> = handles.iter().map(|h| h.abort_handle()).collect();
        let grace = Duration::from_secs(self.config.shutdown_grace_secs);

        let mut joined = pin!(join_all(handles));
        let results = match tokio::time::timeout(grace, joined.as_mut()).await {
            Ok(results) => results,
            Err(_) => {
                tracing::warn!(
                    "Workers did not stop within {}s, aborting",
                    self.config.shutdown_grace_secs
                );
                for abort in aborts {
                    abort.abort();
                }
                // abort 只是请求；等到任务真正被丢弃
                joined.await
            }
        };
        for err in results.into_iter().filter_map(Result::err) {
            if !err.is_cancelled() {
                tracing::warn!("Worker terminated abnormally: {}", err);
            }
        }

        let mut abandoned = 0;
        {
            let mut rx = self.queue_rx.lock().await;
            while let Ok(unit) = rx.try_recv() {
                self.shared.finish(&unit.task_id, Err(ABANDONED_AT_SHUTDOWN.to_string()));
                abandoned += 1;
            }
        }

        // 被 abort 的 worker 无法自行记账
        let stuck: Vec<String> = self
            .shared
            .tracker()
            .tasks
            .values()
            .filter(|t| !t.status.is_finished())
            .map(|t| t.task_id.clone())
            .collect();
        for task_id in stuck {
            self.shared
                .finish(&task_id, Err(CANCELLED_DURING_SHUTDOWN.to_string()));
        }

        tracing::info!("Coordination manager shutdown ({} queued units abandoned)", abandoned);
    }

    pub fn is_shutdown(&self) -> bool {
        self.shutdown_token.is_cancelled()
    }
}

async fn worker_loop(
    worker_id: usize,
    shared: Arc<Shared>,
    queue_rx: Arc<tokio::sync::Mutex<mpsc::UnboundedReceiver<QueuedUnit>>>,
    token: CancellationToken,
) {
    loop {
        let next = tokio::select! {
            biased;
            _ = token.cancelled() => break,
            unit = async { queue_rx.lock().await.recv().await } => unit,
        };
        let Some(unit) = next else {
            break;
        };

        let task_id = unit.task_id;
        shared.mark_running(&task_id);

        let outcome = tokio::select! {
            biased;
            _ = token.cancelled() => {
                shared.finish(&task_id, Err(CANCELLED_DURING_SHUTDOWN.to_string()));
                break;
            }
            outcome = AssertUnwindSafe(unit.work).catch_unwind() => outcome,
        };

        match outcome {
            Ok(Ok(result)) => shared.finish(&task_id, Ok(result)),
            Ok(Err(e)) => {
                tracing::error!("Task {} failed: {}", task_id, e);
                shared.finish(&task_id, Err(e));
            }
            Err(panic) => {
                let msg = panic_message(panic.as_ref());
                tracing::error!("Worker {} caught panic in task {}: {}", worker_id, task_id, msg);
                shared.finish(&task_id, Err(format!("panicked: {msg}")));
            }
        }
    }
    tracing::debug!(worker_id, "worker stopped");
}

/// 从 panic payload 中取出文本
pub(crate) fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}
