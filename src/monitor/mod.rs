//! 健康监控：记录任务开始 / 完成事件，维护 handler 级与系统级指标，给出三级健康结论
//!
//! 所有可变状态（SystemMetrics、历史缓冲、创建时间）放在同一把互斥锁后面；
//! 各操作体很短且不含 await，std Mutex 足够。记录接口对未知输入只告警、不报错。

pub mod history;
pub mod metrics;

use std::collections::BTreeMap;
use std::sync::{Mutex, MutexGuard, PoisonError};

use chrono::{DateTime, Duration, Utc};
use serde::Serialize;

use crate::config::MonitorSection;

pub use history::{EntryStatus, TaskHistory, TaskHistoryEntry, TaskRecord};
pub use metrics::{ratio, AgentMetrics, HealthStatus, SystemMetrics};

/// get_system_health 中单个 handler 的健康信息
#[derive(Debug, Clone, Serialize)]
pub struct AgentHealth {
    pub status: HealthStatus,
    pub total_tasks: u64,
    pub success_rate: f64,
    pub avg_response_time: f64,
    pub last_activity: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct SystemHealth {
    pub system_status: HealthStatus,
    pub uptime_seconds: f64,
    pub total_requests: u64,
    pub success_rate: f64,
    pub agent_health: BTreeMap<String, AgentHealth>,
    /// 统计窗口内开始的任务数
    pub recent_tasks: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct SystemMetricsView {
    pub total_requests: u64,
    pub successful_requests: u64,
    pub failed_requests: u64,
    pub routing_failures: u64,
    pub average_routing_time: f64,
}

#[derive(Debug, Clone, Serialize)]
pub struct AgentMetricsView {
    pub total_tasks: u64,
    pub successful_tasks: u64,
    pub failed_tasks: u64,
    pub average_response_time: f64,
    pub error_rate: f64,
    pub last_activity: Option<String>,
}

impl From<&AgentMetrics> for AgentMetricsView {
    fn from(m: &AgentMetrics) -> Self {
        Self {
            total_tasks: m.total_tasks,
            successful_tasks: m.successful_tasks,
            failed_tasks: m.failed_tasks,
            average_response_time: m.average_response_time,
            error_rate: m.error_rate,
            last_activity: m.last_activity.map(|t| t.to_rfc3339()),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct PerformanceMetrics {
    pub system_metrics: SystemMetricsView,
    pub agent_metrics: BTreeMap<String, AgentMetricsView>,
}

struct MonitorState {
    metrics: SystemMetrics,
    history: TaskHistory,
    started_at: DateTime<Utc>,
}

/// 健康监控器
pub struct HealthMonitor {
    state: Mutex<MonitorState>,
    history_capacity: usize,
    recent_window: Duration,
}

impl HealthMonitor {
    pub fn new(history_capacity: usize, recent_window_secs: u64) -> Self {
        Self {
            state: Mutex::new(MonitorState {
                metrics: SystemMetrics::default(),
                history: TaskHistory::new(history_capacity),
                started_at: Utc::now(),
            }),
            history_capacity,
            recent_window: i64::try_from(recent_window_secs)
                .ok()
                .and_then(Duration::try_seconds)
                .unwrap_or(Duration::MAX),
        }
    }

    pub fn from_config(cfg: &MonitorSection) -> Self {
        Self::new(cfg.history_capacity, cfg.recent_window_secs)
    }

    fn state(&self) -> MutexGuard<'_, MonitorState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// 记录任务开始
    pub fn record_task_start(&self, task_id: &str, handler_type: &str, content: &str) {
        self.record_task_start_at(task_id, handler_type, content, Utc::now());
    }

    pub(crate) fn record_task_start_at(
        &self,
        task_id: &str,
        handler_type: &str,
        content: &str,
        at: DateTime<Utc>,
    ) {
        let mut state = self.state();
        state.history.push(TaskHistoryEntry {
            task_id: task_id.to_string(),
            handler_type: handler_type.to_string(),
            task_content: content.to_string(),
            start_time: at,
            end_time: None,
            response_time: None,
            status: EntryStatus::InProgress,
            error: None,
        });

        let agent = state
            .metrics
            .agent_metrics
            .entry(handler_type.to_string())
            .or_default();
        agent.total_tasks += 1;
        agent.last_activity = Some(at);
        state.metrics.total_requests += 1;

        tracing::debug!(task_id, handler_type, "task started");
    }

    /// 记录任务完成；未知 task_id 或重复完成只告警
    pub fn record_task_completion(
        &self,
        task_id: &str,
        success: bool,
        response_time: f64,
        error: Option<&str>,
    ) {
        let mut guard = self.state();
        let state = &mut *guard;

        let Some(entry) = state.history.find_latest_mut(task_id) else {
            tracing::warn!("Task record not found for task_id: {}", task_id);
            return;
        };
        if entry.status != EntryStatus::InProgress {
            tracing::warn!("Task {} already completed, ignoring duplicate completion", task_id);
            return;
        }

        entry.end_time = Some(Utc::now());
        entry.response_time = Some(response_time);
        entry.status = if success {
            EntryStatus::Completed
        } else {
            EntryStatus::Failed
        };
        entry.error = error.map(str::to_string);

        if let Some(agent) = state.metrics.agent_metrics.get_mut(&entry.handler_type) {
            agent.record_completion(success, response_time);
        }
        if success {
            state.metrics.successful_requests += 1;
        } else {
            state.metrics.failed_requests += 1;
        }
    }

    /// 记录一次路由：成功时更新平均路由耗时，失败时累加 routing_failures
    pub fn record_routing(&self, elapsed_secs: f64, ok: bool) {
        let mut state = self.state();
        let m = &mut state.metrics;
        if ok {
            m.routed_requests += 1;
            let n = m.routed_requests as f64;
            m.average_routing_time = (m.average_routing_time * (n - 1.0) + elapsed_secs) / n;
        } else {
            m.routing_failures += 1;
        }
    }

    pub fn get_system_health(&self) -> SystemHealth {
        let state = self.state();
        let now = Utc::now();
        let uptime = (now - state.started_at).num_milliseconds() as f64 / 1000.0;
        let success_rate = state.metrics.success_rate();

        let agent_health = state
            .metrics
            .agent_metrics
            .iter()
            .map(|(agent_type, m)| {
                (
                    agent_type.clone(),
                    AgentHealth {
                        status: HealthStatus::from_error_rate(m.error_rate),
                        total_tasks: m.total_tasks,
                        success_rate: 1.0 - m.error_rate,
                        avg_response_time: m.average_response_time,
                        last_activity: m.last_activity.map(|t| t.to_rfc3339()),
                    },
                )
            })
            .collect();

        SystemHealth {
            system_status: HealthStatus::from_success_rate(success_rate),
            uptime_seconds: uptime.max(0.0),
            total_requests: state.metrics.total_requests,
            success_rate,
            agent_health,
            recent_tasks: state.history.count_since(
                now.checked_sub_signed(self.recent_window)
                    .unwrap_or(DateTime::<Utc>::MIN_UTC),
            ),
        }
    }

    pub fn get_performance_metrics(&self) -> PerformanceMetrics {
        let state = self.state();
        let m = &state.metrics;
        PerformanceMetrics {
            system_metrics: SystemMetricsView {
                total_requests: m.total_requests,
                successful_requests: m.successful_requests,
                failed_requests: m.failed_requests,
                routing_failures: m.routing_failures,
                average_routing_time: m.average_routing_time,
            },
            agent_metrics: m
                .agent_metrics
                .iter()
                .map(|(k, v)| (k.clone(), AgentMetricsView::from(v)))
                .collect(),
        }
    }

    /// 最近的任务，按开始时间倒序
    pub fn get_recent_tasks(&self, limit: usize) -> Vec<TaskRecord> {
        let state = self.state();
        state
            .history
            .recent(limit)
            .into_iter()
            .map(TaskRecord::from)
            .collect()
    }

    /// 清零指标与历史，并重置 uptime 起点
    pub fn reset_metrics(&self) {
        let mut state = self.state();
        *state = MonitorState {
            metrics: SystemMetrics::default(),
            history: TaskHistory::new(self.history_capacity),
            started_at: Utc::now(),
        };
        tracing::info!("Metrics reset");
    }

    pub fn system_metrics(&self) -> SystemMetrics {
        self.state().metrics.clone()
    }

    pub fn agent_metrics(&self, handler_type: &str) -> Option<AgentMetrics> {
        self.state().metrics.agent_metrics.get(handler_type).cloned()
    }

    pub fn history_len(&self) -> usize {
        self.state().history.len()
    }
}

impl Default for HealthMonitor {
    fn default() -> Self {
        Self::from_config(&MonitorSection::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn complete(monitor: &HealthMonitor, id: &str, handler: &str, ok: bool, t: f64) {
        monitor.record_task_start(id, handler, "content");
        monitor.record_task_completion(id, ok, t, if ok { None } else { Some("failed") });
    }

    #[test]
    fn test_unknown_completion_is_noop() {
        let monitor = HealthMonitor::default();
        monitor.record_task_completion("ghost", true, 1.0, None);
        let m = monitor.system_metrics();
        assert_eq!(m.total_requests, 0);
        assert_eq!(m.successful_requests, 0);
        assert_eq!(m.failed_requests, 0);
    }

    #[test]
    fn test_average_is_arithmetic_mean() {
        let monitor = HealthMonitor::default();
        let times = [0.2, 1.3, 0.7, 2.9, 0.4];
        for (i, t) in times.iter().enumerate() {
            complete(&monitor, &format!("t{i}"), "deployment", true, *t);
        }
        let m = monitor.agent_metrics("deployment").unwrap();
        let mean = times.iter().sum::<f64>() / times.len() as f64;
        assert!((m.average_response_time - mean).abs() < 1e-9);
        assert_eq!(m.total_tasks, 5);
    }

    #[test]
    fn test_error_rate_tracks_failures() {
        let monitor = HealthMonitor::default();
        complete(&monitor, "a", "deployment", true, 0.1);
        complete(&monitor, "b", "deployment", false, 0.1);
        complete(&monitor, "c", "deployment", false, 0.1);
        complete(&monitor, "d", "deployment", true, 0.1);
        let m = monitor.agent_metrics("deployment").unwrap();
        assert_eq!(m.error_rate, m.failed_tasks as f64 / m.total_tasks as f64);
        assert_eq!(m.error_rate, 0.5);

        let health = monitor.get_system_health();
        assert_eq!(health.agent_health["deployment"].status, HealthStatus::Unhealthy);
        assert_eq!(health.system_status, HealthStatus::Unhealthy);
    }

    #[test]
    fn test_duplicate_completion_ignored() {
        let monitor = HealthMonitor::default();
        complete(&monitor, "a", "code_generation", true, 1.0);
        monitor.record_task_completion("a", false, 5.0, Some("late"));
        let m = monitor.system_metrics();
        assert_eq!(m.successful_requests, 1);
        assert_eq!(m.failed_requests, 0);
    }

    #[test]
    fn test_success_rate_exactly_point_nine_is_warning() {
        let monitor = HealthMonitor::default();
        for i in 0..10 {
            complete(&monitor, &format!("t{i}"), "code_generation", i != 0, 0.1);
        }
        let health = monitor.get_system_health();
        assert!((health.success_rate - 0.9).abs() < 1e-12);
        assert_eq!(health.system_status, HealthStatus::Warning);
    }

    #[test]
    fn test_history_capacity_bound() {
        let monitor = HealthMonitor::new(10, 300);
        let base = Utc::now();
        for i in 0..25 {
            monitor.record_task_start_at(
                &format!("t{i}"),
                "code_generation",
                "x",
                base + Duration::milliseconds(i),
            );
        }
        assert_eq!(monitor.history_len(), 10);
        let recent = monitor.get_recent_tasks(100);
        assert_eq!(recent.len(), 10);
        assert_eq!(recent[0].task_id, "t24");
        assert_eq!(recent[9].task_id, "t15");
        // 被淘汰的任务完成时视为未知
        monitor.record_task_completion("t0", true, 1.0, None);
        assert_eq!(monitor.system_metrics().successful_requests, 0);
    }

    #[test]
    fn test_recent_window_counts_only_recent_starts() {
        let monitor = HealthMonitor::new(100, 300);
        let now = Utc::now();
        monitor.record_task_start_at("old", "deployment", "x", now - Duration::seconds(600));
        monitor.record_task_start_at("new", "deployment", "x", now - Duration::seconds(10));
        assert_eq!(monitor.get_system_health().recent_tasks, 1);
    }

    #[test]
    fn test_unbounded_recent_window_counts_everything() {
        let monitor = HealthMonitor::new(10, u64::MAX);
        let now = Utc::now();
        monitor.record_task_start_at("ancient", "deployment", "x", now - Duration::days(3650));
        monitor.record_task_start_at("new", "deployment", "x", now);
        monitor.record_task_completion("ancient", true, 1.0, None);
        monitor.record_task_completion("new", true, 1.0, None);
        let health = monitor.get_system_health();
        assert_eq!(health.recent_tasks, 2);
        assert_eq!(health.system_status, HealthStatus::Healthy);
    }

    #[test]
    fn test_routing_metrics() {
        let monitor = HealthMonitor::default();
        monitor.record_routing(0.2, true);
        monitor.record_routing(0.4, true);
        monitor.record_routing(9.0, false);
        let m = monitor.get_performance_metrics().system_metrics;
        assert!((m.average_routing_time - 0.3).abs() < 1e-9);
        assert_eq!(m.routing_failures, 1);
        assert_eq!(m.failed_requests, 0);
    }

    #[test]
    fn test_reset_metrics() {
        let monitor = HealthMonitor::default();
        complete(&monitor, "a", "deployment", true, 1.0);
        monitor.reset_metrics();
        assert_eq!(monitor.history_len(), 0);
        assert_eq!(monitor.system_metrics().total_requests, 0);
        assert!(monitor.get_performance_metrics().agent_metrics.is_empty());
        assert!(monitor.get_system_health().uptime_seconds < 5.0);
    }

    #[test]
    fn test_empty_monitor_health() {
        let health = HealthMonitor::default().get_system_health();
        assert_eq!(health.success_rate, 0.0);
        assert_eq!(health.system_status, HealthStatus::Unhealthy);
        let json = serde_json::to_value(&health).unwrap();
        assert_eq!(json["system_status"], "unhealthy");
    }
}
