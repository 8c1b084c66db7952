//! 计数器与健康判定

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::Serialize;

/// 三级健康结论
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    Healthy,
    Warning,
    Unhealthy,
}

impl HealthStatus {
    /// 系统级：成功率严格大于 0.9 为 healthy，严格大于 0.7 为 warning
    pub fn from_success_rate(rate: f64) -> Self {
        if rate > 0.9 {
            HealthStatus::Healthy
        } else if rate > 0.7 {
            HealthStatus::Warning
        } else {
            HealthStatus::Unhealthy
        }
    }

    /// handler 级：错误率小于 0.1 为 healthy，小于 0.3 为 warning
    pub fn from_error_rate(rate: f64) -> Self {
        if rate < 0.1 {
            HealthStatus::Healthy
        } else if rate < 0.3 {
            HealthStatus::Warning
        } else {
            HealthStatus::Unhealthy
        }
    }
}

/// 单个 handler 类型的滚动计数
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AgentMetrics {
    pub total_tasks: u64,
    pub successful_tasks: u64,
    pub failed_tasks: u64,
    /// 秒
    pub average_response_time: f64,
    pub error_rate: f64,
    pub last_activity: Option<DateTime<Utc>>,
}

impl AgentMetrics {
    /// 记录一次完成：n 为开始事件后的 total_tasks
    pub(crate) fn record_completion(&mut self, success: bool, response_time: f64) {
        if success {
            self.successful_tasks += 1;
        } else {
            self.failed_tasks += 1;
        }

        let n = self.total_tasks;
        if n > 0 {
            let n = n as f64;
            self.average_response_time = (self.average_response_time * (n - 1.0) + response_time) / n;
        }
        self.error_rate = ratio(self.failed_tasks, self.total_tasks);
    }
}

/// 进程级汇总计数
#[derive(Debug, Clone, Default)]
pub struct SystemMetrics {
    pub total_requests: u64,
    pub successful_requests: u64,
    pub failed_requests: u64,
    /// 分类器失败次数（任务未到达 handler，不计入 failed_requests）
    pub routing_failures: u64,
    /// 成功路由的平均耗时（秒）
    pub average_routing_time: f64,
    pub routed_requests: u64,
    pub agent_metrics: BTreeMap<String, AgentMetrics>,
}

impl SystemMetrics {
    pub fn success_rate(&self) -> f64 {
        ratio(self.successful_requests, self.total_requests)
    }
}

/// 分母为 0 时返回 0
pub fn ratio(numerator: u64, denominator: u64) -> f64 {
    if denominator == 0 {
        0.0
    } else {
        numerator as f64 / denominator as f64
    }
}
