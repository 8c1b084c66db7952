//! 编排运行状态：OrchestrationRun 与 RunPhase
//!
//! 一次运行在提交时创建，被 Routing → Executing → Synthesizing 各阶段原地修改，
//! 调用方读取 final_response 后即丢弃，不做持久化。

use serde::Serialize;

use crate::core::{HandlerResult, HandlerStatus, OrchestrationError, TaskRequest};

/// 没有任何 handler 结果时的固定回复
pub const NO_RESPONSE: &str = "No response received from specialist agents";

/// 运行阶段；Failed 为吸收态
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RunPhase {
    Routing,
    Executing,
    Synthesizing,
    Done,
    Failed,
}

/// 单个任务的可变运行状态
#[derive(Clone, Debug)]
pub struct OrchestrationRun {
    pub task_id: String,
    pub request: TaskRequest,
    pub phase: RunPhase,
    /// 选中的 handler id
    pub routing_decision: Option<String>,
    /// 分类器输出无法识别、回落到默认 handler
    pub routing_ambiguous: bool,
    /// 目前至多一个，预留多 handler 扇出
    pub results: Vec<HandlerResult>,
    pub final_response: Option<String>,
    pub error: Option<OrchestrationError>,
}

impl OrchestrationRun {
    pub fn new(task_id: impl Into<String>, request: TaskRequest) -> Self {
        Self {
            task_id: task_id.into(),
            request,
            phase: RunPhase::Routing,
            routing_decision: None,
            routing_ambiguous: false,
            results: Vec::new(),
            final_response: None,
            error: None,
        }
    }

    /// 记录错误并进入 Failed
    pub fn fail(&mut self, error: OrchestrationError) {
        self.error = Some(error);
        self.phase = RunPhase::Failed;
    }

    pub fn is_failed(&self) -> bool {
        self.phase == RunPhase::Failed
    }

    /// 追加 handler 结果；非 completed 的结果使运行进入 Failed（最终文本仍取自结果）
    pub fn record_result(&mut self, result: HandlerResult) {
        if !result.is_completed() {
            self.phase = RunPhase::Failed;
        }
        self.results.push(result);
    }

    /// 根据错误 / handler 结果生成最终文本；之后阶段为 Done（失败时保持 Failed）
    pub fn synthesize(&mut self) {
        let response = if let Some(err) = &self.error {
            format!("Error: {err}")
        } else {
            match self.results.first() {
                None => NO_RESPONSE.to_string(),
                Some(result) => match result.status {
                    HandlerStatus::Completed => result.content.clone(),
                    HandlerStatus::Failed => format!("Task failed: {}", result.content),
                },
            }
        };
        self.final_response = Some(response);
        if self.phase != RunPhase::Failed {
            self.phase = RunPhase::Done;
        }
    }

    /// 取出最终文本（未合成时返回固定回复）
    pub fn into_response(self) -> String {
        self.final_response
            .unwrap_or_else(|| "No response generated".to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn run() -> OrchestrationRun {
        OrchestrationRun::new("task_1", TaskRequest::new("do something"))
    }

    #[test]
    fn test_synthesize_error_wins() {
        let mut r = run();
        r.results.push(HandlerResult::completed("code_generation", "ok"));
        r.fail(OrchestrationError::Execution("boom".to_string()));
        r.synthesize();
        assert_eq!(r.phase, RunPhase::Failed);
        assert_eq!(r.final_response.as_deref(), Some("Error: Execution error: boom"));
    }

    #[test]
    fn test_synthesize_failed_status() {
        let mut r = run();
        r.record_result(HandlerResult::failed("deployment", "cluster unreachable"));
        r.synthesize();
        assert_eq!(r.phase, RunPhase::Failed);
        assert!(r.error.is_none());
        assert_eq!(r.into_response(), "Task failed: cluster unreachable");
    }

    #[test]
    fn test_completed_result_keeps_phase() {
        let mut r = run();
        r.phase = RunPhase::Executing;
        r.record_result(HandlerResult::completed("marketing_automation", "plan"));
        assert!(!r.is_failed());
        r.synthesize();
        assert_eq!(r.phase, RunPhase::Done);
    }

    #[test]
    fn test_synthesize_without_results() {
        let mut r = run();
        r.synthesize();
        assert_eq!(r.into_response(), NO_RESPONSE);
    }
}
