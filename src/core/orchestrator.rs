//! 编排状态机：Routing → Executing → Synthesizing → Done（任一阶段可进入 Failed）
//!
//! 路由阶段调用分类器并解析其自由文本输出；执行阶段调用对应 handler 并向监控记录开始 / 完成；
//! 合成阶段把错误或 handler 结果折叠为最终文本。process 永不向外返回错误。

use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Instant;

use futures_util::FutureExt;
use serde_json::{Map, Value};

use crate::agents::{AgentRegistry, HandlerSet};
use crate::core::coordination::panic_message;
use crate::core::{
    OrchestrationError, OrchestrationRun, Priority, RegistryError, RunPhase, TaskRequest,
};
use crate::llm::Classifier;
use crate::monitor::HealthMonitor;

/// 分类器输出的解析结果
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoutingDecision {
    pub handler: String,
    /// 未能识别、回落到默认 handler
    pub ambiguous: bool,
}

/// 解析分类器输出：
/// 1. 大小写不敏感的精确匹配
/// 2. 按注册表顺序的子串匹配，取第一个命中
/// 3. 回落到默认 handler
pub fn parse_routing_decision(
    reply: &str,
    registry: &AgentRegistry,
    default_handler: &str,
) -> RoutingDecision {
    let decision = reply.trim().to_lowercase();

    if registry.contains(&decision) {
        return RoutingDecision {
            handler: decision,
            ambiguous: false,
        };
    }

    if let Some(id) = registry.ids().into_iter().find(|id| decision.contains(id.as_str())) {
        return RoutingDecision {
            handler: id,
            ambiguous: false,
        };
    }

    RoutingDecision {
        handler: default_handler.trim().to_lowercase(),
        ambiguous: true,
    }
}

/// 生成任务 id
pub fn new_task_id() -> String {
    format!("task_{}", uuid::Uuid::new_v4())
}

/// 编排器：持有注册表、handler 集、分类器与监控
pub struct Orchestrator {
    registry: Arc<AgentRegistry>,
    handlers: HandlerSet,
    classifier: Arc<dyn Classifier>,
    monitor: Arc<HealthMonitor>,
    default_handler: String,
}

impl Orchestrator {
    /// 构建时校验：默认 handler 必须在注册表中，且每个注册 agent 都有 handler
    pub fn new(
        registry: Arc<AgentRegistry>,
        handlers: HandlerSet,
        classifier: Arc<dyn Classifier>,
        monitor: Arc<HealthMonitor>,
        default_handler: impl Into<String>,
    ) -> Result<Self, RegistryError> {
        let default_handler = default_handler.into().trim().to_lowercase();
        if !registry.contains(&default_handler) {
            return Err(RegistryError::UnknownDefault(default_handler));
        }
        handlers.validate(&registry)?;

        Ok(Self {
            registry,
            handlers,
            classifier,
            monitor,
            default_handler,
        })
    }

    pub fn registry(&self) -> &AgentRegistry {
        &self.registry
    }

    pub fn default_handler(&self) -> &str {
        &self.default_handler
    }

    /// 处理任务并返回最终文本
    pub async fn process(&self, request: TaskRequest) -> String {
        self.run(request).await.into_response()
    }

    pub async fn process_task(
        &self,
        content: &str,
        priority: Priority,
        context: Map<String, Value>,
    ) -> String {
        self.process(
            TaskRequest::new(content)
                .with_priority(priority)
                .with_context(context),
        )
        .await
    }

    /// 完整跑一遍状态机并返回运行状态
    pub async fn run(&self, request: TaskRequest) -> OrchestrationRun {
        let mut run = OrchestrationRun::new(new_task_id(), request);

        self.route(&mut run).await;
        if !run.is_failed() {
            run.phase = RunPhase::Executing;
            self.execute(&mut run).await;
        }
        if !run.is_failed() {
            run.phase = RunPhase::Synthesizing;
        }
        run.synthesize();
        run
    }

    async fn route(&self, run: &mut OrchestrationRun) {
        let candidates = self.registry.candidates();
        let started = Instant::now();
        let outcome = AssertUnwindSafe(self.classifier.classify(&run.request, &candidates))
            .catch_unwind()
            .await;
        let elapsed = started.elapsed().as_secs_f64();

        let reply = match outcome {
            Ok(Ok(reply)) => reply,
            Ok(Err(e)) => {
                tracing::error!("Error in task routing: {}", e);
                self.monitor.record_routing(elapsed, false);
                run.fail(OrchestrationError::Routing(e));
                return;
            }
            Err(panic) => {
                let msg = panic_message(panic.as_ref());
                tracing::error!("Classifier panicked: {}", msg);
                self.monitor.record_routing(elapsed, false);
                run.fail(OrchestrationError::Routing(format!("classifier panicked: {msg}")));
                return;
            }
        };
        self.monitor.record_routing(elapsed, true);

        let decision = parse_routing_decision(&reply, &self.registry, &self.default_handler);
        if decision.ambiguous {
            tracing::warn!(
                "Could not parse routing decision: {:?}, defaulting to {}",
                reply,
                decision.handler
            );
        }
        tracing::info!(task_id = %run.task_id, "Task routed to: {}", decision.handler);
        run.routing_ambiguous = decision.ambiguous;
        run.routing_decision = Some(decision.handler);
    }

    async fn execute(&self, run: &mut OrchestrationRun) {
        let Some(handler_type) = run.routing_decision.clone() else {
            run.fail(OrchestrationError::Execution(
                "No routing decision available".to_string(),
            ));
            return;
        };
        let Some(handler) = self.handlers.get(&handler_type) else {
            tracing::error!("Unknown handler: {}", handler_type);
            run.fail(OrchestrationError::UnknownHandler(handler_type));
            return;
        };

        self.monitor
            .record_task_start(&run.task_id, &handler_type, &run.request.content);
        let started = Instant::now();
        let outcome = AssertUnwindSafe(handler.execute(&run.request))
            .catch_unwind()
            .await;
        let elapsed = started.elapsed();

        let outcome = match outcome {
            Ok(result) => result,
            Err(panic) => Err(format!("handler panicked: {}", panic_message(panic.as_ref()))),
        };

        let label = match &outcome {
            Ok(r) => r.status.as_str(),
            Err(_) => "error",
        };
        let audit = serde_json::json!({
            "event": "handler_audit",
            "task_id": run.task_id,
            "handler": handler_type,
            "outcome": label,
            "duration_ms": elapsed.as_millis() as u64,
        });
        tracing::info!(audit = %audit, "handler");

        match outcome {
            Ok(result) => {
                let success = result.is_completed();
                let error = (!success).then(|| result.content.clone());
                self.monitor.record_task_completion(
                    &run.task_id,
                    success,
                    elapsed.as_secs_f64(),
                    error.as_deref(),
                );
                run.record_result(result);
            }
            Err(e) => {
                tracing::error!("Error in task execution: {}", e);
                self.monitor.record_task_completion(
                    &run.task_id,
                    false,
                    elapsed.as_secs_f64(),
                    Some(&e),
                );
                run.fail(OrchestrationError::Execution(e));
            }
        }
    }
}
