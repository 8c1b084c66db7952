//! AgentSystem：组合根
//!
//! 由配置构建注册表、LLM、分类器、specialist handler、健康监控、编排器与协调管理器。
//! 生命周期：build → start → 使用 → shutdown。

use std::future::Future;
use std::sync::Arc;

use serde::Serialize;
use serde_json::{Map, Value};

use crate::agents::{
    register_builtin_handlers, AgentRegistry, CapabilityHandler, HandlerSet,
};
use crate::config::AppConfig;
use crate::core::{
    CoordinationError, CoordinationManager, CoordinationSnapshot, CoordinationTask,
    OrchestrationRun, Orchestrator, Priority, RegistryError, TaskRequest, WorkResult,
};
use crate::llm::{create_classifier, create_llm_from_config, Classifier, LlmClient, TokenUsage};
use crate::monitor::{HealthMonitor, PerformanceMetrics, SystemHealth, TaskRecord};

/// 演示任务（demo 命令使用）
pub const DEMO_TASKS: [(&str, Priority); 5] = [
    ("Create a Python function to calculate fibonacci numbers", Priority::Medium),
    ("How do I deploy a Flask app to production?", Priority::High),
    ("Analyze our monthly sales data and provide insights", Priority::Medium),
    ("Help a customer who can't log into their account", Priority::High),
    ("Create a social media campaign for our new product launch", Priority::Low),
];

/// get_system_status 的输出
#[derive(Debug, Clone, Serialize)]
pub struct SystemStatus {
    pub master_agent: String,
    pub available_agents: Vec<String>,
    pub llm_provider: String,
    /// 仅统计用量的后端（OpenAI 兼容 / DeepSeek）有值
    #[serde(skip_serializing_if = "Option::is_none")]
    pub token_usage: Option<TokenUsage>,
    pub coordination: CoordinationSnapshot,
}

pub struct AgentSystem {
    registry: Arc<AgentRegistry>,
    llm: Arc<dyn LlmClient>,
    orchestrator: Arc<Orchestrator>,
    monitor: Arc<HealthMonitor>,
    coordinator: Arc<CoordinationManager>,
}

impl AgentSystem {
    pub fn from_config(config: &AppConfig) -> Result<Self, RegistryError> {
        Self::builder(config.clone()).build()
    }

    pub fn builder(config: AppConfig) -> AgentSystemBuilder {
        AgentSystemBuilder {
            config,
            registry: None,
            llm: None,
            classifier: None,
            handlers: Vec::new(),
        }
    }

    /// 启动协调 worker；需在 tokio runtime 内调用
    pub fn start(&self) {
        self.coordinator.start();
    }

    pub async fn process_task(
        &self,
        content: &str,
        priority: Priority,
        context: Map<String, Value>,
    ) -> String {
        self.orchestrator.process_task(content, priority, context).await
    }

    pub async fn process(&self, request: TaskRequest) -> String {
        self.orchestrator.process(request).await
    }

    /// 返回完整运行状态（路由结果、各 handler 结果、最终文本）
    pub async fn run(&self, request: TaskRequest) -> OrchestrationRun {
        self.orchestrator.run(request).await
    }

    pub fn coordinate_task<F>(
        &self,
        task_id: impl Into<String>,
        work: F,
        priority: Priority,
    ) -> Result<(), CoordinationError>
    where
        F: Future<Output = WorkResult> + Send + 'static,
    {
        self.coordinator.coordinate_task(task_id, work, priority)
    }

    /// 把一次完整编排作为协调任务入队；编排失败或 handler 返回 failed 时记为 failed
    pub fn coordinate_request(
        &self,
        task_id: impl Into<String>,
        request: TaskRequest,
    ) -> Result<(), CoordinationError> {
        let orchestrator = Arc::clone(&self.orchestrator);
        let priority = request.priority;
        self.coordinator.coordinate_task(
            task_id,
            async move {
                let run = orchestrator.run(request).await;
                let ok = !run.is_failed();
                let response = run.into_response();
                if ok {
                    Ok(response)
                } else {
                    Err(response)
                }
            },
            priority,
        )
    }

    pub async fn wait_for(&self, task_id: &str) -> Option<CoordinationTask> {
        self.coordinator.wait_for(task_id).await
    }

    pub fn get_system_status(&self) -> SystemStatus {
        SystemStatus {
            master_agent: "active".to_string(),
            available_agents: self.registry.ids(),
            llm_provider: self.llm.provider().to_string(),
            token_usage: self.llm.token_usage(),
            coordination: self.coordinator.get_coordination_status(),
        }
    }

    pub fn get_system_health(&self) -> SystemHealth {
        self.monitor.get_system_health()
    }

    pub fn get_performance_metrics(&self) -> PerformanceMetrics {
        self.monitor.get_performance_metrics()
    }

    pub fn get_recent_tasks(&self, limit: usize) -> Vec<TaskRecord> {
        self.monitor.get_recent_tasks(limit)
    }

    pub fn reset_metrics(&self) {
        self.monitor.reset_metrics();
    }

    pub async fn shutdown(&self) {
        self.coordinator.shutdown().await;
    }

    pub fn registry(&self) -> &AgentRegistry {
        &self.registry
    }

    pub fn monitor(&self) -> &Arc<HealthMonitor> {
        &self.monitor
    }

    pub fn coordinator(&self) -> &Arc<CoordinationManager> {
        &self.coordinator
    }
}

/// 构建器：测试与嵌入方可替换注册表、LLM、分类器或单个 handler
pub struct AgentSystemBuilder {
    config: AppConfig,
    registry: Option<AgentRegistry>,
    llm: Option<Arc<dyn LlmClient>>,
    classifier: Option<Arc<dyn Classifier>>,
    handlers: Vec<Arc<dyn CapabilityHandler>>,
}

impl AgentSystemBuilder {
    pub fn registry(mut self, registry: AgentRegistry) -> Self {
        self.registry = Some(registry);
        self
    }

    pub fn llm(mut self, llm: Arc<dyn LlmClient>) -> Self {
        self.llm = Some(llm);
        self
    }

    pub fn classifier(mut self, classifier: Arc<dyn Classifier>) -> Self {
        self.classifier = Some(classifier);
        self
    }

    /// 显式注册的 handler 优先于内置 specialist
    pub fn handler(mut self, handler: Arc<dyn CapabilityHandler>) -> Self {
        self.handlers.push(handler);
        self
    }

    pub fn build(self) -> Result<AgentSystem, RegistryError> {
        let registry = match self.registry {
            Some(r) => r,
            None => AgentRegistry::from_specs(self.config.agents.clone())?,
        };
        let llm = self
            .llm
            .unwrap_or_else(|| create_llm_from_config(&self.config));
        let default_handler = self.config.orchestrator.default_handler.clone();
        let classifier = self
            .classifier
            .unwrap_or_else(|| create_classifier(&llm, &default_handler));

        let mut handlers = HandlerSet::new();
        for handler in self.handlers {
            handlers.register(&registry, handler)?;
        }
        register_builtin_handlers(&mut handlers, &registry, Arc::clone(&llm))?;

        let registry = Arc::new(registry);
        let monitor = Arc::new(HealthMonitor::from_config(&self.config.monitor));
        let orchestrator = Orchestrator::new(
            Arc::clone(&registry),
            handlers,
            classifier,
            Arc::clone(&monitor),
            default_handler,
        )?;
        let coordinator = CoordinationManager::new(self.config.coordination.clone());

        tracing::info!(
            "Agent system ready: {} agents, llm provider {}",
            registry.len(),
            llm.provider()
        );

        Ok(AgentSystem {
            registry,
            llm,
            orchestrator: Arc::new(orchestrator),
            monitor,
            coordinator: Arc::new(coordinator),
        })
    }
}
