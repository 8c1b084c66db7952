//! 编排 + 监控 + 协调的端到端测试（脚本化分类器与 handler，不访问网络）

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use std::time::Duration;

    use async_trait::async_trait;
    use chrono::DateTime;
    use conductor::agents::{AgentRegistry, Candidate, CapabilityHandler};
    use conductor::config::AppConfig;
    use conductor::core::{
        CoordinationError, HandlerResult, Priority, RunPhase, TaskRequest, TaskStatus,
    };
    use conductor::llm::{Classifier, MockLlmClient};
    use conductor::monitor::EntryStatus;
    use conductor::AgentSystem;
    use serde_json::Map;

    /// 固定返回同一段文本（或错误）的分类器
    struct ScriptedClassifier(Result<String, String>);

    #[async_trait]
    impl Classifier for ScriptedClassifier {
        async fn classify(
            &self,
            _task: &TaskRequest,
            _candidates: &[Candidate],
        ) -> Result<String, String> {
            self.0.clone()
        }
    }

    /// 把任务内容原样作为路由结果
    struct EchoClassifier;

    #[async_trait]
    impl Classifier for EchoClassifier {
        async fn classify(
            &self,
            task: &TaskRequest,
            _candidates: &[Candidate],
        ) -> Result<String, String> {
            Ok(task.content.clone())
        }
    }

    struct FixedHandler {
        id: &'static str,
        reply: HandlerResult,
        calls: AtomicUsize,
    }

    impl FixedHandler {
        fn new(id: &'static str, reply: HandlerResult) -> Arc<Self> {
            Arc::new(Self {
                id,
                reply,
                calls: AtomicUsize::new(0),
            })
        }
    }

    #[async_trait]
    impl CapabilityHandler for FixedHandler {
        fn handler_type(&self) -> &str {
            self.id
        }

        async fn execute(&self, _task: &TaskRequest) -> Result<HandlerResult, String> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(self.reply.clone())
        }
    }

    fn config() -> AppConfig {
        let mut cfg = AppConfig::default();
        cfg.llm.provider = "mock".to_string();
        cfg.coordination.shutdown_grace_secs = 1;
        cfg
    }

    fn system_with(classifier: Arc<dyn Classifier>) -> AgentSystem {
        AgentSystem::builder(config())
            .llm(Arc::new(MockLlmClient))
            .classifier(classifier)
            .build()
            .unwrap()
    }

    #[tokio::test]
    async fn test_exact_identifier_routes_in_any_case() {
        let system = system_with(Arc::new(EchoClassifier));
        for id in AgentRegistry::builtin().ids() {
            for text in [id.clone(), id.to_uppercase()] {
                let run = system.run(TaskRequest::new(text)).await;
                assert_eq!(run.routing_decision.as_deref(), Some(id.as_str()));
                assert!(!run.routing_ambiguous);
            }
        }
    }

    #[tokio::test]
    async fn test_unknown_reply_falls_back_and_completes() {
        let system = system_with(Arc::new(ScriptedClassifier(Ok("no clue".to_string()))));
        let run = system.run(TaskRequest::new("something")).await;
        assert!(run.routing_ambiguous);
        assert_eq!(run.routing_decision.as_deref(), Some("code_generation"));
        assert_eq!(run.phase, RunPhase::Done);
        assert!(!run.into_response().starts_with("Error:"));
    }

    #[tokio::test]
    async fn test_code_generation_end_to_end() {
        let handler = FixedHandler::new(
            "code_generation",
            HandlerResult::completed("code_generation", "def sort(items): return sorted(items)"),
        );
        let system = AgentSystem::builder(config())
            .llm(Arc::new(MockLlmClient))
            .classifier(Arc::new(ScriptedClassifier(Ok("code_generation".to_string()))))
            .handler(handler.clone())
            .build()
            .unwrap();

        let before = system.monitor().system_metrics().successful_requests;
        let response = system
            .process_task("generate a sorting function", Priority::Medium, Map::new())
            .await;

        assert_eq!(response, "def sort(items): return sorted(items)");
        assert_eq!(handler.calls.load(Ordering::SeqCst), 1);
        assert_eq!(system.monitor().system_metrics().successful_requests, before + 1);
        let code = system.monitor().agent_metrics("code_generation").unwrap();
        assert_eq!(code.total_tasks, 1);
        assert_eq!(code.error_rate, 0.0);
    }

    #[tokio::test]
    async fn test_failed_handler_status_surfaces_as_text() {
        let handler = FixedHandler::new(
            "deployment",
            HandlerResult::failed("deployment", "cluster unreachable"),
        );
        let system = AgentSystem::builder(config())
            .llm(Arc::new(MockLlmClient))
            .classifier(Arc::new(ScriptedClassifier(Ok("deployment".to_string()))))
            .handler(handler)
            .build()
            .unwrap();

        let response = system
            .process_task("ship it", Priority::High, Map::new())
            .await;
        assert_eq!(response, "Task failed: cluster unreachable");

        let m = system.monitor().system_metrics();
        assert_eq!(m.failed_requests, 1);
        let recent = system.get_recent_tasks(1);
        assert_eq!(recent[0].status, EntryStatus::Failed);
        assert_eq!(recent[0].error.as_deref(), Some("cluster unreachable"));
    }

    #[tokio::test]
    async fn test_oracle_timeout_is_routing_failure() {
        let system = system_with(Arc::new(ScriptedClassifier(Err(
            "request timed out".to_string(),
        ))));
        let before = system.monitor().system_metrics();

        let response = system
            .process_task("generate a sorting function", Priority::Medium, Map::new())
            .await;

        assert!(response.starts_with("Error:"), "{response}");
        let after = system.monitor().system_metrics();
        assert_eq!(after.failed_requests, before.failed_requests);
        assert_eq!(after.total_requests, before.total_requests);
        assert_eq!(after.routing_failures, before.routing_failures + 1);
        assert!(system.get_recent_tasks(10).is_empty());
    }

    #[tokio::test]
    async fn test_recent_tasks_newest_first() {
        let system = system_with(Arc::new(ScriptedClassifier(Ok("marketing_automation".to_string()))));
        for i in 0..15 {
            system
                .process_task(&format!("campaign {i}"), Priority::Low, Map::new())
                .await;
        }

        let recent = system.get_recent_tasks(5);
        assert_eq!(recent.len(), 5);
        assert_eq!(recent[0].task_content, "campaign 14");
        let starts: Vec<_> = recent
            .iter()
            .map(|r| DateTime::parse_from_rfc3339(&r.start_time).unwrap())
            .collect();
        assert!(starts.windows(2).all(|w| w[0] >= w[1]));
        assert!(recent.iter().all(|r| r.end_time.is_some()));
    }

    #[tokio::test]
    async fn test_unknown_completion_is_ignored() {
        let system = system_with(Arc::new(EchoClassifier));
        system
            .monitor()
            .record_task_completion("task_ghost", false, 1.0, Some("nope"));
        let m = system.monitor().system_metrics();
        assert_eq!(m.total_requests, 0);
        assert_eq!(m.failed_requests, 0);
        assert!(m.agent_metrics.is_empty());
    }

    #[tokio::test]
    async fn test_coordinate_request_records_failure() {
        let system = system_with(Arc::new(ScriptedClassifier(Err("offline".to_string()))));
        system.start();
        system
            .coordinate_request("req_1", TaskRequest::new("anything"))
            .unwrap();

        let task = system.wait_for("req_1").await.unwrap();
        assert_eq!(task.status, TaskStatus::Failed);
        assert_eq!(task.error.as_deref(), Some("Error: Routing error: offline"));
        system.shutdown().await;
    }

    #[tokio::test]
    async fn test_shutdown_with_slow_units() {
        let system = system_with(Arc::new(EchoClassifier));
        system.start();
        for i in 0..5 {
            system
                .coordinate_task(
                    format!("slow_{i}"),
                    async {
                        tokio::time::sleep(Duration::from_secs(60)).await;
                        Ok("late".to_string())
                    },
                    Priority::Medium,
                )
                .unwrap();
        }

        tokio::time::timeout(Duration::from_secs(5), system.shutdown())
            .await
            .expect("shutdown exceeded grace period");

        let status = system.get_system_status().coordination;
        assert_eq!(status.worker_tasks, 0);
        assert_eq!(status.active_tasks, 0);
        for i in 0..5 {
            let task = system.coordinator().get_task(&format!("slow_{i}")).unwrap();
            assert_eq!(task.status, TaskStatus::Failed);
        }
        assert_eq!(
            system.coordinate_task("late", async { Ok(String::new()) }, Priority::Low),
            Err(CoordinationError::ShutDown)
        );
    }
}
