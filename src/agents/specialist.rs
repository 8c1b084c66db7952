//! 内置 specialist handler
//!
//! SpecialistKind 是封闭的五种能力；SpecialistAgent 根据 agent 职责生成 system prompt，
//! 按种类生成任务 prompt 并对模型回复做后处理。模型调用失败视为业务失败（status = failed）。

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::json;

use crate::agents::{AgentSpec, CapabilityHandler};
use crate::core::{HandlerResult, TaskRequest};
use crate::llm::{LlmClient, Message};

/// 内置能力种类
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SpecialistKind {
    CodeGeneration,
    Deployment,
    BusinessIntelligence,
    CustomerOperations,
    MarketingAutomation,
}

impl SpecialistKind {
    pub const ALL: [SpecialistKind; 5] = [
        SpecialistKind::CodeGeneration,
        SpecialistKind::Deployment,
        SpecialistKind::BusinessIntelligence,
        SpecialistKind::CustomerOperations,
        SpecialistKind::MarketingAutomation,
    ];

    pub fn id(&self) -> &'static str {
        match self {
            SpecialistKind::CodeGeneration => "code_generation",
            SpecialistKind::Deployment => "deployment",
            SpecialistKind::BusinessIntelligence => "business_intelligence",
            SpecialistKind::CustomerOperations => "customer_operations",
            SpecialistKind::MarketingAutomation => "marketing_automation",
        }
    }

    pub fn from_id(id: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|k| k.id() == id)
    }

    fn title(&self) -> &'static str {
        match self {
            SpecialistKind::CodeGeneration => "Code Generation Task",
            SpecialistKind::Deployment => "Deployment Task",
            SpecialistKind::BusinessIntelligence => "Business Intelligence Task",
            SpecialistKind::CustomerOperations => "Customer Operations Task",
            SpecialistKind::MarketingAutomation => "Marketing Automation Task",
        }
    }

    fn deliverables(&self) -> (&'static [&'static str], &'static str) {
        match self {
            SpecialistKind::CodeGeneration => (
                &[
                    "Clean, well-commented code",
                    "Error handling where appropriate",
                    "Basic usage examples",
                    "Any necessary dependencies or setup instructions",
                ],
                "Focus on best practices and maintainable code.",
            ),
            SpecialistKind::Deployment => (
                &[
                    "Deployment strategy and steps",
                    "Risk assessment and mitigation",
                    "Rollback procedures",
                    "Monitoring and health checks",
                    "Post-deployment verification steps",
                ],
                "Consider security, scalability, and reliability.",
            ),
            SpecialistKind::BusinessIntelligence => (
                &[
                    "Data analysis approach",
                    "Key metrics and KPIs to track",
                    "Insights and recommendations",
                    "Visualization suggestions",
                    "Action items for improvement",
                ],
                "Focus on actionable business insights.",
            ),
            SpecialistKind::CustomerOperations => (
                &[
                    "Customer-focused solution",
                    "Step-by-step resolution process",
                    "Escalation criteria (if applicable)",
                    "Follow-up actions",
                    "Customer satisfaction measures",
                ],
                "Maintain a helpful and professional tone.",
            ),
            SpecialistKind::MarketingAutomation => (
                &[
                    "Marketing strategy and approach",
                    "Content creation guidelines",
                    "Campaign execution plan",
                    "Success metrics and KPIs",
                    "Optimization recommendations",
                ],
                "Focus on engagement and conversion optimization.",
            ),
        }
    }

    /// 任务 prompt：标题、内容、优先级、context、交付清单
    pub fn task_prompt(&self, task: &TaskRequest) -> String {
        let (items, closing) = self.deliverables();
        let context = task
            .context_json()
            .map(|c| format!("\nContext: {c}"))
            .unwrap_or_default();
        let list = items
            .iter()
            .enumerate()
            .map(|(i, item)| format!("{}. {item}", i + 1))
            .collect::<Vec<_>>()
            .join("\n");

        format!(
            "{}:\n{}\n\nPriority: {}{context}\n\nPlease provide:\n{list}\n\n{closing}",
            self.title(),
            task.content,
            task.priority,
        )
    }

    /// 对模型回复做种类相关的补充
    pub fn post_process(&self, reply: &str) -> String {
        let reply = reply.trim();
        let lower = reply.to_lowercase();
        match self {
            SpecialistKind::CodeGeneration if !reply.contains("```") => {
                format!("Code Generation Response:\n\n{reply}")
            }
            SpecialistKind::Deployment if !lower.contains("checklist") => format!(
                "{reply}\n\n**Deployment Checklist:**\n- [ ] Pre-deployment tests passed\n\
                 - [ ] Security scan completed\n- [ ] Backup created\n- [ ] Monitoring in place\n\
                 - [ ] Rollback plan ready"
            ),
            SpecialistKind::BusinessIntelligence if !lower.contains("summary") => format!(
                "**Executive Summary:**\n[Key findings and recommendations]\n\n{reply}"
            ),
            SpecialistKind::CustomerOperations
                if !reply.starts_with("Dear") && !reply.starts_with("Hello") =>
            {
                format!("Customer Service Response:\n\n{reply}")
            }
            SpecialistKind::MarketingAutomation if !lower.contains("metric") => format!(
                "{reply}\n\n**Key Metrics to Track:**\n- Engagement rate\n- Click-through rate\n\
                 - Conversion rate\n- ROI"
            ),
            _ => reply.to_string(),
        }
    }
}

/// LLM 驱动的 specialist handler
pub struct SpecialistAgent {
    kind: SpecialistKind,
    spec: AgentSpec,
    llm: Arc<dyn LlmClient>,
}

impl SpecialistAgent {
    pub fn new(kind: SpecialistKind, spec: AgentSpec, llm: Arc<dyn LlmClient>) -> Self {
        Self { kind, spec, llm }
    }

    pub fn kind(&self) -> SpecialistKind {
        self.kind
    }

    fn system_prompt(&self) -> String {
        if self.spec.responsibilities.is_empty() {
            return format!(
                "You are a {} agent. Help users with tasks related to your domain.",
                self.spec.id
            );
        }
        let responsibilities = self
            .spec
            .responsibilities
            .iter()
            .map(|r| format!("- {r}"))
            .collect::<Vec<_>>()
            .join("\n");

        format!(
            "You are a {}.\n\nYour responsibilities include:\n{responsibilities}\n\n\
             Always follow these guidelines:\n\
             1. Stay within your domain of expertise\n\
             2. Provide clear, actionable responses\n\
             3. Ask for clarification when needed\n\
             4. Escalate complex issues when appropriate",
            self.spec.display_name()
        )
    }
}

#[async_trait]
impl CapabilityHandler for SpecialistAgent {
    fn handler_type(&self) -> &str {
        self.kind.id()
    }

    async fn execute(&self, task: &TaskRequest) -> Result<HandlerResult, String> {
        let messages = [
            Message::system(self.system_prompt()),
            Message::user(self.kind.task_prompt(task)),
        ];

        match self.llm.complete(&messages).await {
            Ok(reply) => Ok(HandlerResult::completed(self.kind.id(), self.kind.post_process(&reply))
                .with_metadata("task_priority", json!(task.priority.as_str()))
                .with_metadata("context_used", json!(!task.context.is_empty()))),
            Err(e) => {
                tracing::error!("Error in {} task execution: {}", self.kind.id(), e);
                Ok(HandlerResult::failed(self.kind.id(), format!("Error: {e}"))
                    .with_metadata("error", json!(e)))
            }
        }
    }
}
