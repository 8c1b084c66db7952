//! 分类器（路由 oracle）
//!
//! 把任务描述映射为 handler id 文本：
//! - LlmClassifier：构造路由 prompt，让模型只回答一个 agent id
//! - KeywordClassifier：离线关键词打分，无需 API
//!
//! 返回的是自由文本，解析（精确匹配 / 子串匹配 / 回落默认）由编排器负责。

use std::sync::Arc;

use async_trait::async_trait;

use crate::agents::Candidate;
use crate::core::TaskRequest;
use crate::llm::{LlmClient, Message};

/// 分类 oracle
#[async_trait]
pub trait Classifier: Send + Sync {
    async fn classify(&self, task: &TaskRequest, candidates: &[Candidate]) -> Result<String, String>;
}

/// 基于 LLM 的分类器
pub struct LlmClassifier {
    llm: Arc<dyn LlmClient>,
    default_handler: String,
}

impl LlmClassifier {
    pub fn new(llm: Arc<dyn LlmClient>, default_handler: impl Into<String>) -> Self {
        Self {
            llm,
            default_handler: default_handler.into(),
        }
    }

    fn routing_prompt(&self, task: &TaskRequest, candidates: &[Candidate]) -> String {
        let agents = candidates
            .iter()
            .map(|c| format!("- {}: {}", c.id, c.description))
            .collect::<Vec<_>>()
            .join("\n");
        let context = task.context_json().unwrap_or_else(|| "{}".to_string());

        format!(
            "You are a Master Agent responsible for routing tasks to specialist agents.\n\n\
             Available Agents:\n{agents}\n\n\
             Task Details:\n- Content: {}\n- Priority: {}\n- Context: {context}\n\n\
             Instructions:\n\
             1. Analyze the task request carefully\n\
             2. Consider which specialist agent is best suited for this task\n\
             3. Choose exactly ONE agent type from the available options\n\
             4. Respond with ONLY the agent type (e.g. \"{}\")\n\n\
             If the task doesn't clearly fit any agent, choose the most appropriate one or \"{}\" as default.",
            task.content,
            task.priority,
            candidates.first().map(|c| c.id.as_str()).unwrap_or("agent_id"),
            self.default_handler,
        )
    }
}

#[async_trait]
impl Classifier for LlmClassifier {
    async fn classify(&self, task: &TaskRequest, candidates: &[Candidate]) -> Result<String, String> {
        let messages = [
            Message::system(self.routing_prompt(task, candidates)),
            Message::user(task.content.clone()),
        ];
        self.llm.complete(&messages).await
    }
}

/// 关键词分类器：按命中关键词数打分，平分时取候选顺序靠前者
#[derive(Debug, Default)]
pub struct KeywordClassifier;

/// 未命中任何关键词时的输出（不对应任何 id，会触发回落）
pub const NO_MATCH: &str = "unknown";

impl KeywordClassifier {
    pub fn new() -> Self {
        Self
    }

    fn builtin_keywords(id: &str) -> &'static [&'static str] {
        match id {
            "code_generation" => &[
                "code", "function", "class", "implement", "refactor", "debug", "bug", "script",
                "python", "rust", "javascript", "typescript", "sql", "api", "algorithm", "sort",
                "代码", "函数", "编程",
            ],
            "deployment" => &[
                "deploy", "release", "production", "ci/cd", "pipeline", "docker", "kubernetes",
                "rollback", "server", "infrastructure", "aws", "部署", "上线",
            ],
            "business_intelligence" => &[
                "analyze", "analysis", "metrics", "kpi", "report", "dashboard", "sales",
                "revenue", "insight", "data", "trend", "forecast", "分析", "报表",
            ],
            "customer_operations" => &[
                "customer", "support", "ticket", "log in", "login", "account", "refund",
                "onboarding", "complaint", "help a", "客户", "客服",
            ],
            "marketing_automation" => &[
                "marketing", "campaign", "social media", "newsletter", "seo", "brand", "launch",
                "content", "audience", "ad ", "营销", "推广",
            ],
            _ => &[],
        }
    }

    /// 计算某个候选的得分
    pub fn score(content: &str, candidate: &Candidate) -> usize {
        let content = content.to_lowercase();
        let builtin = Self::builtin_keywords(&candidate.id)
            .iter()
            .filter(|k| content.contains(*k))
            .count();
        let from_id = candidate
            .id
            .split(|c: char| c == '_' || c == '-')
            .filter(|w| w.len() >= 4)
            .filter(|w| content.contains(*w))
            .count();
        builtin + from_id
    }
}

#[async_trait]
impl Classifier for KeywordClassifier {
    async fn classify(&self, task: &TaskRequest, candidates: &[Candidate]) -> Result<String, String> {
        let mut best: Option<(&Candidate, usize)> = None;
        for candidate in candidates {
            let score = Self::score(&task.content, candidate);
            if score > 0 && best.map_or(true, |(_, s)| score > s) {
                best = Some((candidate, score));
            }
        }
        Ok(best
            .map(|(c, _)| c.id.clone())
            .unwrap_or_else(|| NO_MATCH.to_string()))
    }
}
