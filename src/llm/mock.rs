//! Mock LLM 客户端（用于测试与离线运行，无需 API）
//!
//! 取最后一条 User 消息，给出确定性的回复，便于本地跑通编排流程。

use async_trait::async_trait;

use crate::llm::{LlmClient, Message, Role};

/// Mock 客户端：回显用户最后一条消息
#[derive(Debug, Default)]
pub struct MockLlmClient;

#[async_trait]
impl LlmClient for MockLlmClient {
    async fn complete(&self, messages: &[Message]) -> Result<String, String> {
        let last_user = messages
            .iter()
            .rev()
            .find(|m| m.role == Role::User)
            .map(|m| m.content.as_str())
            .unwrap_or("(no input)");

        let first_line = last_user.lines().find(|l| !l.trim().is_empty()).unwrap_or("");
        Ok(format!("[mock] Acknowledged: {}", first_line.trim()))
    }

    fn provider(&self) -> &str {
        "mock"
    }
}
