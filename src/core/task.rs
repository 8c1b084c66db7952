//! 任务请求与 handler 结果

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// 任务优先级
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    Low,
    Medium,
    High,
}

impl Default for Priority {
    fn default() -> Self {
        Self::Medium
    }
}

impl Priority {
    pub fn as_str(&self) -> &'static str {
        match self {
            Priority::Low => "low",
            Priority::Medium => "medium",
            Priority::High => "high",
        }
    }
}

impl fmt::Display for Priority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Priority {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "low" => Ok(Priority::Low),
            "medium" => Ok(Priority::Medium),
            "high" => Ok(Priority::High),
            other => Err(format!("invalid priority '{other}' (expected high, medium or low)")),
        }
    }
}

/// 不可变的任务请求；task_id 由协调层 / 监控层在外部附加
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskRequest {
    pub content: String,
    #[serde(default)]
    pub priority: Priority,
    #[serde(default)]
    pub context: Map<String, Value>,
    #[serde(default = "default_requester")]
    pub requester: String,
}

fn default_requester() -> String {
    "user".to_string()
}

impl TaskRequest {
    pub fn new(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            priority: Priority::default(),
            context: Map::new(),
            requester: default_requester(),
        }
    }

    pub fn with_priority(mut self, priority: Priority) -> Self {
        self.priority = priority;
        self
    }

    pub fn with_context(mut self, context: Map<String, Value>) -> Self {
        self.context = context;
        self
    }

    pub fn with_requester(mut self, requester: impl Into<String>) -> Self {
        self.requester = requester.into();
        self
    }

    /// context 的紧凑 JSON 表示，空时返回 None
    pub fn context_json(&self) -> Option<String> {
        if self.context.is_empty() {
            None
        } else {
            Some(Value::Object(self.context.clone()).to_string())
        }
    }
}

/// handler 执行结果状态
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HandlerStatus {
    Completed,
    Failed,
}

impl HandlerStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            HandlerStatus::Completed => "completed",
            HandlerStatus::Failed => "failed",
        }
    }
}

/// handler 对一个任务的唯一产出
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HandlerResult {
    pub handler_type: String,
    pub content: String,
    pub status: HandlerStatus,
    #[serde(default)]
    pub metadata: Map<String, Value>,
}

impl HandlerResult {
    pub fn completed(handler_type: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            handler_type: handler_type.into(),
            content: content.into(),
            status: HandlerStatus::Completed,
            metadata: Map::new(),
        }
    }

    pub fn failed(handler_type: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            handler_type: handler_type.into(),
            content: content.into(),
            status: HandlerStatus::Failed,
            metadata: Map::new(),
        }
    }

    pub fn with_metadata(mut self, key: impl Into<String>, value: Value) -> Self {
        self.metadata.insert(key.into(), value);
        self
    }

    pub fn is_completed(&self) -> bool {
        self.status == HandlerStatus::Completed
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_priority_parse() {
        assert_eq!("HIGH".parse::<Priority>().unwrap(), Priority::High);
        assert_eq!(" low ".parse::<Priority>().unwrap(), Priority::Low);
        assert!("urgent".parse::<Priority>().is_err());
    }

    #[test]
    fn test_task_request_defaults() {
        let req: TaskRequest = serde_json::from_str(r#"{"content": "hi"}"#).unwrap();
        assert_eq!(req.priority, Priority::Medium);
        assert_eq!(req.requester, "user");
        assert!(req.context_json().is_none());
    }

    #[test]
    fn test_handler_result_serializes_lowercase_status() {
        let result = HandlerResult::failed("deployment", "no target");
        let json = serde_json::to_value(&result).unwrap();
        assert_eq!(json["status"], "failed");
        assert!(!result.is_completed());
    }
}
