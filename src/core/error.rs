//! 编排层错误类型
//!
//! OrchestrationError 描述单次编排运行的失败阶段；RegistryError 只在启动注册时出现；
//! CoordinationError 由协调管理器的提交接口返回。

use thiserror::Error;

/// 单次编排运行中的失败（最终都折叠为 `"Error: ..."` 文本返回给调用方）
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum OrchestrationError {
    /// 分类器不可达或返回错误，任务未到达任何 handler
    #[error("Routing error: {0}")]
    Routing(String),

    /// 路由结果没有对应的 handler（注册表与 handler 集不一致时才会出现）
    #[error("Unknown handler: {0}")]
    UnknownHandler(String),

    /// handler 执行时返回 Err 或 panic
    #[error("Execution error: {0}")]
    Execution(String),
}

/// 启动阶段的注册校验错误
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RegistryError {
    #[error("Duplicate agent id: {0}")]
    Duplicate(String),

    /// handler 的类型不在注册表中
    #[error("Handler not in registry: {0}")]
    Unregistered(String),

    /// 注册表中的 agent 没有对应 handler
    #[error("No handler registered for agent: {0}")]
    Missing(String),

    #[error("Default handler not in registry: {0}")]
    UnknownDefault(String),
}

/// 协调管理器提交失败
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CoordinationError {
    #[error("At capacity: {active} active tasks (limit {limit})")]
    AtCapacity { active: usize, limit: usize },

    #[error("Task already active: {0}")]
    Duplicate(String),

    #[error("Coordination manager is shut down")]
    ShutDown,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_orchestration_error_display() {
        let err = OrchestrationError::Routing("timeout".to_string());
        assert_eq!(err.to_string(), "Routing error: timeout");
        let err = OrchestrationError::Execution("boom".to_string());
        assert_eq!(format!("Error: {err}"), "Error: Execution error: boom");
    }

    #[test]
    fn test_capacity_error_display() {
        let err = CoordinationError::AtCapacity { active: 10, limit: 10 };
        assert!(err.to_string().contains("limit 10"));
    }
}
