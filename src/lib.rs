//! Conductor - 多智能体任务编排
//!
//! 模块划分：
//! - **agents**: agent 注册表、capability handler 抽象与内置 specialist
//! - **config**: 应用配置加载（TOML + 环境变量）
//! - **core**: 任务模型、编排状态机、并发协调管理器、优雅关闭
//! - **llm**: LLM 客户端抽象与实现（OpenAI 兼容 / DeepSeek / Mock）与路由分类器
//! - **monitor**: 任务历史、handler 级与系统级指标、健康结论
//! - **observability**: tracing 初始化
//! - **system**: 组合根 AgentSystem

pub mod agents;
pub mod config;
pub mod core;
pub mod llm;
pub mod monitor;
pub mod observability;
pub mod system;

pub use system::{AgentSystem, AgentSystemBuilder, SystemStatus, DEMO_TASKS};
