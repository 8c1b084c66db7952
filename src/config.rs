//! 应用配置：从 config/default.toml 与环境变量加载
//!
//! 加载顺序：先读 TOML 文件，再用环境变量 `CONDUCTOR__*` 覆盖
//! （双下划线表示嵌套，如 `CONDUCTOR__COORDINATION__WORKERS=4`）。

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::agents::AgentSpec;

/// 应用配置根（对应 config/default.toml 的顶层）
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct AppConfig {
    pub app: AppSection,
    pub llm: LlmSection,
    pub orchestrator: OrchestratorSection,
    pub coordination: CoordinationSection,
    pub monitor: MonitorSection,
    /// [[agents]]：为空时使用内置注册表
    pub agents: Vec<AgentSpec>,
}

/// [app] 段
#[derive(Debug, Clone, Deserialize, Default)]
pub struct AppSection {
    pub name: Option<String>,
}

/// [llm] 段：后端选择与采样参数
#[derive(Debug, Clone, Deserialize)]
pub struct LlmSection {
    /// deepseek / openai / mock；无 API Key 时一律回落 mock
    #[serde(default = "default_provider")]
    pub provider: String,
    pub model: Option<String>,
    pub base_url: Option<String>,
    #[serde(default = "default_temperature")]
    pub temperature: f32,
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,
}

fn default_provider() -> String {
    "mock".to_string()
}

fn default_temperature() -> f32 {
    0.7
}

fn default_max_tokens() -> u32 {
    4000
}

impl Default for LlmSection {
    fn default() -> Self {
        Self {
            provider: default_provider(),
            model: None,
            base_url: None,
            temperature: default_temperature(),
            max_tokens: default_max_tokens(),
        }
    }
}

/// [orchestrator] 段
#[derive(Debug, Clone, Deserialize)]
pub struct OrchestratorSection {
    /// 分类结果无法识别时回落的 handler
    #[serde(default = "default_handler")]
    pub default_handler: String,
}

fn default_handler() -> String {
    "code_generation".to_string()
}

impl Default for OrchestratorSection {
    fn default() -> Self {
        Self {
            default_handler: default_handler(),
        }
    }
}

/// 超过软上限时的处理策略
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum CapacityPolicy {
    /// 仅记录告警，照常入队
    #[default]
    Warn,
    /// 拒绝提交
    Reject,
}

/// [coordination] 段：worker 数、软上限、保留条数
#[derive(Debug, Clone, Deserialize)]
pub struct CoordinationSection {
    #[serde(default = "default_workers")]
    pub workers: usize,
    #[serde(default = "default_max_concurrent_tasks")]
    pub max_concurrent_tasks: usize,
    #[serde(default)]
    pub capacity_policy: CapacityPolicy,
    /// 已结束任务最多保留条数
    #[serde(default = "default_retention")]
    pub retention: usize,
    #[serde(default = "default_shutdown_grace_secs")]
    pub shutdown_grace_secs: u64,
}

fn default_workers() -> usize {
    3
}

fn default_max_concurrent_tasks() -> usize {
    10
}

fn default_retention() -> usize {
    1000
}

fn default_shutdown_grace_secs() -> u64 {
    5
}

impl Default for CoordinationSection {
    fn default() -> Self {
        Self {
            workers: default_workers(),
            max_concurrent_tasks: default_max_concurrent_tasks(),
            capacity_policy: CapacityPolicy::default(),
            retention: default_retention(),
            shutdown_grace_secs: default_shutdown_grace_secs(),
        }
    }
}

/// [monitor] 段
#[derive(Debug, Clone, Deserialize)]
pub struct MonitorSection {
    #[serde(default = "default_history_capacity")]
    pub history_capacity: usize,
    /// get_system_health 中 recent_tasks 的统计窗口（秒）
    #[serde(default = "default_recent_window_secs")]
    pub recent_window_secs: u64,
}

fn default_history_capacity() -> usize {
    1000
}

fn default_recent_window_secs() -> u64 {
    300
}

impl Default for MonitorSection {
    fn default() -> Self {
        Self {
            history_capacity: default_history_capacity(),
            recent_window_secs: default_recent_window_secs(),
        }
    }
}

/// 从 config 目录加载配置，环境变量 CONDUCTOR__* 可覆盖
///
/// 1. 按顺序查找 config/default.toml、../config/default.toml、default.toml，找到则作为第一源
/// 2. 若传入 config_path 且文件存在，则追加该文件（可覆盖前面的键）
/// 3. 最后叠加环境变量 CONDUCTOR__*（双下划线表示嵌套键）
pub fn load_config(config_path: Option<PathBuf>) -> Result<AppConfig, config::ConfigError> {
    let mut builder = config::Config::builder();

    let default_names = ["config/default", "../config/default", "default"];
    for name in default_names {
        let path = format!("{}.toml", name);
        if std::path::Path::new(&path).exists() {
            builder = builder.add_source(config::File::with_name(name).required(false));
            break;
        }
    }

    if let Some(ref path) = config_path {
        if path.exists() {
            builder = builder.add_source(config::File::from(path.clone()).required(false));
        }
    }

    builder = builder.add_source(
        config::Environment::with_prefix("CONDUCTOR")
            .separator("__")
            .try_parsing(true),
    );

    builder.build()?.try_deserialize()
}

/// 加载失败（文件格式错误、环境变量类型不符等）时告警并回落默认配置
pub fn load_config_or_default(config_path: Option<PathBuf>) -> AppConfig {
    load_config(config_path).unwrap_or_else(|e| {
        tracing::warn!("Config load failed ({}), using defaults", e);
        AppConfig::default()
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_defaults() {
        let cfg = AppConfig::default();
        assert_eq!(cfg.coordination.workers, 3);
        assert_eq!(cfg.coordination.max_concurrent_tasks, 10);
        assert_eq!(cfg.coordination.capacity_policy, CapacityPolicy::Warn);
        assert_eq!(cfg.monitor.history_capacity, 1000);
        assert_eq!(cfg.monitor.recent_window_secs, 300);
        assert_eq!(cfg.orchestrator.default_handler, "code_generation");
        assert!(cfg.agents.is_empty());
    }

    #[test]
    fn test_load_from_file() {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        writeln!(
            file,
            r#"
[coordination]
workers = 5
capacity_policy = "reject"

[monitor]
history_capacity = 50

[[agents]]
id = "translation"
name = "Translation Agent"
responsibilities = ["Translate documents"]
"#
        )
        .unwrap();

        let cfg = load_config(Some(file.path().to_path_buf())).unwrap();
        assert_eq!(cfg.coordination.workers, 5);
        assert_eq!(cfg.coordination.capacity_policy, CapacityPolicy::Reject);
        assert_eq!(cfg.coordination.max_concurrent_tasks, 10);
        assert_eq!(cfg.monitor.history_capacity, 50);
        assert_eq!(cfg.agents.len(), 1);
        assert_eq!(cfg.agents[0].id, "translation");
    }

    #[test]
    fn test_invalid_config_falls_back_to_defaults() {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        writeln!(file, "[coordination]\nworkers = \"lots\"").unwrap();

        assert!(load_config(Some(file.path().to_path_buf())).is_err());
        let cfg = load_config_or_default(Some(file.path().to_path_buf()));
        assert_eq!(cfg.coordination.workers, 3);
        assert_eq!(cfg.llm.provider, "mock");
    }
}
