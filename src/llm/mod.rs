//! LLM 层：客户端抽象与实现（OpenAI 兼容 / DeepSeek / Mock）以及路由分类器

pub mod mock;
pub mod openai;
pub mod router;
pub mod traits;

use std::sync::Arc;

use crate::config::AppConfig;

pub use mock::MockLlmClient;
pub use openai::{OpenAiClient, Sampling, DEEPSEEK_BASE_URL, DEEPSEEK_CHAT};
pub use router::{Classifier, KeywordClassifier, LlmClassifier, NO_MATCH};
pub use traits::{LlmClient, Message, Role, TokenUsage};

/// 根据配置与环境变量选择 LLM 后端（DeepSeek / OpenAI 兼容 / Mock）
pub fn create_llm_from_config(cfg: &AppConfig) -> Arc<dyn LlmClient> {
    let provider = cfg.llm.provider.to_lowercase();
    let sampling = Sampling {
        temperature: cfg.llm.temperature,
        max_tokens: cfg.llm.max_tokens,
    };

    match provider.as_str() {
        "deepseek" => {
            let key = std::env::var("DEEPSEEK_API_KEY")
                .or_else(|_| std::env::var("OPENAI_API_KEY"));
            match key {
                Ok(key) => {
                    let client = OpenAiClient::deepseek(cfg.llm.model.as_deref(), &key)
                        .with_sampling(sampling);
                    tracing::info!("Using DeepSeek LLM");
                    Arc::new(client)
                }
                Err(_) => {
                    tracing::warn!("DEEPSEEK_API_KEY not set, using Mock LLM");
                    Arc::new(MockLlmClient)
                }
            }
        }
        "openai" => match std::env::var("OPENAI_API_KEY") {
            Ok(key) => {
                let model = cfg.llm.model.clone().unwrap_or_else(|| "gpt-4o-mini".to_string());
                tracing::info!("Using OpenAI LLM ({})", model);
                Arc::new(
                    OpenAiClient::new(cfg.llm.base_url.as_deref(), &model, &key)
                        .with_sampling(sampling),
                )
            }
            Err(_) => {
                tracing::warn!("OPENAI_API_KEY not set, using Mock LLM");
                Arc::new(MockLlmClient)
            }
        },
        "mock" => Arc::new(MockLlmClient),
        other => {
            tracing::warn!("Unknown LLM provider '{}', using Mock LLM", other);
            Arc::new(MockLlmClient)
        }
    }
}

/// 选择分类器：真实 LLM 用 LlmClassifier，Mock 时用关键词分类器
pub fn create_classifier(llm: &Arc<dyn LlmClient>, default_handler: &str) -> Arc<dyn Classifier> {
    if llm.provider() == "mock" {
        Arc::new(KeywordClassifier::new())
    } else {
        Arc::new(LlmClassifier::new(Arc::clone(llm), default_handler))
    }
}
