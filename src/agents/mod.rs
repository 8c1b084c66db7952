//! Agent 层：注册表、capability handler 抽象与内置 specialist

pub mod handler;
pub mod registry;
pub mod specialist;

use std::sync::Arc;

use crate::core::RegistryError;
use crate::llm::LlmClient;

pub use handler::{CapabilityHandler, HandlerSet};
pub use registry::{AgentRegistry, AgentSpec, Candidate};
pub use specialist::{SpecialistAgent, SpecialistKind};

/// 为注册表中的内置 agent 创建 specialist handler；非内置 id 需调用方自行注册
pub fn builtin_handlers(
    registry: &AgentRegistry,
    llm: Arc<dyn LlmClient>,
) -> Result<HandlerSet, RegistryError> {
    let mut set = HandlerSet::new();
    register_builtin_handlers(&mut set, registry, llm)?;
    Ok(set)
}

/// 补齐尚无 handler 的内置 agent；已注册的 id 保持不变
pub fn register_builtin_handlers(
    set: &mut HandlerSet,
    registry: &AgentRegistry,
    llm: Arc<dyn LlmClient>,
) -> Result<(), RegistryError> {
    for spec in registry.iter() {
        if set.get(&spec.id).is_some() {
            continue;
        }
        if let Some(kind) = SpecialistKind::from_id(&spec.id) {
            set.register(
                registry,
                Arc::new(SpecialistAgent::new(kind, spec.clone(), Arc::clone(&llm))),
            )?;
        }
    }
    Ok(())
}
