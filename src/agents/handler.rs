//! Capability handler 抽象与 HandlerSet
//!
//! 每个注册表 id 对应一个实现 CapabilityHandler 的 handler，启动时显式注册；
//! 未知类型在注册时拒绝，而不是等到分派时才发现。

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;

use crate::agents::AgentRegistry;
use crate::core::{HandlerResult, RegistryError, TaskRequest};

/// 执行某一类任务的 handler
///
/// 预期内的业务失败应返回 `Ok(HandlerResult { status: Failed, .. })`；
/// `Err` 仅用于不可恢复的情况。
#[async_trait]
pub trait CapabilityHandler: Send + Sync {
    /// 对应注册表中的 agent id
    fn handler_type(&self) -> &str;

    async fn execute(&self, task: &TaskRequest) -> Result<HandlerResult, String>;
}

/// 按 id 存储的 handler 集合
#[derive(Default, Clone)]
pub struct HandlerSet {
    handlers: HashMap<String, Arc<dyn CapabilityHandler>>,
}

impl HandlerSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// 注册 handler；类型必须存在于注册表且未被注册过
    pub fn register(
        &mut self,
        registry: &AgentRegistry,
        handler: Arc<dyn CapabilityHandler>,
    ) -> Result<(), RegistryError> {
        let id = handler.handler_type().trim().to_lowercase();
        if !registry.contains(&id) {
            return Err(RegistryError::Unregistered(id));
        }
        if self.handlers.contains_key(&id) {
            return Err(RegistryError::Duplicate(id));
        }
        self.handlers.insert(id, handler);
        Ok(())
    }

    /// 确认注册表中每个 agent 都有 handler
    pub fn validate(&self, registry: &AgentRegistry) -> Result<(), RegistryError> {
        match registry.ids().into_iter().find(|id| !self.handlers.contains_key(id)) {
            Some(missing) => Err(RegistryError::Missing(missing)),
            None => Ok(()),
        }
    }

    pub fn get(&self, id: &str) -> Option<Arc<dyn CapabilityHandler>> {
        self.handlers.get(&id.trim().to_lowercase()).cloned()
    }

    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agents::AgentSpec;

    struct Fixed(&'static str);

    #[async_trait]
    impl CapabilityHandler for Fixed {
        fn handler_type(&self) -> &str {
            self.0
        }

        async fn execute(&self, _task: &TaskRequest) -> Result<HandlerResult, String> {
            Ok(HandlerResult::completed(self.0, "ok"))
        }
    }

    fn registry() -> AgentRegistry {
        let mut r = AgentRegistry::new();
        r.register(AgentSpec::new("alpha", "Alpha")).unwrap();
        r.register(AgentSpec::new("beta", "Beta")).unwrap();
        r
    }

    #[test]
    fn test_register_unknown_type_rejected() {
        let mut set = HandlerSet::new();
        let err = set.register(&registry(), Arc::new(Fixed("gamma"))).unwrap_err();
        assert_eq!(err, RegistryError::Unregistered("gamma".to_string()));
    }

    #[test]
    fn test_register_duplicate_rejected() {
        let r = registry();
        let mut set = HandlerSet::new();
        set.register(&r, Arc::new(Fixed("alpha"))).unwrap();
        assert!(matches!(
            set.register(&r, Arc::new(Fixed("alpha"))),
            Err(RegistryError::Duplicate(_))
        ));
    }

    #[test]
    fn test_validate_reports_missing() {
        let r = registry();
        let mut set = HandlerSet::new();
        set.register(&r, Arc::new(Fixed("alpha"))).unwrap();
        assert_eq!(
            set.validate(&r).unwrap_err(),
            RegistryError::Missing("beta".to_string())
        );
        set.register(&r, Arc::new(Fixed("beta"))).unwrap();
        assert!(set.validate(&r).is_ok());
        assert!(set.get("ALPHA").is_some());
    }
}
