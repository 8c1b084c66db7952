//! Agent 注册表
//!
//! 静态枚举合法的 handler id 及其描述。保持插入顺序：路由的子串匹配按此顺序取第一个命中。

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::core::RegistryError;

/// 单个 agent 的描述（来自内置 SOP 或配置文件 [[agents]]）
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AgentSpec {
    pub id: String,
    #[serde(default)]
    pub name: String,
    /// 为空时由 responsibilities 生成
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub responsibilities: Vec<String>,
}

impl AgentSpec {
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            description: String::new(),
            responsibilities: Vec::new(),
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn with_responsibilities<I, S>(mut self, items: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.responsibilities = items.into_iter().map(Into::into).collect();
        self
    }

    /// 简短描述：显式描述优先，否则取前三条职责
    pub fn short_description(&self) -> String {
        if !self.description.trim().is_empty() {
            return self.description.clone();
        }
        if self.responsibilities.is_empty() {
            return "General purpose agent".to_string();
        }
        self.responsibilities
            .iter()
            .take(3)
            .cloned()
            .collect::<Vec<_>>()
            .join("; ")
    }

    pub fn display_name(&self) -> &str {
        if self.name.is_empty() {
            &self.id
        } else {
            &self.name
        }
    }
}

/// 提供给分类器的候选项
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Candidate {
    pub id: String,
    pub description: String,
}

/// 有序注册表：id 统一小写存储
#[derive(Debug, Clone, Default)]
pub struct AgentRegistry {
    agents: Vec<AgentSpec>,
    index: HashMap<String, usize>,
}

impl AgentRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// 从配置条目构建；空列表时使用内置注册表
    pub fn from_specs(specs: Vec<AgentSpec>) -> Result<Self, RegistryError> {
        if specs.is_empty() {
            return Ok(Self::builtin());
        }
        let mut registry = Self::new();
        for spec in specs {
            registry.register(spec)?;
        }
        Ok(registry)
    }

    pub fn register(&mut self, mut spec: AgentSpec) -> Result<(), RegistryError> {
        spec.id = spec.id.trim().to_lowercase();
        if self.index.contains_key(&spec.id) {
            return Err(RegistryError::Duplicate(spec.id));
        }
        self.index.insert(spec.id.clone(), self.agents.len());
        self.agents.push(spec);
        Ok(())
    }

    pub fn get(&self, id: &str) -> Option<&AgentSpec> {
        self.index
            .get(&id.trim().to_lowercase())
            .map(|&i| &self.agents[i])
    }

    pub fn contains(&self, id: &str) -> bool {
        self.get(id).is_some()
    }

    /// 按注册顺序返回 id
    pub fn ids(&self) -> Vec<String> {
        self.agents.iter().map(|a| a.id.clone()).collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = &AgentSpec> {
        self.agents.iter()
    }

    pub fn len(&self) -> usize {
        self.agents.len()
    }

    pub fn is_empty(&self) -> bool {
        self.agents.is_empty()
    }

    pub fn candidates(&self) -> Vec<Candidate> {
        self.agents
            .iter()
            .map(|a| Candidate {
                id: a.id.clone(),
                description: a.short_description(),
            })
            .collect()
    }

    /// 内置五个 agent 及其标准作业职责
    pub fn builtin() -> Self {
        let specs = [
            AgentSpec::new("code_generation", "Code Generation Agent").with_responsibilities([
                "Generate high-quality code from natural language prompts",
                "Follow coding best practices and standards",
                "Ensure code is well-documented and testable",
                "Handle error cases and edge conditions",
            ]),
            AgentSpec::new("deployment", "Deployment Agent").with_responsibilities([
                "Handle CI/CD pipeline execution",
                "Manage production deployments",
                "Monitor deployment health and rollback if needed",
                "Coordinate with infrastructure teams",
            ]),
            AgentSpec::new("business_intelligence", "Business Intelligence Agent")
                .with_responsibilities([
                    "Analyze business metrics and KPIs",
                    "Generate insights and recommendations",
                    "Create dashboards and reports",
                    "Monitor system performance and optimization",
                ]),
            AgentSpec::new("customer_operations", "Customer Operations Agent")
                .with_responsibilities([
                    "Handle customer support inquiries",
                    "Manage customer onboarding processes",
                    "Escalate complex issues to human agents",
                    "Maintain customer satisfaction metrics",
                ]),
            AgentSpec::new("marketing_automation", "Marketing Automation Agent")
                .with_responsibilities([
                    "Generate marketing content and campaigns",
                    "Manage social media automation",
                    "Analyze campaign performance",
                    "Optimize marketing strategies",
                ]),
        ];

        let mut registry = Self::new();
        for spec in specs {
            // 内置 id 互不重复
            let _ = registry.register(spec);
        }
        registry
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builtin_order_is_stable() {
        let registry = AgentRegistry::builtin();
        assert_eq!(
            registry.ids(),
            vec![
                "code_generation",
                "deployment",
                "business_intelligence",
                "customer_operations",
                "marketing_automation",
            ]
        );
    }

    #[test]
    fn test_register_rejects_duplicate() {
        let mut registry = AgentRegistry::new();
        registry.register(AgentSpec::new("Deployment", "")).unwrap();
        let err = registry.register(AgentSpec::new("deployment ", "")).unwrap_err();
        assert_eq!(err, RegistryError::Duplicate("deployment".to_string()));
        assert!(registry.contains("DEPLOYMENT"));
    }

    #[test]
    fn test_short_description() {
        let spec = AgentSpec::new("x", "X").with_responsibilities(["a", "b", "c", "d"]);
        assert_eq!(spec.short_description(), "a; b; c");
        assert_eq!(AgentSpec::new("y", "").short_description(), "General purpose agent");
        let spec = AgentSpec::new("z", "").with_description("custom");
        assert_eq!(spec.short_description(), "custom");
    }

    #[test]
    fn test_from_empty_specs_uses_builtin() {
        let registry = AgentRegistry::from_specs(Vec::new()).unwrap();
        assert_eq!(registry.len(), 5);
    }
}
