//! Read-skill executors and the LLM tool table.
//!
//! Read skills run inline during an agent run and never touch domain tables.
//! Write skills have no executor here; they are deferred to the approval
//! handler.

pub mod analysis;
pub mod report;
pub mod schema;
pub mod search;

pub use analysis::{ComplianceCheckSkill, RiskAnalysisSkill};
pub use report::DraftReportSkill;
pub use schema::build_tools;
pub use search::WebSearchSkill;

use async_trait::async_trait;
use grc_common::{OrganizationId, SearchConfig};
use grc_storage::GrcStore;
use serde_json::Value;
use std::collections::HashMap;
use std::fmt::Debug;
use std::sync::Arc;

#[async_trait]
pub trait SkillExecutor: Send + Sync + Debug {
    /// Catalog id of the skill this executor serves
    fn skill_id(&self) -> &'static str;

    async fn execute(&self, input: Value, organization_id: OrganizationId) -> anyhow::Result<Value>;
}

/// Read-skill executors keyed by skill id
#[derive(Debug, Default, Clone)]
pub struct SkillRegistry {
    executors: HashMap<&'static str, Arc<dyn SkillExecutor>>,
}

impl SkillRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry with every built-in read skill
    pub fn with_defaults(store: Arc<dyn GrcStore>, search: &SearchConfig) -> anyhow::Result<Self> {
        let mut registry = Self::new();
        registry.register(Arc::new(WebSearchSkill::new(search)?));
        registry.register(Arc::new(RiskAnalysisSkill::new(store.clone())));
        registry.register(Arc::new(ComplianceCheckSkill::new(store)));
        registry.register(Arc::new(DraftReportSkill));
        Ok(registry)
    }

    pub fn register(&mut self, executor: Arc<dyn SkillExecutor>) {
        self.executors.insert(executor.skill_id(), executor);
    }

    pub fn get(&self, skill_id: &str) -> Option<Arc<dyn SkillExecutor>> {
        self.executors.get(skill_id).cloned()
    }
}
