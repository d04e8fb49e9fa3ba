//! Tool catalog
//!
//! The catalog is an immutable snapshot. Discovery builds a new snapshot and
//! swaps it in whole; readers always see a complete catalog.

pub mod discovery;
pub mod schema;
pub mod seed;

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::RwLock;
use serde::Serialize;
use serde_json::Value;

pub use schema::{input_schema, ParamKind, ParamSpec};

/// What a tool call is routed to
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ToolTarget {
    /// Free-form request against any FMP path
    Request,
    /// A fixed FMP endpoint
    Endpoint { service: String, endpoint: String },
    ListEndpoints,
    TestEndpoint,
    Search,
    Fetch,
}

/// A callable tool
#[derive(Debug, Clone, Serialize)]
pub struct ToolDefinition {
    pub name: String,
    pub title: String,
    pub description: String,
    pub target: ToolTarget,
    pub params: Vec<ParamSpec>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cache_ttl: Option<Duration>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub plan_hint: Option<String>,
    /// Category label used by the endpoint listing
    #[serde(skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,
    /// Query used when probing plan access
    #[serde(skip)]
    pub probe: Vec<(String, String)>,
    /// Added by discovery rather than the seed list
    pub discovered: bool,
}

impl ToolDefinition {
    pub fn input_schema(&self) -> Value {
        input_schema(&self.params)
    }

    /// Description with the plan hint appended, as shown to clients
    pub fn display_description(&self) -> String {
        match &self.plan_hint {
            Some(plan) => format!("{} | Plan hint: {}", self.description, plan),
            None => self.description.clone(),
        }
    }
}

/// Immutable set of tools indexed by name
#[derive(Debug, Default)]
pub struct Catalog {
    tools: Vec<ToolDefinition>,
    index: HashMap<String, usize>,
}

impl Catalog {
    /// Build a catalog; on duplicate names the first definition wins
    pub fn new(tools: Vec<ToolDefinition>) -> Self {
        let mut kept = Vec::with_capacity(tools.len());
        let mut index = HashMap::with_capacity(tools.len());
        for tool in tools {
            if tool.name.is_empty() || index.contains_key(&tool.name) {
                tracing::debug!(name = %tool.name, "skipping duplicate or unnamed tool");
                continue;
            }
            index.insert(tool.name.clone(), kept.len());
            kept.push(tool);
        }
        Self { tools: kept, index }
    }

    pub fn get(&self, name: &str) -> Option<&ToolDefinition> {
        self.index.get(name).map(|&i| &self.tools[i])
    }

    pub fn tools(&self) -> &[ToolDefinition] {
        &self.tools
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }

    /// Seed tools followed by any extra tools whose names are new
    pub fn merged(&self, extra: Vec<ToolDefinition>) -> Self {
        let mut all = self.tools.clone();
        all.extend(extra);
        Self::new(all)
    }
}

/// Shared handle to the current catalog snapshot
#[derive(Clone)]
pub struct CatalogHandle {
    current: Arc<RwLock<Arc<Catalog>>>,
}

impl CatalogHandle {
    pub fn new(catalog: Catalog) -> Self {
        Self {
            current: Arc::new(RwLock::new(Arc::new(catalog))),
        }
    }

    /// Handle over the built-in seed catalog
    pub fn seeded() -> Self {
        Self::new(seed::seed_catalog())
    }

    /// Latest snapshot; cheap to clone and never partially updated
    pub fn snapshot(&self) -> Arc<Catalog> {
        self.current.read().clone()
    }

    /// Replace the snapshot wholesale
    pub fn swap(&self, catalog: Catalog) -> Arc<Catalog> {
        let next = Arc::new(catalog);
        let mut guard = self.current.write();
        std::mem::replace(&mut *guard, next)
    }
}
