use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use bridge_spec::QueryParams;
use serde_json::Value;

use crate::runner::ActionRunner;

/// Outcome of resolving a query name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum QueryResolution {
    /// The query is known and produced data.
    Found(Value),
    /// No query is registered under that name.
    Unrecognized,
}

/// The host's native ability to run actions and answer queries.
pub trait ExecutorCapability: Send + Sync {
    /// Run an action descriptor. `Ok(None)` means success without output.
    fn execute(&self, action: &str) -> anyhow::Result<Option<Value>>;

    /// Resolve a named query.
    fn resolve_query(
        &self,
        name: &str,
        params: Option<&QueryParams>,
    ) -> anyhow::Result<QueryResolution>;
}

type QueryHandler = Box<dyn Fn(Option<&QueryParams>) -> anyhow::Result<Value> + Send + Sync>;

/// Named query handlers.
#[derive(Default)]
pub struct QueryRegistry {
    handlers: BTreeMap<String, QueryHandler>,
}

impl fmt::Debug for QueryRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.handlers.keys()).finish()
    }
}

impl QueryRegistry {
    /// Empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `handler` under `name`, replacing any previous handler.
    pub fn register<F>(&mut self, name: impl Into<String>, handler: F) -> &mut Self
    where
        F: Fn(Option<&QueryParams>) -> anyhow::Result<Value> + Send + Sync + 'static,
    {
        self.handlers.insert(name.into(), Box::new(handler));
        self
    }

    /// Builder form of [`QueryRegistry::register`].
    pub fn with<F>(mut self, name: impl Into<String>, handler: F) -> Self
    where
        F: Fn(Option<&QueryParams>) -> anyhow::Result<Value> + Send + Sync + 'static,
    {
        self.register(name, handler);
        self
    }

    /// Registered query names, sorted.
    pub fn names(&self) -> Vec<&str> {
        self.handlers.keys().map(String::as_str).collect()
    }

    /// Run the handler registered under `name`.
    pub fn resolve(
        &self,
        name: &str,
        params: Option<&QueryParams>,
    ) -> anyhow::Result<QueryResolution> {
        match self.handlers.get(name) {
            Some(handler) => handler(params).map(QueryResolution::Found),
            None => Ok(QueryResolution::Unrecognized),
        }
    }
}

/// Capability assembled from an action runner and a query registry.
///
/// Actions and queries travel separate paths so the runner can be swapped for
/// a sandboxed one without touching query handling or the wire protocol.
pub struct HostCapability {
    runner: Arc<dyn ActionRunner>,
    queries: QueryRegistry,
}

impl HostCapability {
    /// Combine a runner and a registry.
    pub fn new(runner: Arc<dyn ActionRunner>, queries: QueryRegistry) -> Self {
        Self { runner, queries }
    }

    /// Registered query names.
    pub fn query_names(&self) -> Vec<&str> {
        self.queries.names()
    }
}

impl ExecutorCapability for HostCapability {
    fn execute(&self, action: &str) -> anyhow::Result<Option<Value>> {
        self.runner.run(action)
    }

    fn resolve_query(
        &self,
        name: &str,
        params: Option<&QueryParams>,
    ) -> anyhow::Result<QueryResolution> {
        self.queries.resolve(name, params)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    struct Recorder;

    impl ActionRunner for Recorder {
        fn run(&self, action: &str) -> anyhow::Result<Option<Value>> {
            if action == "fail" {
                anyhow::bail!("boom");
            }
            Ok(Some(json!({ "ran": action })))
        }
    }

    fn capability() -> HostCapability {
        let queries = QueryRegistry::new()
            .with("echo", |params| {
                Ok(params.map_or(Value::Null, |p| Value::Object(p.clone())))
            })
            .with("broken", |_| anyhow::bail!("query backend offline"));
        HostCapability::new(Arc::new(Recorder), queries)
    }

    #[test]
    fn routes_actions_to_runner() {
        let cap = capability();
        assert_eq!(cap.execute("ls").unwrap(), Some(json!({ "ran": "ls" })));
        assert_eq!(cap.execute("fail").unwrap_err().to_string(), "boom");
    }

    #[test]
    fn resolves_registered_and_unknown_queries() {
        let cap = capability();
        let mut params = QueryParams::new();
        params.insert("k".into(), json!(1));
        assert_eq!(
            cap.resolve_query("echo", Some(&params)).unwrap(),
            QueryResolution::Found(json!({ "k": 1 }))
        );
        assert_eq!(
            cap.resolve_query("nonexistent_query_xyz", None).unwrap(),
            QueryResolution::Unrecognized
        );
        assert!(cap.resolve_query("broken", None).is_err());
        assert_eq!(cap.query_names(), vec!["broken", "echo"]);
    }
}
