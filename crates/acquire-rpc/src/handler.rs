//! Handler registration and routing.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use acquire_core::Value;

use crate::context::CallContext;
use crate::error::Result;

/// Namespace tried when a function name is not registered directly.
pub const ADMIN_NAMESPACE: &str = "admin";

/// A registered function.
pub type Handler = Arc<dyn Fn(Value, &CallContext) -> Result<Option<Value>> + Send + Sync>;

/// Routes calls to functions this service does not handle itself.
pub trait Router: Send + Sync {
    /// Handle `function`, or fail with [`crate::RpcError::MissingHandler`].
    fn route(&self, function: &str, args: Value, ctx: &CallContext) -> Result<Option<Value>>;
}

impl<F> Router for F
where
    F: Fn(&str, Value, &CallContext) -> Result<Option<Value>> + Send + Sync,
{
    fn route(&self, function: &str, args: Value, ctx: &CallContext) -> Result<Option<Value>> {
        self(function, args, ctx)
    }
}

/// Function names mapped to handlers, built at startup.
#[derive(Clone, Default)]
pub struct HandlerTable {
    root: Option<Handler>,
    handlers: HashMap<String, Handler>,
}

impl HandlerTable {
    /// Create an empty table.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `handler` under `name`, replacing any previous one.
    pub fn register<F>(&mut self, name: impl Into<String>, handler: F) -> &mut Self
    where
        F: Fn(Value, &CallContext) -> Result<Option<Value>> + Send + Sync + 'static,
    {
        self.handlers.insert(name.into(), Arc::new(handler));
        self
    }

    /// Register the handler for calls that name no function.
    pub fn register_root<F>(&mut self, handler: F) -> &mut Self
    where
        F: Fn(Value, &CallContext) -> Result<Option<Value>> + Send + Sync + 'static,
    {
        self.root = Some(Arc::new(handler));
        self
    }

    /// Builder-style [`HandlerTable::register`].
    pub fn with<F>(mut self, name: impl Into<String>, handler: F) -> Self
    where
        F: Fn(Value, &CallContext) -> Result<Option<Value>> + Send + Sync + 'static,
    {
        self.register(name, handler);
        self
    }

    /// Builder-style [`HandlerTable::register_root`].
    pub fn with_root<F>(mut self, handler: F) -> Self
    where
        F: Fn(Value, &CallContext) -> Result<Option<Value>> + Send + Sync + 'static,
    {
        self.register_root(handler);
        self
    }

    /// Find the handler for a call.
    ///
    /// No name resolves to the root handler. Otherwise the name itself is
    /// tried, then `admin.<name>`.
    pub fn resolve(&self, function: Option<&str>) -> Option<&Handler> {
        match function {
            None => self.root.as_ref(),
            Some(name) => self
                .handlers
                .get(name)
                .or_else(|| self.handlers.get(&format!("{ADMIN_NAMESPACE}.{name}"))),
        }
    }

    /// Whether a handler is registered under exactly `name`.
    pub fn contains(&self, name: &str) -> bool {
        self.handlers.contains_key(name)
    }

    /// Registered names, sorted.
    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.handlers.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }
}

impl fmt::Debug for HandlerTable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HandlerTable")
            .field("root", &self.root.is_some())
            .field("handlers", &self.names())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn echo(args: Value, _ctx: &CallContext) -> Result<Option<Value>> {
        Ok(Some(args))
    }

    #[test]
    fn test_resolve_by_name() {
        let table = HandlerTable::new().with("echo", echo);
        assert!(table.resolve(Some("echo")).is_some());
        assert!(table.resolve(Some("nope")).is_none());
    }

    #[test]
    fn test_resolve_admin_fallback() {
        let table = HandlerTable::new().with("admin.setup", echo);
        assert!(table.resolve(Some("setup")).is_some());
        assert!(!table.contains("setup"));
    }

    #[test]
    fn test_resolve_root() {
        let table = HandlerTable::new();
        assert!(table.resolve(None).is_none());

        let table = table.with_root(echo);
        assert!(table.resolve(None).is_some());
    }

    #[test]
    fn test_names_sorted() {
        let table = HandlerTable::new().with("b", echo).with("a", echo);
        assert_eq!(table.names(), vec!["a", "b"]);
    }
}
