//! The state a running command reads and writes.

use std::collections::HashMap;
use std::sync::Arc;

use once_cell::sync::OnceCell;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;

use crate::error::Result;
use crate::services::Services;

/// Shared cancellation flag for one module.
///
/// The first reason set wins; later calls are ignored. Clones observe the
/// same flag, so a [`ModuleHandle`](super::ModuleHandle) can cancel a module
/// that is running on a worker.
#[derive(Debug, Clone, Default)]
pub struct CancelToken {
    reason: Arc<OnceCell<String>>,
}

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    /// Request cancellation. Returns `false` if already canceled.
    pub fn cancel(&self, reason: impl Into<String>) -> bool {
        self.reason.set(reason.into()).is_ok()
    }

    pub fn is_canceled(&self) -> bool {
        self.reason.get().is_some()
    }

    pub fn reason(&self) -> Option<&str> {
        self.reason.get().map(String::as_str)
    }
}

/// Values, services and the cancel flag of one module, as seen by its command.
#[derive(Debug)]
pub struct CommandContext {
    identity: String,
    values: HashMap<String, Value>,
    services: Services,
    cancel: CancelToken,
}

impl CommandContext {
    pub(crate) fn new(identity: impl Into<String>, services: Services) -> Self {
        Self {
            identity: identity.into(),
            values: HashMap::new(),
            services,
            cancel: CancelToken::new(),
        }
    }

    /// Identity of the command this context belongs to.
    pub fn identity(&self) -> &str {
        &self.identity
    }

    /// Raw value of parameter `name`.
    pub fn value(&self, name: &str) -> Option<&Value> {
        self.values.get(name)
    }

    /// Value of `name` converted to `T`; `None` when unset or not convertible.
    pub fn input<T: DeserializeOwned>(&self, name: &str) -> Option<T> {
        let value = self.values.get(name)?;
        serde_json::from_value(value.clone()).ok()
    }

    /// Store a raw value without any type check.
    pub fn set_value(&mut self, name: impl Into<String>, value: Value) {
        self.values.insert(name.into(), value);
    }

    /// Serialize `value` and store it under `name`.
    pub fn set_output<T: Serialize>(&mut self, name: impl Into<String>, value: T) -> Result<()> {
        let value = serde_json::to_value(value)?;
        self.values.insert(name.into(), value);
        Ok(())
    }

    pub fn contains(&self, name: &str) -> bool {
        self.values.contains_key(name)
    }

    pub fn values(&self) -> &HashMap<String, Value> {
        &self.values
    }

    pub fn services(&self) -> &Services {
        &self.services
    }

    /// First injected service of type `S`.
    pub fn service<S: std::any::Any + Send + Sync>(&self) -> Option<Arc<S>> {
        self.services.get::<S>()
    }

    pub fn is_canceled(&self) -> bool {
        self.cancel.is_canceled()
    }

    /// Request cancellation; the first reason wins.
    pub fn cancel(&self, reason: impl Into<String>) {
        self.cancel.cancel(reason);
    }

    pub fn cancel_reason(&self) -> Option<&str> {
        self.cancel.reason()
    }

    pub(crate) fn cancel_token(&self) -> &CancelToken {
        &self.cancel
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_cancel_first_reason_wins() {
        let token = CancelToken::new();
        assert!(!token.is_canceled());
        assert!(token.cancel("first"));
        assert!(!token.cancel("second"));
        assert_eq!(token.reason(), Some("first"));
    }

    #[test]
    fn test_cancel_token_clones_share_state() {
        let token = CancelToken::new();
        let remote = token.clone();
        remote.cancel("from handle");
        assert!(token.is_canceled());
        assert_eq!(token.reason(), Some("from handle"));
    }

    #[test]
    fn test_typed_input_and_output() {
        let mut ctx = CommandContext::new("demo.Sum", Services::default());
        ctx.set_value("a", json!(2));
        ctx.set_value("label", json!("total"));

        assert_eq!(ctx.input::<i64>("a"), Some(2));
        assert_eq!(ctx.input::<f64>("a"), Some(2.0));
        assert_eq!(ctx.input::<String>("label"), Some("total".to_string()));
        // Wrong type or missing value reads as None.
        assert_eq!(ctx.input::<i64>("label"), None);
        assert_eq!(ctx.input::<i64>("missing"), None);

        ctx.set_output("pairs", vec![(1, "one")]).unwrap();
        assert_eq!(ctx.value("pairs"), Some(&json!([[1, "one"]])));
    }

    #[test]
    fn test_context_cancel() {
        let ctx = CommandContext::new("demo.Delay", Services::default());
        ctx.cancel("enough");
        assert!(ctx.is_canceled());
        assert_eq!(ctx.cancel_reason(), Some("enough"));
        assert!(ctx.cancel_token().is_canceled());
    }
}
