//! What to run, and with which inputs.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use serde_json::Value;

use crate::plugins::ImplType;

use super::descriptor::CommandDescriptor;
use super::module::{BindingError, Module};
use super::DescribedCommand;

/// The command a [`CommandService::run`](super::CommandService::run) call
/// should execute.
#[derive(Debug)]
pub enum RunTarget {
    /// First registered command with this identity.
    Identity(String),
    /// First registered command implemented by this type.
    Type(ImplType),
    /// This exact descriptor, registered or not.
    Descriptor(Arc<CommandDescriptor>),
    /// An already constructed module; it must still be in the CREATED state.
    Module(Box<Module>),
}

impl RunTarget {
    /// Target the first command implemented by `C`.
    pub fn of<C: DescribedCommand>() -> Self {
        RunTarget::Type(ImplType::of::<C>())
    }
}

impl From<&str> for RunTarget {
    fn from(identity: &str) -> Self {
        RunTarget::Identity(identity.to_string())
    }
}

impl From<String> for RunTarget {
    fn from(identity: String) -> Self {
        RunTarget::Identity(identity)
    }
}

impl From<ImplType> for RunTarget {
    fn from(implementation: ImplType) -> Self {
        RunTarget::Type(implementation)
    }
}

impl From<Arc<CommandDescriptor>> for RunTarget {
    fn from(descriptor: Arc<CommandDescriptor>) -> Self {
        RunTarget::Descriptor(descriptor)
    }
}

impl From<&Arc<CommandDescriptor>> for RunTarget {
    fn from(descriptor: &Arc<CommandDescriptor>) -> Self {
        RunTarget::Descriptor(Arc::clone(descriptor))
    }
}

impl From<Module> for RunTarget {
    fn from(module: Module) -> Self {
        RunTarget::Module(Box::new(module))
    }
}

/// Caller-supplied input values.
///
/// Either a flat list alternating names and values
/// (`["sigma", 2.0, "passes", 3]`) or explicit name/value entries. Entries
/// are applied in order, so a repeated name ends with its last value.
#[derive(Debug, Clone, PartialEq)]
pub enum Inputs {
    Pairs(Vec<Value>),
    Map(Vec<(String, Value)>),
}

impl Inputs {
    pub fn none() -> Self {
        Inputs::Map(Vec::new())
    }

    /// Alternating name/value list.
    pub fn pairs(values: impl IntoIterator<Item = Value>) -> Self {
        Inputs::Pairs(values.into_iter().collect())
    }

    /// Name/value entries in the given order.
    pub fn map<K: Into<String>>(entries: impl IntoIterator<Item = (K, Value)>) -> Self {
        Inputs::Map(entries.into_iter().map(|(k, v)| (k.into(), v)).collect())
    }

    pub fn is_empty(&self) -> bool {
        match self {
            Inputs::Pairs(values) => values.is_empty(),
            Inputs::Map(entries) => entries.is_empty(),
        }
    }

    /// Flatten into ordered bindings. Pairs whose name is not a string, and
    /// a trailing name without a value, come back as errors.
    pub(crate) fn into_bindings(self) -> (Vec<(String, Value)>, Vec<BindingError>) {
        match self {
            Inputs::Map(entries) => (entries, Vec::new()),
            Inputs::Pairs(values) => {
                let mut bindings = Vec::with_capacity(values.len() / 2);
                let mut errors = Vec::new();
                let mut iter = values.into_iter();
                while let Some(name) = iter.next() {
                    let Some(value) = iter.next() else {
                        errors.push(BindingError::MalformedPair(format!(
                            "name {} has no value",
                            name
                        )));
                        break;
                    };
                    match name {
                        Value::String(name) => bindings.push((name, value)),
                        other => errors.push(BindingError::MalformedPair(format!(
                            "expected a parameter name, got {}",
                            other
                        ))),
                    }
                }
                (bindings, errors)
            }
        }
    }
}

impl Default for Inputs {
    fn default() -> Self {
        Inputs::none()
    }
}

impl From<()> for Inputs {
    fn from(_: ()) -> Self {
        Inputs::none()
    }
}

impl From<Vec<Value>> for Inputs {
    fn from(values: Vec<Value>) -> Self {
        Inputs::Pairs(values)
    }
}

impl From<Vec<(String, Value)>> for Inputs {
    fn from(entries: Vec<(String, Value)>) -> Self {
        Inputs::Map(entries)
    }
}

impl From<HashMap<String, Value>> for Inputs {
    fn from(map: HashMap<String, Value>) -> Self {
        Inputs::Map(map.into_iter().collect())
    }
}

impl From<BTreeMap<String, Value>> for Inputs {
    fn from(map: BTreeMap<String, Value>) -> Self {
        Inputs::Map(map.into_iter().collect())
    }
}

impl From<serde_json::Map<String, Value>> for Inputs {
    fn from(map: serde_json::Map<String, Value>) -> Self {
        Inputs::Map(map.into_iter().collect())
    }
}

/// Objects become name/value entries, arrays alternating pairs, `null` no
/// inputs. Any other value is an odd-length pair list.
impl From<Value> for Inputs {
    fn from(value: Value) -> Self {
        match value {
            Value::Object(map) => map.into(),
            Value::Array(values) => Inputs::Pairs(values),
            Value::Null => Inputs::none(),
            other => Inputs::Pairs(vec![other]),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_pairs_flatten_in_order() {
        let inputs = Inputs::pairs(vec![json!("a"), json!(1), json!("b"), json!("x"), json!("a"), json!(2)]);
        let (bindings, errors) = inputs.into_bindings();
        assert!(errors.is_empty());
        assert_eq!(
            bindings,
            vec![
                ("a".to_string(), json!(1)),
                ("b".to_string(), json!("x")),
                ("a".to_string(), json!(2)),
            ]
        );
    }

    #[test]
    fn test_malformed_pairs_are_reported() {
        let (bindings, errors) = Inputs::pairs(vec![json!(7), json!(1), json!("a"), json!(2), json!("dangling")])
            .into_bindings();
        assert_eq!(bindings, vec![("a".to_string(), json!(2))]);
        assert_eq!(errors.len(), 2);
        assert!(errors.iter().all(|e| matches!(e, BindingError::MalformedPair(_))));
    }

    #[test]
    fn test_from_json_value() {
        assert_eq!(Inputs::from(json!(null)), Inputs::none());
        assert!(matches!(Inputs::from(json!({"a": 1})), Inputs::Map(ref e) if e.len() == 1));
        assert!(matches!(Inputs::from(json!(["a", 1])), Inputs::Pairs(ref v) if v.len() == 2));
    }

    #[test]
    fn test_run_target_conversions() {
        assert!(matches!(RunTarget::from("demo.Sum"), RunTarget::Identity(ref s) if s == "demo.Sum"));
        let target = RunTarget::of::<crate::test_support::Noop>();
        assert!(
            matches!(target, RunTarget::Type(imp) if imp == ImplType::of::<crate::test_support::Noop>())
        );
    }
}
