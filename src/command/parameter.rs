//! Parameter metadata for commands
//!
//! A [`ParameterDescriptor`] describes one typed input or output slot of a
//! command. Commands declare their parameters explicitly through their
//! factory; the declarations are validated and classified by
//! [`CommandDescriptor`](super::CommandDescriptor) the first time its
//! metadata is needed.

use serde::Serialize;
use serde_json::Value;

use crate::services::ServiceRole;

// ---------------------------------------------------------------------------
// Kinds, directions, visibility
// ---------------------------------------------------------------------------

/// Semantic type of a parameter.
///
/// Values travel as JSON values; the kind decides which values a parameter
/// accepts during binding. `Service` parameters are never bound from caller
/// inputs: they are filled by the service provider, keyed on the role type.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ParamKind {
    Boolean,
    Integer,
    Float,
    Text,
    List,
    Map,
    /// Accepts any JSON value.
    Any,
    /// A service slot resolved by declared role type.
    Service(ServiceRole),
}

impl ParamKind {
    /// Whether `value` can be bound to a parameter of this kind.
    pub fn accepts(&self, value: &Value) -> bool {
        match self {
            ParamKind::Boolean => value.is_boolean(),
            ParamKind::Integer => value.is_i64() || value.is_u64(),
            ParamKind::Float => value.is_number(),
            ParamKind::Text => value.is_string(),
            ParamKind::List => value.is_array(),
            ParamKind::Map => value.is_object(),
            ParamKind::Any => true,
            ParamKind::Service(_) => false,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ParamKind::Boolean => "boolean",
            ParamKind::Integer => "integer",
            ParamKind::Float => "float",
            ParamKind::Text => "text",
            ParamKind::List => "list",
            ParamKind::Map => "map",
            ParamKind::Any => "any",
            ParamKind::Service(_) => "service",
        }
    }

    /// Whether min/max/step apply to this kind.
    pub fn is_numeric(&self) -> bool {
        matches!(self, ParamKind::Integer | ParamKind::Float)
    }

    /// The service role, if this is a service slot.
    pub fn service_role(&self) -> Option<&ServiceRole> {
        match self {
            ParamKind::Service(role) => Some(role),
            _ => None,
        }
    }
}

/// Whether a parameter is read, written, or both by the command.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Direction {
    Input,
    Output,
    Both,
}

impl Direction {
    pub fn is_input(self) -> bool {
        matches!(self, Direction::Input | Direction::Both)
    }

    pub fn is_output(self) -> bool {
        matches!(self, Direction::Output | Direction::Both)
    }
}

/// How a parameter is presented to users.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Visibility {
    #[default]
    Normal,
    /// Display-only text; never bound.
    Message,
    Invisible,
}

// ---------------------------------------------------------------------------
// Parameter descriptor
// ---------------------------------------------------------------------------

/// Declarative metadata for one parameter of a command.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ParameterDescriptor {
    /// Binding key; must be unique across a command's inputs and outputs.
    pub name: String,
    pub kind: ParamKind,
    pub direction: Direction,
    pub visibility: Visibility,
    /// A run is canceled by input checking when this input has no value.
    pub required: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub default_value: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub min: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub step: Option<f64>,
    /// Whether the last used value should be remembered by a persistence layer.
    pub persisted: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Immutable slots cannot be bound; only message parameters may be immutable.
    pub mutable: bool,
}

impl ParameterDescriptor {
    fn new(name: impl Into<String>, kind: ParamKind, direction: Direction) -> Self {
        Self {
            name: name.into(),
            kind,
            direction,
            visibility: Visibility::Normal,
            required: false,
            default_value: None,
            min: None,
            max: None,
            step: None,
            persisted: true,
            label: None,
            description: None,
            mutable: true,
        }
    }

    /// An input parameter.
    pub fn input(name: impl Into<String>, kind: ParamKind) -> Self {
        Self::new(name, kind, Direction::Input)
    }

    /// An output parameter.
    pub fn output(name: impl Into<String>, kind: ParamKind) -> Self {
        Self::new(name, kind, Direction::Output)
    }

    /// A parameter that is both read and written.
    pub fn both(name: impl Into<String>, kind: ParamKind) -> Self {
        Self::new(name, kind, Direction::Both)
    }

    /// A service slot filled by the service provider for role `S`.
    pub fn service<S: std::any::Any + Send + Sync>(name: impl Into<String>) -> Self {
        let mut param = Self::new(name, ParamKind::Service(ServiceRole::of::<S>()), Direction::Input);
        param.visibility = Visibility::Invisible;
        param.persisted = false;
        param
    }

    /// A read-only message shown to the user.
    pub fn message(name: impl Into<String>, text: impl Into<String>) -> Self {
        let mut param = Self::new(name, ParamKind::Text, Direction::Input);
        param.visibility = Visibility::Message;
        param.default_value = Some(Value::String(text.into()));
        param.persisted = false;
        param.mutable = false;
        param
    }

    pub fn required(mut self) -> Self {
        self.required = true;
        self
    }

    pub fn with_default(mut self, value: Value) -> Self {
        self.default_value = Some(value);
        self
    }

    /// Inclusive numeric bounds. Ignored for non-numeric kinds.
    pub fn with_range(mut self, min: f64, max: f64) -> Self {
        self.min = Some(min);
        self.max = Some(max);
        self
    }

    pub fn with_step(mut self, step: f64) -> Self {
        self.step = Some(step);
        self
    }

    pub fn with_visibility(mut self, visibility: Visibility) -> Self {
        self.visibility = visibility;
        self
    }

    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = Some(label.into());
        self
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn not_persisted(mut self) -> Self {
        self.persisted = false;
        self
    }

    /// Mark the slot as immutable.
    pub fn immutable(mut self) -> Self {
        self.mutable = false;
        self
    }

    pub fn is_input(&self) -> bool {
        self.direction.is_input()
    }

    pub fn is_output(&self) -> bool {
        self.direction.is_output()
    }

    pub fn is_message(&self) -> bool {
        self.visibility == Visibility::Message
    }

    pub fn is_service(&self) -> bool {
        self.kind.service_role().is_some()
    }

    /// Label for display, falling back to the name.
    pub fn display_label(&self) -> &str {
        self.label.as_deref().unwrap_or(&self.name)
    }

    /// Check a value against the numeric bounds.
    ///
    /// Returns a human-readable problem when the value is out of range,
    /// `None` otherwise (including for non-numeric kinds and values).
    pub fn range_problem(&self, value: &Value) -> Option<String> {
        if !self.kind.is_numeric() {
            return None;
        }
        let number = value.as_f64()?;
        if let Some(min) = self.min {
            if number < min {
                return Some(format!(
                    "{} = {} is below the minimum of {}",
                    self.name, number, min
                ));
            }
        }
        if let Some(max) = self.max {
            if number > max {
                return Some(format!(
                    "{} = {} is above the maximum of {}",
                    self.name, number, max
                ));
            }
        }
        None
    }
}
