//! Modules: one bound execution of a command.

use std::fmt;
use std::sync::Arc;

use serde::Serialize;
use serde_json::Value;
use thiserror::Error;
use tracing::warn;
use uuid::Uuid;

use crate::error::{Result, RuntimeError};
use crate::services::Services;

use super::context::{CancelToken, CommandContext};
use super::descriptor::CommandDescriptor;
use super::Command;

/// Lifecycle state of a [`Module`].
///
/// ```text
/// CREATED -> PREPROCESSING -> CANCELED
///                          -> RUNNING -> POSTPROCESSING -> COMPLETE
///                                     -> ERROR
/// ```
///
/// Once running, cancellation is cooperative: a body that returns early
/// still goes through postprocessing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ModuleStatus {
    Created,
    Preprocessing,
    Canceled,
    Running,
    Postprocessing,
    Complete,
    Error,
}

impl ModuleStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ModuleStatus::Created => "CREATED",
            ModuleStatus::Preprocessing => "PREPROCESSING",
            ModuleStatus::Canceled => "CANCELED",
            ModuleStatus::Running => "RUNNING",
            ModuleStatus::Postprocessing => "POSTPROCESSING",
            ModuleStatus::Complete => "COMPLETE",
            ModuleStatus::Error => "ERROR",
        }
    }

    /// Canceled, Complete and Error are final.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            ModuleStatus::Canceled | ModuleStatus::Complete | ModuleStatus::Error
        )
    }

    pub fn can_transition_to(&self, next: ModuleStatus) -> bool {
        use ModuleStatus::*;
        matches!(
            (self, next),
            (Created, Preprocessing)
                | (Preprocessing, Canceled)
                | (Preprocessing, Running)
                | (Running, Postprocessing)
                | (Running, Error)
                | (Postprocessing, Complete)
                | (Postprocessing, Error)
        )
    }
}

impl fmt::Display for ModuleStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Why a caller-supplied value was not bound.
///
/// Binding errors are reported and recorded, never raised to the caller of
/// `run`.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum BindingError {
    #[error("Unknown input '{0}'")]
    UnknownInput(String),

    #[error("Input '{name}' expects {expected}, got {actual}")]
    Incompatible {
        name: String,
        expected: &'static str,
        actual: &'static str,
    },

    #[error("Input '{0}' is a fixed preset")]
    PresetFixed(String),

    #[error("Input '{0}' is a service slot")]
    ServiceSlot(String),

    #[error("Input '{0}' is read-only")]
    ReadOnly(String),

    #[error("Malformed input pair: {0}")]
    MalformedPair(String),
}

/// JSON type name of `value`, for diagnostics.
pub(crate) fn json_type(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(n) if n.is_f64() => "float",
        Value::Number(_) => "integer",
        Value::String(_) => "text",
        Value::Array(_) => "list",
        Value::Object(_) => "map",
    }
}

/// One instantiated, bound execution of a command.
///
/// A module is owned by the run that created it; nothing else reads or
/// writes its values while it executes.
pub struct Module {
    id: Uuid,
    descriptor: Arc<CommandDescriptor>,
    command: Box<dyn Command>,
    context: CommandContext,
    status: ModuleStatus,
    diagnostics: Vec<String>,
    failure: Option<String>,
}

impl Module {
    pub(crate) fn new(
        descriptor: Arc<CommandDescriptor>,
        command: Box<dyn Command>,
        services: Services,
    ) -> Self {
        let context = CommandContext::new(descriptor.identity(), services);
        Self {
            id: Uuid::new_v4(),
            descriptor,
            command,
            context,
            status: ModuleStatus::Created,
            diagnostics: Vec::new(),
            failure: None,
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn descriptor(&self) -> &Arc<CommandDescriptor> {
        &self.descriptor
    }

    pub fn identity(&self) -> &str {
        self.descriptor.identity()
    }

    pub fn status(&self) -> ModuleStatus {
        self.status
    }

    /// Move to `next`, refusing transitions the lifecycle does not allow.
    pub(crate) fn transition(&mut self, next: ModuleStatus) -> Result<()> {
        if !self.status.can_transition_to(next) {
            return Err(RuntimeError::InvalidTransition {
                from: self.status,
                to: next,
            });
        }
        self.status = next;
        Ok(())
    }

    // -- Cancellation --

    /// Request cancellation. During preprocessing this stops the module
    /// before its body runs; afterwards the body has to notice it.
    pub fn cancel(&self, reason: impl Into<String>) {
        self.context.cancel(reason);
    }

    pub fn is_canceled(&self) -> bool {
        self.context.is_canceled()
    }

    pub fn cancel_reason(&self) -> Option<&str> {
        self.context.cancel_reason()
    }

    pub(crate) fn cancel_token(&self) -> CancelToken {
        self.context.cancel_token().clone()
    }

    // -- Values --

    pub fn value(&self, name: &str) -> Option<&Value> {
        self.context.value(name)
    }

    pub fn values(&self) -> &std::collections::HashMap<String, Value> {
        self.context.values()
    }

    /// Value of output `name`, if the command declared and produced it.
    pub fn output(&self, name: &str) -> Option<&Value> {
        self.descriptor.output(name)?;
        self.context.value(name)
    }

    /// Produced outputs in declaration order, presets excluded.
    pub fn outputs(&self) -> Vec<(&str, &Value)> {
        self.descriptor
            .outputs()
            .iter()
            .filter_map(|p| self.context.value(&p.name).map(|v| (p.name.as_str(), v)))
            .collect()
    }

    /// Bind a caller value to input `name`, checking it against the
    /// declared parameter.
    pub fn set_input(&mut self, name: &str, value: Value) -> std::result::Result<(), BindingError> {
        if self.descriptor.is_preset(name) {
            return Err(BindingError::PresetFixed(name.to_string()));
        }
        let param = self
            .descriptor
            .input(name)
            .ok_or_else(|| BindingError::UnknownInput(name.to_string()))?;
        if param.is_service() {
            return Err(BindingError::ServiceSlot(name.to_string()));
        }
        if param.is_message() {
            return Err(BindingError::ReadOnly(name.to_string()));
        }
        if !param.kind.accepts(&value) {
            return Err(BindingError::Incompatible {
                name: name.to_string(),
                expected: param.kind.as_str(),
                actual: json_type(&value),
            });
        }
        self.context.set_value(name, value);
        Ok(())
    }

    /// Like [`set_input`](Self::set_input), but a refused value is logged
    /// and recorded as a diagnostic instead of returned.
    pub fn bind(&mut self, name: &str, value: Value) -> bool {
        match self.set_input(name, value) {
            Ok(()) => true,
            Err(e) => {
                self.report_binding_error(&e);
                false
            }
        }
    }

    pub(crate) fn report_binding_error(&mut self, error: &BindingError) {
        warn!(
            module = %self.id,
            command = %self.identity(),
            error = %error,
            "Ignoring input"
        );
        self.diagnostics.push(error.to_string());
    }

    /// Fill every input that declares a default value.
    pub(crate) fn apply_defaults(&mut self) {
        let defaults: Vec<(String, Value)> = self
            .descriptor
            .all_inputs()
            .filter(|p| !p.is_service())
            .filter_map(|p| p.default_value.clone().map(|v| (p.name.clone(), v)))
            .collect();
        for (name, value) in defaults {
            self.context.set_value(name, value);
        }
    }

    /// Write the descriptor's preset values. Presets for names the command
    /// does not declare are reported and skipped.
    pub(crate) fn apply_presets(&mut self) {
        let descriptor = Arc::clone(&self.descriptor);
        for (name, value) in descriptor.presets() {
            if descriptor.input(name).is_none() && descriptor.output(name).is_none() {
                warn!(command = %self.identity(), preset = %name, "Preset names no parameter");
                self.diagnostics
                    .push(format!("Preset '{}' names no parameter", name));
                continue;
            }
            self.context.set_value(name.clone(), value.clone());
        }
    }

    // -- Diagnostics --

    /// Non-fatal problems recorded while binding and postprocessing.
    pub fn diagnostics(&self) -> &[String] {
        &self.diagnostics
    }

    pub fn record_diagnostic(&mut self, diagnostic: impl Into<String>) {
        self.diagnostics.push(diagnostic.into());
    }

    /// The body's failure message, when the module ended in error.
    pub fn failure(&self) -> Option<&str> {
        self.failure.as_deref()
    }

    pub(crate) fn set_failure(&mut self, message: String) {
        self.failure = Some(message);
    }

    // -- Command access --

    pub fn context(&self) -> &CommandContext {
        &self.context
    }

    pub fn context_mut(&mut self) -> &mut CommandContext {
        &mut self.context
    }

    pub(crate) async fn initialize_command(&mut self) -> anyhow::Result<()> {
        self.command.initialize(&mut self.context).await
    }

    pub(crate) async fn run_command(&mut self) -> anyhow::Result<()> {
        self.command.run(&mut self.context).await
    }
}

impl fmt::Debug for Module {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Module")
            .field("id", &self.id)
            .field("identity", &self.identity())
            .field("status", &self.status)
            .field("values", self.context.values())
            .field("cancel_reason", &self.cancel_reason())
            .finish()
    }
}
