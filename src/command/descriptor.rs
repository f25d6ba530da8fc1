//! Command descriptors and lazy parameter parsing.

use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::sync::Arc;

use once_cell::sync::OnceCell;
use serde::Serialize;
use serde_json::Value;
use tracing::{debug, error};

use crate::error::{Result, RuntimeError};
use crate::events::{EventKind, EventPublisher};
use crate::plugins::{Capability, ImplType, PluginDescriptor};

use super::parameter::ParameterDescriptor;
use super::{Command, CommandFactory, DescribedCommand, TypedFactory};

/// Behavior flags declared alongside a command.
///
/// These never require the command's parameters to be parsed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct CommandFlags {
    /// The command offers a preview mode.
    pub previewable: bool,
    /// The command honors cancellation requests.
    pub cancelable: bool,
    /// The command can run without a user interface.
    pub headless: bool,
}

/// Result of parsing a command's declared parameters.
#[derive(Debug, Default)]
struct ParsedParameters {
    /// Declaration order, presets excluded.
    inputs: Vec<ParameterDescriptor>,
    outputs: Vec<ParameterDescriptor>,
    /// All accepted parameters, presets included.
    input_map: HashMap<String, ParameterDescriptor>,
    output_map: HashMap<String, ParameterDescriptor>,
    problems: Vec<String>,
}

/// Metadata for one command: plugin identity, flags, presets, and lazily
/// parsed parameters.
///
/// Nothing about the implementation is touched until parameter metadata is
/// first requested; from then on the parse result is memoized.
pub struct CommandDescriptor {
    plugin: PluginDescriptor,
    flags: CommandFlags,
    presets: BTreeMap<String, Value>,
    factory: Arc<dyn CommandFactory>,
    parsed: OnceCell<ParsedParameters>,
}

impl CommandDescriptor {
    /// Descriptor for a command type; the identity is the type's full path.
    pub fn of<C: DescribedCommand>() -> Self {
        Self::new(
            PluginDescriptor::of::<C>(Capability::Command),
            Arc::new(TypedFactory::<C>::new()),
        )
    }

    /// Descriptor for an arbitrary factory under `identity`.
    pub fn from_factory(identity: impl Into<String>, factory: Arc<dyn CommandFactory>) -> Self {
        Self::new(PluginDescriptor::new(identity, Capability::Command), factory)
    }

    fn new(plugin: PluginDescriptor, factory: Arc<dyn CommandFactory>) -> Self {
        Self {
            plugin,
            flags: CommandFlags::default(),
            presets: BTreeMap::new(),
            factory,
            parsed: OnceCell::new(),
        }
    }

    // -- Builder --

    pub fn with_identity(mut self, identity: impl Into<String>) -> Self {
        self.plugin.identity = identity.into();
        self
    }

    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.plugin.title = Some(title.into());
        self
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.plugin.description = Some(description.into());
        self
    }

    pub fn with_menu_path(mut self, menu_path: impl Into<String>) -> Self {
        self.plugin.menu_path = Some(menu_path.into());
        self
    }

    pub fn with_priority(mut self, priority: f64) -> Self {
        self.plugin.priority = priority;
        self
    }

    /// Fix `name` to `value` for every run. The parameter disappears from
    /// the ordered input/output lists but stays resolvable by name.
    pub fn with_preset(mut self, name: impl Into<String>, value: Value) -> Self {
        self.presets.insert(name.into(), value);
        self
    }

    pub fn with_flags(mut self, flags: CommandFlags) -> Self {
        self.flags = flags;
        self
    }

    pub fn cancelable(mut self) -> Self {
        self.flags.cancelable = true;
        self
    }

    pub fn headless(mut self) -> Self {
        self.flags.headless = true;
        self
    }

    pub fn previewable(mut self) -> Self {
        self.flags.previewable = true;
        self
    }

    pub fn disabled(mut self) -> Self {
        self.plugin.enabled = false;
        self
    }

    // -- Plugin metadata --

    pub fn plugin(&self) -> &PluginDescriptor {
        &self.plugin
    }

    pub fn identity(&self) -> &str {
        &self.plugin.identity
    }

    pub fn implementation(&self) -> Option<ImplType> {
        self.plugin.implementation
    }

    pub fn is_enabled(&self) -> bool {
        self.plugin.enabled
    }

    /// Explicit title, or the last segment of the identity.
    pub fn title(&self) -> &str {
        self.plugin.title()
    }

    pub fn flags(&self) -> CommandFlags {
        self.flags
    }

    pub fn can_preview(&self) -> bool {
        self.flags.previewable
    }

    pub fn can_cancel(&self) -> bool {
        self.flags.cancelable
    }

    pub fn can_run_headless(&self) -> bool {
        self.flags.headless
    }

    pub fn presets(&self) -> &BTreeMap<String, Value> {
        &self.presets
    }

    pub fn is_preset(&self, name: &str) -> bool {
        self.presets.contains_key(name)
    }

    // -- Parameter metadata (parses on first use) --

    /// Ordered inputs, preset parameters excluded.
    pub fn inputs(&self) -> &[ParameterDescriptor] {
        &self.parsed().inputs
    }

    /// Ordered outputs, preset parameters excluded.
    pub fn outputs(&self) -> &[ParameterDescriptor] {
        &self.parsed().outputs
    }

    /// Input by name, presets included.
    pub fn input(&self, name: &str) -> Option<&ParameterDescriptor> {
        self.parsed().input_map.get(name)
    }

    /// Output by name, presets included.
    pub fn output(&self, name: &str) -> Option<&ParameterDescriptor> {
        self.parsed().output_map.get(name)
    }

    /// Service slots among the inputs, presets included.
    pub fn service_slots(&self) -> impl Iterator<Item = &ParameterDescriptor> {
        let parsed = self.parsed();
        parsed.input_map.values().filter(|p| p.is_service())
    }

    /// Every accepted input, presets included, in no particular order.
    pub(crate) fn all_inputs(&self) -> impl Iterator<Item = &ParameterDescriptor> {
        self.parsed().input_map.values()
    }

    pub fn is_valid(&self) -> bool {
        self.parsed().problems.is_empty()
    }

    /// Problems found while parsing, or `None` when the command is valid.
    pub fn problems(&self) -> Option<&[String]> {
        let problems = &self.parsed().problems;
        if problems.is_empty() {
            None
        } else {
            Some(problems)
        }
    }

    /// Whether parameter metadata has been parsed yet.
    pub fn is_parsed(&self) -> bool {
        self.parsed.get().is_some()
    }

    /// Fail with [`RuntimeError::InvalidCommand`] unless the command is valid.
    pub fn ensure_valid(&self) -> Result<()> {
        match self.problems() {
            None => Ok(()),
            Some(problems) => Err(RuntimeError::InvalidCommand {
                identity: self.identity().to_string(),
                problems: problems.to_vec(),
            }),
        }
    }

    // -- Construction --

    /// A fresh, unbound command instance.
    pub fn create_command(&self) -> Result<Box<dyn Command>> {
        self.factory.create().map_err(|e| {
            error!(command = %self.identity(), error = %e, "Could not instantiate command");
            RuntimeError::Instantiation(format!("{}: {:#}", self.identity(), e))
        })
    }

    /// Announce that this descriptor's metadata changed.
    pub fn update(&self, publisher: &dyn EventPublisher) {
        publisher.publish(
            EventKind::ModulesUpdated {
                identity: self.identity().to_string(),
            }
            .into(),
        );
    }

    fn parsed(&self) -> &ParsedParameters {
        self.parsed.get_or_init(|| self.parse_parameters())
    }

    fn parse_parameters(&self) -> ParsedParameters {
        let mut parsed = ParsedParameters::default();

        let declared = match self.factory.parameters() {
            Ok(declared) => declared,
            Err(e) => {
                // Not a parameter problem; instantiation reports it at run time.
                error!(command = %self.identity(), error = %format!("{:#}", e), "Could not describe command");
                return parsed;
            }
        };

        for param in declared {
            let mut valid = true;

            if !param.mutable && !param.is_message() {
                // Immutable slots cannot receive bound values.
                let problem = format!("Invalid immutable parameter: {}", param.name);
                error!(command = %self.identity(), parameter = %param.name, "{}", problem);
                parsed.problems.push(problem);
                valid = false;
            }

            if parsed.input_map.contains_key(&param.name)
                || parsed.output_map.contains_key(&param.name)
            {
                // Shadowed names are ambiguous binding targets.
                let problem = format!("Invalid duplicate parameter: {}", param.name);
                error!(command = %self.identity(), parameter = %param.name, "{}", problem);
                parsed.problems.push(problem);
                valid = false;
            }

            if !valid {
                continue;
            }

            let is_preset = self.presets.contains_key(&param.name);
            if param.is_input() {
                parsed.input_map.insert(param.name.clone(), param.clone());
                if !is_preset {
                    parsed.inputs.push(param.clone());
                }
            }
            if param.is_output() {
                parsed.output_map.insert(param.name.clone(), param.clone());
                if !is_preset {
                    parsed.outputs.push(param);
                }
            }
        }

        debug!(
            command = %self.identity(),
            inputs = parsed.input_map.len(),
            outputs = parsed.output_map.len(),
            problems = parsed.problems.len(),
            "Parsed command parameters"
        );

        parsed
    }
}

impl fmt::Debug for CommandDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CommandDescriptor")
            .field("plugin", &self.plugin)
            .field("flags", &self.flags)
            .field("presets", &self.presets)
            .field("parsed", &self.is_parsed())
            .finish()
    }
}

/// Serializable summary used by the CLI's `describe` output.
#[derive(Debug, Serialize)]
pub struct CommandSummary<'a> {
    pub identity: &'a str,
    pub title: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub menu_path: Option<&'a str>,
    pub flags: CommandFlags,
    pub valid: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub problems: Option<&'a [String]>,
    pub inputs: &'a [ParameterDescriptor],
    pub outputs: &'a [ParameterDescriptor],
    pub presets: &'a BTreeMap<String, Value>,
}

impl CommandDescriptor {
    pub fn summary(&self) -> CommandSummary<'_> {
        CommandSummary {
            identity: self.identity(),
            title: self.title(),
            menu_path: self.plugin.menu_path.as_deref(),
            flags: self.flags,
            valid: self.is_valid(),
            problems: self.problems(),
            inputs: self.inputs(),
            outputs: self.outputs(),
            presets: &self.presets,
        }
    }
}
