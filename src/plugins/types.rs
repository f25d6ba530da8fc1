//! Plugin types for modrun
//!
//! This module defines the metadata shared by every discoverable unit
//! ([`PluginDescriptor`]), the closed set of plugin capabilities, and the
//! [`PluginInfo`] sum type the index stores.

use std::any::{Any, TypeId};
use std::fmt;
use std::sync::Arc;

use serde::{Serialize, Serializer};

use crate::command::{Command, CommandDescriptor};
use crate::interceptors::{
    Postprocessor, PostprocessorDescriptor, Preprocessor, PreprocessorDescriptor,
};

// ---------------------------------------------------------------------------
// Capability
// ---------------------------------------------------------------------------

/// The role a plugin plays in the runtime.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Capability {
    /// A runnable command.
    Command,
    /// An interceptor consulted before a command runs.
    Preprocessor,
    /// An interceptor consulted after a command runs.
    Postprocessor,
}

impl Capability {
    pub fn as_str(&self) -> &'static str {
        match self {
            Capability::Command => "command",
            Capability::Preprocessor => "preprocessor",
            Capability::Postprocessor => "postprocessor",
        }
    }
}

impl fmt::Display for Capability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// Implementation type
// ---------------------------------------------------------------------------

/// The Rust type implementing a plugin, used for lookup by type.
#[derive(Clone, Copy)]
pub struct ImplType {
    type_id: TypeId,
    type_name: &'static str,
}

impl ImplType {
    pub fn of<T: Any>() -> Self {
        Self {
            type_id: TypeId::of::<T>(),
            type_name: std::any::type_name::<T>(),
        }
    }

    pub fn type_id(&self) -> TypeId {
        self.type_id
    }

    /// Fully-qualified type name, e.g. `modrun::commands::Sum`.
    pub fn type_name(&self) -> &'static str {
        self.type_name
    }
}

impl PartialEq for ImplType {
    fn eq(&self, other: &Self) -> bool {
        self.type_id == other.type_id
    }
}

impl Eq for ImplType {}

impl fmt::Debug for ImplType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ImplType({})", self.type_name)
    }
}

impl Serialize for ImplType {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.serialize_str(self.type_name)
    }
}

// ---------------------------------------------------------------------------
// Plugin descriptor
// ---------------------------------------------------------------------------

/// Identity and classification metadata for one discoverable unit.
///
/// Descriptors are cheap to inspect: nothing here requires the plugin's
/// implementation to be constructed.
#[derive(Debug, Clone, Serialize)]
pub struct PluginDescriptor {
    /// Stable lookup key, usually the fully-qualified implementation name.
    /// Duplicates are allowed; singular lookups return the first match.
    pub identity: String,

    pub capability: Capability,

    /// Implementing type, when the plugin is backed by a concrete Rust type.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub implementation: Option<ImplType>,

    /// Explicit title. See [`PluginDescriptor::title`] for the fallback.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,

    /// Menu placement, e.g. `Process > Math > Add`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub menu_path: Option<String>,

    /// Ordering key for interceptors; lower runs first.
    pub priority: f64,

    pub enabled: bool,
}

impl PluginDescriptor {
    /// Create an enabled descriptor with default priority.
    pub fn new(identity: impl Into<String>, capability: Capability) -> Self {
        Self {
            identity: identity.into(),
            capability,
            implementation: None,
            title: None,
            description: None,
            menu_path: None,
            priority: 0.0,
            enabled: true,
        }
    }

    /// Create a descriptor whose identity is the type name of `T`.
    pub fn of<T: Any>(capability: Capability) -> Self {
        let implementation = ImplType::of::<T>();
        let mut descriptor = Self::new(implementation.type_name(), capability);
        descriptor.implementation = Some(implementation);
        descriptor
    }

    /// The explicit title, or the last `.`/`::` separated segment of the identity.
    pub fn title(&self) -> &str {
        match &self.title {
            Some(title) => title,
            None => short_name(&self.identity),
        }
    }

    pub fn is_implemented_by<T: Any>(&self) -> bool {
        self.implementation
            .map(|imp| imp.type_id() == TypeId::of::<T>())
            .unwrap_or(false)
    }
}

/// Last segment of a dotted or path-qualified name.
pub(crate) fn short_name(qualified: &str) -> &str {
    // Generic arguments would contain separators of their own.
    let base = qualified.split('<').next().unwrap_or(qualified);
    base.rsplit(&['.', ':'][..]).next().unwrap_or(base)
}

// ---------------------------------------------------------------------------
// PluginInfo / PluginInstance
// ---------------------------------------------------------------------------

/// A registered plugin: one of the closed set of capability-specific descriptors.
///
/// Cloning is cheap; clones share the same descriptor, so two clones compare
/// as the same registration in [`PluginInfo::same_registration`].
#[derive(Clone)]
pub enum PluginInfo {
    Command(Arc<CommandDescriptor>),
    Preprocessor(Arc<PreprocessorDescriptor>),
    Postprocessor(Arc<PostprocessorDescriptor>),
}

impl PluginInfo {
    pub fn descriptor(&self) -> &PluginDescriptor {
        match self {
            PluginInfo::Command(info) => info.plugin(),
            PluginInfo::Preprocessor(info) => info.plugin(),
            PluginInfo::Postprocessor(info) => info.plugin(),
        }
    }

    pub fn identity(&self) -> &str {
        &self.descriptor().identity
    }

    pub fn capability(&self) -> Capability {
        self.descriptor().capability
    }

    pub fn priority(&self) -> f64 {
        self.descriptor().priority
    }

    pub fn is_enabled(&self) -> bool {
        self.descriptor().enabled
    }

    pub fn as_command(&self) -> Option<&Arc<CommandDescriptor>> {
        match self {
            PluginInfo::Command(info) => Some(info),
            _ => None,
        }
    }

    pub fn as_preprocessor(&self) -> Option<&Arc<PreprocessorDescriptor>> {
        match self {
            PluginInfo::Preprocessor(info) => Some(info),
            _ => None,
        }
    }

    pub fn as_postprocessor(&self) -> Option<&Arc<PostprocessorDescriptor>> {
        match self {
            PluginInfo::Postprocessor(info) => Some(info),
            _ => None,
        }
    }

    /// Whether `self` and `other` are the same registered descriptor.
    pub fn same_registration(&self, other: &PluginInfo) -> bool {
        match (self, other) {
            (PluginInfo::Command(a), PluginInfo::Command(b)) => Arc::ptr_eq(a, b),
            (PluginInfo::Preprocessor(a), PluginInfo::Preprocessor(b)) => Arc::ptr_eq(a, b),
            (PluginInfo::Postprocessor(a), PluginInfo::Postprocessor(b)) => Arc::ptr_eq(a, b),
            _ => false,
        }
    }

    /// Construct the bare plugin object: no service injection, no presets,
    /// no interceptors.
    pub fn instantiate(&self) -> anyhow::Result<PluginInstance> {
        Ok(match self {
            PluginInfo::Command(info) => PluginInstance::Command(info.create_command()?),
            PluginInfo::Preprocessor(info) => PluginInstance::Preprocessor(info.create()?),
            PluginInfo::Postprocessor(info) => PluginInstance::Postprocessor(info.create()?),
        })
    }
}

impl fmt::Debug for PluginInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PluginInfo")
            .field("identity", &self.identity())
            .field("capability", &self.capability())
            .finish()
    }
}

impl From<CommandDescriptor> for PluginInfo {
    fn from(info: CommandDescriptor) -> Self {
        PluginInfo::Command(Arc::new(info))
    }
}

impl From<Arc<CommandDescriptor>> for PluginInfo {
    fn from(info: Arc<CommandDescriptor>) -> Self {
        PluginInfo::Command(info)
    }
}

impl From<PreprocessorDescriptor> for PluginInfo {
    fn from(info: PreprocessorDescriptor) -> Self {
        PluginInfo::Preprocessor(Arc::new(info))
    }
}

impl From<PostprocessorDescriptor> for PluginInfo {
    fn from(info: PostprocessorDescriptor) -> Self {
        PluginInfo::Postprocessor(Arc::new(info))
    }
}

/// A bare plugin object created by [`PluginInfo::instantiate`].
pub enum PluginInstance {
    Command(Box<dyn Command>),
    Preprocessor(Box<dyn Preprocessor>),
    Postprocessor(Box<dyn Postprocessor>),
}

impl PluginInstance {
    pub fn capability(&self) -> Capability {
        match self {
            PluginInstance::Command(_) => Capability::Command,
            PluginInstance::Preprocessor(_) => Capability::Preprocessor,
            PluginInstance::Postprocessor(_) => Capability::Postprocessor,
        }
    }
}

impl fmt::Debug for PluginInstance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "PluginInstance({})", self.capability())
    }
}
