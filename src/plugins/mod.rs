//! Plugin system for modrun
//!
//! Every discoverable unit (commands and interceptors alike) is a plugin.
//! This module provides:
//!
//! - **types**: plugin metadata ([`PluginDescriptor`]), the [`Capability`]
//!   set, and the [`PluginInfo`] / [`PluginInstance`] sum types
//! - **index**: the snapshot-based [`PluginIndex`]
//! - **discovery**: the [`DiscoverySource`] collaborator
//! - **registry**: the [`PluginService`] facade
//!
//! # Usage
//!
//! ```rust
//! use modrun::commands::{Delay, Sum};
//! use modrun::command::CommandDescriptor;
//! use modrun::plugins::{Capability, PluginService};
//!
//! let plugins = PluginService::empty();
//! plugins.add_plugins(vec![
//!     CommandDescriptor::of::<Sum>().into(),
//!     CommandDescriptor::of::<Delay>().into(),
//! ]);
//!
//! assert_eq!(plugins.plugins_of_capability(Capability::Command).len(), 2);
//! ```

mod discovery;
mod index;
pub mod registry;
pub mod types;

pub use discovery::{DiscoverySource, StaticDiscovery};
pub use index::{PluginIndex, PluginSnapshot};
pub use registry::PluginService;
pub use types::{Capability, ImplType, PluginDescriptor, PluginInfo, PluginInstance};
