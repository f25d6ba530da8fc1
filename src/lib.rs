//! modrun - extensible command runtime
//!
//! Commands declare typed parameters, get discovered into a plugin
//! registry, and execute as modules through an async pre/post-processing
//! pipeline with service injection and lifecycle events.

pub mod command;
pub mod commands;
pub mod config;
pub mod error;
pub mod events;
pub mod interceptors;
pub mod plugins;
pub mod services;
pub mod utils;

pub use command::{CommandDescriptor, CommandService, Module, ModuleHandle, ModuleStatus};
pub use config::RuntimeConfig;
pub use error::{Result, RuntimeError};
pub use events::{EventBus, RuntimeEvent};
pub use plugins::PluginService;
