//! Plugin registry facade for modrun
//!
//! [`PluginService`] owns the [`PluginIndex`] and is the only writer to it.
//! It refreshes the index from a [`DiscoverySource`], accepts manual
//! registrations, answers typed and untyped lookups, and creates bare
//! plugin instances. It performs no service injection and runs no
//! interceptors; that is the command service's job.

use std::any::{Any, TypeId};
use std::sync::Arc;

use tracing::{debug, error, info};

use crate::command::CommandDescriptor;
use crate::config::PluginFilterConfig;
use crate::events::{EventKind, EventPublisher, NoopPublisher};

use super::discovery::{DiscoverySource, StaticDiscovery};
use super::index::{PluginIndex, PluginSnapshot};
use super::types::{Capability, PluginInfo, PluginInstance};

/// Registry of every plugin known to the runtime.
///
/// # Example
///
/// ```rust
/// use modrun::commands::Sum;
/// use modrun::command::CommandDescriptor;
/// use modrun::plugins::{PluginService, StaticDiscovery};
///
/// let discovered = StaticDiscovery::new(vec![CommandDescriptor::of::<Sum>().into()]);
/// let plugins = PluginService::with_discovery(discovered);
/// assert_eq!(plugins.plugin_count(), 1);
/// assert!(plugins.plugin_of_type::<Sum>().is_some());
/// ```
pub struct PluginService {
    index: PluginIndex,
    discovery: Arc<dyn DiscoverySource>,
    filter: PluginFilterConfig,
    events: Arc<dyn EventPublisher>,
}

impl PluginService {
    /// Create the registry and populate it from `discovery`.
    pub fn new(
        discovery: Arc<dyn DiscoverySource>,
        filter: PluginFilterConfig,
        events: Arc<dyn EventPublisher>,
    ) -> Self {
        let service = Self {
            index: PluginIndex::new(),
            discovery,
            filter,
            events,
        };
        service.reload_plugins();
        service
    }

    /// Registry over `discovery` with no filtering and no event publishing.
    pub fn with_discovery(discovery: impl DiscoverySource + 'static) -> Self {
        Self::new(
            Arc::new(discovery),
            PluginFilterConfig::default(),
            Arc::new(NoopPublisher),
        )
    }

    /// Registry that discovers nothing; plugins are added manually.
    pub fn empty() -> Self {
        Self::with_discovery(StaticDiscovery::empty())
    }

    pub fn events(&self) -> &Arc<dyn EventPublisher> {
        &self.events
    }

    pub fn index(&self) -> &PluginIndex {
        &self.index
    }

    /// The current snapshot; it stays unchanged while held.
    pub fn snapshot(&self) -> Arc<PluginSnapshot> {
        self.index.snapshot()
    }

    // -- Writes --

    /// Rebuild the index from discovery. Manually added plugins are dropped.
    ///
    /// Returns the number of plugins installed.
    pub fn reload_plugins(&self) -> usize {
        let discovered = self.discovery.scan();
        let found = discovered.len();

        let permitted: Vec<PluginInfo> = discovered
            .into_iter()
            .filter(|plugin| {
                let permitted = self.filter.is_permitted(plugin.identity());
                if !permitted {
                    debug!(plugin = %plugin.identity(), "Plugin filtered out by config");
                }
                permitted
            })
            .collect();

        let count = permitted.len();
        self.index.replace(permitted);

        info!(
            discovered = found,
            installed = count,
            "Reloaded plugins"
        );
        self.events
            .publish(EventKind::PluginsReloaded { count }.into());
        count
    }

    /// Register one plugin after the current entries.
    ///
    /// Returns the registered entry, which can later be passed to
    /// [`remove_plugin`](Self::remove_plugin). Manual registrations bypass
    /// the discovery filter.
    pub fn add_plugin(&self, plugin: impl Into<PluginInfo>) -> PluginInfo {
        let plugin = plugin.into();
        self.add_plugins(vec![plugin.clone()]);
        plugin
    }

    /// Register several plugins at once, as one snapshot update.
    pub fn add_plugins(&self, plugins: impl IntoIterator<Item = PluginInfo>) {
        let plugins: Vec<PluginInfo> = plugins.into_iter().collect();
        if plugins.is_empty() {
            return;
        }
        self.index.add(&plugins);

        let identities = identities(&plugins);
        info!(plugins = ?identities, "Added plugins");
        self.events
            .publish(EventKind::PluginsAdded { identities }.into());
    }

    /// Unregister one plugin. Returns whether it was registered.
    pub fn remove_plugin(&self, plugin: &PluginInfo) -> bool {
        self.remove_plugins(std::slice::from_ref(plugin)) > 0
    }

    /// Unregister several plugins at once. Returns how many entries were removed.
    pub fn remove_plugins(&self, plugins: &[PluginInfo]) -> usize {
        let removed = self.index.remove(plugins);
        if removed > 0 {
            let identities = identities(plugins);
            info!(plugins = ?identities, removed, "Removed plugins");
            self.events
                .publish(EventKind::PluginsRemoved { identities }.into());
        }
        removed
    }

    // -- Lookups --

    /// All plugins in registration order.
    pub fn plugins(&self) -> Vec<PluginInfo> {
        self.index.all()
    }

    pub fn plugin_count(&self) -> usize {
        self.index.len()
    }

    /// First plugin registered under `identity`.
    pub fn plugin(&self, identity: &str) -> Option<PluginInfo> {
        self.snapshot().named(identity).next().cloned()
    }

    /// Every plugin registered under `identity`.
    pub fn plugins_named(&self, identity: &str) -> Vec<PluginInfo> {
        self.index.get_by_identity(identity)
    }

    pub fn plugins_of_capability(&self, capability: Capability) -> Vec<PluginInfo> {
        self.index.get_by_capability(capability)
    }

    /// First plugin implemented by `T`.
    pub fn plugin_of_type<T: Any>(&self) -> Option<PluginInfo> {
        let wanted = TypeId::of::<T>();
        self.snapshot()
            .all()
            .iter()
            .find(|p| implemented_by(p, wanted))
            .cloned()
    }

    /// Every plugin implemented by `T`.
    pub fn plugins_of_type<T: Any>(&self) -> Vec<PluginInfo> {
        self.plugins_of_type_id(TypeId::of::<T>())
    }

    pub(crate) fn plugins_of_type_id(&self, wanted: TypeId) -> Vec<PluginInfo> {
        self.snapshot()
            .all()
            .iter()
            .filter(|p| implemented_by(p, wanted))
            .cloned()
            .collect()
    }

    /// Command descriptors in registration order.
    pub fn commands(&self) -> Vec<Arc<CommandDescriptor>> {
        self.snapshot()
            .of_capability(Capability::Command)
            .filter_map(|p| p.as_command().cloned())
            .collect()
    }

    // -- Instantiation --

    /// Create one bare instance per descriptor, skipping (and logging) those
    /// whose construction fails. No services are injected.
    pub fn instantiate(&self, plugins: &[PluginInfo]) -> Vec<PluginInstance> {
        plugins
            .iter()
            .filter_map(|plugin| match plugin.instantiate() {
                Ok(instance) => Some(instance),
                Err(e) => {
                    error!(
                        plugin = %plugin.identity(),
                        capability = %plugin.capability(),
                        error = %e,
                        "Could not instantiate plugin"
                    );
                    None
                }
            })
            .collect()
    }

    /// Create one bare instance of every registered plugin of `capability`.
    pub fn create_instances_of(&self, capability: Capability) -> Vec<PluginInstance> {
        let plugins = self.plugins_of_capability(capability);
        self.instantiate(&plugins)
    }
}

impl Default for PluginService {
    fn default() -> Self {
        Self::empty()
    }
}

fn implemented_by(plugin: &PluginInfo, wanted: TypeId) -> bool {
    plugin
        .descriptor()
        .implementation
        .map(|imp| imp.type_id() == wanted)
        .unwrap_or(false)
}

fn identities(plugins: &[PluginInfo]) -> Vec<String> {
    plugins.iter().map(|p| p.identity().to_string()).collect()
}
