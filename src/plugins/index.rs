//! Snapshot-based plugin index
//!
//! The index is the only state shared between concurrent module runs. It is
//! read far more often than written, so it is kept as an immutable
//! [`PluginSnapshot`] behind an [`ArcSwap`]: readers load the current
//! snapshot without locking, writers build a new snapshot and swap it in.
//! A reader holding a snapshot keeps seeing it unchanged even if a reload
//! happens meanwhile.

use std::collections::HashMap;
use std::sync::Arc;

use arc_swap::ArcSwap;

use super::types::{Capability, PluginInfo};

/// An immutable view of all registered plugins at one point in time.
#[derive(Debug, Default)]
pub struct PluginSnapshot {
    /// Registration order.
    plugins: Vec<PluginInfo>,
    by_capability: HashMap<Capability, Vec<usize>>,
    by_identity: HashMap<String, Vec<usize>>,
}

impl PluginSnapshot {
    /// Build a snapshot, indexing `plugins` in the given order.
    pub fn new(plugins: Vec<PluginInfo>) -> Self {
        let mut by_capability: HashMap<Capability, Vec<usize>> = HashMap::new();
        let mut by_identity: HashMap<String, Vec<usize>> = HashMap::new();

        for (position, plugin) in plugins.iter().enumerate() {
            by_capability
                .entry(plugin.capability())
                .or_default()
                .push(position);
            by_identity
                .entry(plugin.identity().to_string())
                .or_default()
                .push(position);
        }

        Self {
            plugins,
            by_capability,
            by_identity,
        }
    }

    /// All plugins in registration order.
    pub fn all(&self) -> &[PluginInfo] {
        &self.plugins
    }

    pub fn len(&self) -> usize {
        self.plugins.len()
    }

    pub fn is_empty(&self) -> bool {
        self.plugins.is_empty()
    }

    /// Plugins of `capability`, in registration order.
    pub fn of_capability(&self, capability: Capability) -> impl Iterator<Item = &PluginInfo> {
        self.positions(self.by_capability.get(&capability))
    }

    /// Plugins registered under `identity`, in registration order.
    pub fn named<'a>(&'a self, identity: &str) -> impl Iterator<Item = &'a PluginInfo> {
        self.positions(self.by_identity.get(identity))
    }

    fn positions<'a>(
        &'a self,
        positions: Option<&'a Vec<usize>>,
    ) -> impl Iterator<Item = &'a PluginInfo> {
        positions
            .into_iter()
            .flatten()
            .map(move |&position| &self.plugins[position])
    }

    fn with_added(&self, added: &[PluginInfo]) -> Self {
        let mut plugins = self.plugins.clone();
        plugins.extend(added.iter().cloned());
        Self::new(plugins)
    }

    fn with_removed(&self, removed: &[PluginInfo]) -> Self {
        let plugins = self
            .plugins
            .iter()
            .filter(|plugin| !removed.iter().any(|r| r.same_registration(plugin)))
            .cloned()
            .collect();
        Self::new(plugins)
    }
}

/// Concurrently readable registry of plugin descriptors.
pub struct PluginIndex {
    current: ArcSwap<PluginSnapshot>,
}

impl PluginIndex {
    /// Create an empty index.
    pub fn new() -> Self {
        Self {
            current: ArcSwap::from_pointee(PluginSnapshot::default()),
        }
    }

    /// The current snapshot. Holding it never blocks writers.
    pub fn snapshot(&self) -> Arc<PluginSnapshot> {
        self.current.load_full()
    }

    /// Replace the whole contents.
    pub fn replace(&self, plugins: Vec<PluginInfo>) {
        self.current.store(Arc::new(PluginSnapshot::new(plugins)));
    }

    /// Append `plugins` after the current entries.
    pub fn add(&self, plugins: &[PluginInfo]) {
        if plugins.is_empty() {
            return;
        }
        // rcu retries if another writer swapped in between.
        self.current.rcu(|current| current.with_added(plugins));
    }

    /// Remove the given registrations. Returns how many entries were dropped.
    pub fn remove(&self, plugins: &[PluginInfo]) -> usize {
        if plugins.is_empty() {
            return 0;
        }
        let previous = self.current.rcu(|current| current.with_removed(plugins));
        previous
            .all()
            .iter()
            .filter(|plugin| plugins.iter().any(|r| r.same_registration(plugin)))
            .count()
    }

    /// Plugins of `capability` in registration order.
    pub fn get_by_capability(&self, capability: Capability) -> Vec<PluginInfo> {
        self.snapshot().of_capability(capability).cloned().collect()
    }

    /// Plugins registered under `identity` in registration order.
    pub fn get_by_identity(&self, identity: &str) -> Vec<PluginInfo> {
        self.snapshot().named(identity).cloned().collect()
    }

    /// All plugins in registration order.
    pub fn all(&self) -> Vec<PluginInfo> {
        self.snapshot().all().to_vec()
    }

    pub fn len(&self) -> usize {
        self.current.load().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for PluginIndex {
    fn default() -> Self {
        Self::new()
    }
}
