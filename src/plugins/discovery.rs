//! Discovery sources feeding the plugin index.

use super::types::PluginInfo;

/// Produces the plugins a reload installs.
///
/// How plugins are found is up to the source; the registry only asks for
/// the full current list, in registration order.
pub trait DiscoverySource: Send + Sync {
    fn scan(&self) -> Vec<PluginInfo>;
}

impl<F> DiscoverySource for F
where
    F: Fn() -> Vec<PluginInfo> + Send + Sync,
{
    fn scan(&self) -> Vec<PluginInfo> {
        self()
    }
}

/// A fixed list of plugins, returned unchanged by every scan.
#[derive(Debug, Clone, Default)]
pub struct StaticDiscovery {
    plugins: Vec<PluginInfo>,
}

impl StaticDiscovery {
    pub fn new(plugins: Vec<PluginInfo>) -> Self {
        Self { plugins }
    }

    /// A source that discovers nothing.
    pub fn empty() -> Self {
        Self::default()
    }
}

impl DiscoverySource for StaticDiscovery {
    fn scan(&self) -> Vec<PluginInfo> {
        self.plugins.clone()
    }
}
