//! Interceptors around module execution.
//!
//! Interceptors are plugins consulted at two points of a module's lifecycle:
//!
//! - [`Preprocessor`]: before the command body runs (can inspect, fill in or
//!   cancel the module)
//! - [`Postprocessor`]: after the command body completed (can inspect or
//!   publish outputs)
//!
//! Both kinds are registered in the plugin index like any other plugin and
//! are instantiated fresh for every run. They run sequentially on the
//! module's worker in ascending priority order; ties keep registration order.
//!
//! # Example
//!
//! ```rust
//! use async_trait::async_trait;
//! use modrun::command::Module;
//! use modrun::interceptors::{Preprocessor, PreprocessorDescriptor};
//!
//! #[derive(Default)]
//! struct NightlyFreeze;
//!
//! #[async_trait]
//! impl Preprocessor for NightlyFreeze {
//!     async fn process(&self, module: &mut Module) -> anyhow::Result<()> {
//!         module.cancel("Runs are frozen during maintenance");
//!         Ok(())
//!     }
//! }
//!
//! let info = PreprocessorDescriptor::of::<NightlyFreeze>().with_priority(-100.0);
//! assert_eq!(info.plugin().priority, -100.0);
//! ```

pub mod builtin;

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;

use crate::command::Module;
use crate::plugins::{Capability, PluginDescriptor, PluginInfo};

// ---------------------------------------------------------------------------
// Interceptor traits
// ---------------------------------------------------------------------------

/// Consulted before a command body runs.
///
/// Call [`Module::cancel`] to stop the module; the body and all
/// postprocessors are then skipped. Returning an error cancels the module
/// with the error text as the reason.
#[async_trait]
pub trait Preprocessor: Send + Sync {
    async fn process(&self, module: &mut Module) -> anyhow::Result<()>;
}

/// Consulted after a command body completed successfully.
///
/// Errors are logged and recorded on the module; they never change a
/// completed module's status.
#[async_trait]
pub trait Postprocessor: Send + Sync {
    async fn process(&self, module: &mut Module) -> anyhow::Result<()>;
}

// ---------------------------------------------------------------------------
// Descriptors
// ---------------------------------------------------------------------------

type Factory<T> = Arc<dyn Fn() -> anyhow::Result<Box<T>> + Send + Sync>;

/// Registry metadata plus a factory for one interceptor plugin.
pub struct InterceptorDescriptor<T: ?Sized> {
    plugin: PluginDescriptor,
    factory: Factory<T>,
}

/// Descriptor of a [`Preprocessor`] plugin.
pub type PreprocessorDescriptor = InterceptorDescriptor<dyn Preprocessor>;

/// Descriptor of a [`Postprocessor`] plugin.
pub type PostprocessorDescriptor = InterceptorDescriptor<dyn Postprocessor>;

impl<T: ?Sized> InterceptorDescriptor<T> {
    pub fn plugin(&self) -> &PluginDescriptor {
        &self.plugin
    }

    /// Construct a fresh interceptor instance.
    pub fn create(&self) -> anyhow::Result<Box<T>> {
        (self.factory)()
    }

    pub fn with_identity(mut self, identity: impl Into<String>) -> Self {
        self.plugin.identity = identity.into();
        self
    }

    pub fn with_priority(mut self, priority: f64) -> Self {
        self.plugin.priority = priority;
        self
    }

    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.plugin.title = Some(title.into());
        self
    }

    /// Keep the plugin registered but skip it during runs.
    pub fn disabled(mut self) -> Self {
        self.plugin.enabled = false;
        self
    }
}

impl InterceptorDescriptor<dyn Preprocessor> {
    /// Descriptor for a default-constructible preprocessor type.
    pub fn of<P: Preprocessor + Default + 'static>() -> Self {
        Self {
            plugin: PluginDescriptor::of::<P>(Capability::Preprocessor),
            factory: Arc::new(|| {
                Ok::<_, anyhow::Error>(Box::new(P::default()) as Box<dyn Preprocessor>)
            }),
        }
    }

    /// Descriptor backed by an arbitrary factory.
    pub fn from_fn<F>(identity: impl Into<String>, factory: F) -> Self
    where
        F: Fn() -> anyhow::Result<Box<dyn Preprocessor>> + Send + Sync + 'static,
    {
        Self {
            plugin: PluginDescriptor::new(identity, Capability::Preprocessor),
            factory: Arc::new(factory),
        }
    }
}

impl InterceptorDescriptor<dyn Postprocessor> {
    /// Descriptor for a default-constructible postprocessor type.
    pub fn of<P: Postprocessor + Default + 'static>() -> Self {
        Self {
            plugin: PluginDescriptor::of::<P>(Capability::Postprocessor),
            factory: Arc::new(|| {
                Ok::<_, anyhow::Error>(Box::new(P::default()) as Box<dyn Postprocessor>)
            }),
        }
    }

    /// Descriptor backed by an arbitrary factory.
    pub fn from_fn<F>(identity: impl Into<String>, factory: F) -> Self
    where
        F: Fn() -> anyhow::Result<Box<dyn Postprocessor>> + Send + Sync + 'static,
    {
        Self {
            plugin: PluginDescriptor::new(identity, Capability::Postprocessor),
            factory: Arc::new(factory),
        }
    }
}

impl<T: ?Sized> fmt::Debug for InterceptorDescriptor<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InterceptorDescriptor")
            .field("plugin", &self.plugin)
            .finish()
    }
}

// ---------------------------------------------------------------------------
// Chain assembly
// ---------------------------------------------------------------------------

/// Enabled plugins from `plugins`, ordered by ascending priority.
///
/// The sort is stable, so equal priorities keep registration order.
pub(crate) fn ordered_enabled<'a, D, F>(
    plugins: &'a [PluginInfo],
    project: F,
) -> Vec<&'a Arc<D>>
where
    D: ?Sized,
    F: Fn(&'a PluginInfo) -> Option<&'a Arc<D>>,
{
    let mut selected: Vec<&PluginInfo> = plugins.iter().filter(|p| p.is_enabled()).collect();
    selected.sort_by(|a, b| a.priority().total_cmp(&b.priority()));
    selected.into_iter().filter_map(project).collect()
}

/// Instantiate a fresh, priority-ordered chain of preprocessors.
///
/// Interceptors whose factory fails are logged and left out.
pub fn preprocessor_chain(plugins: &[PluginInfo]) -> Vec<(String, Box<dyn Preprocessor>)> {
    ordered_enabled(plugins, PluginInfo::as_preprocessor)
        .into_iter()
        .filter_map(|info| instantiate_logged(info.as_ref()))
        .collect()
}

/// Instantiate a fresh, priority-ordered chain of postprocessors.
pub fn postprocessor_chain(plugins: &[PluginInfo]) -> Vec<(String, Box<dyn Postprocessor>)> {
    ordered_enabled(plugins, PluginInfo::as_postprocessor)
        .into_iter()
        .filter_map(|info| instantiate_logged(info.as_ref()))
        .collect()
}

fn instantiate_logged<T: ?Sized>(info: &InterceptorDescriptor<T>) -> Option<(String, Box<T>)> {
    match info.create() {
        Ok(instance) => Some((info.plugin().identity.clone(), instance)),
        Err(error) => {
            tracing::error!(
                interceptor = %info.plugin().identity,
                capability = %info.plugin().capability,
                error = %error,
                "Could not instantiate interceptor"
            );
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{NoopPostprocessor, NoopPreprocessor};

    fn pre(identity: &str, priority: f64) -> PluginInfo {
        PreprocessorDescriptor::of::<NoopPreprocessor>()
            .with_identity(identity)
            .with_priority(priority)
            .into()
    }

    fn names<T: ?Sized>(chain: &[(String, Box<T>)]) -> Vec<&str> {
        chain.iter().map(|(name, _)| name.as_str()).collect()
    }

    #[test]
    fn test_chain_orders_by_ascending_priority() {
        let plugins = vec![pre("late", 10.0), pre("early", -5.0), pre("middle", 0.0)];
        let chain = preprocessor_chain(&plugins);
        assert_eq!(names(&chain), vec!["early", "middle", "late"]);
    }

    #[test]
    fn test_chain_ties_keep_registration_order() {
        let plugins = vec![pre("first", 1.0), pre("second", 1.0), pre("third", 1.0)];
        let chain = preprocessor_chain(&plugins);
        assert_eq!(names(&chain), vec!["first", "second", "third"]);
    }

    #[test]
    fn test_chain_skips_disabled_and_other_capabilities() {
        let plugins = vec![
            pre("on", 0.0),
            PreprocessorDescriptor::of::<NoopPreprocessor>()
                .with_identity("off")
                .disabled()
                .into(),
            PostprocessorDescriptor::of::<NoopPostprocessor>()
                .with_identity("post")
                .into(),
        ];
        assert_eq!(names(&preprocessor_chain(&plugins)), vec!["on"]);
        assert_eq!(names(&postprocessor_chain(&plugins)), vec!["post"]);
    }

    #[test]
    fn test_failing_factory_is_left_out() {
        let plugins = vec![
            pre("ok", 0.0),
            PreprocessorDescriptor::from_fn("broken", || anyhow::bail!("missing native library"))
                .into(),
        ];
        assert_eq!(names(&preprocessor_chain(&plugins)), vec!["ok"]);
    }

    #[test]
    fn test_each_chain_gets_fresh_instances() {
        use std::sync::atomic::{AtomicUsize, Ordering};

        let created = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&created);
        let plugins: Vec<PluginInfo> = vec![PreprocessorDescriptor::from_fn("counted", move || {
            counter.fetch_add(1, Ordering::SeqCst);
            Ok(Box::new(NoopPreprocessor) as Box<dyn Preprocessor>)
        })
        .into()];

        preprocessor_chain(&plugins);
        preprocessor_chain(&plugins);
        assert_eq!(created.load(Ordering::SeqCst), 2);
    }
}
