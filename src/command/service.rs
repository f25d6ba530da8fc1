//! The command service: resolve, bind, and dispatch modules.

use std::any::{Any, TypeId};
use std::sync::Arc;

use tokio::runtime::Handle;
use tokio::sync::{watch, Semaphore};
use tracing::{debug, info, warn};

use crate::config::RuntimeConfig;
use crate::error::{Result, RuntimeError};
use crate::interceptors::{postprocessor_chain, preprocessor_chain};
use crate::plugins::{ImplType, PluginService};
use crate::services::{ServiceProvider, Services};

use super::descriptor::CommandDescriptor;
use super::handle::ModuleHandle;
use super::module::{Module, ModuleStatus};
use super::request::{Inputs, RunTarget};
use super::runner::Pipeline;
use super::DescribedCommand;

/// Executor facade over the plugin registry.
///
/// `run` resolves a command, builds and binds a [`Module`], and hands it to
/// a worker; it never waits for the module. At most
/// `max_concurrent_modules` modules execute at once; further runs queue
/// for a worker.
///
/// # Example
///
/// ```rust
/// use std::sync::Arc;
/// use modrun::command::{CommandService, ModuleStatus};
/// use modrun::commands::{self, Sum};
/// use modrun::config::RuntimeConfig;
/// use modrun::plugins::{PluginService, StaticDiscovery};
/// use modrun::services::ServiceRegistry;
/// use serde_json::json;
///
/// # #[tokio::main]
/// # async fn main() -> modrun::Result<()> {
/// let plugins = Arc::new(PluginService::with_discovery(StaticDiscovery::new(
///     commands::builtin(),
/// )));
/// let service = CommandService::new(plugins, Arc::new(ServiceRegistry::new()), &RuntimeConfig::default());
///
/// let module = service
///     .run_command::<Sum>(vec![json!("a"), json!(2), json!("b"), json!(3)])?
///     .join()
///     .await?;
/// assert_eq!(module.status(), ModuleStatus::Complete);
/// assert_eq!(module.output("sum"), Some(&json!(5.0)));
/// # Ok(())
/// # }
/// ```
pub struct CommandService {
    plugins: Arc<PluginService>,
    services: Arc<dyn ServiceProvider>,
    workers: Arc<Semaphore>,
    max_concurrent: usize,
    runtime: Option<Handle>,
}

impl CommandService {
    pub fn new(
        plugins: Arc<PluginService>,
        services: Arc<dyn ServiceProvider>,
        config: &RuntimeConfig,
    ) -> Self {
        let max_concurrent = config.max_concurrent_modules.max(1);
        Self {
            plugins,
            services,
            workers: Arc::new(Semaphore::new(max_concurrent)),
            max_concurrent,
            runtime: None,
        }
    }

    /// Spawn workers on `handle` instead of the ambient runtime, so `run`
    /// can be called from threads outside any runtime.
    pub fn with_runtime(mut self, handle: Handle) -> Self {
        self.runtime = Some(handle);
        self
    }

    pub fn plugins(&self) -> &Arc<PluginService> {
        &self.plugins
    }

    pub fn max_concurrent_modules(&self) -> usize {
        self.max_concurrent
    }

    // -- Command lookups --

    /// Every registered command, in registration order.
    pub fn list_commands(&self) -> Vec<Arc<CommandDescriptor>> {
        self.plugins.commands()
    }

    /// First command registered under `identity`.
    pub fn find_command(&self, identity: &str) -> Option<Arc<CommandDescriptor>> {
        self.find_commands_named(identity).into_iter().next()
    }

    /// Every command registered under `identity`.
    pub fn find_commands_named(&self, identity: &str) -> Vec<Arc<CommandDescriptor>> {
        self.plugins
            .plugins_named(identity)
            .iter()
            .filter_map(|p| p.as_command().cloned())
            .collect()
    }

    /// First command implemented by `C`.
    pub fn find_command_by_type<C: Any>(&self) -> Option<Arc<CommandDescriptor>> {
        self.find_commands_of_type::<C>().into_iter().next()
    }

    /// Every command implemented by `C`.
    pub fn find_commands_of_type<C: Any>(&self) -> Vec<Arc<CommandDescriptor>> {
        self.commands_of_type_id(TypeId::of::<C>())
    }

    fn commands_of_type_id(&self, wanted: TypeId) -> Vec<Arc<CommandDescriptor>> {
        self.plugins
            .plugins_of_type_id(wanted)
            .iter()
            .filter_map(|p| p.as_command().cloned())
            .collect()
    }

    // -- Module construction --

    /// Instantiate `descriptor`'s command and prepare a module: services
    /// injected, defaults and presets applied, nothing run.
    pub fn create_module(&self, descriptor: &Arc<CommandDescriptor>) -> Result<Module> {
        if !descriptor.is_enabled() {
            return Err(RuntimeError::Disabled(descriptor.identity().to_string()));
        }
        descriptor.ensure_valid()?;

        let command = descriptor.create_command()?;

        let mut services = Services::default();
        let mut missing = Vec::new();
        for slot in descriptor.service_slots() {
            let Some(role) = slot.kind.service_role() else {
                continue;
            };
            match self.services.get(role) {
                Some(instance) => services.insert(slot.name.clone(), *role, instance),
                None => {
                    warn!(
                        command = %descriptor.identity(),
                        slot = %slot.name,
                        role = %role,
                        "No service available"
                    );
                    missing.push(format!("No service for '{}' ({})", slot.name, role));
                }
            }
        }

        let mut module = Module::new(Arc::clone(descriptor), command, services);
        for diagnostic in missing {
            module.record_diagnostic(diagnostic);
        }
        module.apply_defaults();
        module.apply_presets();

        debug!(module = %module.id(), command = %descriptor.identity(), "Module created");
        Ok(module)
    }

    fn resolve(&self, target: RunTarget) -> Result<Module> {
        match target {
            RunTarget::Identity(identity) => {
                let descriptor = self
                    .find_command(&identity)
                    .ok_or_else(|| RuntimeError::NotFound(format!("command '{}'", identity)))?;
                self.create_module(&descriptor)
            }
            RunTarget::Type(implementation) => {
                let descriptor = self.find_by_impl(implementation)?;
                self.create_module(&descriptor)
            }
            RunTarget::Descriptor(descriptor) => self.create_module(&descriptor),
            RunTarget::Module(module) => {
                if module.status() != ModuleStatus::Created {
                    return Err(RuntimeError::InvalidTransition {
                        from: module.status(),
                        to: ModuleStatus::Preprocessing,
                    });
                }
                Ok(*module)
            }
        }
    }

    fn find_by_impl(&self, implementation: ImplType) -> Result<Arc<CommandDescriptor>> {
        self.commands_of_type_id(implementation.type_id())
            .into_iter()
            .next()
            .ok_or_else(|| {
                RuntimeError::NotFound(format!("command of type {}", implementation.type_name()))
            })
    }

    // -- Dispatch --

    /// Resolve `target`, bind `inputs`, and submit the module to a worker.
    ///
    /// Inputs are applied in order after defaults and presets. Inputs that
    /// cannot be bound are logged and recorded on the module, never raised.
    /// Fails only when the target cannot be resolved or instantiated, or no
    /// runtime is available.
    pub fn run(
        &self,
        target: impl Into<RunTarget>,
        inputs: impl Into<Inputs>,
    ) -> Result<ModuleHandle> {
        let runtime = self.runtime_handle()?;
        let mut module = self.resolve(target.into())?;

        let (bindings, malformed) = inputs.into().into_bindings();
        for error in &malformed {
            module.report_binding_error(error);
        }
        for (name, value) in bindings {
            module.bind(&name, value);
        }

        let snapshot = self.plugins.snapshot();
        let (status_tx, status_rx) = watch::channel(module.status());
        let pipeline = Pipeline {
            preprocessors: preprocessor_chain(snapshot.all()),
            postprocessors: postprocessor_chain(snapshot.all()),
            events: Arc::clone(self.plugins.events()),
            status: status_tx,
        };

        let id = module.id();
        let identity = module.identity().to_string();
        let cancel = module.cancel_token();
        let workers = Arc::clone(&self.workers);

        let task = runtime.spawn(async move {
            let _permit = workers
                .acquire_owned()
                .await
                .map_err(|e| RuntimeError::Join(format!("worker pool closed: {}", e)))?;
            pipeline.execute(module).await
        });

        info!(module = %id, command = %identity, "Module submitted");
        Ok(ModuleHandle::new(id, identity, status_rx, cancel, task))
    }

    /// [`run`](Self::run) the first command implemented by `C`.
    pub fn run_command<C: DescribedCommand>(
        &self,
        inputs: impl Into<Inputs>,
    ) -> Result<ModuleHandle> {
        self.run(RunTarget::of::<C>(), inputs)
    }

    fn runtime_handle(&self) -> Result<Handle> {
        match &self.runtime {
            Some(handle) => Ok(handle.clone()),
            None => Handle::try_current().map_err(|_| RuntimeError::NoRuntime),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::command::{Command, CommandContext, FnFactory, ParamKind, ParameterDescriptor};
    use crate::commands::{self, Delay, Sum};
    use crate::events::{EventBus, EventKind};
    use crate::interceptors::{
        builtin, Postprocessor, PostprocessorDescriptor, Preprocessor, PreprocessorDescriptor,
    };
    use crate::plugins::{PluginInfo, StaticDiscovery};
    use crate::services::{MockServiceProvider, ServiceInstance, ServiceRegistry, ServiceRole};
    use crate::config::PluginFilterConfig;
    use anyhow::Context;
    use async_trait::async_trait;
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::{Duration, Instant};

    /// Shared side-effect counter, injected as a service.
    #[derive(Default)]
    struct Counter(AtomicUsize);

    #[derive(Default)]
    struct Increment;

    #[async_trait]
    impl Command for Increment {
        async fn run(&mut self, ctx: &mut CommandContext) -> anyhow::Result<()> {
            let counter = ctx
                .services()
                .named::<Counter>("counter")
                .ok_or_else(|| anyhow::anyhow!("counter service missing"))?;
            let by: usize = ctx.input("by").unwrap_or(1);
            let now = counter.0.fetch_add(by, Ordering::SeqCst) + by;
            ctx.set_output("count", now)?;
            Ok(())
        }
    }

    impl DescribedCommand for Increment {
        fn parameters() -> Vec<ParameterDescriptor> {
            vec![
                ParameterDescriptor::service::<Counter>("counter"),
                ParameterDescriptor::input("by", ParamKind::Integer).with_default(json!(1)),
                ParameterDescriptor::output("count", ParamKind::Integer),
            ]
        }
    }

    #[derive(Default)]
    struct Explode;

    #[async_trait]
    impl Command for Explode {
        async fn run(&mut self, _ctx: &mut CommandContext) -> anyhow::Result<()> {
            Err(anyhow::anyhow!("sensor offline")).context("reading frame")
        }
    }

    impl DescribedCommand for Explode {
        fn parameters() -> Vec<ParameterDescriptor> {
            Vec::new()
        }
    }

    #[derive(Default)]
    struct Crash;

    #[async_trait]
    impl Command for Crash {
        async fn run(&mut self, _ctx: &mut CommandContext) -> anyhow::Result<()> {
            let frames: Vec<u32> = Vec::new();
            let _ = frames[3];
            Ok(())
        }
    }

    impl DescribedCommand for Crash {
        fn parameters() -> Vec<ParameterDescriptor> {
            Vec::new()
        }
    }

    #[derive(Default)]
    struct Veto;

    #[async_trait]
    impl Preprocessor for Veto {
        async fn process(&self, module: &mut Module) -> anyhow::Result<()> {
            module.cancel("vetoed by policy");
            Ok(())
        }
    }

    #[derive(Default)]
    struct Broken;

    #[async_trait]
    impl Postprocessor for Broken {
        async fn process(&self, _module: &mut Module) -> anyhow::Result<()> {
            anyhow::bail!("viewer crashed")
        }
    }

    fn discovered() -> Vec<PluginInfo> {
        let mut plugins = commands::builtin();
        plugins.push(CommandDescriptor::of::<Increment>().into());
        plugins.push(CommandDescriptor::of::<Explode>().into());
        plugins.extend(builtin::interceptors());
        plugins
    }

    fn setup_with(config: &RuntimeConfig) -> (CommandService, Arc<Counter>) {
        let counter = Arc::new(Counter::default());
        let registry = ServiceRegistry::new().with(Arc::clone(&counter));
        let plugins = Arc::new(PluginService::with_discovery(StaticDiscovery::new(
            discovered(),
        )));
        (CommandService::new(plugins, Arc::new(registry), config), counter)
    }

    fn setup() -> (CommandService, Arc<Counter>) {
        setup_with(&RuntimeConfig::default())
    }

    #[tokio::test]
    async fn test_run_by_identity_completes() {
        let (service, _) = setup();
        let identity = CommandDescriptor::of::<Sum>().identity().to_string();
        let module = service
            .run(identity.as_str(), json!({"a": 1.5, "b": 2}))
            .unwrap()
            .join()
            .await
            .unwrap();
        assert_eq!(module.status(), ModuleStatus::Complete);
        assert_eq!(module.output("sum"), Some(&json!(3.5)));
        assert!(module.diagnostics().is_empty());
    }

    #[tokio::test]
    async fn test_every_target_shape_runs() {
        let (service, counter) = setup();
        let descriptor = service.find_command_by_type::<Increment>().unwrap();

        service.run(descriptor.identity(), ()).unwrap().join().await.unwrap();
        service.run(RunTarget::of::<Increment>(), ()).unwrap().join().await.unwrap();
        service.run(&descriptor, ()).unwrap().join().await.unwrap();
        let module = service.create_module(&descriptor).unwrap();
        service.run(module, ()).unwrap().join().await.unwrap();

        assert_eq!(counter.0.load(Ordering::SeqCst), 4);
    }

    #[tokio::test]
    async fn test_unknown_parameter_is_ignored_with_diagnostic() {
        let (service, counter) = setup();
        let module = service
            .run_command::<Increment>(vec![json!("nonexistentParam"), json!(5)])
            .unwrap()
            .join()
            .await
            .unwrap();

        assert_eq!(module.status(), ModuleStatus::Complete);
        assert!(module.value("nonexistentParam").is_none());
        assert_eq!(module.value("by"), Some(&json!(1)));
        assert_eq!(module.diagnostics().len(), 1);
        assert!(module.diagnostics()[0].contains("nonexistentParam"));
        assert_eq!(counter.0.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_incompatible_value_is_ignored() {
        let (service, counter) = setup();
        let module = service
            .run_command::<Increment>(vec![json!("by"), json!("seven")])
            .unwrap()
            .join()
            .await
            .unwrap();
        assert_eq!(module.value("by"), Some(&json!(1)));
        assert!(module.diagnostics()[0].contains("expects integer"));
        assert_eq!(counter.0.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_service_slot_cannot_be_overridden() {
        let (service, counter) = setup();
        let module = service
            .run_command::<Increment>(json!({"counter": 99, "by": 2}))
            .unwrap()
            .join()
            .await
            .unwrap();
        assert_eq!(module.output("count"), Some(&json!(2)));
        assert_eq!(module.diagnostics().len(), 1);
        assert_eq!(counter.0.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_canceling_preprocessor_prevents_body() {
        let (service, counter) = setup();
        service.plugins().add_plugin(PreprocessorDescriptor::of::<Veto>());

        let module = service
            .run_command::<Increment>(())
            .unwrap()
            .join()
            .await
            .unwrap();

        assert_eq!(module.status(), ModuleStatus::Canceled);
        assert_eq!(module.cancel_reason(), Some("vetoed by policy"));
        assert_eq!(counter.0.load(Ordering::SeqCst), 0);
        assert!(module.output("count").is_none());
    }

    #[tokio::test]
    async fn test_missing_required_input_cancels_run() {
        let (service, _) = setup();
        let module = service
            .run_command::<Sum>(vec![json!("a"), json!(1)])
            .unwrap()
            .join()
            .await
            .unwrap();
        assert_eq!(module.status(), ModuleStatus::Canceled);
        assert_eq!(module.cancel_reason(), Some("Missing required input: b"));
    }

    #[tokio::test]
    async fn test_execution_failure_surfaces_on_join() {
        let (service, _) = setup();
        let handle = service.run_command::<Explode>(()).unwrap();
        let err = tokio_test::assert_err!(handle.join().await);
        match err {
            RuntimeError::Execution { message, .. } => {
                assert!(message.contains("reading frame"));
                assert!(message.contains("sensor offline"));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn test_failure_status_visible_on_handle() {
        let (service, _) = setup();
        let mut handle = service.run_command::<Explode>(()).unwrap();
        assert_eq!(handle.finished().await, ModuleStatus::Error);
    }

    #[tokio::test]
    async fn test_postprocessor_failure_keeps_complete() {
        let (service, _) = setup();
        service.plugins().add_plugin(PostprocessorDescriptor::of::<Broken>());

        let module = service
            .run_command::<Sum>(json!({"a": 1, "b": 1}))
            .unwrap()
            .join()
            .await
            .unwrap();
        assert_eq!(module.status(), ModuleStatus::Complete);
        assert_eq!(module.output("sum"), Some(&json!(2.0)));
        assert!(module.diagnostics().iter().any(|d| d.contains("viewer crashed")));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_runs_overlap() {
        let config = RuntimeConfig {
            max_concurrent_modules: 8,
            ..RuntimeConfig::default()
        };
        let (service, _) = setup_with(&config);

        let started = Instant::now();
        let handles: Vec<ModuleHandle> = (0..8)
            .map(|i| {
                service
                    .run_command::<Delay>(json!({"millis": 100 + i * 20}))
                    .unwrap()
            })
            .collect();
        for handle in handles {
            let module = handle.join().await.unwrap();
            assert_eq!(module.status(), ModuleStatus::Complete);
        }
        let elapsed = started.elapsed();

        // Slowest run is 240ms; sequential would take over 1.7s.
        assert!(elapsed >= Duration::from_millis(240));
        assert!(elapsed < Duration::from_millis(1000), "took {:?}", elapsed);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_worker_bound_serializes_runs() {
        let config = RuntimeConfig {
            max_concurrent_modules: 1,
            ..RuntimeConfig::default()
        };
        let (service, _) = setup_with(&config);

        let started = Instant::now();
        let first = service.run_command::<Delay>(json!({"millis": 100})).unwrap();
        let second = service.run_command::<Delay>(json!({"millis": 100})).unwrap();
        first.join().await.unwrap();
        second.join().await.unwrap();
        assert!(started.elapsed() >= Duration::from_millis(200));
    }

    #[tokio::test]
    async fn test_cancel_through_handle_while_running() {
        let (service, _) = setup();
        let mut handle = service
            .run_command::<Delay>(json!({"millis": 60_000}))
            .unwrap();

        while handle.status() != ModuleStatus::Running {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        assert!(handle.cancel("user abort"));

        // The body stops early; the lifecycle still runs to completion.
        assert_eq!(handle.finished().await, ModuleStatus::Complete);
        let module = handle.join_timeout(Duration::from_secs(5)).await.unwrap();
        assert_eq!(module.cancel_reason(), Some("user abort"));
        assert!(module.output("elapsed_ms").unwrap().as_u64().unwrap() < 60_000);
    }

    #[tokio::test]
    async fn test_panicking_command_reaches_error() {
        let (service, _) = setup();
        service
            .plugins()
            .add_plugin(CommandDescriptor::of::<Crash>());

        let mut handle = service.run_command::<Crash>(()).unwrap();
        assert_eq!(handle.finished().await, ModuleStatus::Error);
        assert_eq!(handle.status(), ModuleStatus::Error);
        let err = handle.join().await.unwrap_err();
        assert!(matches!(err, RuntimeError::Execution { ref message, .. } if message.contains("panicked")));
    }

    #[tokio::test]
    async fn test_reload_drops_manual_commands() {
        let (service, _) = setup();
        service
            .plugins()
            .add_plugin(CommandDescriptor::of::<Sum>().with_identity("demo.ManualSum"));
        assert!(service.find_command("demo.ManualSum").is_some());

        service.plugins().reload_plugins();
        assert!(service.find_command("demo.ManualSum").is_none());
        assert!(service.find_command_by_type::<Sum>().is_some());
        assert!(matches!(
            service.run("demo.ManualSum", ()),
            Err(RuntimeError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_invalid_command_is_refused() {
        let (service, _) = setup();
        let factory = FnFactory::new(
            || {
                Ok(vec![
                    ParameterDescriptor::input("x", ParamKind::Integer),
                    ParameterDescriptor::input("x", ParamKind::Float),
                ])
            },
            || Ok(Box::new(Increment) as Box<dyn Command>),
        );
        let info = service.plugins().add_plugin(CommandDescriptor::from_factory(
            "demo.Duplicated",
            Arc::new(factory),
        ));

        assert_eq!(service.list_commands().len(), 5);
        assert!(!info.as_command().unwrap().is_valid());
        assert!(matches!(
            service.run("demo.Duplicated", ()),
            Err(RuntimeError::InvalidCommand { .. })
        ));
    }

    #[tokio::test]
    async fn test_disabled_command_is_refused() {
        let (service, _) = setup();
        service
            .plugins()
            .add_plugin(CommandDescriptor::of::<Sum>().with_identity("demo.Off").disabled());
        assert!(matches!(
            service.run("demo.Off", ()),
            Err(RuntimeError::Disabled(_))
        ));
    }

    #[tokio::test]
    async fn test_rerunning_finished_module_is_refused() {
        let (service, _) = setup();
        let module = service
            .run_command::<Sum>(json!({"a": 1, "b": 2}))
            .unwrap()
            .join()
            .await
            .unwrap();
        assert!(matches!(
            service.run(module, ()),
            Err(RuntimeError::InvalidTransition { .. })
        ));
    }

    #[tokio::test]
    async fn test_caller_bound_module_target() {
        let (service, _) = setup();
        let descriptor = service.find_command_by_type::<Sum>().unwrap();
        let mut module = service.create_module(&descriptor).unwrap();
        module.set_input("a", json!(4)).unwrap();
        module.set_input("b", json!(6)).unwrap();

        let module = service.run(module, ()).unwrap().join().await.unwrap();
        assert_eq!(module.output("sum"), Some(&json!(10.0)));
    }

    #[tokio::test]
    async fn test_lifecycle_events_are_published() {
        let bus = Arc::new(EventBus::new(64));
        let mut rx = bus.subscribe();
        let plugins = Arc::new(PluginService::new(
            Arc::new(StaticDiscovery::new(discovered())),
            PluginFilterConfig::default(),
            bus.clone(),
        ));
        let service = CommandService::new(
            plugins,
            Arc::new(ServiceRegistry::new()),
            &RuntimeConfig::default(),
        );

        let module = service
            .run_command::<Sum>(json!({"a": 1, "b": 2}))
            .unwrap()
            .join()
            .await
            .unwrap();

        let events: Vec<EventKind> = std::iter::from_fn(|| rx.try_recv().ok())
            .map(|e| e.kind)
            .collect();
        assert!(matches!(events[0], EventKind::PluginsReloaded { .. }));
        let statuses: Vec<ModuleStatus> = events
            .iter()
            .filter_map(|e| match e {
                EventKind::ModuleStatusChanged {
                    module_id, status, ..
                } if *module_id == module.id() => Some(*status),
                _ => None,
            })
            .collect();
        assert_eq!(
            statuses,
            vec![
                ModuleStatus::Preprocessing,
                ModuleStatus::Running,
                ModuleStatus::Postprocessing,
                ModuleStatus::Complete,
            ]
        );
    }

    #[tokio::test]
    async fn test_services_resolved_by_role_through_provider() {
        let mut provider = MockServiceProvider::new();
        let counter: ServiceInstance = Arc::new(Counter::default());
        let expected = ServiceRole::of::<Counter>();
        provider
            .expect_get()
            .withf(move |role| *role == expected)
            .times(1)
            .returning(move |_| Some(Arc::clone(&counter)));

        let plugins = Arc::new(PluginService::with_discovery(StaticDiscovery::new(
            discovered(),
        )));
        let service = CommandService::new(plugins, Arc::new(provider), &RuntimeConfig::default());

        let handle = tokio_test::assert_ok!(service.run_command::<Increment>(json!({"by": 3})));
        let module = tokio_test::assert_ok!(handle.join().await);
        assert_eq!(module.output("count"), Some(&json!(3)));
    }

    #[tokio::test]
    async fn test_missing_service_is_recorded() {
        let plugins = Arc::new(PluginService::with_discovery(StaticDiscovery::new(
            discovered(),
        )));
        let service = CommandService::new(
            plugins,
            Arc::new(ServiceRegistry::new()),
            &RuntimeConfig::default(),
        );
        let descriptor = service.find_command_by_type::<Increment>().unwrap();
        let module = service.create_module(&descriptor).unwrap();
        assert!(module.diagnostics()[0].contains("No service for 'counter'"));

        // The body reports the missing service itself.
        let err = service.run(module, ()).unwrap().join().await.unwrap_err();
        assert!(matches!(err, RuntimeError::Execution { .. }));
    }

    #[test]
    fn test_run_without_runtime_fails() {
        let (service, _) = setup();
        assert!(matches!(
            service.run_command::<Sum>(()),
            Err(RuntimeError::NoRuntime)
        ));
    }

    #[test]
    fn test_blocking_wait_with_explicit_runtime() {
        let runtime = tokio::runtime::Runtime::new().unwrap();
        let (service, _) = setup();
        let service = service.with_runtime(runtime.handle().clone());

        let module = service
            .run_command::<Sum>(json!({"a": 20, "b": 22}))
            .unwrap()
            .wait()
            .unwrap();
        assert_eq!(module.output("sum"), Some(&json!(42.0)));
    }

    #[test]
    fn test_lookups_are_projections() {
        let (service, _) = setup();
        assert_eq!(service.list_commands().len(), 4);
        assert_eq!(service.find_commands_of_type::<Sum>().len(), 1);
        let sum = service.find_command_by_type::<Sum>().unwrap();
        assert!(Arc::ptr_eq(&sum, &service.find_command(sum.identity()).unwrap()));
        assert_eq!(service.find_commands_named(sum.identity()).len(), 1);
        assert!(service.find_command("demo.Nothing").is_none());
        assert!(service.find_command_by_type::<Delay>().unwrap().can_cancel());
    }
}
