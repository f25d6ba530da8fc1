//! Commands and their execution
//!
//! A command is a runnable unit with typed, named inputs and outputs. This
//! module provides:
//!
//! - **parameter**: parameter metadata ([`ParameterDescriptor`])
//! - **descriptor**: [`CommandDescriptor`], lazily parsed command metadata
//! - **context**: the [`CommandContext`] a running command reads and writes
//! - **module**: [`Module`], one bound execution and its state machine
//! - **request**: run targets and caller inputs
//! - **runner**: the preprocess → run → postprocess pipeline
//! - **handle**: [`ModuleHandle`], the completion handle returned by `run`
//! - **service**: [`CommandService`], the executor facade
//!
//! # Writing a command
//!
//! ```rust
//! use async_trait::async_trait;
//! use modrun::command::{
//!     Command, CommandContext, CommandDescriptor, DescribedCommand, ParamKind,
//!     ParameterDescriptor,
//! };
//!
//! #[derive(Default)]
//! struct Negate;
//!
//! #[async_trait]
//! impl Command for Negate {
//!     async fn run(&mut self, ctx: &mut CommandContext) -> anyhow::Result<()> {
//!         let value: f64 = ctx.input("value").unwrap_or(0.0);
//!         ctx.set_output("result", -value)?;
//!         Ok(())
//!     }
//! }
//!
//! impl DescribedCommand for Negate {
//!     fn parameters() -> Vec<ParameterDescriptor> {
//!         vec![
//!             ParameterDescriptor::input("value", ParamKind::Float).required(),
//!             ParameterDescriptor::output("result", ParamKind::Float),
//!         ]
//!     }
//! }
//!
//! let info = CommandDescriptor::of::<Negate>();
//! assert_eq!(info.title(), "Negate");
//! assert_eq!(info.inputs().len(), 1);
//! ```

mod context;
mod descriptor;
mod handle;
mod module;
pub mod parameter;
mod request;
mod runner;
mod service;

use std::marker::PhantomData;

use async_trait::async_trait;

pub use context::{CancelToken, CommandContext};
pub use descriptor::{CommandDescriptor, CommandFlags, CommandSummary};
pub use handle::ModuleHandle;
pub use module::{BindingError, Module, ModuleStatus};
pub use parameter::{Direction, ParamKind, ParameterDescriptor, Visibility};
pub use request::{Inputs, RunTarget};
pub use service::CommandService;

/// The body of a command.
///
/// One instance is created per run; it may keep state between
/// [`initialize`](Command::initialize) and [`run`](Command::run).
#[async_trait]
pub trait Command: Send {
    /// Called first during preprocessing, before any preprocessor.
    ///
    /// A failure cancels the module with the error text as the reason.
    async fn initialize(&mut self, _ctx: &mut CommandContext) -> anyhow::Result<()> {
        Ok(())
    }

    /// Execute the command. Long-running bodies should check
    /// [`CommandContext::is_canceled`] and return early when it is set.
    async fn run(&mut self, ctx: &mut CommandContext) -> anyhow::Result<()>;
}

/// Describes and constructs one command implementation.
///
/// [`parameters`](CommandFactory::parameters) is called at most once per
/// descriptor, and only when the descriptor's metadata is first needed.
pub trait CommandFactory: Send + Sync {
    /// The declared parameters, in declaration order.
    fn parameters(&self) -> anyhow::Result<Vec<ParameterDescriptor>>;

    /// A fresh command instance.
    fn create(&self) -> anyhow::Result<Box<dyn Command>>;
}

/// A command type that declares its own parameters.
///
/// Implementing this trait lets [`CommandDescriptor::of`] build a
/// descriptor straight from the type.
pub trait DescribedCommand: Command + Default + 'static {
    fn parameters() -> Vec<ParameterDescriptor>;
}

/// [`CommandFactory`] for a [`DescribedCommand`] type.
pub(crate) struct TypedFactory<C>(PhantomData<fn() -> C>);

impl<C> TypedFactory<C> {
    pub(crate) fn new() -> Self {
        Self(PhantomData)
    }
}

impl<C: DescribedCommand> CommandFactory for TypedFactory<C> {
    fn parameters(&self) -> anyhow::Result<Vec<ParameterDescriptor>> {
        Ok(C::parameters())
    }

    fn create(&self) -> anyhow::Result<Box<dyn Command>> {
        Ok(Box::new(C::default()))
    }
}

/// [`CommandFactory`] assembled from two closures.
pub struct FnFactory<P, F> {
    parameters: P,
    create: F,
}

impl<P, F> FnFactory<P, F>
where
    P: Fn() -> anyhow::Result<Vec<ParameterDescriptor>> + Send + Sync,
    F: Fn() -> anyhow::Result<Box<dyn Command>> + Send + Sync,
{
    pub fn new(parameters: P, create: F) -> Self {
        Self { parameters, create }
    }
}

impl<P, F> CommandFactory for FnFactory<P, F>
where
    P: Fn() -> anyhow::Result<Vec<ParameterDescriptor>> + Send + Sync,
    F: Fn() -> anyhow::Result<Box<dyn Command>> + Send + Sync,
{
    fn parameters(&self) -> anyhow::Result<Vec<ParameterDescriptor>> {
        (self.parameters)()
    }

    fn create(&self) -> anyhow::Result<Box<dyn Command>> {
        (self.create)()
    }
}
