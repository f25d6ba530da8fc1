//! Sample commands shipped with modrun.
//!
//! - [`Sum`]: adds two numbers
//! - [`Delay`]: waits for a number of milliseconds, honoring cancellation

use std::time::Duration;

use async_trait::async_trait;
use serde_json::json;

use crate::command::{
    Command, CommandContext, CommandDescriptor, DescribedCommand, ParamKind, ParameterDescriptor,
};
use crate::plugins::PluginInfo;

/// Adds `a` and `b` into `sum`.
#[derive(Debug, Default)]
pub struct Sum;

#[async_trait]
impl Command for Sum {
    async fn run(&mut self, ctx: &mut CommandContext) -> anyhow::Result<()> {
        let a: f64 = ctx.input("a").unwrap_or_default();
        let b: f64 = ctx.input("b").unwrap_or_default();
        ctx.set_output("sum", a + b)?;
        Ok(())
    }
}

impl DescribedCommand for Sum {
    fn parameters() -> Vec<ParameterDescriptor> {
        vec![
            ParameterDescriptor::input("a", ParamKind::Float)
                .required()
                .with_label("First operand"),
            ParameterDescriptor::input("b", ParamKind::Float)
                .required()
                .with_label("Second operand"),
            ParameterDescriptor::output("sum", ParamKind::Float),
        ]
    }
}

/// Upper bound for [`Delay`], one hour.
pub const MAX_DELAY_MS: u64 = 3_600_000;

const DELAY_SLICE: Duration = Duration::from_millis(10);

/// Sleeps for `millis` milliseconds in short slices, returning early when
/// canceled. Reports the time actually waited in `elapsed_ms`.
#[derive(Debug, Default)]
pub struct Delay;

#[async_trait]
impl Command for Delay {
    async fn run(&mut self, ctx: &mut CommandContext) -> anyhow::Result<()> {
        let millis: u64 = ctx.input("millis").unwrap_or(0);
        let total = Duration::from_millis(millis);
        let started = tokio::time::Instant::now();

        while started.elapsed() < total {
            if ctx.is_canceled() {
                break;
            }
            let remaining = total.saturating_sub(started.elapsed());
            tokio::time::sleep(remaining.min(DELAY_SLICE)).await;
        }

        ctx.set_output("elapsed_ms", started.elapsed().as_millis() as u64)?;
        Ok(())
    }
}

impl DescribedCommand for Delay {
    fn parameters() -> Vec<ParameterDescriptor> {
        vec![
            ParameterDescriptor::input("millis", ParamKind::Integer)
                .with_default(json!(100))
                .with_range(0.0, MAX_DELAY_MS as f64)
                .with_step(10.0),
            ParameterDescriptor::output("elapsed_ms", ParamKind::Integer),
        ]
    }
}

/// Descriptors for every sample command.
pub fn builtin() -> Vec<PluginInfo> {
    vec![
        CommandDescriptor::of::<Sum>()
            .with_title("Sum")
            .with_description("Add two numbers")
            .with_menu_path("Process > Math > Sum")
            .headless()
            .into(),
        CommandDescriptor::of::<Delay>()
            .with_title("Delay")
            .with_description("Wait for a number of milliseconds")
            .with_menu_path("Plugins > Utilities > Delay")
            .cancelable()
            .headless()
            .into(),
    ]
}
