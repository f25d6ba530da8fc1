//! Interceptors registered by default.

use async_trait::async_trait;
use tracing::debug;

use crate::command::Module;
use crate::plugins::PluginInfo;

use super::{Postprocessor, PostprocessorDescriptor, Preprocessor, PreprocessorDescriptor};

/// Runs after other preprocessors had a chance to fill inputs in.
pub const CHECK_INPUTS_PRIORITY: f64 = 1000.0;
pub const DEBUG_PRIORITY: f64 = 1000.0;

/// Cancels modules with a missing required input or a numeric input out
/// of its declared range.
#[derive(Debug, Default)]
pub struct CheckInputsPreprocessor;

#[async_trait]
impl Preprocessor for CheckInputsPreprocessor {
    async fn process(&self, module: &mut Module) -> anyhow::Result<()> {
        let descriptor = std::sync::Arc::clone(module.descriptor());
        for param in descriptor.inputs() {
            if param.is_service() || param.is_message() {
                continue;
            }
            match module.value(&param.name) {
                None | Some(serde_json::Value::Null) if param.required => {
                    module.cancel(format!("Missing required input: {}", param.name));
                    return Ok(());
                }
                Some(value) => {
                    if let Some(problem) = param.range_problem(value) {
                        module.cancel(format!("Invalid input: {}", problem));
                        return Ok(());
                    }
                }
                None => {}
            }
        }
        Ok(())
    }
}

/// Logs every produced output at debug level.
#[derive(Debug, Default)]
pub struct DebugPostprocessor;

#[async_trait]
impl Postprocessor for DebugPostprocessor {
    async fn process(&self, module: &mut Module) -> anyhow::Result<()> {
        for (name, value) in module.outputs() {
            debug!(
                module = %module.id(),
                command = %module.identity(),
                output = name,
                value = %value,
                "Module output"
            );
        }
        Ok(())
    }
}

/// Descriptors for the default interceptors.
pub fn interceptors() -> Vec<PluginInfo> {
    vec![
        PreprocessorDescriptor::of::<CheckInputsPreprocessor>()
            .with_title("Input check")
            .with_priority(CHECK_INPUTS_PRIORITY)
            .into(),
        PostprocessorDescriptor::of::<DebugPostprocessor>()
            .with_title("Debug output")
            .with_priority(DEBUG_PRIORITY)
            .into(),
    ]
}
