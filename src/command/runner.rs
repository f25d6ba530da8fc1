//! The preprocess → run → postprocess pipeline for one module.

use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use futures::FutureExt;
use tokio::sync::watch;
use tracing::{debug, error, info, warn};

use crate::error::{Result, RuntimeError};
use crate::events::{EventKind, EventPublisher};
use crate::interceptors::{Postprocessor, Preprocessor};

use super::module::{Module, ModuleStatus};

/// Everything one run needs besides the module itself.
///
/// Interceptor chains are instantiated per run and already ordered by
/// priority.
pub(crate) struct Pipeline {
    pub(crate) preprocessors: Vec<(String, Box<dyn Preprocessor>)>,
    pub(crate) postprocessors: Vec<(String, Box<dyn Postprocessor>)>,
    pub(crate) events: Arc<dyn EventPublisher>,
    pub(crate) status: watch::Sender<ModuleStatus>,
}

impl Pipeline {
    /// Drive `module` to a terminal state.
    ///
    /// Returns the module when it completed or was canceled, and the
    /// body's failure when it ended in error.
    pub(crate) async fn execute(self, mut module: Module) -> Result<Module> {
        self.advance(&mut module, ModuleStatus::Preprocessing)?;
        self.preprocess(&mut module).await;
        if module.is_canceled() {
            self.finish_canceled(&mut module)?;
            return Ok(module);
        }

        self.advance(&mut module, ModuleStatus::Running)?;
        let outcome = AssertUnwindSafe(module.run_command())
            .catch_unwind()
            .await
            .unwrap_or_else(|panic| Err(anyhow::anyhow!("panicked: {}", panic_message(&*panic))));
        if let Err(e) = outcome {
            let message = format!("{:#}", e);
            error!(
                module = %module.id(),
                command = %module.identity(),
                error = %message,
                "Command failed"
            );
            module.set_failure(message.clone());
            self.advance(&mut module, ModuleStatus::Error)?;
            self.events.publish(
                EventKind::ModuleFailed {
                    module_id: module.id(),
                    identity: module.identity().to_string(),
                    error: message.clone(),
                }
                .into(),
            );
            return Err(RuntimeError::Execution {
                identity: module.identity().to_string(),
                message,
            });
        }

        self.advance(&mut module, ModuleStatus::Postprocessing)?;
        self.postprocess(&mut module).await;
        self.advance(&mut module, ModuleStatus::Complete)?;

        info!(
            module = %module.id(),
            command = %module.identity(),
            outputs = module.outputs().len(),
            canceled = module.is_canceled(),
            "Module complete"
        );
        Ok(module)
    }

    async fn preprocess(&self, module: &mut Module) {
        // Canceled through the handle before the worker picked it up.
        if module.is_canceled() {
            return;
        }
        if let Err(e) = module.initialize_command().await {
            warn!(
                module = %module.id(),
                command = %module.identity(),
                error = %e,
                "Command initializer failed"
            );
            module.cancel(format!("{:#}", e));
            return;
        }
        if module.is_canceled() {
            return;
        }

        for (name, preprocessor) in &self.preprocessors {
            if let Err(e) = preprocessor.process(module).await {
                warn!(
                    module = %module.id(),
                    preprocessor = %name,
                    error = %e,
                    "Preprocessor failed"
                );
                module.cancel(format!("{:#}", e));
            }
            if module.is_canceled() {
                debug!(
                    module = %module.id(),
                    preprocessor = %name,
                    reason = module.cancel_reason().unwrap_or_default(),
                    "Preprocessor canceled module"
                );
                return;
            }
        }
    }

    async fn postprocess(&self, module: &mut Module) {
        for (name, postprocessor) in &self.postprocessors {
            if let Err(e) = postprocessor.process(module).await {
                error!(
                    module = %module.id(),
                    postprocessor = %name,
                    error = %e,
                    "Postprocessor failed"
                );
                module.record_diagnostic(format!("Postprocessor {} failed: {:#}", name, e));
            }
        }
    }

    fn finish_canceled(&self, module: &mut Module) -> Result<()> {
        self.advance(module, ModuleStatus::Canceled)?;
        let reason = module.cancel_reason().unwrap_or_default().to_string();
        info!(
            module = %module.id(),
            command = %module.identity(),
            reason = %reason,
            "Module canceled"
        );
        self.events.publish(
            EventKind::ModuleCanceled {
                module_id: module.id(),
                identity: module.identity().to_string(),
                reason,
            }
            .into(),
        );
        Ok(())
    }

    fn advance(&self, module: &mut Module, next: ModuleStatus) -> Result<()> {
        module.transition(next)?;
        self.status.send_replace(next);
        self.events.publish(
            EventKind::ModuleStatusChanged {
                module_id: module.id(),
                identity: module.identity().to_string(),
                status: next,
            }
            .into(),
        );
        Ok(())
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> &str {
    payload
        .downcast_ref::<&'static str>()
        .copied()
        .or_else(|| payload.downcast_ref::<String>().map(String::as_str))
        .unwrap_or("unknown panic")
}
