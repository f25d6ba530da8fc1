//! Completion handle for a submitted module.

use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use uuid::Uuid;

use crate::error::{Result, RuntimeError};

use super::context::CancelToken;
use super::module::{Module, ModuleStatus};

/// Handle to a module running on a worker.
///
/// Dropping the handle does not stop the module.
#[derive(Debug)]
pub struct ModuleHandle {
    id: Uuid,
    identity: String,
    status: watch::Receiver<ModuleStatus>,
    cancel: CancelToken,
    task: JoinHandle<Result<Module>>,
}

impl ModuleHandle {
    pub(crate) fn new(
        id: Uuid,
        identity: String,
        status: watch::Receiver<ModuleStatus>,
        cancel: CancelToken,
        task: JoinHandle<Result<Module>>,
    ) -> Self {
        Self {
            id,
            identity,
            status,
            cancel,
            task,
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn identity(&self) -> &str {
        &self.identity
    }

    /// Most recent status reported by the worker.
    pub fn status(&self) -> ModuleStatus {
        *self.status.borrow()
    }

    /// Request cooperative cancellation. Before the body starts this cancels
    /// the module outright; once running, the body decides when to stop.
    pub fn cancel(&self, reason: impl Into<String>) -> bool {
        self.cancel.cancel(reason)
    }

    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }

    /// Wait until the status changes to a terminal state.
    ///
    /// A worker that died before reporting a terminal state counts as
    /// [`ModuleStatus::Error`].
    pub async fn finished(&mut self) -> ModuleStatus {
        match self.status.wait_for(|s| s.is_terminal()).await {
            Ok(status) => *status,
            Err(_) => ModuleStatus::Error,
        }
    }

    /// Wait for the module to finish.
    ///
    /// Yields the module when it completed or was canceled, and the body's
    /// failure as [`RuntimeError::Execution`] when it ended in error.
    pub async fn join(self) -> Result<Module> {
        match self.task.await {
            Ok(result) => result,
            Err(e) => Err(RuntimeError::Join(format!("{}: {}", self.identity, e))),
        }
    }

    /// [`join`](Self::join) with an upper bound on the wait.
    ///
    /// On timeout the module keeps running; only the wait is abandoned.
    pub async fn join_timeout(self, limit: Duration) -> Result<Module> {
        let identity = self.identity.clone();
        tokio::time::timeout(limit, self.join())
            .await
            .map_err(|_| RuntimeError::Timeout(identity))?
    }

    /// Block the current thread until the module finishes.
    ///
    /// Must not be called from within an async context.
    pub fn wait(self) -> Result<Module> {
        futures::executor::block_on(self.join())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::command::{CommandDescriptor, FnFactory};
    use crate::services::Services;
    use crate::test_support::Noop;
    use std::sync::Arc;

    fn module() -> Module {
        let factory = FnFactory::new(
            || Ok(Vec::new()),
            || Ok(Box::new(Noop) as Box<dyn crate::command::Command>),
        );
        let descriptor = Arc::new(CommandDescriptor::from_factory("demo.Wait", Arc::new(factory)));
        let command = descriptor.create_command().unwrap();
        Module::new(descriptor, command, Services::default())
    }

    fn handle_for(task: JoinHandle<Result<Module>>) -> (ModuleHandle, watch::Sender<ModuleStatus>) {
        let (tx, rx) = watch::channel(ModuleStatus::Created);
        let handle = ModuleHandle::new(Uuid::new_v4(), "demo.Wait".to_string(), rx, CancelToken::new(), task);
        (handle, tx)
    }

    #[tokio::test]
    async fn test_join_returns_module() {
        let (handle, _tx) = handle_for(tokio::spawn(async { Ok(module()) }));
        let finished = handle.join().await.unwrap();
        assert_eq!(finished.identity(), "demo.Wait");
    }

    #[tokio::test]
    async fn test_join_timeout_elapses() {
        let (handle, _tx) = handle_for(tokio::spawn(async {
            tokio::time::sleep(Duration::from_secs(5)).await;
            Ok(module())
        }));
        let err = handle
            .join_timeout(Duration::from_millis(20))
            .await
            .unwrap_err();
        assert!(matches!(err, RuntimeError::Timeout(ref id) if id == "demo.Wait"));
    }

    #[tokio::test]
    async fn test_panicking_worker_maps_to_join_error() {
        let (handle, _tx) = handle_for(tokio::spawn(async {
            if true {
                panic!("worker exploded");
            }
            Ok(module())
        }));
        let err = handle.join().await.unwrap_err();
        assert!(matches!(err, RuntimeError::Join(_)));
    }

    #[tokio::test]
    async fn test_status_tracks_watch_channel() {
        let (mut handle, tx) = handle_for(tokio::spawn(async { Ok(module()) }));
        assert_eq!(handle.status(), ModuleStatus::Created);
        tx.send_replace(ModuleStatus::Running);
        assert_eq!(handle.status(), ModuleStatus::Running);
        tx.send_replace(ModuleStatus::Complete);
        assert_eq!(handle.finished().await, ModuleStatus::Complete);
    }

    #[tokio::test]
    async fn test_worker_gone_without_terminal_status_counts_as_error() {
        let (mut handle, tx) = handle_for(tokio::spawn(async { Ok(module()) }));
        tx.send_replace(ModuleStatus::Running);
        drop(tx);
        assert_eq!(handle.finished().await, ModuleStatus::Error);
    }

    #[test]
    fn test_wait_blocks_outside_async_context() {
        let runtime = tokio::runtime::Runtime::new().unwrap();
        let task = runtime.spawn(async { Ok(module()) });
        let (handle, _tx) = handle_for(task);
        let finished = handle.wait().unwrap();
        assert_eq!(finished.status(), ModuleStatus::Created);
    }

    #[test]
    fn test_cancel_through_handle() {
        let runtime = tokio::runtime::Runtime::new().unwrap();
        let task = runtime.spawn(async { Ok(module()) });
        let (handle, _tx) = handle_for(task);
        assert!(handle.cancel("stop"));
        assert!(!handle.cancel("again"));
    }
}
