//! Background task supervision.
//!
//! Every gateway unit runs as one registered task sharing a single
//! cancellation token.
//!
//! # Task kinds
//!
//! - [`TaskKind::Handler`] - request handler, runs until shutdown
//! - [`TaskKind::Forwarder`] - watch forwarder, may end early without restart

use futures::FutureExt;
use std::fmt;
use std::panic::AssertUnwindSafe;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskKind {
    Handler,
    Forwarder,
}

impl fmt::Display for TaskKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TaskKind::Handler => write!(f, "Handler"),
            TaskKind::Forwarder => write!(f, "Forwarder"),
        }
    }
}

struct RegisteredTask {
    name: &'static str,
    kind: TaskKind,
    handle: JoinHandle<()>,
}

/// Registry of running tasks.
///
/// ```ignore
/// let mut tasks = BackgroundTasks::new();
/// let token = tasks.shutdown_token();
/// tasks.spawn("kube.get", TaskKind::Handler, async move {
///     token.cancelled().await;
/// });
/// tasks.shutdown().await;
/// ```
pub struct BackgroundTasks {
    tasks: Vec<RegisteredTask>,
    shutdown: CancellationToken,
}

impl BackgroundTasks {
    pub fn new() -> Self {
        Self {
            tasks: Vec::new(),
            shutdown: CancellationToken::new(),
        }
    }

    /// Token every task should watch for shutdown.
    pub fn shutdown_token(&self) -> CancellationToken {
        self.shutdown.clone()
    }

    /// Register and start a task.
    ///
    /// Panics inside the task are caught and logged. A task that returns
    /// before shutdown was requested is logged as unexpected.
    pub fn spawn<F>(&mut self, name: &'static str, kind: TaskKind, future: F)
    where
        F: std::future::Future<Output = ()> + Send + 'static,
    {
        let shutdown = self.shutdown.clone();
        let wrapped_future = async move {
            let result: Result<(), Box<dyn std::any::Any + Send>> =
                AssertUnwindSafe(future).catch_unwind().await;
            match result {
                Ok(()) if shutdown.is_cancelled() => {
                    tracing::debug!(task = %name, kind = %kind, "Background task finished");
                }
                Ok(()) => {
                    tracing::warn!(task = %name, kind = %kind, "Background task exited before shutdown");
                }
                Err(panic_info) => {
                    let panic_msg: String = if let Some(s) = panic_info.downcast_ref::<&str>() {
                        (*s).to_string()
                    } else if let Some(s) = panic_info.downcast_ref::<String>() {
                        s.clone()
                    } else {
                        "Unknown panic".to_string()
                    };
                    tracing::error!(
                        task = %name,
                        kind = %kind,
                        panic = %panic_msg,
                        "Background task panicked"
                    );
                }
            }
        };

        let handle = tokio::spawn(wrapped_future);
        tracing::debug!(task = %name, kind = %kind, "Registered background task");
        self.tasks.push(RegisteredTask { name, kind, handle });
    }

    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }

    /// Number of registered tasks of `kind`.
    pub fn count(&self, kind: TaskKind) -> usize {
        self.tasks.iter().filter(|t| t.kind == kind).count()
    }

    pub fn log_summary(&self) {
        tracing::info!(
            total = self.tasks.len(),
            handlers = self.count(TaskKind::Handler),
            forwarders = self.count(TaskKind::Forwarder),
            "Background tasks registered"
        );
    }

    /// Number of tasks of `kind` that have already finished.
    ///
    /// Finished handlers mean the gateway can no longer serve that subject.
    pub fn check_health(&self, kind: TaskKind) -> usize {
        let mut failed_count = 0;
        for task in self.tasks.iter().filter(|t| t.kind == kind) {
            if task.handle.is_finished() {
                tracing::error!(task = %task.name, kind = %task.kind, "Background task has stopped");
                failed_count += 1;
            }
        }
        failed_count
    }

    /// Cancel every task and wait for all of them.
    pub async fn shutdown(self) {
        tracing::info!(tasks = self.tasks.len(), "Shutting down background tasks");
        self.shutdown.cancel();

        for task in self.tasks {
            match task.handle.await {
                Ok(()) => {
                    tracing::debug!(task = %task.name, "Task completed");
                }
                Err(e) if e.is_cancelled() => {
                    tracing::debug!(task = %task.name, "Task cancelled");
                }
                Err(e) => {
                    tracing::error!(task = %task.name, error = ?e, "Task panicked");
                }
            }
        }

        tracing::info!("All background tasks stopped");
    }
}

impl Default for BackgroundTasks {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Arc;
    use std::time::Duration;

    #[tokio::test]
    async fn test_shutdown_cancels_and_awaits() {
        let mut tasks = BackgroundTasks::new();
        let stopped = Arc::new(AtomicBool::new(false));

        let token = tasks.shutdown_token();
        let flag = Arc::clone(&stopped);
        tasks.spawn("kube.get", TaskKind::Handler, async move {
            token.cancelled().await;
            flag.store(true, Ordering::SeqCst);
        });
        assert_eq!(tasks.len(), 1);
        assert_eq!(tasks.count(TaskKind::Handler), 1);

        tokio::time::timeout(Duration::from_secs(1), tasks.shutdown())
            .await
            .unwrap();
        assert!(stopped.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn test_health_reports_finished_tasks() {
        let mut tasks = BackgroundTasks::new();
        let token = tasks.shutdown_token();
        tasks.spawn("kube.list", TaskKind::Handler, async {});
        tasks.spawn("kube.get", TaskKind::Handler, async move {
            token.cancelled().await;
        });

        tokio::time::sleep(Duration::from_millis(20)).await;
        assert_eq!(tasks.check_health(TaskKind::Handler), 1);
        assert_eq!(tasks.check_health(TaskKind::Forwarder), 0);
        tasks.shutdown().await;
    }

    #[tokio::test]
    async fn test_panic_is_contained() {
        let mut tasks = BackgroundTasks::new();
        tasks.spawn("boom", TaskKind::Forwarder, async {
            panic!("boom");
        });
        tokio::time::timeout(Duration::from_secs(1), tasks.shutdown())
            .await
            .unwrap();
    }
}
