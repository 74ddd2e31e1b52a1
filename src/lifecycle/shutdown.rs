//! Shutdown signals and fatal-error escalation.
//!
//! Detached tasks never swallow errors: they hold a [`FatalReporter`] and
//! any failure or panic becomes a [`ShutdownSignal::Fatal`] for the
//! supervisor.

use std::fmt;
use std::future::Future;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;

/// OS termination request kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SignalKind {
    Interrupt,
    Terminate,
}

impl fmt::Display for SignalKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SignalKind::Interrupt => f.write_str("SIGINT"),
            SignalKind::Terminate => f.write_str("SIGTERM"),
        }
    }
}

/// Event that moves the listener towards `Closed` or `FailedToBind`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ShutdownSignal {
    /// Operator asked the process to stop.
    Terminate(SignalKind),
    /// An error surfaced outside any request pipeline.
    Fatal(String),
    /// The resolved port could not be bound.
    BindConflict(u16),
}

impl ShutdownSignal {
    /// Process exit status once shutdown completes.
    pub fn exit_code(&self) -> u8 {
        match self {
            ShutdownSignal::Terminate(_) => 0,
            ShutdownSignal::Fatal(_) | ShutdownSignal::BindConflict(_) => 1,
        }
    }
}

impl fmt::Display for ShutdownSignal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ShutdownSignal::Terminate(kind) => write!(f, "{kind} received"),
            ShutdownSignal::Fatal(reason) => write!(f, "unrecoverable error: {reason}"),
            ShutdownSignal::BindConflict(port) => write!(f, "port {port} is already in use"),
        }
    }
}

/// Cloneable handle for escalating errors from detached tasks.
#[derive(Debug, Clone)]
pub struct FatalReporter {
    tx: mpsc::UnboundedSender<ShutdownSignal>,
}

impl FatalReporter {
    pub(crate) fn new(tx: mpsc::UnboundedSender<ShutdownSignal>) -> Self {
        Self { tx }
    }

    /// Report an unrecoverable error.
    pub fn report(&self, reason: impl Into<String>) {
        let reason = reason.into();
        if self.tx.send(ShutdownSignal::Fatal(reason.clone())).is_err() {
            tracing::error!(%reason, "Fatal error reported after supervisor stopped");
        }
    }
}

/// Spawn a background task whose failure or panic is escalated.
pub fn spawn_supervised<F, E>(reporter: FatalReporter, name: &'static str, task: F) -> JoinHandle<()>
where
    F: Future<Output = Result<(), E>> + Send + 'static,
    E: fmt::Display + Send + 'static,
{
    let inner = tokio::spawn(task);
    tokio::spawn(async move {
        match inner.await {
            Ok(Ok(())) => tracing::debug!(task = name, "Background task finished"),
            Ok(Err(e)) => {
                tracing::error!(task = name, error = %e, "Background task failed");
                reporter.report(format!("{name}: {e}"));
            }
            Err(join) if join.is_panic() => {
                tracing::error!(task = name, "Background task panicked");
                reporter.report(format!("{name} panicked"));
            }
            Err(_) => tracing::debug!(task = name, "Background task cancelled"),
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exit_codes() {
        assert_eq!(ShutdownSignal::Terminate(SignalKind::Terminate).exit_code(), 0);
        assert_eq!(ShutdownSignal::Terminate(SignalKind::Interrupt).exit_code(), 0);
        assert_eq!(ShutdownSignal::Fatal("boom".into()).exit_code(), 1);
        assert_eq!(ShutdownSignal::BindConflict(5000).exit_code(), 1);
    }

    #[tokio::test]
    async fn failed_task_is_reported() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let handle = spawn_supervised(FatalReporter::new(tx), "purge", async {
            Err::<(), _>("disk gone")
        });
        handle.await.unwrap();

        assert_eq!(rx.recv().await, Some(ShutdownSignal::Fatal("purge: disk gone".into())));
    }

    #[tokio::test]
    async fn panicking_task_is_reported() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let handle = spawn_supervised(FatalReporter::new(tx), "purge", async {
            if true {
                panic!("bad state");
            }
            Ok::<(), String>(())
        });
        handle.await.unwrap();

        assert_eq!(rx.recv().await, Some(ShutdownSignal::Fatal("purge panicked".into())));
    }

    #[tokio::test]
    async fn clean_task_reports_nothing() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let handle = spawn_supervised(FatalReporter::new(tx), "noop", async { Ok::<(), String>(()) });
        handle.await.unwrap();

        assert!(rx.try_recv().is_err());
    }
}
