//! Run-to-shutdown supervision.
//!
//! # Responsibilities
//! - Own the [`ListenerState`] machine and reject illegal transitions
//! - Accept shutdown signals from the OS, from detached tasks and from bind
//!   failures, acting on the first one only
//! - Tell the server when to start draining
//! - Produce the process exit code once the listener is closed
//!
//! # Design Decisions
//! - One mutex guards state and cause together, so the first-signal check and
//!   the transition it triggers are atomic
//! - A signal that lands before the listener accepts is remembered and acted
//!   on as soon as it does
//! - The drain request is a watch channel: late subscribers still see it

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;

use crate::config::RunMode;
use crate::lifecycle::shutdown::{FatalReporter, ShutdownSignal, SignalKind};
use crate::lifecycle::signals::OsSignals;
use crate::lifecycle::state::{ListenerState, TransitionError};
use crate::net::ListenerError;

#[derive(Debug)]
struct Inner {
    state: ListenerState,
    port: Option<u16>,
    cause: Option<ShutdownSignal>,
}

/// Owner of the listener lifecycle.
pub struct LifecycleSupervisor {
    inner: Mutex<Inner>,
    drain_tx: watch::Sender<bool>,
    events_tx: mpsc::UnboundedSender<ShutdownSignal>,
    events_rx: Mutex<Option<mpsc::UnboundedReceiver<ShutdownSignal>>>,
}

impl LifecycleSupervisor {
    pub fn new() -> Self {
        let (drain_tx, _) = watch::channel(false);
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        Self {
            inner: Mutex::new(Inner {
                state: ListenerState::Unbound,
                port: None,
                cause: None,
            }),
            drain_tx,
            events_tx,
            events_rx: Mutex::new(Some(events_rx)),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn state(&self) -> ListenerState {
        self.lock().state
    }

    /// Port the listener bound, once it has.
    pub fn port(&self) -> Option<u16> {
        self.lock().port
    }

    /// The signal that started shutdown, if any.
    pub fn cause(&self) -> Option<ShutdownSignal> {
        self.lock().cause.clone()
    }

    /// Handle for detached tasks to escalate fatal errors.
    pub fn reporter(&self) -> FatalReporter {
        FatalReporter::new(self.events_tx.clone())
    }

    /// Receiver that flips to `true` when draining must begin.
    pub fn subscribe(&self) -> watch::Receiver<bool> {
        self.drain_tx.subscribe()
    }

    fn transition(inner: &mut Inner, to: ListenerState) -> Result<(), TransitionError> {
        let from = inner.state;
        if !from.can_transition_to(to) {
            return Err(TransitionError { from, to });
        }
        tracing::debug!(%from, %to, "Listener state changed");
        inner.state = to;
        Ok(())
    }

    pub fn on_bound(&self, port: u16) -> Result<(), TransitionError> {
        let mut inner = self.lock();
        Self::transition(&mut inner, ListenerState::Bound)?;
        inner.port = Some(port);
        Ok(())
    }

    /// The server is about to accept connections.
    pub fn on_accepting(&self, mode: RunMode) -> Result<(), TransitionError> {
        let mut inner = self.lock();
        let port = inner.port.unwrap_or_default();

        if let Some(cause) = inner.cause.clone() {
            tracing::info!(port, %cause, "Shutdown requested before accepting, draining");
            Self::transition(&mut inner, ListenerState::Draining)?;
            self.drain_tx.send_replace(true);
            return Ok(());
        }

        Self::transition(&mut inner, ListenerState::Accepting)?;
        tracing::info!(mode = %mode, port, "We are live in {mode} mode on port {port}");
        Ok(())
    }

    /// Record a bind failure. Returns the exit code.
    pub fn on_bind_failed(&self, error: &ListenerError) -> Result<u8, TransitionError> {
        let mut inner = self.lock();
        Self::transition(&mut inner, ListenerState::FailedToBind)?;

        let cause = match error {
            ListenerError::AddrInUse { port, .. } => {
                tracing::error!(port, error = %error, "Port is already in use");
                ShutdownSignal::BindConflict(*port)
            }
            ListenerError::Bind { .. } => {
                tracing::error!(error = %error, "Failed to bind listener");
                ShutdownSignal::Fatal(error.to_string())
            }
        };
        let code = cause.exit_code();
        inner.cause = Some(cause);
        Ok(code)
    }

    /// Ask for shutdown. Returns `true` only for the signal that is acted on.
    pub fn request_shutdown(&self, signal: ShutdownSignal) -> bool {
        let mut inner = self.lock();

        if let Some(first) = &inner.cause {
            tracing::debug!(ignored = %signal, first = %first, "Shutdown already in progress");
            return false;
        }
        if inner.state.is_terminal() {
            tracing::debug!(ignored = %signal, state = %inner.state, "Listener already stopped");
            return false;
        }

        match &signal {
            ShutdownSignal::Terminate(_) => tracing::info!(%signal, "Shutting down gracefully"),
            _ => tracing::error!(%signal, "Shutting down after unrecoverable error"),
        }

        if matches!(inner.state, ListenerState::Bound | ListenerState::Accepting) {
            if Self::transition(&mut inner, ListenerState::Draining).is_err() {
                return false;
            }
            self.drain_tx.send_replace(true);
        }
        inner.cause = Some(signal);
        true
    }

    /// All in-flight work is done. Returns the exit code.
    pub fn on_drained(&self) -> Result<u8, TransitionError> {
        let mut inner = self.lock();
        Self::transition(&mut inner, ListenerState::Closed)?;
        let code = inner.cause.as_ref().map_or(0, ShutdownSignal::exit_code);
        tracing::info!(exit_code = code, "Server closed");
        Ok(code)
    }

    /// Forward OS signals and reported errors into [`Self::request_shutdown`].
    ///
    /// Only the first call receives reported errors.
    pub fn spawn_watch(self: &Arc<Self>, mut signals: Option<OsSignals>) -> JoinHandle<()> {
        let supervisor = Arc::clone(self);
        let events = supervisor
            .events_rx
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();

        tokio::spawn(async move {
            let mut events = events;
            loop {
                let signal = tokio::select! {
                    Some(signal) = recv_event(&mut events) => signal,
                    kind = recv_os(&mut signals) => ShutdownSignal::Terminate(kind),
                };
                supervisor.request_shutdown(signal);
            }
        })
    }
}

impl Default for LifecycleSupervisor {
    fn default() -> Self {
        Self::new()
    }
}

async fn recv_event(
    events: &mut Option<mpsc::UnboundedReceiver<ShutdownSignal>>,
) -> Option<ShutdownSignal> {
    match events {
        Some(rx) => rx.recv().await,
        None => std::future::pending().await,
    }
}

async fn recv_os(signals: &mut Option<OsSignals>) -> SignalKind {
    match signals {
        Some(signals) => signals.recv().await,
        None => std::future::pending().await,
    }
}

/// Resolves once draining has been requested.
pub async fn drain_requested(mut rx: watch::Receiver<bool>) {
    if rx.wait_for(|draining| *draining).await.is_err() {
        std::future::pending::<()>().await;
    }
}
