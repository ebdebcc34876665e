//! Cooperative shutdown shared by every suspension point.
//!
//! [`Shutdown`] is a cloneable token. Backoff sleeps and settle delays wait
//! on it directly through [`Shutdown::sleep`]; blocking primitives that wait
//! on their own condition variables register as [`Interrupt`] watchers and
//! are woken when a shutdown is requested.

use std::io;
use std::sync::{Arc, Condvar, Mutex, PoisonError, Weak};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use signal_hook::consts::signal::{SIGHUP, SIGINT, SIGQUIT, SIGTERM};
use signal_hook::iterator::{Handle, Signals};
use thiserror::Error;
use tracing::{info, warn};

const SHUTDOWN_TARGET: &str = concat!(env!("CARGO_PKG_NAME"), "::shutdown");

/// Blocking primitive that can be woken by a shutdown request.
pub trait Interrupt: Send + Sync {
    /// Wakes every waiter and refuses further waits.
    fn interrupt(&self);
}

/// Returned when a wait was cut short by a shutdown request.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
#[error("shutdown requested")]
pub struct Interrupted;

#[derive(Default)]
struct ShutdownState {
    requested: Mutex<bool>,
    changed: Condvar,
    watchers: Mutex<Vec<Weak<dyn Interrupt>>>,
}

/// Cloneable shutdown token.
#[derive(Clone, Default)]
pub struct Shutdown {
    state: Arc<ShutdownState>,
}

impl std::fmt::Debug for Shutdown {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Shutdown")
            .field("requested", &self.is_requested())
            .finish()
    }
}

impl Shutdown {
    /// Creates a token in the running state.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Requests shutdown and wakes every sleeper and watcher.
    pub fn request(&self) {
        let watchers = {
            let mut watchers = self
                .state
                .watchers
                .lock()
                .unwrap_or_else(PoisonError::into_inner);
            *self
                .state
                .requested
                .lock()
                .unwrap_or_else(PoisonError::into_inner) = true;
            std::mem::take(&mut *watchers)
        };
        self.state.changed.notify_all();

        for watcher in watchers.iter().filter_map(Weak::upgrade) {
            watcher.interrupt();
        }
    }

    /// Whether shutdown has been requested.
    #[must_use]
    pub fn is_requested(&self) -> bool {
        *self
            .state
            .requested
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    /// Sleeps for `duration` unless shutdown is requested first.
    pub fn sleep(&self, duration: Duration) -> Result<(), Interrupted> {
        let requested = self
            .state
            .requested
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        let (requested, _) = self
            .state
            .changed
            .wait_timeout_while(requested, duration, |requested| !*requested)
            .unwrap_or_else(PoisonError::into_inner);
        if *requested { Err(Interrupted) } else { Ok(()) }
    }

    /// Registers a watcher woken on shutdown.
    ///
    /// A watcher registered after shutdown was requested is interrupted
    /// immediately.
    pub fn watch(&self, watcher: Weak<dyn Interrupt>) {
        // The watcher list lock is held across the check so a concurrent
        // request either sees this watcher or is seen by it.
        let mut watchers = self
            .state
            .watchers
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        if self.is_requested() {
            drop(watchers);
            if let Some(watcher) = watcher.upgrade() {
                watcher.interrupt();
            }
            return;
        }
        watchers.retain(|existing| existing.strong_count() > 0);
        watchers.push(watcher);
    }
}

/// Errors reported while installing the signal listener.
#[derive(Debug, Error)]
pub enum ShutdownError {
    /// Installing signal handlers failed.
    #[error("failed to install signal handlers: {source}")]
    Install {
        /// Underlying IO error.
        #[source]
        source: io::Error,
    },
    /// The listener thread could not be spawned.
    #[error("failed to spawn signal listener thread: {source}")]
    Spawn {
        /// Underlying IO error.
        #[source]
        source: io::Error,
    },
}

/// Background listener translating termination signals into a shutdown
/// request. Dropping the listener stops the thread.
pub struct SignalListener {
    handle: Handle,
    thread: Option<JoinHandle<()>>,
}

impl SignalListener {
    /// Installs handlers for SIGTERM, SIGINT, SIGQUIT, and SIGHUP.
    pub fn install(shutdown: Shutdown) -> Result<Self, ShutdownError> {
        let mut signals = Signals::new([SIGTERM, SIGINT, SIGQUIT, SIGHUP])
            .map_err(|source| ShutdownError::Install { source })?;
        let handle = signals.handle();
        let thread = thread::Builder::new()
            .name(String::from("shadowlinkd-signals"))
            .spawn(move || {
                for signal in signals.forever() {
                    info!(target: SHUTDOWN_TARGET, signal, "shutdown signal received");
                    shutdown.request();
                }
            })
            .map_err(|source| ShutdownError::Spawn { source })?;
        Ok(Self {
            handle,
            thread: Some(thread),
        })
    }
}

impl Drop for SignalListener {
    fn drop(&mut self) {
        self.handle.close();
        if let Some(thread) = self.thread.take() {
            if thread.join().is_err() {
                warn!(target: SHUTDOWN_TARGET, "signal listener thread panicked");
            }
        }
    }
}
