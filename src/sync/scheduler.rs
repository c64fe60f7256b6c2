//! Background scheduler running sync ticks on an interval.
//!
//! A single worker task waits for the poll interval, a `sync_now` request or
//! cancellation, whichever comes first. Configuration is re-read before every
//! wait and again at the start of every tick.

use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::runtime::Handle;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::error::TickError;
use crate::sync::config::{ConfigSource, DEFAULT_INTERVAL_SECS};
use crate::sync::engine::{SyncEngine, TickReport};

/// Lifecycle state of a [`SyncScheduler`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchedulerState {
    Idle,
    Syncing,
    /// Terminal.
    Stopped,
}

impl fmt::Display for SchedulerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SchedulerState::Idle => write!(f, "idle"),
            SchedulerState::Syncing => write!(f, "syncing"),
            SchedulerState::Stopped => write!(f, "stopped"),
        }
    }
}

type Predicate = Arc<dyn Fn() -> bool + Send + Sync>;
type Callback = Arc<dyn Fn() + Send + Sync>;

/// Host-supplied capabilities queried around each tick.
#[derive(Clone)]
pub struct SchedulerHooks {
    sync_allowed: Predicate,
    on_sync_start: Callback,
    on_sync_end: Callback,
}

impl Default for SchedulerHooks {
    fn default() -> Self {
        Self {
            sync_allowed: Arc::new(|| true),
            on_sync_start: Arc::new(|| {}),
            on_sync_end: Arc::new(|| {}),
        }
    }
}

impl SchedulerHooks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Ticks are skipped while this returns false (e.g. during a print).
    pub fn sync_allowed(mut self, f: impl Fn() -> bool + Send + Sync + 'static) -> Self {
        self.sync_allowed = Arc::new(f);
        self
    }

    pub fn on_sync_start(mut self, f: impl Fn() + Send + Sync + 'static) -> Self {
        self.on_sync_start = Arc::new(f);
        self
    }

    pub fn on_sync_end(mut self, f: impl Fn() + Send + Sync + 'static) -> Self {
        self.on_sync_end = Arc::new(f);
        self
    }
}

impl fmt::Debug for SchedulerHooks {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SchedulerHooks").finish_non_exhaustive()
    }
}

/// What became of a requested tick.
#[derive(Debug)]
pub enum TickOutcome {
    /// The predicate refused, or the scheduler is stopped.
    Skipped,
    Completed(TickReport),
    Aborted(TickError),
}

struct Inner {
    engine: SyncEngine,
    config: Arc<dyn ConfigSource>,
    hooks: SchedulerHooks,
    state: watch::Sender<SchedulerState>,
    cancel: CancellationToken,
    wake_tx: mpsc::Sender<()>,
    // At most one tick at a time, worker or `run_once`
    tick_lock: tokio::sync::Mutex<()>,
}

impl Inner {
    async fn run_tick(&self) -> TickOutcome {
        if self.cancel.is_cancelled() {
            return TickOutcome::Skipped;
        }
        if !(self.hooks.sync_allowed)() {
            debug!("Sync not allowed right now, skipping");
            return TickOutcome::Skipped;
        }

        let _guard = self.tick_lock.lock().await;

        self.state.send_if_modified(|state| {
            if *state == SchedulerState::Idle {
                *state = SchedulerState::Syncing;
                true
            } else {
                false
            }
        });
        (self.hooks.on_sync_start)();

        let outcome = match self.config.load() {
            Ok(config) => match self.engine.tick(&config).await {
                Ok(report) => TickOutcome::Completed(report),
                Err(e) => TickOutcome::Aborted(e),
            },
            Err(e) => {
                let e = TickError::from(e);
                error!("Sync aborted: {}", e);
                TickOutcome::Aborted(e)
            }
        };

        (self.hooks.on_sync_end)();
        self.state.send_if_modified(|state| {
            if *state == SchedulerState::Syncing {
                *state = SchedulerState::Idle;
                true
            } else {
                false
            }
        });

        outcome
    }
}

/// Runs [`SyncEngine`] ticks in the background.
pub struct SyncScheduler {
    inner: Arc<Inner>,
    wake_rx: Mutex<Option<mpsc::Receiver<()>>>,
    worker: Mutex<Option<JoinHandle<()>>>,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

impl SyncScheduler {
    pub fn new(engine: SyncEngine, config: Arc<dyn ConfigSource>, hooks: SchedulerHooks) -> Self {
        let (wake_tx, wake_rx) = mpsc::channel(1);
        let (state, _) = watch::channel(SchedulerState::Idle);

        Self {
            inner: Arc::new(Inner {
                engine,
                config,
                hooks,
                state,
                cancel: CancellationToken::new(),
                wake_tx,
                tick_lock: tokio::sync::Mutex::new(()),
            }),
            wake_rx: Mutex::new(Some(wake_rx)),
            worker: Mutex::new(None),
        }
    }

    /// Spawn the background worker on the current Tokio runtime.
    pub fn start(&self) {
        if self.inner.cancel.is_cancelled() {
            warn!("Sync scheduler was stopped, not starting it again");
            return;
        }

        let mut wake_rx = lock(&self.wake_rx);
        if wake_rx.is_none() {
            warn!("Sync scheduler is already running");
            return;
        }

        let handle = match Handle::try_current() {
            Ok(handle) => handle,
            Err(e) => {
                warn!("Sync scheduler needs a Tokio runtime to start: {}", e);
                return;
            }
        };

        if let Some(rx) = wake_rx.take() {
            let worker = handle.spawn(run_worker(self.inner.clone(), rx));
            *lock(&self.worker) = Some(worker);
            info!("Sync scheduler started");
        }
    }

    /// Stop the worker and wait for it to exit.
    ///
    /// A tick in progress runs to completion first. Calling this again, or
    /// without having started, is harmless.
    pub async fn stop(&self) {
        self.inner.cancel.cancel();

        let worker = lock(&self.worker).take();
        if let Some(worker) = worker {
            if let Err(e) = worker.await {
                error!("Sync worker ended abnormally: {}", e);
            }
        }

        self.inner.state.send_replace(SchedulerState::Stopped);
    }

    /// Cut the current wait short. Requests made while a tick runs are dropped.
    pub fn sync_now(&self) {
        if self.inner.wake_tx.try_send(()).is_ok() {
            debug!("Sync requested");
        }
    }

    pub fn state(&self) -> SchedulerState {
        *self.inner.state.borrow()
    }

    /// Watch state changes.
    pub fn subscribe(&self) -> watch::Receiver<SchedulerState> {
        self.inner.state.subscribe()
    }

    /// Run one tick right away, with the same hooks as the worker.
    pub async fn run_once(&self) -> TickOutcome {
        self.inner.run_tick().await
    }
}

impl Drop for SyncScheduler {
    fn drop(&mut self) {
        self.inner.cancel.cancel();
    }
}

async fn run_worker(inner: Arc<Inner>, mut wake_rx: mpsc::Receiver<()>) {
    let mut interval = Duration::from_secs(DEFAULT_INTERVAL_SECS);

    loop {
        match inner.config.load() {
            Ok(config) => interval = config.poll_interval,
            Err(e) => error!(
                "Failed to read sync configuration, next attempt in {}s: {}",
                interval.as_secs(),
                e
            ),
        }

        tokio::select! {
            biased;
            _ = inner.cancel.cancelled() => break,
            _ = wake_rx.recv() => debug!("Woken up for an early sync"),
            _ = tokio::time::sleep(interval) => {}
        }

        inner.run_tick().await;

        // Requests that arrived during the tick are already served
        while wake_rx.try_recv().is_ok() {}
    }

    inner.state.send_replace(SchedulerState::Stopped);
    info!("Sync scheduler stopped");
}
