//! Poll loop: drives a [`StatusSource`] on a fixed cadence and feeds every
//! outcome through the [`StatusStore`].

use chrono::Utc;
use parking_lot::Mutex as SyncMutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, ThreadId};
use std::time::Duration;
use tokio::sync::{watch, Mutex};
use tokio::time::MissedTickBehavior;
use tracing::{debug, info};

use crate::fetcher::StatusSource;
use crate::models::MonitorState;
use crate::store::{SharedStore, StatusReader, StatusStore};

pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(30_000);

/// Receives the reconciled state once per completed poll.
pub type UpdateCallback = Box<dyn FnMut(MonitorState) + Send>;

/// Hand-off point between the poll task and [`PollHandle::stop`].
struct Delivery {
    stopped: AtomicBool,
    callback: SyncMutex<Option<UpdateCallback>>,
    /// Thread currently running the callback, if any.
    delivering_on: SyncMutex<Option<ThreadId>>,
}

impl Delivery {
    fn new(callback: UpdateCallback) -> Self {
        Self {
            stopped: AtomicBool::new(false),
            callback: SyncMutex::new(Some(callback)),
            delivering_on: SyncMutex::new(None),
        }
    }

    fn is_stopped(&self) -> bool {
        self.stopped.load(Ordering::SeqCst)
    }

    /// Runs the callback unless stopped. Returns whether polling should go on.
    fn deliver(&self, state: MonitorState) -> bool {
        if self.is_stopped() {
            return false;
        }
        let mut callback = self.callback.lock();
        // stop() may have won the race for the lock.
        let Some(on_update) = callback.as_mut().filter(|_| !self.is_stopped()) else {
            return false;
        };
        *self.delivering_on.lock() = Some(thread::current().id());
        on_update(state);
        *self.delivering_on.lock() = None;
        !self.is_stopped()
    }

    /// Marks delivery stopped. Returns `false` if it already was.
    fn stop(&self) -> bool {
        if self.stopped.swap(true, Ordering::SeqCst) {
            return false;
        }
        let reentrant = *self.delivering_on.lock() == Some(thread::current().id());
        if !reentrant {
            // Waits out a callback running on another thread.
            self.callback.lock().take();
        }
        true
    }

    fn release(&self) {
        self.callback.lock().take();
    }
}

pub struct PollScheduler<S> {
    source: Arc<S>,
    interval: Duration,
}

impl<S: StatusSource> PollScheduler<S> {
    pub fn new(source: S) -> Self {
        Self {
            source: Arc::new(source),
            interval: DEFAULT_POLL_INTERVAL,
        }
    }

    /// A zero interval is ignored.
    pub fn with_interval(mut self, interval: Duration) -> Self {
        if !interval.is_zero() {
            self.interval = interval;
        }
        self
    }

    /// Spawns the poll loop on the current tokio runtime.
    ///
    /// The first poll fires immediately; later ones are spaced `interval`
    /// apart from the previous trigger. Only one poll is ever in flight: a
    /// tick that elapses while a poll is outstanding is held as the single
    /// pending poll and any further missed ticks are dropped.
    ///
    /// `on_update` may stop or drop its own handle; the update being delivered
    /// is then the last one.
    pub fn start<F>(self, on_update: F) -> PollHandle
    where
        F: FnMut(MonitorState) + Send + 'static,
    {
        let store: SharedStore = Arc::new(Mutex::new(StatusStore::new()));
        let delivery = Arc::new(Delivery::new(Box::new(on_update)));
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        tokio::spawn(run_poll_loop(
            self.source,
            self.interval,
            store.clone(),
            delivery.clone(),
            shutdown_rx,
        ));

        info!(interval = ?self.interval, "status polling started");

        PollHandle {
            store,
            delivery,
            shutdown_tx,
        }
    }
}

/// Owns a running poll loop. Dropping the handle stops it.
pub struct PollHandle {
    store: SharedStore,
    delivery: Arc<Delivery>,
    shutdown_tx: watch::Sender<bool>,
}

impl PollHandle {
    /// Stops polling. Once this returns `on_update` is never called again,
    /// even for a poll that was in flight. Calling it again is a no-op.
    ///
    /// The shutdown signal wakes the poll task, which then drops its timer
    /// and any in-flight request before it is parked again.
    pub fn stop(&self) {
        if !self.delivery.stop() {
            return;
        }
        let _ = self.shutdown_tx.send(true);
        info!("status polling stopped");
    }

    pub fn is_stopped(&self) -> bool {
        self.delivery.is_stopped()
    }

    pub fn reader(&self) -> StatusReader {
        StatusReader::new(self.store.clone())
    }

    pub async fn state(&self) -> MonitorState {
        self.store.lock().await.state().clone()
    }
}

impl Drop for PollHandle {
    fn drop(&mut self) {
        self.stop();
    }
}

async fn run_poll_loop<S: StatusSource>(
    source: Arc<S>,
    period: Duration,
    store: SharedStore,
    delivery: Arc<Delivery>,
    mut shutdown: watch::Receiver<bool>,
) {
    let mut ticker = tokio::time::interval(period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

    loop {
        tokio::select! {
            biased;
            _ = shutdown.changed() => break,
            _ = ticker.tick() => {}
        }

        debug!("polling status endpoint");
        let outcome = tokio::select! {
            biased;
            _ = shutdown.changed() => break,
            outcome = source.fetch() => outcome,
        };

        let state = store.lock().await.reconcile(outcome, Utc::now());

        if !delivery.deliver(state) {
            break;
        }
    }

    delivery.release();
    debug!("poll loop exited");
}
