//! Reconciliation of poll outcomes into the monitor state.

use chrono::{DateTime, Utc};
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::debug;

use crate::models::{FetchOutcome, Health, LastError, MonitorState, StatusSnapshot};

#[derive(Debug, Default)]
pub struct StatusStore {
    state: MonitorState,
}

impl StatusStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Folds one poll outcome into the state and returns the result.
    ///
    /// A success replaces the snapshot wholesale and advances
    /// `last_checked_at`. A failure keeps the previous snapshot and timestamp
    /// and only records the error. Either way loading is over for good.
    pub fn reconcile(&mut self, outcome: FetchOutcome, observed_at: DateTime<Utc>) -> MonitorState {
        match outcome {
            Ok(snapshot) => {
                debug!(servers = snapshot.len(), "snapshot replaced");
                self.state.snapshot = Some(snapshot);
                self.state.last_checked_at = Some(observed_at);
                self.state.last_error = None;
            }
            Err(err) => {
                debug!(error = %err, "poll failed, keeping previous snapshot");
                self.state.last_error = Some(LastError::from(&err));
            }
        }
        self.state.is_loading = false;
        self.state.clone()
    }

    pub fn state(&self) -> &MonitorState {
        &self.state
    }

    pub fn offline_count(&self) -> usize {
        self.state.offline_count()
    }

    pub fn has_critical_alert(&self) -> bool {
        self.state.has_critical_alert()
    }

    pub fn alert_message(&self) -> Option<String> {
        self.state.alert_message()
    }
}

/// Store shared between the polling task (sole writer) and readers.
pub type SharedStore = Arc<Mutex<StatusStore>>;

/// Read-only view of a [`SharedStore`] for presentation code.
#[derive(Clone)]
pub struct StatusReader {
    store: SharedStore,
}

impl StatusReader {
    pub fn new(store: SharedStore) -> Self {
        Self { store }
    }

    pub async fn current(&self) -> MonitorState {
        self.store.lock().await.state().clone()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Transition {
    pub server: String,
    pub from: Health,
    pub to: Health,
    /// When the endpoint last checked the server, if it said so parseably.
    pub checked_at: Option<DateTime<Utc>>,
}

/// Servers whose effective health differs between two snapshots.
///
/// A server seen for the first time counts as a transition only when it shows
/// up down. Servers missing from `next` are ignored.
pub fn status_transitions(previous: Option<&StatusSnapshot>, next: &StatusSnapshot) -> Vec<Transition> {
    next.iter()
        .filter_map(|(name, status)| {
            let to = status.health();
            let from = match previous.and_then(|prev| prev.get(name)) {
                Some(old) if old.health() != to => old.health(),
                None if to == Health::Down => Health::Up,
                _ => return None,
            };
            Some(Transition {
                server: name.clone(),
                from,
                to,
                checked_at: status.last_checked_at(),
            })
        })
        .collect()
}
