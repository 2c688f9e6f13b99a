//! Surfaces: the dashboard and the coil table, each mounted against one
//! shared store and one injected event channel.
//!
//! DESIGN
//! ======
//! A surface registers its own `new_coil` listener when mounted and runs a
//! background task until unmounted. Only the dashboard writes to the store;
//! the table reads it and raises its own toast for arrivals.
//!
//! The dashboard's snapshot fetch and event loop run in one `select!`, so an
//! event may land before, during, or after the fetch. The store's watermark
//! merge reconciles the two.
//!
//! Dropping a surface aborts its task, which cancels a pending fetch and
//! drops its subscription. `unmount` does the same and waits for it.

use std::sync::Arc;

use serde_json::Value;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::api::YardBackend;
use crate::channel::{EventChannel, NEW_COIL_EVENT, Subscription};
use crate::coil::{Coil, CoilEvent};
use crate::dispatch::CommandDispatcher;
use crate::notify::Notifier;
use crate::snapshot::load_snapshot;
use crate::store::SharedStore;
use crate::view::{self, YardStats};

/// Progress of the dashboard's initial snapshot.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum LoadState {
    #[default]
    Loading,
    Ready,
    Failed,
}

/// Decode a `new_coil` payload, logging and discarding malformed ones.
fn decode_event(payload: Value) -> Option<CoilEvent> {
    match serde_json::from_value::<CoilEvent>(payload) {
        Ok(event) if !event.coil_id.trim().is_empty() => Some(event),
        Ok(_) => {
            warn!("surface: new_coil without coil_id, skipped");
            None
        }
        Err(e) => {
            warn!(error = %e, "surface: malformed new_coil payload, skipped");
            None
        }
    }
}

/// Await the surface task after aborting it, so its subscription is gone.
async fn stop(task: &mut Option<JoinHandle<()>>) {
    if let Some(task) = task.take() {
        task.abort();
        let _ = task.await;
    }
}

// =============================================================================
// DASHBOARD
// =============================================================================

pub struct Dashboard {
    store: SharedStore,
    dispatcher: CommandDispatcher,
    latest: watch::Receiver<Option<Coil>>,
    load: watch::Receiver<LoadState>,
    task: Option<JoinHandle<()>>,
}

impl Dashboard {
    /// Subscribe to `new_coil`, then load the snapshot and apply events in a
    /// background task. Must be called inside a Tokio runtime.
    #[must_use]
    pub fn mount(
        backend: Arc<dyn YardBackend>,
        channel: &EventChannel,
        store: SharedStore,
        notifier: Notifier,
        crane_id: u32,
    ) -> Self {
        let subscription = channel.subscribe(NEW_COIL_EVENT);
        let (latest_tx, latest) = watch::channel(None);
        let (load_tx, load) = watch::channel(LoadState::Loading);
        let dispatcher = CommandDispatcher::new(backend.clone(), store.clone(), notifier.clone(), crane_id);

        let task = tokio::spawn(run_dashboard(backend, subscription, store.clone(), notifier, latest_tx, load_tx));
        info!("dashboard: mounted");

        Self { store, dispatcher, latest, load, task: Some(task) }
    }

    #[must_use]
    pub fn dispatcher(&self) -> &CommandDispatcher {
        &self.dispatcher
    }

    /// The most recent coil announced by a push event.
    #[must_use]
    pub fn latest_coil(&self) -> Option<Coil> {
        self.latest.borrow().clone()
    }

    #[must_use]
    pub fn load_state(&self) -> watch::Receiver<LoadState> {
        self.load.clone()
    }

    pub async fn stats(&self) -> YardStats {
        YardStats::from_coils(&self.store.coils().await)
    }

    /// Stop the background task and release the subscription.
    pub async fn unmount(mut self) {
        stop(&mut self.task).await;
        info!("dashboard: unmounted");
    }
}

impl Drop for Dashboard {
    fn drop(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}

async fn run_dashboard(
    backend: Arc<dyn YardBackend>,
    mut subscription: Subscription,
    store: SharedStore,
    notifier: Notifier,
    latest: watch::Sender<Option<Coil>>,
    load: watch::Sender<LoadState>,
) {
    let snapshot = load_snapshot(backend.as_ref(), &store, &notifier);
    tokio::pin!(snapshot);
    let mut loading = true;
    let mut listening = true;

    // A closed channel ends the event branch only; the snapshot still lands.
    while loading || listening {
        tokio::select! {
            result = &mut snapshot, if loading => {
                loading = false;
                load.send_replace(if result.is_ok() { LoadState::Ready } else { LoadState::Failed });
            }
            payload = subscription.recv(), if listening => {
                let Some(payload) = payload else {
                    debug!("dashboard: channel closed");
                    listening = false;
                    continue;
                };
                apply_new_coil(&store, &notifier, &latest, payload).await;
            }
        }
    }
}

/// Prepend a pushed coil, remember it as the latest, and announce it.
async fn apply_new_coil(store: &SharedStore, notifier: &Notifier, latest: &watch::Sender<Option<Coil>>, payload: Value) {
    let Some(event) = decode_event(payload) else { return };
    let coil = Coil::from(event);

    let evicted = store.push_front(coil.clone()).await;
    if !evicted.is_empty() {
        debug!(count = evicted.len(), "dashboard: evicted oldest coils");
    }
    notifier.info("New Coil Produced", format!("{} placed at {}", coil.coil_id, coil.location));
    latest.send_replace(Some(coil));
}

// =============================================================================
// COIL TABLE
// =============================================================================

pub struct CoilTable {
    store: SharedStore,
    search: String,
    task: Option<JoinHandle<()>>,
}

impl CoilTable {
    /// Subscribe to `new_coil` for arrival toasts. Must be called inside a
    /// Tokio runtime.
    #[must_use]
    pub fn mount(channel: &EventChannel, store: SharedStore, notifier: Notifier) -> Self {
        let subscription = channel.subscribe(NEW_COIL_EVENT);
        let task = tokio::spawn(run_table(subscription, notifier));
        info!("table: mounted");
        Self { store, search: String::new(), task: Some(task) }
    }

    pub fn set_search(&mut self, term: &str) {
        term.clone_into(&mut self.search);
    }

    #[must_use]
    pub fn search(&self) -> &str {
        &self.search
    }

    /// Store rows matching the current search, newest first.
    pub async fn rows(&self) -> Vec<Coil> {
        let coils = self.store.coils().await;
        view::filter(&coils, &self.search).into_iter().cloned().collect()
    }

    /// Total weight across the whole store, independent of the search.
    pub async fn total_weight(&self) -> f64 {
        view::total_weight(&self.store.coils().await)
    }

    pub async fn render(&self) -> Vec<String> {
        let coils = self.store.coils().await;
        view::render_table(&view::filter(&coils, &self.search))
    }

    pub async fn unmount(mut self) {
        stop(&mut self.task).await;
        info!("table: unmounted");
    }
}

impl Drop for CoilTable {
    fn drop(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}

async fn run_table(mut subscription: Subscription, notifier: Notifier) {
    while let Some(payload) = subscription.recv().await {
        let Some(event) = decode_event(payload) else { continue };
        notifier.info(
            "New Coil Added",
            format!("ID: {} Weight: {} at {}", event.coil_id, view::format_weight(event.weight), event.location),
        );
    }
}

#[cfg(test)]
#[path = "surface_test.rs"]
mod tests;
