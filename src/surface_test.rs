use std::sync::atomic::Ordering;
use std::time::Duration;

use serde_json::json;
use tokio::sync::Notify;
use tokio::time::timeout;

use super::*;
use crate::coil::CoilStatus;
use crate::test_helpers::{MockBackend, record};

async fn eventually(check: impl Fn() -> bool) {
    timeout(Duration::from_secs(5), async {
        while !check() {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .expect("condition not reached in time");
}

async fn store_until(store: &SharedStore, check: impl Fn(&[Coil]) -> bool) {
    timeout(Duration::from_secs(5), async {
        while !check(&store.coils().await) {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .expect("store condition not reached in time");
}

async fn wait_loaded(dashboard: &Dashboard) -> LoadState {
    let mut load = dashboard.load_state();
    let state = timeout(Duration::from_secs(5), load.wait_for(|s| *s != LoadState::Loading))
        .await
        .expect("snapshot timed out")
        .expect("dashboard alive");
    *state
}

fn mount_dashboard(backend: &Arc<MockBackend>, channel: &EventChannel, store: &SharedStore, notifier: &Notifier) -> Dashboard {
    Dashboard::mount(backend.clone(), channel, store.clone(), notifier.clone(), 1)
}

fn new_coil(id: &str, location: &str, weight: f64) -> Value {
    json!({"coil_id": id, "location": location, "timestamp": "2025-01-01 09:00:00", "weight": weight})
}

// =============================================================
// Dashboard
// =============================================================

#[tokio::test]
async fn dashboard_loads_snapshot_on_mount() {
    let backend = Arc::new(MockBackend::with_coils(vec![
        record("Y2", "A-B3-2", "Placed", Some(20.0)),
        record("Y1", "Road-1", "Dispatched", Some(10.0)),
    ]));
    let channel = EventChannel::offline();
    let store = SharedStore::new(20);
    let dashboard = mount_dashboard(&backend, &channel, &store, &Notifier::default());

    assert_eq!(wait_loaded(&dashboard).await, LoadState::Ready);

    let stats = dashboard.stats().await;
    assert_eq!(stats.total, 2);
    assert_eq!(stats.dispatched, 1);
    assert!((stats.total_weight - 30.0).abs() < f64::EPSILON);
}

#[tokio::test]
async fn dashboard_snapshot_failure_is_reported() {
    let backend = Arc::new(MockBackend::failing());
    let channel = EventChannel::offline();
    let notifier = Notifier::default();
    let mut toasts = notifier.subscribe();
    let dashboard = mount_dashboard(&backend, &channel, &SharedStore::new(20), &notifier);

    assert_eq!(wait_loaded(&dashboard).await, LoadState::Failed);
    assert!(toasts.recv().await.expect("toast").is_error());
}

#[tokio::test]
async fn pushed_coil_is_prepended_and_announced() {
    let backend = Arc::new(MockBackend::with_coils(vec![record("Y1", "A-B3-2", "Placed", None)]));
    let channel = EventChannel::offline();
    let store = SharedStore::new(20);
    let notifier = Notifier::default();
    let dashboard = mount_dashboard(&backend, &channel, &store, &notifier);
    wait_loaded(&dashboard).await;
    let mut toasts = notifier.subscribe();

    channel.publish(NEW_COIL_EVENT, new_coil("Y9", "B-C4-1", 15.5));
    store_until(&store, |coils| coils.len() == 2).await;

    let coils = store.coils().await;
    assert_eq!(coils[0].coil_id, "Y9");
    assert_eq!(coils[0].status, CoilStatus::CoilYard);
    let latest = dashboard.latest_coil().expect("latest coil");
    assert_eq!(latest.coil_id, "Y9");

    let toast = toasts.recv().await.expect("toast");
    assert_eq!(toast.title, "New Coil Produced");
    assert_eq!(toast.description, "Y9 placed at B-C4-1");
}

#[tokio::test]
async fn pushed_coils_never_exceed_capacity() {
    let backend = Arc::new(MockBackend::default());
    let channel = EventChannel::offline();
    let store = SharedStore::new(3);
    let dashboard = mount_dashboard(&backend, &channel, &store, &Notifier::default());
    wait_loaded(&dashboard).await;

    for i in 0..5 {
        channel.publish(NEW_COIL_EVENT, new_coil(&format!("Y{i}"), "A-B3-2", 1.0));
    }
    store_until(&store, |coils| coils.first().is_some_and(|c| c.coil_id == "Y4")).await;

    let ids: Vec<_> = store.coils().await.into_iter().map(|c| c.coil_id).collect();
    assert_eq!(ids, ["Y4", "Y3", "Y2"]);
}

#[tokio::test]
async fn malformed_payload_is_skipped() {
    let backend = Arc::new(MockBackend::default());
    let channel = EventChannel::offline();
    let store = SharedStore::new(20);
    let dashboard = mount_dashboard(&backend, &channel, &store, &Notifier::default());
    wait_loaded(&dashboard).await;

    channel.publish(NEW_COIL_EVENT, json!({"weight": "heavy"}));
    channel.publish(NEW_COIL_EVENT, json!({"coil_id": "", "location": "A-B3-2"}));
    channel.publish(NEW_COIL_EVENT, new_coil("YOK", "A-B3-2", 2.0));
    store_until(&store, |coils| !coils.is_empty()).await;

    let coils = store.coils().await;
    assert_eq!(coils.len(), 1);
    assert_eq!(coils[0].coil_id, "YOK");
}

#[tokio::test]
async fn event_racing_the_snapshot_is_kept() {
    let backend = Arc::new(MockBackend {
        coils: vec![record("Y1", "A-B3-2", "Placed", Some(5.0)), record("Y2", "B-C4-1", "Placed", None)],
        fetch_gate: Some(Notify::new()),
        ..MockBackend::default()
    });
    let channel = EventChannel::offline();
    let store = SharedStore::new(20);
    let dashboard = mount_dashboard(&backend, &channel, &store, &Notifier::default());

    eventually(|| backend.fetch_calls.load(Ordering::SeqCst) == 1).await;
    channel.publish(NEW_COIL_EVENT, new_coil("Y1", "C-D5-1", 7.0));
    store_until(&store, |coils| coils.len() == 1).await;

    backend.fetch_gate.as_ref().expect("gate").notify_one();
    assert_eq!(wait_loaded(&dashboard).await, LoadState::Ready);

    let coils = store.coils().await;
    assert_eq!(coils.len(), 2);
    assert_eq!(coils[0].coil_id, "Y1");
    assert_eq!(coils[0].location, "C-D5-1", "event newer than the snapshot wins");
    assert_eq!(coils[1].coil_id, "Y2");
}

#[tokio::test]
async fn dispatcher_updates_the_dashboard_store() {
    let backend = Arc::new(MockBackend::with_coils(vec![record("Y1", "A-B3-2", "Placed", None)]));
    let channel = EventChannel::offline();
    let store = SharedStore::new(20);
    let dashboard = mount_dashboard(&backend, &channel, &store, &Notifier::default());
    wait_loaded(&dashboard).await;

    let mut form = crate::dispatch::AssignForm::new();
    form.set_coil_id("Y1");
    form.select_drop(Some(crate::location::DropLocation::Road2));
    dashboard.dispatcher().assign(&mut form).await.expect("assign succeeds");

    assert_eq!(dashboard.stats().await.dispatched, 1);
}

// =============================================================
// Table and lifecycle
// =============================================================

#[tokio::test]
async fn both_surfaces_react_to_one_event() {
    let backend = Arc::new(MockBackend::default());
    let channel = EventChannel::offline();
    let store = SharedStore::new(20);
    let notifier = Notifier::default();
    let mut toasts = notifier.subscribe();
    let dashboard = mount_dashboard(&backend, &channel, &store, &notifier);
    let mut table = CoilTable::mount(&channel, store.clone(), notifier.clone());
    wait_loaded(&dashboard).await;

    assert_eq!(channel.publish(NEW_COIL_EVENT, new_coil("Y7", "A-B3-2", 12.5)), 2);

    let mut titles = Vec::new();
    for _ in 0..2 {
        let toast = timeout(Duration::from_secs(5), toasts.recv()).await.expect("toast timed out").expect("toast");
        if toast.title == "New Coil Added" {
            assert_eq!(toast.description, "ID: Y7 Weight: 12.5T at A-B3-2");
        }
        titles.push(toast.title);
    }
    titles.sort();
    assert_eq!(titles, ["New Coil Added", "New Coil Produced"]);

    store_until(&store, |coils| coils.len() == 1).await;
    table.set_search("y7");
    assert_eq!(table.search(), "y7");
    assert_eq!(table.rows().await.len(), 1);
    table.set_search("nothing");
    assert!(table.rows().await.is_empty());
    assert_eq!(table.render().await.last().map(String::as_str), Some(crate::view::EMPTY_TABLE));
    assert!((table.total_weight().await - 12.5).abs() < f64::EPSILON);
}

#[tokio::test]
async fn unmounting_surfaces_releases_their_listeners() {
    let backend = Arc::new(MockBackend::default());
    let channel = EventChannel::offline();
    let store = SharedStore::new(20);
    let notifier = Notifier::default();
    let dashboard = mount_dashboard(&backend, &channel, &store, &notifier);
    let table = CoilTable::mount(&channel, store.clone(), notifier);
    assert_eq!(channel.listener_count(), 2);

    dashboard.unmount().await;
    assert_eq!(channel.listener_count(), 1);

    table.unmount().await;
    assert_eq!(channel.listener_count(), 0);
}

#[tokio::test]
async fn dropping_dashboard_cancels_pending_fetch() {
    let backend = Arc::new(MockBackend {
        coils: vec![record("Y1", "A-B3-2", "Placed", None)],
        fetch_gate: Some(Notify::new()),
        ..MockBackend::default()
    });
    let channel = EventChannel::offline();
    let store = SharedStore::new(20);
    let dashboard = mount_dashboard(&backend, &channel, &store, &Notifier::default());
    eventually(|| backend.fetch_calls.load(Ordering::SeqCst) == 1).await;

    drop(dashboard);
    eventually(|| channel.listener_count() == 0).await;

    backend.fetch_gate.as_ref().expect("gate").notify_one();
    tokio::time::sleep(Duration::from_millis(20)).await;
    assert!(store.coils().await.is_empty());
}

#[tokio::test]
async fn snapshot_lands_after_channel_is_dropped() {
    let backend = Arc::new(MockBackend {
        coils: vec![record("Y1", "A-B3-2", "Placed", Some(3.0))],
        fetch_gate: Some(Notify::new()),
        ..MockBackend::default()
    });
    let store = SharedStore::new(20);
    let dashboard = {
        let channel = EventChannel::offline();
        mount_dashboard(&backend, &channel, &store, &Notifier::default())
    };
    eventually(|| backend.fetch_calls.load(Ordering::SeqCst) == 1).await;

    backend.fetch_gate.as_ref().expect("gate").notify_one();

    assert_eq!(wait_loaded(&dashboard).await, LoadState::Ready);
    let coils = store.coils().await;
    assert_eq!(coils.len(), 1);
    assert_eq!(coils[0].coil_id, "Y1");
}
