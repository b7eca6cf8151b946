mod common;

use std::sync::Arc;
use std::time::Duration;

use async_std::task;
use async_std::task::JoinHandle;
use serde_json::{ json, Value };

use common::{ driver_row, eventually, init_logger, user };
use fleetwatch::app::{ App, AppMonitor, Services };
use fleetwatch::backend::memory::{ MemoryBackend, MemoryIdentity };
use fleetwatch::backend::{ IdentityProvider, Permission };
use fleetwatch::config::TrackingConfig;
use fleetwatch::model::LocationSample;
use fleetwatch::session::Role;
use fleetwatch::tracking::simulated::SimulatedLocation;
use fleetwatch::tracking::TrackerStatus;
use fleetwatch::{ Config, Result };

fn backend() -> MemoryBackend {
    let backend = MemoryBackend::new();
    backend.seed("admins", vec![json!({ "id": "boss" })]);
    backend.seed("drivers", vec![driver_row("d1", 10.0, 10.0), driver_row("d2", 11.0, 11.0)]);
    backend
}

fn circuit() -> Arc<SimulatedLocation> {
    Arc::new(SimulatedLocation::circuit(10.0, 10.0, 200.0, 0.0, Duration::from_millis(5)))
}

fn config() -> Config {
    let mut config = Config::default();
    config.tracking = TrackingConfig { min_interval: Duration::from_millis(0), min_distance_m: 0.0 };
    config
}

fn launch(backend: &MemoryBackend, identity: &MemoryIdentity, location: Arc<SimulatedLocation>) -> (JoinHandle<Result<()>>, AppMonitor) {
    let services = Services {
        identity: Arc::new(identity.clone()),
        store: Arc::new(backend.clone()),
        feed: Arc::new(backend.clone()),
        location,
        blobs: Arc::new(backend.clone()),
    };
    let (app, monitor) = App::new(services, config());
    (task::spawn(app.run()), monitor)
}

async fn stop(identity: &MemoryIdentity, app: JoinHandle<Result<()>>) {
    identity.shutdown();
    assert!(app.await.is_ok());
}

fn tracker_status(monitor: &AppMonitor) -> Option<TrackerStatus> {
    monitor.tracker().map(|tracker| tracker.status())
}

fn latitude_of(backend: &MemoryBackend, id: &str) -> Option<f64> {
    backend.row("drivers", id)?.get("latitude").and_then(Value::as_f64)
}

#[async_std::test]
async fn driver_tracks_until_sign_out() {
    init_logger();
    let backend = backend();
    let identity = MemoryIdentity::signed_in(user("d1", Some(Role::Driver)));
    let location = circuit();
    let (app, monitor) = launch(&backend, &identity, location.clone());

    eventually("tracking", || tracker_status(&monitor) == Some(TrackerStatus::Tracking)).await;
    eventually("first write", || latitude_of(&backend, "d1") != Some(10.0)).await;
    assert!(monitor.roster().is_none());
    assert!(monitor.chat().is_some());

    identity.sign_out().await.unwrap();
    eventually("signed out", || monitor.session().is_none()).await;
    assert_eq!(location.active_watches(), 0);
    assert!(monitor.tracker().is_none());

    let latitude = latitude_of(&backend, "d1");
    task::sleep(Duration::from_millis(40)).await;
    assert_eq!(latitude_of(&backend, "d1"), latitude);

    stop(&identity, app).await;
}

#[async_std::test]
async fn admins_table_grants_the_roster() {
    init_logger();
    let backend = backend();
    let identity = MemoryIdentity::signed_in(user("boss", None));
    let (app, monitor) = launch(&backend, &identity, circuit());

    eventually("roster", || monitor.roster().map(|roster| roster.len()) == Some(2)).await;
    assert!(monitor.session().unwrap().is_admin());
    assert!(monitor.tracker().is_none());
    assert_eq!(backend.subscription_count(), 1);

    identity.sign_out().await.unwrap();
    eventually("signed out", || monitor.roster().is_none()).await;
    assert_eq!(backend.subscription_count(), 0);

    stop(&identity, app).await;
}

#[async_std::test]
async fn denied_permission_is_shown_until_sign_out() {
    init_logger();
    let backend = backend();
    let identity = MemoryIdentity::signed_in(user("d1", Some(Role::Driver)));
    let location = Arc::new(
        SimulatedLocation::scripted(LocationSample::new(10.0, 10.0, 0), vec![])
            .with_permission(Permission::Denied),
    );
    let (app, monitor) = launch(&backend, &identity, location);

    eventually("denied", || tracker_status(&monitor) == Some(TrackerStatus::PermissionDenied)).await;

    identity.refresh();
    task::sleep(Duration::from_millis(20)).await;
    assert_eq!(tracker_status(&monitor), Some(TrackerStatus::PermissionDenied));

    identity.sign_out().await.unwrap();
    eventually("signed out", || monitor.tracker().is_none()).await;

    stop(&identity, app).await;
}

#[async_std::test]
async fn switching_users_swaps_components() {
    init_logger();
    let backend = backend();
    let identity = MemoryIdentity::signed_in(user("d1", Some(Role::Driver)));
    let location = circuit();
    let (app, monitor) = launch(&backend, &identity, location.clone());

    eventually("tracking", || tracker_status(&monitor) == Some(TrackerStatus::Tracking)).await;
    let driver_session = monitor.session().unwrap();

    identity.sign_in(user("boss", Some(Role::Admin)));
    eventually("roster", || monitor.roster().is_some()).await;

    assert!(!driver_session.is_valid());
    assert_eq!(monitor.session().unwrap().user_id(), "boss");
    assert!(monitor.tracker().is_none());
    assert_eq!(location.active_watches(), 0);

    stop(&identity, app).await;
    assert_eq!(backend.subscription_count(), 0);
}

#[async_std::test]
async fn refresh_for_the_same_user_keeps_the_session() {
    init_logger();
    let backend = backend();
    let identity = MemoryIdentity::signed_in(user("boss", Some(Role::Admin)));
    let (app, monitor) = launch(&backend, &identity, circuit());

    eventually("roster", || monitor.roster().is_some()).await;
    let session = monitor.session().unwrap();

    identity.refresh();
    identity.sign_in(user("boss", Some(Role::Admin)));
    task::sleep(Duration::from_millis(20)).await;

    assert!(session.is_valid());
    assert_eq!(backend.subscription_count(), 1);

    stop(&identity, app).await;
}
