use std::sync::Arc;

use async_std::channel;
use async_std::channel::Receiver;
use async_std::task;
use async_std::task::JoinHandle;

use crate::backend::{ LocationService, Permission, RecordStore, WatchHandle, WatchOptions };
use crate::config::TrackingConfig;
use crate::error::{ Error, Result };
use crate::model::LocationSample;
use crate::session::{ Role, SessionContext };
use crate::tracking::gate::SampleGate;
use crate::tracking::{ TrackerStatus, TrackerView };

/// Pushes the driver's position into their row of the drivers table.
pub struct LocationPublisher {
    session: SessionContext,
    store: Arc<dyn RecordStore>,
    location: Arc<dyn LocationService>,
    settings: TrackingConfig,
    table: String,
    view: TrackerView,
}

impl LocationPublisher {
    pub fn new(
        session: SessionContext,
        store: Arc<dyn RecordStore>,
        location: Arc<dyn LocationService>,
        settings: TrackingConfig,
        table: &str,
    ) -> (LocationPublisher, TrackerView) {
        let view = TrackerView::new();
        (
            LocationPublisher {
                session,
                store,
                location,
                settings,
                table: table.to_string(),
                view: view.clone(),
            },
            view,
        )
    }

    fn fail(&self, err: Error) -> Error {
        error!["Location tracking for {} failed: {}", self.session.user_id(), err];
        self.view.set_status(TrackerStatus::Failed(err.to_string()));
        err
    }

    pub async fn start(self) -> Result<TrackerHandle> {
        if self.session.role() != Role::Driver {
            return Err(Error::WrongRole { expected: Role::Driver, actual: self.session.role() });
        }

        self.view.set_status(TrackerStatus::AwaitingPermission);
        let permission = self.location.request_permission().await.map_err(|err| self.fail(err))?;
        if permission == Permission::Denied {
            warn!["Location permission denied for {}", self.session.user_id()];
            self.view.set_status(TrackerStatus::PermissionDenied);
            return Err(Error::PermissionDenied);
        }

        let initial = self.location.current_position().await.map_err(|err| self.fail(err))?;
        info!["Initial fix for {}: {:.5}, {:.5}", self.session.user_id(), initial.latitude, initial.longitude];
        self.view.show_position(initial);

        let mut gate = SampleGate::new(self.settings.min_interval, self.settings.min_distance_m);
        gate.prime(initial);

        let (sender, receiver) = channel::unbounded();
        let options = WatchOptions {
            min_interval: self.settings.min_interval,
            min_distance_m: self.settings.min_distance_m,
        };
        let watch = self.location.watch_position(options, sender).await.map_err(|err| self.fail(err))?;

        self.view.set_status(TrackerStatus::Tracking);
        let task = task::spawn(publish_samples(
            receiver,
            gate,
            self.session.clone(),
            self.store.clone(),
            self.table.clone(),
            self.view.clone(),
        ));

        Ok(TrackerHandle {
            watch,
            location: self.location,
            task,
            view: self.view,
        })
    }
}

async fn publish_samples(
    receiver: Receiver<LocationSample>,
    mut gate: SampleGate,
    session: SessionContext,
    store: Arc<dyn RecordStore>,
    table: String,
    view: TrackerView,
) {
    while let Ok(sample) = receiver.recv().await {
        if !session.is_valid() {
            debug!["Session for {} invalidated, no more writes", session.user_id()];
            break;
        }
        if !gate.offer(&sample) {
            trace!["Sample at {} held back by gate", sample.timestamp];
            continue;
        }

        view.record_accepted(sample);
        match store.update(&table, session.user_id(), sample.to_fields()).await {
            Ok(()) => debug!["Published location for {} at {}", session.user_id(), sample.timestamp],
            Err(err) => {
                view.record_failed_write();
                error!["Failed to publish location for {}: {}", session.user_id(), err];
            }
        }
    }

    info!["Location stream for {} ended", session.user_id()];
}

/// A running tracker. Dropping it does not stop the watch; call `release`.
pub struct TrackerHandle {
    watch: WatchHandle,
    location: Arc<dyn LocationService>,
    task: JoinHandle<()>,
    view: TrackerView,
}

impl TrackerHandle {
    pub fn view(&self) -> &TrackerView {
        &self.view
    }

    /// Waits until the location source stops delivering on its own.
    pub async fn finished(self) {
        self.task.await;
        self.view.set_status(TrackerStatus::Stopped);
    }

    pub async fn release(self) {
        if let Err(err) = self.location.clear_watch(self.watch).await {
            warn!["Failed to clear location watch {:?}: {}", self.watch, err];
        }
        self.task.cancel().await;
        self.view.set_status(TrackerStatus::Stopped);
    }
}
