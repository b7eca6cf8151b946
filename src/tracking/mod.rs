//! Driver side: sampling the device position and publishing it.

pub mod gate;
pub mod publisher;
pub mod simulated;

use std::sync::{ Arc, PoisonError, RwLock };

use crate::model::LocationSample;

#[derive(Debug, Clone, PartialEq)]
pub enum TrackerStatus {
    Idle,
    AwaitingPermission,
    Tracking,
    /// Terminal for the session, shown to the driver until sign-out
    PermissionDenied,
    Failed(String),
    Stopped,
}

#[derive(Debug, Clone)]
struct TrackerState {
    status: TrackerStatus,
    position: Option<LocationSample>,
    accepted: u64,
    failed_writes: u64,
}

/// What the driver's own screen shows. Cheap to clone.
#[derive(Debug, Clone)]
pub struct TrackerView {
    state: Arc<RwLock<TrackerState>>,
}

impl TrackerView {
    pub(crate) fn new() -> TrackerView {
        TrackerView {
            state: Arc::new(RwLock::new(TrackerState {
                status: TrackerStatus::Idle,
                position: None,
                accepted: 0,
                failed_writes: 0,
            })),
        }
    }

    fn read<T>(&self, f: impl FnOnce(&TrackerState) -> T) -> T {
        f(&self.state.read().unwrap_or_else(PoisonError::into_inner))
    }

    fn write(&self, f: impl FnOnce(&mut TrackerState)) {
        f(&mut self.state.write().unwrap_or_else(PoisonError::into_inner))
    }

    pub fn status(&self) -> TrackerStatus {
        self.read(|state| state.status.clone())
    }

    pub fn position(&self) -> Option<LocationSample> {
        self.read(|state| state.position)
    }

    /// Samples that passed the gate since tracking started.
    pub fn accepted(&self) -> u64 {
        self.read(|state| state.accepted)
    }

    pub fn failed_writes(&self) -> u64 {
        self.read(|state| state.failed_writes)
    }

    pub(crate) fn set_status(&self, status: TrackerStatus) {
        self.write(|state| state.status = status);
    }

    pub(crate) fn show_position(&self, sample: LocationSample) {
        self.write(|state| state.position = Some(sample));
    }

    pub(crate) fn record_accepted(&self, sample: LocationSample) {
        self.write(|state| {
            state.position = Some(sample);
            state.accepted += 1;
        });
    }

    pub(crate) fn record_failed_write(&self) {
        self.write(|state| state.failed_writes += 1);
    }
}
