use std::collections::HashMap;
use std::f64::consts::PI;
use std::sync::atomic::{ AtomicU64, Ordering };
use std::sync::{ Mutex, MutexGuard, PoisonError };
use std::time::Duration;

use async_std::channel::Sender;
use async_std::task;
use async_std::task::JoinHandle;
use async_trait::async_trait;

use crate::backend::{ LocationService, Permission, WatchHandle, WatchOptions };
use crate::error::{ Error, Result };
use crate::model::{ now_millis, LocationSample };

const METERS_PER_DEGREE: f64 = 111_195.0;

#[derive(Debug, Clone)]
enum Route {
    /// Drives around a circle, one step per tick
    Circuit {
        center_lat: f64,
        center_lon: f64,
        radius_m: f64,
        step: f64,
        tick: Duration,
    },
    /// Replays fixed samples as fast as they are consumed, then stops
    Scripted {
        initial: LocationSample,
        samples: Vec<LocationSample>,
    },
}

/// A device location service that makes up its own positions.
pub struct SimulatedLocation {
    route: Route,
    permission: Permission,
    phase: Mutex<f64>,
    watches: Mutex<HashMap<u64, JoinHandle<()>>>,
    next_watch: AtomicU64,
}

fn circuit_point(center_lat: f64, center_lon: f64, radius_m: f64, phase: f64) -> (f64, f64) {
    let angle = 2.0 * PI * phase;
    let latitude = center_lat + radius_m / METERS_PER_DEGREE * angle.cos();
    let longitude = center_lon + radius_m / (METERS_PER_DEGREE * center_lat.to_radians().cos()) * angle.sin();
    (latitude, longitude)
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

impl SimulatedLocation {
    pub fn circuit(center_lat: f64, center_lon: f64, radius_m: f64, phase: f64, tick: Duration) -> SimulatedLocation {
        SimulatedLocation::with_route(Route::Circuit {
            center_lat,
            center_lon,
            radius_m,
            step: 0.01,
            tick,
        }, phase)
    }

    pub fn scripted(initial: LocationSample, samples: Vec<LocationSample>) -> SimulatedLocation {
        SimulatedLocation::with_route(Route::Scripted { initial, samples }, 0.0)
    }

    fn with_route(route: Route, phase: f64) -> SimulatedLocation {
        SimulatedLocation {
            route,
            permission: Permission::Granted,
            phase: Mutex::new(phase % 1.0),
            watches: Mutex::new(HashMap::new()),
            next_watch: AtomicU64::new(1),
        }
    }

    pub fn with_permission(mut self, permission: Permission) -> SimulatedLocation {
        self.permission = permission;
        self
    }

    pub fn active_watches(&self) -> usize {
        lock(&self.watches).len()
    }
}

#[async_trait]
impl LocationService for SimulatedLocation {
    async fn request_permission(&self) -> Result<Permission> {
        Ok(self.permission)
    }

    async fn current_position(&self) -> Result<LocationSample> {
        if self.permission != Permission::Granted {
            return Err(Error::Location("no permission".to_string()));
        }
        match &self.route {
            Route::Circuit { center_lat, center_lon, radius_m, .. } => {
                let (latitude, longitude) = circuit_point(*center_lat, *center_lon, *radius_m, *lock(&self.phase));
                Ok(LocationSample::new(latitude, longitude, now_millis()))
            },
            Route::Scripted { initial, .. } => Ok(*initial),
        }
    }

    async fn watch_position(&self, options: WatchOptions, sink: Sender<LocationSample>) -> Result<WatchHandle> {
        if self.permission != Permission::Granted {
            return Err(Error::Location("no permission".to_string()));
        }
        debug!["Watching position every {:?} / {} m", options.min_interval, options.min_distance_m];

        let task = match self.route.clone() {
            Route::Circuit { center_lat, center_lon, radius_m, step, tick } => {
                let mut phase = *lock(&self.phase);
                task::spawn(async move {
                    loop {
                        phase = (phase + step) % 1.0;
                        let (latitude, longitude) = circuit_point(center_lat, center_lon, radius_m, phase);
                        if sink.send(LocationSample::new(latitude, longitude, now_millis())).await.is_err() {
                            break;
                        }
                        task::sleep(tick).await;
                    }
                })
            },
            Route::Scripted { samples, .. } => task::spawn(async move {
                for sample in samples {
                    if sink.send(sample).await.is_err() {
                        break;
                    }
                }
            }),
        };

        let id = self.next_watch.fetch_add(1, Ordering::Relaxed);
        lock(&self.watches).insert(id, task);
        Ok(WatchHandle(id))
    }

    async fn clear_watch(&self, handle: WatchHandle) -> Result<()> {
        let task = lock(&self.watches).remove(&handle.0);
        match task {
            Some(task) => {
                task.cancel().await;
                Ok(())
            },
            None => Err(Error::Location(format!["unknown watch {:?}", handle])),
        }
    }
}
