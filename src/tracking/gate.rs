use std::time::Duration;

use crate::model::LocationSample;

const EARTH_RADIUS_M: f64 = 6_371_000.0;

/// Great-circle distance in meters.
pub fn haversine_m(from: &LocationSample, to: &LocationSample) -> f64 {
    let lat_from = from.latitude.to_radians();
    let lat_to = to.latitude.to_radians();
    let d_lat = (to.latitude - from.latitude).to_radians();
    let d_lon = (to.longitude - from.longitude).to_radians();

    let a = (d_lat / 2.0).sin().powi(2)
        + lat_from.cos() * lat_to.cos() * (d_lon / 2.0).sin().powi(2);
    2.0 * EARTH_RADIUS_M * a.sqrt().min(1.0).asin()
}

/// Admits a sample only once enough time has passed AND the device has moved
/// far enough since the last admitted one.
#[derive(Debug, Clone)]
pub struct SampleGate {
    min_interval: Duration,
    min_distance_m: f64,
    last: Option<LocationSample>,
}

impl SampleGate {
    pub fn new(min_interval: Duration, min_distance_m: f64) -> SampleGate {
        SampleGate { min_interval, min_distance_m, last: None }
    }

    pub fn last(&self) -> Option<&LocationSample> {
        self.last.as_ref()
    }

    /// Sets the reference point without admitting anything.
    pub fn prime(&mut self, sample: LocationSample) {
        self.last = Some(sample);
    }

    pub fn offer(&mut self, sample: &LocationSample) -> bool {
        let last = match &self.last {
            Some(last) => last,
            None => {
                self.last = Some(*sample);
                return false;
            }
        };

        let elapsed_ms = sample.timestamp - last.timestamp;
        if elapsed_ms < 0 || (elapsed_ms as u128) < self.min_interval.as_millis() {
            return false;
        }
        if haversine_m(last, sample) < self.min_distance_m {
            return false;
        }

        self.last = Some(*sample);
        true
    }
}
