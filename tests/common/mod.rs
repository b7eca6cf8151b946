#![allow(dead_code)]

use std::time::Duration;

use async_std::task;
use serde_json::{ json, Value };

use fleetwatch::model::Record;
use fleetwatch::session::{ CurrentUser, Role };

pub fn init_logger() {
    let _ = env_logger::Builder::from_default_env().is_test(true).try_init();
}

/// Polls `condition` until it holds, failing the test after about two seconds.
pub async fn eventually<F: Fn() -> bool>(what: &str, condition: F) {
    for _ in 0..400 {
        if condition() {
            return;
        }
        task::sleep(Duration::from_millis(5)).await;
    }
    panic!("timed out waiting for {}", what);
}

pub fn record(value: Value) -> Record {
    match value {
        Value::Object(map) => map,
        other => panic!("not an object: {}", other),
    }
}

pub fn driver_row(id: &str, latitude: f64, longitude: f64) -> Value {
    json!({
        "id": id,
        "email": format!("{}@fleet.test", id),
        "truckType": "truck",
        "isAdmin": false,
        "latitude": latitude,
        "longitude": longitude,
    })
}

pub fn user(id: &str, role_hint: Option<Role>) -> CurrentUser {
    CurrentUser {
        id: id.to_string(),
        email: format!("{}@fleet.test", id),
        role_hint,
    }
}
