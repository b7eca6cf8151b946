use std::convert::TryFrom;
use std::time::{ SystemTime, UNIX_EPOCH };

use serde::de::DeserializeOwned;
use serde::{ Deserialize, Deserializer, Serialize };
use serde_json::{ json, Map, Value };

use crate::error::Error;

/// A row as the backend hands it out: a JSON object keyed by column name.
pub type Record = Map<String, Value>;

pub fn now_millis() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|elapsed| elapsed.as_millis() as i64)
        .unwrap_or(0)
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Position {
    pub latitude: f64,
    pub longitude: f64,
    #[serde(default)]
    pub timestamp: i64,
}

/// A single GPS reading from the device.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LocationSample {
    pub latitude: f64,
    pub longitude: f64,
    /// Capture time, epoch milliseconds
    pub timestamp: i64,
}

impl LocationSample {
    pub fn new(latitude: f64, longitude: f64, timestamp: i64) -> LocationSample {
        LocationSample { latitude, longitude, timestamp }
    }

    /// Column values written to the driver's row for this sample.
    pub fn to_fields(&self) -> Record {
        let mut fields = Record::new();
        fields.insert("latitude".to_string(), json!(self.latitude));
        fields.insert("longitude".to_string(), json!(self.longitude));
        fields.insert("timestamp".to_string(), json!(self.timestamp));
        fields
    }
}

impl From<LocationSample> for Position {
    fn from(sample: LocationSample) -> Position {
        Position {
            latitude: sample.latitude,
            longitude: sample.longitude,
            timestamp: sample.timestamp,
        }
    }
}

/// A column that only feeds the display: a value of the wrong type reads as absent.
fn lenient<'de, D, T>(deserializer: D) -> Result<Option<T>, D::Error>
where
    D: Deserializer<'de>,
    T: DeserializeOwned,
{
    let value = Value::deserialize(deserializer)?;
    Ok(serde_json::from_value(value).ok())
}

/// Epoch milliseconds from any JSON number; some devices report fractions.
fn epoch_millis<'de, D>(deserializer: D) -> Result<Option<i64>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Value::deserialize(deserializer)?;
    Ok(match value {
        Value::Number(number) => number.as_i64().or_else(|| number.as_f64().map(|millis| millis.round() as i64)),
        _ => None,
    })
}

/// Latest known condition of one driver.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DriverState {
    pub id: String,
    #[serde(default, deserialize_with = "lenient")]
    pub email: Option<String>,
    #[serde(default, deserialize_with = "lenient")]
    pub phone_number: Option<String>,
    #[serde(default, deserialize_with = "lenient")]
    pub truck_type: Option<String>,
    #[serde(default)]
    pub latitude: Option<f64>,
    #[serde(default)]
    pub longitude: Option<f64>,
    #[serde(default, deserialize_with = "epoch_millis")]
    pub timestamp: Option<i64>,
    #[serde(default, rename = "photoURL", deserialize_with = "lenient")]
    pub photo_url: Option<String>,
    #[serde(default, deserialize_with = "lenient")]
    pub path: Option<Vec<Position>>,
    #[serde(default)]
    pub is_admin: Option<bool>,
}

impl DriverState {
    pub fn new(id: &str) -> DriverState {
        DriverState {
            id: id.to_string(),
            email: None,
            phone_number: None,
            truck_type: None,
            latitude: None,
            longitude: None,
            timestamp: None,
            photo_url: None,
            path: None,
            is_admin: None,
        }
    }

    pub fn is_admin(&self) -> bool {
        self.is_admin.unwrap_or(false)
    }

    /// Latitude and longitude are only usable together.
    pub fn position(&self) -> Option<Position> {
        match (self.latitude, self.longitude) {
            (Some(latitude), Some(longitude)) => Some(Position {
                latitude,
                longitude,
                timestamp: self.timestamp.unwrap_or(0),
            }),
            _ => None,
        }
    }

    /// Whether this state belongs on the admin's driver roster.
    pub fn is_rosterable(&self) -> bool {
        !self.is_admin() && self.position().is_some()
    }
}

impl TryFrom<&Record> for DriverState {
    type Error = Error;

    fn try_from(record: &Record) -> Result<Self, Self::Error> {
        Ok(serde_json::from_value(Value::Object(record.clone()))?)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChangeKind {
    Insert,
    Update,
    Delete,
}

/// One notification from the change feed.
#[derive(Debug, Clone, PartialEq)]
pub struct ChangeEvent {
    pub kind: ChangeKind,
    pub subject: Record,
}
