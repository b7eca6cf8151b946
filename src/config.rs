use std::convert::TryFrom;
use std::fs;
use std::path::Path;
use std::time::Duration;

use yaml_rust::{ Yaml, YamlLoader };

use crate::error::{ Error, Result };

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TrackingConfig {
    pub min_interval: Duration,
    pub min_distance_m: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Tables {
    pub drivers: String,
    pub admins: String,
    pub messages: String,
    pub photo_bucket: String,
}

/// Settings for the simulated fleet the binary runs.
#[derive(Debug, Clone, PartialEq)]
pub struct DemoConfig {
    pub drivers: usize,
    pub tick: Duration,
    pub duration: Duration,
    pub center_lat: f64,
    pub center_lon: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Config {
    pub tracking: TrackingConfig,
    pub tables: Tables,
    pub demo: DemoConfig,
}

impl Default for Config {
    fn default() -> Config {
        Config {
            tracking: TrackingConfig {
                min_interval: Duration::from_millis(5000),
                min_distance_m: 10.0,
            },
            tables: Tables {
                drivers: "drivers".to_string(),
                admins: "admins".to_string(),
                messages: "messages".to_string(),
                photo_bucket: "chat-images".to_string(),
            },
            demo: DemoConfig {
                drivers: 3,
                tick: Duration::from_millis(1000),
                duration: Duration::from_secs(20),
                center_lat: -12.1466,
                center_lon: -45.0007,
            },
        }
    }
}

fn read_u64(section: &Yaml, key: &str, default: u64) -> Result<u64> {
    match &section[key] {
        Yaml::BadValue | Yaml::Null => Ok(default),
        Yaml::Integer(value) if *value >= 0 => Ok(*value as u64),
        other => Err(Error::Config(format!["{} must be a non-negative integer, got {:?}", key, other])),
    }
}

fn read_f64(section: &Yaml, key: &str, default: f64) -> Result<f64> {
    match &section[key] {
        Yaml::BadValue | Yaml::Null => Ok(default),
        Yaml::Integer(value) => Ok(*value as f64),
        Yaml::Real(_) => section[key].as_f64()
            .ok_or_else(|| Error::Config(format!["{} is not a number", key])),
        other => Err(Error::Config(format!["{} must be a number, got {:?}", key, other])),
    }
}

fn read_string(section: &Yaml, key: &str, default: &str) -> Result<String> {
    match &section[key] {
        Yaml::BadValue | Yaml::Null => Ok(default.to_string()),
        Yaml::String(value) if !value.is_empty() => Ok(value.clone()),
        other => Err(Error::Config(format!["{} must be a non-empty string, got {:?}", key, other])),
    }
}

impl TryFrom<&String> for Config {
    type Error = Error;

    /// Every key is optional; anything left out keeps its default.
    fn try_from(str: &String) -> Result<Self> {
        let documents = YamlLoader::load_from_str(str)
            .map_err(|err| Error::Config(format!["Failed to parse yaml: {:?}", err]))?;
        let defaults = Config::default();
        let parsed = match documents.first() {
            Some(parsed) => parsed,
            None => return Ok(defaults),
        };
        if !matches!(parsed, Yaml::Hash(_)) {
            return Err(Error::Config("top level must be a mapping".to_string()));
        }

        let tracking = &parsed["tracking"];
        let tables = &parsed["tables"];
        let demo = &parsed["demo"];

        Ok(Config {
            tracking: TrackingConfig {
                min_interval: Duration::from_millis(read_u64(tracking, "min_interval_ms", defaults.tracking.min_interval.as_millis() as u64)?),
                min_distance_m: read_f64(tracking, "min_distance_m", defaults.tracking.min_distance_m)?,
            },
            tables: Tables {
                drivers: read_string(tables, "drivers", &defaults.tables.drivers)?,
                admins: read_string(tables, "admins", &defaults.tables.admins)?,
                messages: read_string(tables, "messages", &defaults.tables.messages)?,
                photo_bucket: read_string(tables, "photo_bucket", &defaults.tables.photo_bucket)?,
            },
            demo: DemoConfig {
                drivers: read_u64(demo, "drivers", defaults.demo.drivers as u64)? as usize,
                tick: Duration::from_millis(read_u64(demo, "tick_ms", defaults.demo.tick.as_millis() as u64)?),
                duration: Duration::from_secs(read_u64(demo, "duration_s", defaults.demo.duration.as_secs())?),
                center_lat: read_f64(demo, "center_lat", defaults.demo.center_lat)?,
                center_lon: read_f64(demo, "center_lon", defaults.demo.center_lon)?,
            },
        })
    }
}

impl Config {
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Config> {
        let contents = fs::read_to_string(path)?;
        Config::try_from(&contents)
    }
}
