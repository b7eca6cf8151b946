//! Contracts for the hosted services the client talks to.

pub mod memory;

use std::time::Duration;

use async_std::channel::Sender;
use async_trait::async_trait;
use serde_json::Value;

use crate::error::Result;
use crate::model::{ ChangeEvent, LocationSample, Record };
use crate::session::{ CurrentUser, SessionEvent };

#[derive(Debug, Clone, PartialEq)]
pub enum Condition {
    Eq(String, Value),
    /// Different from the value, or the field is missing
    Neq(String, Value),
    NotNull(String),
}

impl Condition {
    fn matches(&self, record: &Record) -> bool {
        match self {
            Condition::Eq(field, value) => record.get(field) == Some(value),
            Condition::Neq(field, value) => record.get(field) != Some(value),
            Condition::NotNull(field) => !matches!(record.get(field), None | Some(Value::Null)),
        }
    }
}

/// Selects rows of one table.
#[derive(Debug, Clone, PartialEq)]
pub struct Filter {
    pub table: String,
    pub conditions: Vec<Condition>,
}

impl Filter {
    pub fn table(table: &str) -> Filter {
        Filter { table: table.to_string(), conditions: vec![] }
    }

    pub fn eq<V: Into<Value>>(mut self, field: &str, value: V) -> Filter {
        self.conditions.push(Condition::Eq(field.to_string(), value.into()));
        self
    }

    pub fn neq<V: Into<Value>>(mut self, field: &str, value: V) -> Filter {
        self.conditions.push(Condition::Neq(field.to_string(), value.into()));
        self
    }

    pub fn not_null(mut self, field: &str) -> Filter {
        self.conditions.push(Condition::NotNull(field.to_string()));
        self
    }

    pub fn matches(&self, record: &Record) -> bool {
        self.conditions.iter().all(|condition| condition.matches(record))
    }
}

#[async_trait]
pub trait IdentityProvider: Send + Sync {
    async fn current_user(&self) -> Result<Option<CurrentUser>>;

    /// Every later session change is delivered to `sink`.
    async fn on_session_change(&self, sink: Sender<SessionEvent>) -> Result<()>;

    async fn sign_out(&self) -> Result<()>;
}

#[async_trait]
pub trait RecordStore: Send + Sync {
    async fn read_all(&self, filter: &Filter) -> Result<Vec<Record>>;

    async fn update(&self, table: &str, id: &str, fields: Record) -> Result<()>;

    /// Returns the row as stored, including generated columns.
    async fn insert(&self, table: &str, fields: Record) -> Result<Record>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionHandle(pub u64);

#[async_trait]
pub trait ChangeFeed: Send + Sync {
    async fn subscribe(&self, filter: Filter, sink: Sender<ChangeEvent>) -> Result<SubscriptionHandle>;

    /// Stops delivery. The sink is dropped, which ends the receiving stream.
    async fn unsubscribe(&self, handle: SubscriptionHandle) -> Result<()>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Permission {
    Granted,
    Denied,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct WatchOptions {
    pub min_interval: Duration,
    pub min_distance_m: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct WatchHandle(pub u64);

#[async_trait]
pub trait LocationService: Send + Sync {
    async fn request_permission(&self) -> Result<Permission>;

    async fn current_position(&self) -> Result<LocationSample>;

    async fn watch_position(&self, options: WatchOptions, sink: Sender<LocationSample>) -> Result<WatchHandle>;

    async fn clear_watch(&self, handle: WatchHandle) -> Result<()>;
}

#[async_trait]
pub trait BlobStore: Send + Sync {
    /// Stores `bytes` under `key` and returns a public URL for them.
    async fn upload(&self, key: &str, bytes: Vec<u8>) -> Result<String>;
}
