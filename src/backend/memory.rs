//! In-process stand-ins for the hosted backend, used by the demo binary and tests.

use std::collections::HashMap;
use std::sync::{ Arc, Mutex, MutexGuard, PoisonError };

use async_std::channel::Sender;
use async_trait::async_trait;
use serde_json::Value;

use crate::backend::{ BlobStore, ChangeFeed, Filter, IdentityProvider, RecordStore, SubscriptionHandle };
use crate::error::{ Error, Result };
use crate::model::{ ChangeEvent, ChangeKind, Record };
use crate::session::{ CurrentUser, SessionEvent };

struct Subscription {
    handle: SubscriptionHandle,
    filter: Filter,
    sink: Sender<ChangeEvent>,
}

#[derive(Default)]
struct BackendInner {
    tables: HashMap<String, Vec<Record>>,
    subscriptions: Vec<Subscription>,
    blobs: HashMap<String, Vec<u8>>,
    next_handle: u64,
    next_row: u64,
    failing_reads: usize,
    failing_writes: usize,
}

impl BackendInner {
    fn notify(&mut self, table: &str, kind: ChangeKind, row: &Record) {
        self.subscriptions.retain(|subscription| {
            if subscription.filter.table != table || !subscription.filter.matches(row) {
                return true;
            }
            let event = ChangeEvent { kind, subject: row.clone() };
            match subscription.sink.try_send(event) {
                Ok(()) => true,
                Err(_) => {
                    debug!["Dropping closed subscription {:?}", subscription.handle];
                    false
                }
            }
        });
    }

    fn take_read_failure(&mut self) -> bool {
        if self.failing_reads > 0 {
            self.failing_reads -= 1;
            true
        } else {
            false
        }
    }

    fn take_write_failure(&mut self) -> bool {
        if self.failing_writes > 0 {
            self.failing_writes -= 1;
            true
        } else {
            false
        }
    }
}

/// Record store, change feed and blob store sharing one set of tables.
/// Every mutation is broadcast synchronously to matching subscriptions, so
/// feed order always equals write order.
#[derive(Clone, Default)]
pub struct MemoryBackend {
    inner: Arc<Mutex<BackendInner>>,
}

impl MemoryBackend {
    pub fn new() -> MemoryBackend {
        MemoryBackend::default()
    }

    fn lock(&self) -> MutexGuard<'_, BackendInner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Loads rows without notifying subscribers. Non-object values are ignored.
    pub fn seed(&self, table: &str, rows: Vec<Value>) {
        let mut inner = self.lock();
        let stored = inner.tables.entry(table.to_string()).or_default();
        for row in rows {
            if let Value::Object(record) = row {
                stored.push(record);
            }
        }
    }

    pub fn rows(&self, table: &str) -> Vec<Record> {
        self.lock().tables.get(table).cloned().unwrap_or_default()
    }

    pub fn row(&self, table: &str, id: &str) -> Option<Record> {
        self.lock().tables.get(table)?
            .iter()
            .find(|row| row.get("id").and_then(Value::as_str) == Some(id))
            .cloned()
    }

    pub fn delete(&self, table: &str, id: &str) -> bool {
        let mut inner = self.lock();
        let removed = match inner.tables.get_mut(table) {
            Some(rows) => rows.iter()
                .position(|row| row.get("id").and_then(Value::as_str) == Some(id))
                .map(|idx| rows.remove(idx)),
            None => None,
        };
        match removed {
            Some(row) => {
                inner.notify(table, ChangeKind::Delete, &row);
                true
            },
            None => false,
        }
    }

    pub fn subscription_count(&self) -> usize {
        self.lock().subscriptions.len()
    }

    pub fn blob(&self, key: &str) -> Option<Vec<u8>> {
        self.lock().blobs.get(key).cloned()
    }

    /// The next `count` reads fail with a store error.
    pub fn fail_next_reads(&self, count: usize) {
        self.lock().failing_reads = count;
    }

    /// The next `count` writes (update or insert) fail with a store error.
    pub fn fail_next_writes(&self, count: usize) {
        self.lock().failing_writes = count;
    }
}

#[async_trait]
impl RecordStore for MemoryBackend {
    async fn read_all(&self, filter: &Filter) -> Result<Vec<Record>> {
        let mut inner = self.lock();
        if inner.take_read_failure() {
            return Err(Error::Store(format!["read from {} failed", filter.table]));
        }
        Ok(inner.tables.get(&filter.table)
            .map(|rows| rows.iter().filter(|row| filter.matches(row)).cloned().collect())
            .unwrap_or_default())
    }

    async fn update(&self, table: &str, id: &str, fields: Record) -> Result<()> {
        let mut inner = self.lock();
        if inner.take_write_failure() {
            return Err(Error::Store(format!["update of {}/{} failed", table, id]));
        }

        let updated = inner.tables.get_mut(table).and_then(|rows| {
            let row = rows.iter_mut().find(|row| row.get("id").and_then(Value::as_str) == Some(id))?;
            row.extend(fields);
            Some(row.clone())
        });

        match updated {
            Some(row) => inner.notify(table, ChangeKind::Update, &row),
            None => debug!["Update of {}/{} matched no rows", table, id],
        }
        Ok(())
    }

    async fn insert(&self, table: &str, mut fields: Record) -> Result<Record> {
        let mut inner = self.lock();
        if inner.take_write_failure() {
            return Err(Error::Store(format!["insert into {} failed", table]));
        }

        inner.next_row += 1;
        if !fields.contains_key("id") {
            let id = format!("{}-{}", table, inner.next_row);
            fields.insert("id".to_string(), Value::String(id));
        }

        inner.tables.entry(table.to_string()).or_default().push(fields.clone());
        inner.notify(table, ChangeKind::Insert, &fields);
        Ok(fields)
    }
}

#[async_trait]
impl ChangeFeed for MemoryBackend {
    async fn subscribe(&self, filter: Filter, sink: Sender<ChangeEvent>) -> Result<SubscriptionHandle> {
        let mut inner = self.lock();
        inner.next_handle += 1;
        let handle = SubscriptionHandle(inner.next_handle);
        debug!["Subscribed {:?} to {}", handle, filter.table];
        inner.subscriptions.push(Subscription { handle, filter, sink });
        Ok(handle)
    }

    async fn unsubscribe(&self, handle: SubscriptionHandle) -> Result<()> {
        let mut inner = self.lock();
        let before = inner.subscriptions.len();
        inner.subscriptions.retain(|subscription| subscription.handle != handle);
        if inner.subscriptions.len() == before {
            return Err(Error::Feed(format!["unknown subscription {:?}", handle]));
        }
        Ok(())
    }
}

#[async_trait]
impl BlobStore for MemoryBackend {
    async fn upload(&self, key: &str, bytes: Vec<u8>) -> Result<String> {
        if key.is_empty() {
            return Err(Error::Blob("empty key".to_string()));
        }
        self.lock().blobs.insert(key.to_string(), bytes);
        Ok(format!["memory://blobs/{}", key])
    }
}

#[derive(Default)]
struct IdentityInner {
    user: Option<CurrentUser>,
    listeners: Vec<Sender<SessionEvent>>,
}

/// Identity provider for a single simulated device.
#[derive(Clone, Default)]
pub struct MemoryIdentity {
    inner: Arc<Mutex<IdentityInner>>,
}

impl MemoryIdentity {
    pub fn new() -> MemoryIdentity {
        MemoryIdentity::default()
    }

    pub fn signed_in(user: CurrentUser) -> MemoryIdentity {
        let identity = MemoryIdentity::new();
        identity.lock().user = Some(user);
        identity
    }

    fn lock(&self) -> MutexGuard<'_, IdentityInner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn broadcast(inner: &mut IdentityInner, event: SessionEvent) {
        inner.listeners.retain(|listener| listener.try_send(event.clone()).is_ok());
    }

    pub fn sign_in(&self, user: CurrentUser) {
        let mut inner = self.lock();
        inner.user = Some(user.clone());
        MemoryIdentity::broadcast(&mut inner, SessionEvent::Established(user));
    }

    pub fn refresh(&self) {
        let mut inner = self.lock();
        if let Some(user) = inner.user.clone() {
            MemoryIdentity::broadcast(&mut inner, SessionEvent::Refreshed(user));
        }
    }

    /// Drops every listener, which ends their session streams.
    pub fn shutdown(&self) {
        self.lock().listeners.clear();
    }
}

#[async_trait]
impl IdentityProvider for MemoryIdentity {
    async fn current_user(&self) -> Result<Option<CurrentUser>> {
        Ok(self.lock().user.clone())
    }

    async fn on_session_change(&self, sink: Sender<SessionEvent>) -> Result<()> {
        self.lock().listeners.push(sink);
        Ok(())
    }

    async fn sign_out(&self) -> Result<()> {
        let mut inner = self.lock();
        inner.user = None;
        MemoryIdentity::broadcast(&mut inner, SessionEvent::Cleared);
        Ok(())
    }
}
