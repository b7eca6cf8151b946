use std::sync::{ Arc, PoisonError, RwLock, RwLockReadGuard };

use crate::model::DriverState;
use crate::roster::cache::ReconciliationCache;
use crate::roster::{ FeedStatus, RosterUpdate, StateUpdater };

/// A driver pin on the admin map.
#[derive(Debug, Clone, PartialEq)]
pub struct MapMarker {
    pub id: String,
    pub latitude: f64,
    pub longitude: f64,
    pub title: String,
    pub description: String,
    pub avatar: Option<String>,
    pub phone: Option<String>,
}

impl MapMarker {
    /// `None` when the state has no usable position.
    pub fn from_state(state: &DriverState) -> Option<MapMarker> {
        let position = state.position()?;
        Some(MapMarker {
            id: state.id.clone(),
            latitude: position.latitude,
            longitude: position.longitude,
            title: state.email.clone().unwrap_or_default(),
            description: state.truck_type.clone().unwrap_or_default(),
            avatar: state.photo_url.clone().filter(|url| !url.is_empty()),
            phone: state.phone_number.clone().filter(|phone| !phone.is_empty()),
        })
    }
}

#[derive(Debug)]
struct RosterShared {
    cache: ReconciliationCache,
    revision: u64,
    feed: FeedStatus,
}

/// Read side of the roster. Every read sees whole entries only: updates are
/// applied under the write lock one message at a time.
#[derive(Debug, Clone)]
pub struct RosterView {
    shared: Arc<RwLock<RosterShared>>,
}

impl RosterView {
    pub(crate) fn new() -> RosterView {
        RosterView {
            shared: Arc::new(RwLock::new(RosterShared {
                cache: ReconciliationCache::new(),
                revision: 0,
                feed: FeedStatus::Pending,
            })),
        }
    }

    fn read(&self) -> RwLockReadGuard<'_, RosterShared> {
        self.shared.read().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn drivers(&self) -> Vec<DriverState> {
        self.read().cache.all().to_vec()
    }

    pub fn driver(&self, id: &str) -> Option<DriverState> {
        self.read().cache.get(id).cloned()
    }

    pub fn len(&self) -> usize {
        self.read().cache.len()
    }

    pub fn is_empty(&self) -> bool {
        self.read().cache.is_empty()
    }

    pub fn markers(&self) -> Vec<MapMarker> {
        self.read().cache.all().iter().filter_map(MapMarker::from_state).collect()
    }

    /// Bumped on every update that changed the roster.
    pub fn revision(&self) -> u64 {
        self.read().revision
    }

    pub fn feed_status(&self) -> FeedStatus {
        self.read().feed
    }

    pub(crate) fn apply(&self, update: &RosterUpdate) -> bool {
        let mut shared = self.shared.write().unwrap_or_else(PoisonError::into_inner);
        let changed = shared.cache.update_state(update);
        if changed {
            shared.revision += 1;
        }
        changed
    }

    pub(crate) fn set_feed_status(&self, feed: FeedStatus) {
        self.shared.write().unwrap_or_else(PoisonError::into_inner).feed = feed;
    }
}
