use std::collections::HashMap;
use std::convert::TryFrom;

use crate::model::{ ChangeEvent, ChangeKind, DriverState };
use crate::roster::{ RosterUpdate, StateUpdater };

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Upsert {
    Inserted,
    Replaced,
}

/// Driver id -> last known state. One entry per id, kept in the order ids
/// were first seen. Last write wins; there is no timestamp comparison.
#[derive(Debug, Clone, Default)]
pub struct ReconciliationCache {
    entries: Vec<DriverState>,
    index: HashMap<String, usize>,
}

impl ReconciliationCache {
    pub fn new() -> ReconciliationCache {
        ReconciliationCache::default()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn get(&self, id: &str) -> Option<&DriverState> {
        self.index.get(id).map(|idx| &self.entries[*idx])
    }

    pub fn all(&self) -> &[DriverState] {
        &self.entries
    }

    /// Replaces the whole entry for `state.id`, or appends it.
    pub fn upsert(&mut self, state: DriverState) -> Upsert {
        match self.index.get(&state.id) {
            Some(idx) => {
                self.entries[*idx] = state;
                Upsert::Replaced
            },
            None => {
                self.index.insert(state.id.clone(), self.entries.len());
                self.entries.push(state);
                Upsert::Inserted
            },
        }
    }

    /// Applies the initial bulk load. Ids in the snapshot replace what is
    /// cached; entries the live feed delivered for other ids are kept.
    pub fn apply_snapshot(&mut self, snapshot: Vec<DriverState>) -> usize {
        let mut applied = 0;
        for state in snapshot {
            if state.is_rosterable() {
                self.upsert(state);
                applied += 1;
            }
        }
        applied
    }

    /// Returns whether the event changed the cache.
    pub fn apply_event(&mut self, event: &ChangeEvent) -> bool {
        if event.kind == ChangeKind::Delete {
            trace!["Ignoring delete event"];
            return false;
        }

        let state = match DriverState::try_from(&event.subject) {
            Ok(state) => state,
            Err(err) => {
                debug!["Discarding malformed change event: {}", err];
                return false;
            }
        };

        if state.is_admin() {
            trace!["Ignoring admin record {}", state.id];
            return false;
        }
        if state.position().is_none() {
            trace!["Ignoring {} without position", state.id];
            return false;
        }

        self.upsert(state);
        true
    }
}

impl StateUpdater for ReconciliationCache {
    fn update_state(self: &mut Self, update: &RosterUpdate) -> bool {
        match update {
            RosterUpdate::Snapshot(snapshot) => self.apply_snapshot(snapshot.clone()) > 0,
            RosterUpdate::Change(event) => self.apply_event(event),
            RosterUpdate::FeedClosed => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Record;
    use serde_json::{ json, Value };
    use std::collections::HashSet;

    fn record(value: Value) -> Record {
        match value {
            Value::Object(map) => map,
            _ => panic!("not an object"),
        }
    }

    fn driver(id: &str, latitude: f64, longitude: f64) -> DriverState {
        let mut state = DriverState::new(id);
        state.email = Some(format!("{}@fleet.test", id));
        state.latitude = Some(latitude);
        state.longitude = Some(longitude);
        state
    }

    fn event(kind: ChangeKind, subject: Value) -> ChangeEvent {
        ChangeEvent { kind, subject: record(subject) }
    }

    fn assert_unique_ids(cache: &ReconciliationCache) {
        let ids: HashSet<_> = cache.all().iter().map(|state| state.id.clone()).collect();
        assert_eq!(ids.len(), cache.len());
    }

    #[test]
    fn upsert_replaces_in_place() {
        let mut cache = ReconciliationCache::new();
        assert_eq!(cache.upsert(driver("d1", 1.0, 1.0)), Upsert::Inserted);
        assert_eq!(cache.upsert(driver("d2", 2.0, 2.0)), Upsert::Inserted);
        assert_eq!(cache.upsert(driver("d1", 3.0, 3.0)), Upsert::Replaced);

        assert_eq!(cache.len(), 2);
        assert_eq!(cache.all()[0].id, "d1");
        assert_eq!(cache.get("d1").unwrap().latitude, Some(3.0));
    }

    #[test]
    fn no_duplicate_ids_across_snapshots_and_events() {
        let mut cache = ReconciliationCache::new();
        let ids = ["d1", "d2", "d3", "d1", "d2", "d1"];
        for (step, id) in ids.iter().enumerate() {
            let lat = step as f64;
            cache.apply_event(&event(ChangeKind::Update, json!({ "id": id, "latitude": lat, "longitude": lat })));
            if step % 2 == 0 {
                cache.apply_snapshot(vec![driver(id, lat, lat), driver("d4", lat, lat)]);
            }
            assert_unique_ids(&cache);
        }
        assert_eq!(cache.len(), 4);
    }

    #[test]
    fn admin_events_leave_cache_unchanged() {
        let mut cache = ReconciliationCache::new();
        cache.upsert(driver("d1", 1.0, 1.0));
        let before = cache.all().to_vec();

        assert!(!cache.apply_event(&event(ChangeKind::Insert,
            json!({ "id": "a1", "isAdmin": true, "latitude": 5.0, "longitude": 5.0 }))));
        // An admin flag on a known id does not touch the existing entry either
        assert!(!cache.apply_event(&event(ChangeKind::Update,
            json!({ "id": "d1", "isAdmin": true, "latitude": 9.0, "longitude": 9.0 }))));

        assert_eq!(cache.all(), &before[..]);
    }

    #[test]
    fn events_without_position_are_dropped() {
        let mut cache = ReconciliationCache::new();
        assert!(!cache.apply_event(&event(ChangeKind::Insert, json!({ "id": "d1" }))));
        assert!(!cache.apply_event(&event(ChangeKind::Insert, json!({ "id": "d1", "latitude": 1.0 }))));
        assert!(!cache.apply_event(&event(ChangeKind::Insert, json!({ "id": "d1", "longitude": 1.0, "latitude": null }))));
        assert!(cache.is_empty());

        let mut no_position = DriverState::new("d2");
        no_position.email = Some("d2@fleet.test".to_string());
        assert_eq!(cache.apply_snapshot(vec![no_position]), 0);
        assert!(cache.is_empty());
    }

    #[test]
    fn later_event_wins() {
        let mut cache = ReconciliationCache::new();
        cache.apply_event(&event(ChangeKind::Update, json!({ "id": "d1", "latitude": 1.0, "longitude": 1.0 })));
        cache.apply_event(&event(ChangeKind::Update, json!({ "id": "d1", "latitude": 2.0, "longitude": 2.5 })));

        let position = cache.get("d1").unwrap().position().unwrap();
        assert_eq!((position.latitude, position.longitude), (2.0, 2.5));
    }

    #[test]
    fn stale_events_still_overwrite() {
        let mut cache = ReconciliationCache::new();
        cache.apply_event(&event(ChangeKind::Update, json!({ "id": "d1", "latitude": 2.0, "longitude": 2.0, "timestamp": 2000 })));
        cache.apply_event(&event(ChangeKind::Update, json!({ "id": "d1", "latitude": 1.0, "longitude": 1.0, "timestamp": 1000 })));
        assert_eq!(cache.get("d1").unwrap().timestamp, Some(1000));
    }

    #[test]
    fn snapshot_keeps_admins_out() {
        let mut admin = driver("a1", 0.0, 0.0);
        admin.is_admin = Some(true);

        let mut cache = ReconciliationCache::new();
        cache.apply_snapshot(vec![driver("d1", 1.0, 1.0), admin, driver("d2", 2.0, 2.0)]);

        let ids: Vec<_> = cache.all().iter().map(|state| state.id.as_str()).collect();
        assert_eq!(ids, vec!["d1", "d2"]);
    }

    #[test]
    fn unseen_id_is_appended_with_event_fields() {
        let mut cache = ReconciliationCache::new();
        cache.upsert(driver("d1", 1.0, 1.0));

        cache.apply_event(&event(ChangeKind::Insert, json!({
            "id": "d9", "email": "d9@fleet.test", "truckType": "reefer", "latitude": 4.0, "longitude": 5.0,
        })));

        assert_eq!(cache.len(), 2);
        let added = cache.get("d9").unwrap();
        assert_eq!(added.truck_type.as_deref(), Some("reefer"));
        assert_eq!(added.position().unwrap().longitude, 5.0);
    }

    #[test]
    fn replacement_is_whole_record_not_field_merge() {
        let mut cache = ReconciliationCache::new();
        cache.apply_event(&event(ChangeKind::Update, json!({
            "id": "d1", "email": "old@fleet.test", "truckType": "flatbed", "latitude": 1.0, "longitude": 1.0,
        })));

        // New longitude in a full record: everything comes from the new payload
        cache.apply_event(&event(ChangeKind::Update, json!({ "id": "d1", "latitude": 1.0, "longitude": 7.0 })));
        let entry = cache.get("d1").unwrap();
        assert_eq!(entry.longitude, Some(7.0));
        assert_eq!(entry.latitude, Some(1.0));
        assert!(entry.email.is_none());
        assert!(entry.truck_type.is_none());

        // A payload missing latitude is not patched with the old latitude
        assert!(!cache.apply_event(&event(ChangeKind::Update, json!({ "id": "d1", "longitude": 8.0 }))));
        assert_eq!(cache.get("d1").unwrap().longitude, Some(7.0));
    }

    #[test]
    fn feed_entry_survives_snapshot_without_that_id() {
        let mut cache = ReconciliationCache::new();
        cache.apply_event(&event(ChangeKind::Insert, json!({ "id": "early", "latitude": 1.0, "longitude": 1.0 })));
        cache.apply_snapshot(vec![driver("d1", 2.0, 2.0)]);

        assert!(cache.get("early").is_some());
        assert_eq!(cache.len(), 2);

        // but a snapshot that has the id overwrites it
        cache.apply_snapshot(vec![driver("early", 9.0, 9.0)]);
        assert_eq!(cache.get("early").unwrap().latitude, Some(9.0));
    }

    #[test]
    fn fractional_timestamp_does_not_hide_the_driver() {
        let mut cache = ReconciliationCache::new();
        assert!(cache.apply_event(&event(ChangeKind::Update, json!({
            "id": "ios-driver", "latitude": -12.1, "longitude": -45.0, "timestamp": 1700000000000.123,
        }))));
        assert_eq!(cache.get("ios-driver").unwrap().timestamp, Some(1700000000000));
    }

    #[test]
    fn odd_contact_columns_do_not_hide_the_driver() {
        let mut cache = ReconciliationCache::new();
        assert!(cache.apply_event(&event(ChangeKind::Insert, json!({
            "id": "d2", "latitude": 1.0, "longitude": 2.0, "phoneNumber": 5577999990000i64, "truckType": 3,
        }))));

        let entry = cache.get("d2").unwrap();
        assert!(entry.phone_number.is_none());
        assert!(entry.truck_type.is_none());
    }

    #[test]
    fn delete_and_malformed_events_are_ignored() {
        let mut cache = ReconciliationCache::new();
        cache.upsert(driver("d1", 1.0, 1.0));

        assert!(!cache.apply_event(&event(ChangeKind::Delete, json!({ "id": "d1", "latitude": 1.0, "longitude": 1.0 }))));
        assert!(!cache.apply_event(&event(ChangeKind::Update, json!({ "latitude": 1.0, "longitude": 1.0 }))));
        assert!(!cache.apply_event(&event(ChangeKind::Update, json!({ "id": 17, "latitude": 1.0, "longitude": 1.0 }))));
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn state_updater_routes_updates() {
        let mut cache = ReconciliationCache::new();
        assert!(cache.update_state(&RosterUpdate::Snapshot(vec![driver("d1", 1.0, 1.0)])));
        assert!(cache.update_state(&RosterUpdate::Change(event(ChangeKind::Update,
            json!({ "id": "d2", "latitude": 1.0, "longitude": 1.0 })))));
        assert!(!cache.update_state(&RosterUpdate::FeedClosed));
        assert_eq!(cache.len(), 2);
    }
}
