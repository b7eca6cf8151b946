//! Admin side: the live driver roster behind the map.

pub mod cache;
pub mod subscriber;
pub mod view;

use crate::model::{ ChangeEvent, DriverState };

/// One message for the roster reducer.
#[derive(Debug, Clone)]
pub enum RosterUpdate {
    Snapshot(Vec<DriverState>),
    Change(ChangeEvent),
    /// The change feed stopped delivering
    FeedClosed,
}

pub trait StateUpdater {
    /// Returns whether anything visible changed.
    fn update_state(self: &mut Self, update: &RosterUpdate) -> bool;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FeedStatus {
    Pending,
    Live,
    /// Ended without being released; the roster is frozen from here on
    Dropped,
    Released,
}
