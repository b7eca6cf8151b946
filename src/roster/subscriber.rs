use std::convert::TryFrom;
use std::sync::Arc;
use std::sync::atomic::{ AtomicBool, Ordering };

use async_std::channel;
use async_std::channel::{ Receiver, Sender };
use async_std::stream;
use async_std::stream::StreamExt;
use async_std::task;
use async_std::task::JoinHandle;

use crate::backend::{ ChangeFeed, Filter, RecordStore, SubscriptionHandle };
use crate::error::{ Error, Result };
use crate::model::{ ChangeEvent, DriverState };
use crate::roster::view::RosterView;
use crate::roster::{ FeedStatus, RosterUpdate };
use crate::session::{ Role, SessionContext };

/// Keeps the admin's roster in step with the drivers table.
pub struct PresenceSubscriber {
    session: SessionContext,
    store: Arc<dyn RecordStore>,
    feed: Arc<dyn ChangeFeed>,
    table: String,
}

impl PresenceSubscriber {
    pub fn new(
        session: SessionContext,
        store: Arc<dyn RecordStore>,
        feed: Arc<dyn ChangeFeed>,
        table: &str,
    ) -> PresenceSubscriber {
        PresenceSubscriber {
            session,
            store,
            feed,
            table: table.to_string(),
        }
    }

    /// Subscribes to the feed, then loads the snapshot. Both feed the same
    /// reducer, which is the only writer of the roster.
    pub async fn activate(self) -> Result<RosterHandle> {
        if !self.session.is_admin() {
            return Err(Error::WrongRole { expected: Role::Admin, actual: self.session.role() });
        }

        let view = RosterView::new();
        let released = Arc::new(AtomicBool::new(false));

        let (change_sender, change_receiver) = channel::unbounded();
        let filter = Filter::table(&self.table).neq("isAdmin", true);
        let subscription = match self.feed.subscribe(filter, change_sender).await {
            Ok(handle) => {
                info!["Subscribed to {} changes", self.table];
                view.set_feed_status(FeedStatus::Live);
                Some(handle)
            },
            Err(err) => {
                error!["Failed to subscribe to {} changes: {}", self.table, err];
                None
            },
        };

        let (snapshot_sender, snapshot_receiver) = channel::unbounded();
        let loader = task::spawn(load_snapshot(self.store.clone(), self.table.clone(), snapshot_sender));
        let reducer = task::spawn(reduce(snapshot_receiver, change_receiver, view.clone(), released.clone()));

        Ok(RosterHandle {
            subscription,
            feed: self.feed,
            loader,
            reducer,
            view,
            released,
        })
    }
}

async fn load_snapshot(store: Arc<dyn RecordStore>, table: String, sink: Sender<Vec<DriverState>>) {
    let filter = Filter::table(&table)
        .neq("isAdmin", true)
        .not_null("latitude")
        .not_null("longitude");

    let rows = match store.read_all(&filter).await {
        Ok(rows) => rows,
        Err(err) => {
            error!["Failed to load drivers from {}: {}", table, err];
            return;
        }
    };

    let snapshot: Vec<DriverState> = rows.iter()
        .filter_map(|row| match DriverState::try_from(row) {
            Ok(state) => Some(state),
            Err(err) => {
                debug!["Skipping malformed row in {}: {}", table, err];
                None
            }
        })
        .filter(DriverState::is_rosterable)
        .collect();

    info!["Loaded {} drivers with a position", snapshot.len()];
    if sink.send(snapshot).await.is_err() {
        debug!["Roster went away before the snapshot arrived"];
    }
}

async fn reduce(
    snapshots: Receiver<Vec<DriverState>>,
    changes: Receiver<ChangeEvent>,
    view: RosterView,
    released: Arc<AtomicBool>,
) {
    let snapshots = snapshots.map(RosterUpdate::Snapshot);
    let changes = changes.map(RosterUpdate::Change)
        .chain(stream::once(RosterUpdate::FeedClosed));
    let mut updates = Box::pin(snapshots.merge(changes));

    while let Some(update) = updates.next().await {
        if let RosterUpdate::FeedClosed = update {
            if released.load(Ordering::Acquire) {
                debug!["Change feed closed after release"];
            } else {
                // TODO: resubscribe and reload the snapshot instead of freezing the roster
                warn!["Change feed ended unexpectedly, roster is no longer live"];
                view.set_feed_status(FeedStatus::Dropped);
            }
            continue;
        }

        if view.apply(&update) {
            trace!["Roster at revision {}", view.revision()];
        }
    }
}

/// A live roster. Call `release` when the admin leaves the map.
pub struct RosterHandle {
    subscription: Option<SubscriptionHandle>,
    feed: Arc<dyn ChangeFeed>,
    loader: JoinHandle<()>,
    reducer: JoinHandle<()>,
    view: RosterView,
    released: Arc<AtomicBool>,
}

impl RosterHandle {
    pub fn view(&self) -> &RosterView {
        &self.view
    }

    pub async fn release(self) {
        self.released.store(true, Ordering::Release);
        if let Some(subscription) = self.subscription {
            if let Err(err) = self.feed.unsubscribe(subscription).await {
                warn!["Failed to unsubscribe {:?}: {}", subscription, err];
            }
        }
        self.loader.cancel().await;
        self.reducer.cancel().await;
        self.view.set_feed_status(FeedStatus::Released);
        info!["Roster released"];
    }
}
