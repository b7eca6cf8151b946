use std::sync::{ Arc, PoisonError, RwLock };

use async_std::channel;

use crate::backend::{ BlobStore, ChangeFeed, IdentityProvider, LocationService, RecordStore };
use crate::chat::ChatService;
use crate::config::Config;
use crate::error::Result;
use crate::roster::subscriber::{ PresenceSubscriber, RosterHandle };
use crate::roster::view::RosterView;
use crate::session::{ CurrentUser, Role, SessionContext, SessionEvent };
use crate::tracking::publisher::{ LocationPublisher, TrackerHandle };
use crate::tracking::TrackerView;

/// Everything a device talks to.
#[derive(Clone)]
pub struct Services {
    pub identity: Arc<dyn IdentityProvider>,
    pub store: Arc<dyn RecordStore>,
    pub feed: Arc<dyn ChangeFeed>,
    pub location: Arc<dyn LocationService>,
    pub blobs: Arc<dyn BlobStore>,
}

#[derive(Default)]
struct Surface {
    session: Option<SessionContext>,
    tracker: Option<TrackerView>,
    roster: Option<RosterView>,
    chat: Option<ChatService>,
}

/// What the screens of the running session can read.
#[derive(Clone, Default)]
pub struct AppMonitor {
    surface: Arc<RwLock<Surface>>,
}

impl AppMonitor {
    fn update(&self, f: impl FnOnce(&mut Surface)) {
        f(&mut self.surface.write().unwrap_or_else(PoisonError::into_inner))
    }

    fn read<T>(&self, f: impl FnOnce(&Surface) -> T) -> T {
        f(&self.surface.read().unwrap_or_else(PoisonError::into_inner))
    }

    pub fn session(&self) -> Option<SessionContext> {
        self.read(|surface| surface.session.clone())
    }

    pub fn tracker(&self) -> Option<TrackerView> {
        self.read(|surface| surface.tracker.clone())
    }

    pub fn roster(&self) -> Option<RosterView> {
        self.read(|surface| surface.roster.clone())
    }

    pub fn chat(&self) -> Option<ChatService> {
        self.read(|surface| surface.chat.clone())
    }
}

enum Active {
    /// `None` when tracking could not start; the tracker view says why
    Driver(Option<TrackerHandle>),
    Admin(RosterHandle),
}

/// Follows the identity provider and runs the role's component for
/// whoever is signed in.
pub struct App {
    services: Services,
    config: Config,
    session: Option<SessionContext>,
    active: Option<Active>,
    monitor: AppMonitor,
}

impl App {
    pub fn new(services: Services, config: Config) -> (App, AppMonitor) {
        let monitor = AppMonitor::default();
        (
            App {
                services,
                config,
                session: None,
                active: None,
                monitor: monitor.clone(),
            },
            monitor,
        )
    }

    /// Runs until the identity provider stops delivering session changes.
    pub async fn run(mut self) -> Result<()> {
        let (sender, receiver) = channel::unbounded();
        self.services.identity.on_session_change(sender).await?;

        if let Some(user) = self.services.identity.current_user().await? {
            self.handle(SessionEvent::Established(user)).await;
        }
        while let Ok(event) = receiver.recv().await {
            self.handle(event).await;
        }

        self.teardown().await;
        info!["Session listener closed"];
        Ok(())
    }

    pub async fn handle(&mut self, event: SessionEvent) {
        match event {
            SessionEvent::Established(user) | SessionEvent::Refreshed(user) => {
                let same_user = self.session.as_ref()
                    .map(|session| session.user_id() == user.id)
                    .unwrap_or(false);
                if same_user {
                    debug!["Session for {} refreshed", user.id];
                    return;
                }
                self.teardown().await;
                self.activate(user).await;
            },
            SessionEvent::Cleared => {
                info!["Signed out"];
                self.teardown().await;
            },
        }
    }

    async fn activate(&mut self, user: CurrentUser) {
        let tables = &self.config.tables;
        let session = SessionContext::resolve(user, self.services.store.as_ref(), &tables.admins).await;
        let chat = ChatService::new(
            session.clone(),
            self.services.store.clone(),
            self.services.blobs.clone(),
            &tables.messages,
            &tables.photo_bucket,
        );
        self.monitor.update(|surface| {
            surface.session = Some(session.clone());
            surface.chat = Some(chat);
        });

        let active = match session.role() {
            Role::Driver => {
                let (publisher, view) = LocationPublisher::new(
                    session.clone(),
                    self.services.store.clone(),
                    self.services.location.clone(),
                    self.config.tracking,
                    &tables.drivers,
                );
                self.monitor.update(|surface| surface.tracker = Some(view));
                match publisher.start().await {
                    Ok(handle) => Active::Driver(Some(handle)),
                    Err(err) => {
                        warn!["Location tracking not started: {}", err];
                        Active::Driver(None)
                    },
                }
            },
            Role::Admin => {
                let subscriber = PresenceSubscriber::new(
                    session.clone(),
                    self.services.store.clone(),
                    self.services.feed.clone(),
                    &tables.drivers,
                );
                match subscriber.activate().await {
                    Ok(handle) => {
                        let view = handle.view().clone();
                        self.monitor.update(|surface| surface.roster = Some(view));
                        Active::Admin(handle)
                    },
                    Err(err) => {
                        error!["Roster not started: {}", err];
                        self.session = Some(session);
                        return;
                    },
                }
            },
        };

        self.session = Some(session);
        self.active = Some(active);
    }

    async fn teardown(&mut self) {
        if let Some(session) = self.session.take() {
            session.invalidate();
        }
        match self.active.take() {
            Some(Active::Driver(Some(tracker))) => tracker.release().await,
            Some(Active::Admin(roster)) => roster.release().await,
            Some(Active::Driver(None)) | None => {},
        }
        self.monitor.update(|surface| *surface = Surface::default());
    }
}
