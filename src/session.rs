use std::sync::Arc;
use std::sync::atomic::{ AtomicBool, Ordering };

use crate::backend::{ Filter, RecordStore };

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    Driver,
    Admin,
}

#[derive(Debug, Clone, PartialEq)]
pub struct CurrentUser {
    pub id: String,
    pub email: String,
    /// Role carried in the user's metadata, when the provider has one
    pub role_hint: Option<Role>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum SessionEvent {
    Established(CurrentUser),
    Refreshed(CurrentUser),
    Cleared,
}

struct SessionInner {
    user: CurrentUser,
    role: Role,
    valid: AtomicBool,
}

/// Identity and role of the signed in user, handed to every component that
/// acts on behalf of the session. Clones share validity.
#[derive(Clone)]
pub struct SessionContext {
    inner: Arc<SessionInner>,
}

impl SessionContext {
    pub fn new(user: CurrentUser, role: Role) -> SessionContext {
        SessionContext {
            inner: Arc::new(SessionInner {
                user,
                role,
                valid: AtomicBool::new(true),
            }),
        }
    }

    /// Uses the metadata hint when present, otherwise an admin is anyone
    /// with a row in `admins_table`.
    pub async fn resolve(user: CurrentUser, store: &dyn RecordStore, admins_table: &str) -> SessionContext {
        let role = match user.role_hint {
            Some(role) => role,
            None => {
                let filter = Filter::table(admins_table).eq("id", user.id.as_str());
                match store.read_all(&filter).await {
                    Ok(rows) if !rows.is_empty() => Role::Admin,
                    Ok(_) => Role::Driver,
                    Err(err) => {
                        warn!["Admin lookup for {} failed, treating as driver: {}", user.id, err];
                        Role::Driver
                    }
                }
            }
        };

        info!("Session for {} established as {:?}", user.email, role);
        SessionContext::new(user, role)
    }

    pub fn user_id(&self) -> &str {
        &self.inner.user.id
    }

    pub fn role(&self) -> Role {
        self.inner.role
    }

    pub fn is_admin(&self) -> bool {
        self.inner.role == Role::Admin
    }

    pub fn is_valid(&self) -> bool {
        self.inner.valid.load(Ordering::Acquire)
    }

    pub fn invalidate(&self) {
        self.inner.valid.store(false, Ordering::Release);
    }
}

impl std::fmt::Debug for SessionContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionContext")
            .field("user", &self.inner.user.id)
            .field("role", &self.inner.role)
            .field("valid", &self.is_valid())
            .finish()
    }
}
