//! Privileged mutations. Each one re-checks its predicate against the session at
//! request time; the backend's row-level security stays the final authority.

use std::sync::Arc;
use thiserror::Error;
use tracing::{info, instrument, warn};

use super::{
    capability::{admin_only, may_modify},
    resolver::SessionHandle,
    session::{Identity, RoleStatus, Session},
};
use crate::backend::{
    BackendError, NewNotice, NoticeId, NoticeStore, NoticeUpdate, ProfileStore, SettingUpdate,
    SettingsStore,
};

#[derive(Debug, Error)]
pub enum ActionError {
    #[error("sign in required")]
    Unauthenticated,
    #[error("session is still resolving")]
    SessionPending,
    #[error("forbidden: {0}")]
    Forbidden(&'static str),
    #[error("{0} not found")]
    NotFound(&'static str),
    #[error(transparent)]
    Backend(#[from] BackendError),
}

/// Identity of a resolved session, or why there is none.
fn acting_identity(session: &Session) -> Result<&Identity, ActionError> {
    if !session.is_resolved() {
        return Err(ActionError::SessionPending);
    }
    session.identity().ok_or(ActionError::Unauthenticated)
}

/// Acting identity of an admin session.
///
/// # Errors
/// `SessionPending` while the session or the role is still loading, `Forbidden`
/// for resolved non-admins.
pub fn require_admin(session: &Session) -> Result<&Identity, ActionError> {
    let identity = acting_identity(session)?;

    if admin_only(session) {
        return Ok(identity);
    }

    if session.role_status() == Some(RoleStatus::Loading) {
        return Err(ActionError::SessionPending);
    }

    warn!(%identity, "admin action rejected, admin role required");
    Err(ActionError::Forbidden("admin role required"))
}

#[derive(Clone, Copy, Debug)]
enum NoticeAction {
    Update,
    Delete,
    Archive,
    Restore,
}

impl NoticeAction {
    const fn as_str(self) -> &'static str {
        match self {
            Self::Update => "update",
            Self::Delete => "delete",
            Self::Archive => "archive",
            Self::Restore => "restore",
        }
    }
}

pub struct NoticeActions<N> {
    store: Arc<N>,
    session: SessionHandle,
}

impl<N: NoticeStore> NoticeActions<N> {
    pub fn new(store: Arc<N>, session: SessionHandle) -> Self {
        Self { store, session }
    }

    /// Publishes `notice` with the acting admin as its creator.
    ///
    /// # Errors
    /// Admin-only, see [`require_admin`].
    #[instrument(skip(self, notice))]
    pub async fn create(&self, notice: &NewNotice) -> Result<NoticeId, ActionError> {
        let creator = require_admin(&self.session.current())?.clone();
        let id = self.store.create_notice(&creator, notice).await?;
        info!(identity = %creator, notice = %id, "notice created");
        Ok(id)
    }

    /// # Errors
    /// See [`ActionError`].
    pub async fn update(&self, id: NoticeId, update: &NoticeUpdate) -> Result<(), ActionError> {
        self.authorize(id, NoticeAction::Update).await?;
        self.store.update_notice(id, update).await?;
        Ok(())
    }

    /// # Errors
    /// See [`ActionError`].
    pub async fn delete(&self, id: NoticeId) -> Result<(), ActionError> {
        self.authorize(id, NoticeAction::Delete).await?;
        self.store.delete_notice(id).await?;
        Ok(())
    }

    /// # Errors
    /// See [`ActionError`].
    pub async fn archive(&self, id: NoticeId) -> Result<(), ActionError> {
        self.authorize(id, NoticeAction::Archive).await?;
        self.store.set_archived(id, true).await?;
        Ok(())
    }

    /// # Errors
    /// See [`ActionError`].
    pub async fn restore(&self, id: NoticeId) -> Result<(), ActionError> {
        self.authorize(id, NoticeAction::Restore).await?;
        self.store.set_archived(id, false).await?;
        Ok(())
    }

    #[instrument(skip(self, action), fields(action = action.as_str()))]
    async fn authorize(&self, id: NoticeId, action: NoticeAction) -> Result<(), ActionError> {
        acting_identity(&self.session.current())?;

        let notice = self
            .store
            .notice(id)
            .await?
            .ok_or(ActionError::NotFound("notice"))?;

        // The session may have changed while the notice was being fetched.
        let session = self.session.current();
        let identity = acting_identity(&session)?;

        if may_modify(&session, notice.creator.as_ref()) {
            info!(%identity, notice = %id, "notice action authorized");
            Ok(())
        } else {
            warn!(%identity, notice = %id, "notice action rejected, not owner or admin");
            Err(ActionError::Forbidden("only the creator or an admin may modify this notice"))
        }
    }
}

pub struct UserActions<P> {
    profiles: Arc<P>,
    session: SessionHandle,
}

impl<P: ProfileStore> UserActions<P> {
    pub fn new(profiles: Arc<P>, session: SessionHandle) -> Self {
        Self { profiles, session }
    }

    /// Activates or deactivates the account of `target`.
    ///
    /// # Errors
    /// Admin-only; admin accounts cannot be deactivated.
    #[instrument(skip(self, target), fields(target = %target))]
    pub async fn set_active(&self, target: &Identity, active: bool) -> Result<(), ActionError> {
        let session = self.session.current();
        let identity = require_admin(&session)?;

        let role = self
            .profiles
            .get_role(target)
            .await?
            .ok_or(ActionError::NotFound("user"))?;

        if role.is_admin() && !active {
            return Err(ActionError::Forbidden("admin accounts cannot be deactivated"));
        }

        self.profiles.set_active(target, active).await?;
        info!(%identity, active, "user activation updated");
        Ok(())
    }
}

pub struct SettingsActions<S> {
    settings: Arc<S>,
    session: SessionHandle,
}

impl<S: SettingsStore> SettingsActions<S> {
    pub fn new(settings: Arc<S>, session: SessionHandle) -> Self {
        Self { settings, session }
    }

    /// # Errors
    /// Admin-only, see [`require_admin`].
    #[instrument(skip(self, update), fields(key = update.key.as_str()))]
    pub async fn update(&self, update: &SettingUpdate) -> Result<(), ActionError> {
        let session = self.session.current();
        let identity = require_admin(&session)?;

        self.settings.upsert_setting(update).await?;
        info!(%identity, "setting updated");
        Ok(())
    }
}
