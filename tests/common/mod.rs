//! In-memory backend shared by the integration tests.
#![allow(dead_code)]

use noticeboard::{
    access::{
        resolver::SessionHandle,
        role::Role,
        session::{AuthUser, Identity, Session},
    },
    backend::{
        AuthEvent, AuthService, BackendError, NewNotice, NewProfile, NoticeId, NoticeRecord,
        NoticeStore, NoticeUpdate, ProfileStore, SettingUpdate, SettingsStore,
    },
};
use secrecy::{ExposeSecret, SecretString};
use std::{
    collections::{HashMap, HashSet},
    sync::{
        atomic::{AtomicUsize, Ordering},
        Arc, Mutex,
    },
    time::Duration,
};
use tokio::{
    sync::{broadcast, Notify},
    time::timeout,
};
use uuid::Uuid;

pub const WAIT: Duration = Duration::from_secs(2);

#[derive(Clone, Copy, Debug)]
pub enum InitialSession {
    Anonymous,
    Failing,
}

pub struct FakeBackend {
    events: broadcast::Sender<AuthEvent>,
    initial: Mutex<Result<Option<AuthUser>, ()>>,
    session_hold: Mutex<Option<Arc<Notify>>>,
    session_checks: AtomicUsize,
    credentials: Mutex<HashMap<String, (String, AuthUser)>>,
    roles: Mutex<HashMap<Identity, Role>>,
    failing_roles: Mutex<HashSet<Identity>>,
    holds: Mutex<HashMap<Identity, Arc<Notify>>>,
    lookups: AtomicUsize,
    created: Mutex<Vec<NewProfile>>,
    provision_attempts: AtomicUsize,
    failing_provision: Mutex<bool>,
    active: Mutex<HashMap<Identity, bool>>,
    notices: Mutex<HashMap<NoticeId, NoticeRecord>>,
    notice_writes: Mutex<Vec<(NoticeId, &'static str)>>,
    failing_notices: Mutex<bool>,
    published: Mutex<Vec<(Identity, NewNotice)>>,
    settings: Mutex<Vec<SettingUpdate>>,
}

impl FakeBackend {
    pub fn new(initial: InitialSession) -> Self {
        let (events, _) = broadcast::channel(64);
        let initial = match initial {
            InitialSession::Anonymous => Ok(None),
            InitialSession::Failing => Err(()),
        };

        Self {
            events,
            initial: Mutex::new(initial),
            session_hold: Mutex::new(None),
            session_checks: AtomicUsize::new(0),
            credentials: Mutex::new(HashMap::new()),
            roles: Mutex::new(HashMap::new()),
            failing_roles: Mutex::new(HashSet::new()),
            holds: Mutex::new(HashMap::new()),
            lookups: AtomicUsize::new(0),
            created: Mutex::new(Vec::new()),
            provision_attempts: AtomicUsize::new(0),
            failing_provision: Mutex::new(false),
            active: Mutex::new(HashMap::new()),
            notices: Mutex::new(HashMap::new()),
            notice_writes: Mutex::new(Vec::new()),
            failing_notices: Mutex::new(false),
            published: Mutex::new(Vec::new()),
            settings: Mutex::new(Vec::new()),
        }
    }

    /// Backend whose initial session check reports `user`.
    pub fn signed_in(user: &AuthUser) -> Self {
        let backend = Self::new(InitialSession::Anonymous);
        backend.set_session(Some(user));
        backend
    }

    /// Changes what later session checks report.
    pub fn set_session(&self, user: Option<&AuthUser>) {
        if let Ok(mut initial) = self.initial.lock() {
            *initial = Ok(user.cloned());
        }
    }

    pub fn with_role(self, id: &str, role: Role) -> Self {
        if let Ok(mut roles) = self.roles.lock() {
            roles.insert(Identity::new(id), role);
        }
        self
    }

    pub fn with_account(self, email: &str, password: &str, id: &str) -> Self {
        let user = AuthUser::new(Identity::new(id)).with_email(email);
        if let Ok(mut credentials) = self.credentials.lock() {
            credentials.insert(email.to_string(), (password.to_string(), user));
        }
        self
    }

    pub fn with_notice(self, creator: Option<&str>) -> (Self, NoticeId) {
        let id = NoticeId(Uuid::new_v4());
        let record = NoticeRecord {
            id,
            creator: creator.map(Identity::new),
            archived: false,
        };
        if let Ok(mut notices) = self.notices.lock() {
            notices.insert(id, record);
        }
        (self, id)
    }

    /// Delays the initial session check until the returned handle is notified.
    pub fn hold_session(&self) -> Arc<Notify> {
        let hold = Arc::new(Notify::new());
        if let Ok(mut slot) = self.session_hold.lock() {
            *slot = Some(Arc::clone(&hold));
        }
        hold
    }

    /// Delays role lookups for `id` until the returned handle is notified.
    pub fn hold_role(&self, id: &str) -> Arc<Notify> {
        let hold = Arc::new(Notify::new());
        if let Ok(mut holds) = self.holds.lock() {
            holds.insert(Identity::new(id), Arc::clone(&hold));
        }
        hold
    }

    pub fn fail_role(&self, id: &str) {
        if let Ok(mut failing) = self.failing_roles.lock() {
            failing.insert(Identity::new(id));
        }
    }

    /// Makes every profile write fail.
    pub fn fail_provisioning(&self) {
        if let Ok(mut failing) = self.failing_provision.lock() {
            *failing = true;
        }
    }

    pub fn fail_notices(&self) {
        if let Ok(mut failing) = self.failing_notices.lock() {
            *failing = true;
        }
    }

    pub fn emit(&self, event: AuthEvent) {
        let _ = self.events.send(event);
    }

    pub fn lookups(&self) -> usize {
        self.lookups.load(Ordering::SeqCst)
    }

    pub fn session_checks(&self) -> usize {
        self.session_checks.load(Ordering::SeqCst)
    }

    pub fn provision_attempts(&self) -> usize {
        self.provision_attempts.load(Ordering::SeqCst)
    }

    pub fn published(&self) -> Vec<(Identity, NewNotice)> {
        self.published
            .lock()
            .map(|published| published.clone())
            .unwrap_or_default()
    }

    pub fn settings(&self) -> Vec<SettingUpdate> {
        self.settings
            .lock()
            .map(|settings| settings.clone())
            .unwrap_or_default()
    }

    pub fn created(&self) -> Vec<NewProfile> {
        self.created.lock().map(|c| c.clone()).unwrap_or_default()
    }

    pub fn active(&self, id: &str) -> Option<bool> {
        self.active
            .lock()
            .ok()
            .and_then(|active| active.get(&Identity::new(id)).copied())
    }

    pub fn notice(&self, id: NoticeId) -> Option<NoticeRecord> {
        self.notices
            .lock()
            .ok()
            .and_then(|notices| notices.get(&id).cloned())
    }

    pub fn notice_writes(&self) -> Vec<(NoticeId, &'static str)> {
        self.notice_writes
            .lock()
            .map(|writes| writes.clone())
            .unwrap_or_default()
    }

    fn notices_failing(&self) -> bool {
        self.failing_notices.lock().map(|f| *f).unwrap_or(false)
    }

    fn record_write(&self, id: NoticeId, write: &'static str) -> Result<(), BackendError> {
        if self.notices_failing() {
            return Err(unavailable());
        }
        if let Ok(mut writes) = self.notice_writes.lock() {
            writes.push((id, write));
        }
        Ok(())
    }
}

fn unavailable() -> BackendError {
    BackendError::Status {
        url: "fake://backend".to_string(),
        status: 503,
        message: "unavailable".to_string(),
    }
}

impl AuthService for FakeBackend {
    async fn sign_in_with_password(
        &self,
        email: &str,
        password: &SecretString,
    ) -> Result<AuthUser, BackendError> {
        let account = self
            .credentials
            .lock()
            .ok()
            .and_then(|credentials| credentials.get(email).cloned());

        match account {
            Some((expected, user)) if expected == password.expose_secret() => {
                self.emit(AuthEvent::SignedIn(user.clone()));
                Ok(user)
            }
            _ => Err(BackendError::Status {
                url: "fake://auth/v1/token".to_string(),
                status: 400,
                message: "Invalid login credentials".to_string(),
            }),
        }
    }

    async fn current_session(&self) -> Result<Option<AuthUser>, BackendError> {
        self.session_checks.fetch_add(1, Ordering::SeqCst);
        let hold = self.session_hold.lock().ok().and_then(|mut slot| slot.take());
        if let Some(hold) = hold {
            hold.notified().await;
        }

        let initial = self
            .initial
            .lock()
            .map(|initial| initial.clone())
            .unwrap_or(Err(()));

        initial.map_err(|()| unavailable())
    }

    fn subscribe(&self) -> broadcast::Receiver<AuthEvent> {
        self.events.subscribe()
    }

    async fn sign_out(&self) -> Result<(), BackendError> {
        if let Ok(mut initial) = self.initial.lock() {
            *initial = Ok(None);
        }
        self.emit(AuthEvent::SignedOut);
        Ok(())
    }
}

impl ProfileStore for FakeBackend {
    async fn get_role(&self, identity: &Identity) -> Result<Option<Role>, BackendError> {
        self.lookups.fetch_add(1, Ordering::SeqCst);

        let hold = self
            .holds
            .lock()
            .ok()
            .and_then(|holds| holds.get(identity).cloned());
        if let Some(hold) = hold {
            hold.notified().await;
        }

        let failing = self
            .failing_roles
            .lock()
            .map(|failing| failing.contains(identity))
            .unwrap_or(false);
        if failing {
            return Err(unavailable());
        }

        Ok(self
            .roles
            .lock()
            .ok()
            .and_then(|roles| roles.get(identity).copied()))
    }

    async fn create_profile(&self, profile: &NewProfile) -> Result<(), BackendError> {
        self.provision_attempts.fetch_add(1, Ordering::SeqCst);
        if self.failing_provision.lock().map(|f| *f).unwrap_or(false) {
            return Err(unavailable());
        }
        if let Ok(mut created) = self.created.lock() {
            created.push(profile.clone());
        }
        if let Ok(mut roles) = self.roles.lock() {
            roles.insert(profile.user_id.clone(), profile.role);
        }
        Ok(())
    }

    async fn set_active(&self, identity: &Identity, active: bool) -> Result<(), BackendError> {
        if let Ok(mut states) = self.active.lock() {
            states.insert(identity.clone(), active);
        }
        Ok(())
    }
}

impl NoticeStore for FakeBackend {
    async fn notice(&self, id: NoticeId) -> Result<Option<NoticeRecord>, BackendError> {
        if self.notices_failing() {
            return Err(unavailable());
        }
        Ok(FakeBackend::notice(self, id))
    }

    async fn update_notice(&self, id: NoticeId, _update: &NoticeUpdate) -> Result<(), BackendError> {
        self.record_write(id, "update")
    }

    async fn delete_notice(&self, id: NoticeId) -> Result<(), BackendError> {
        self.record_write(id, "delete")?;
        if let Ok(mut notices) = self.notices.lock() {
            notices.remove(&id);
        }
        Ok(())
    }

    async fn set_archived(&self, id: NoticeId, archived: bool) -> Result<(), BackendError> {
        self.record_write(id, if archived { "archive" } else { "restore" })?;
        if let Ok(mut notices) = self.notices.lock() {
            if let Some(notice) = notices.get_mut(&id) {
                notice.archived = archived;
            }
        }
        Ok(())
    }

    async fn create_notice(
        &self,
        creator: &Identity,
        notice: &NewNotice,
    ) -> Result<NoticeId, BackendError> {
        if self.notices_failing() {
            return Err(unavailable());
        }

        let id = NoticeId(Uuid::new_v4());
        let record = NoticeRecord {
            id,
            creator: Some(creator.clone()),
            archived: false,
        };
        if let Ok(mut notices) = self.notices.lock() {
            notices.insert(id, record);
        }
        if let Ok(mut published) = self.published.lock() {
            published.push((creator.clone(), notice.clone()));
        }
        Ok(id)
    }
}

impl SettingsStore for FakeBackend {
    async fn upsert_setting(&self, update: &SettingUpdate) -> Result<(), BackendError> {
        if let Ok(mut settings) = self.settings.lock() {
            settings.retain(|existing| existing.key != update.key);
            settings.push(update.clone());
        }
        Ok(())
    }
}

/// Waits until the session satisfies `predicate` and returns it.
pub async fn wait_until(
    handle: &SessionHandle,
    predicate: impl FnMut(&Session) -> bool,
) -> Session {
    let mut rx = handle.subscribe();
    let session = timeout(WAIT, rx.wait_for(predicate))
        .await
        .ok()
        .and_then(|result| result.ok().map(|session| Session::clone(&session)));

    match session {
        Some(session) => session,
        None => panic!("session never matched, last: {:?}", handle.current()),
    }
}

/// Polls `condition` until it holds.
pub async fn eventually(mut condition: impl FnMut() -> bool) -> bool {
    let polling = async {
        while !condition() {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    };
    timeout(WAIT, polling).await.is_ok()
}

pub fn user(id: &str) -> AuthUser {
    AuthUser::new(Identity::new(id)).with_email(format!("{id}@dept.edu"))
}
