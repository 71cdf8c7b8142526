//! Session resolver: the only writer of the session cell.
//!
//! Flow Overview:
//! 1) Subscribe to auth events, then perform the one-shot session check. Its
//!    completion (success or failure) resolves the session exactly once.
//! 2) Apply auth events in arrival order. An identity that is newly present starts
//!    an asynchronous role lookup; `SIGNED_OUT` clears identity and role at once.
//! 3) Lookups report back through a channel tagged with the identity and session
//!    epoch they were started for. Results whose tag no longer matches are dropped.
//!
//! Failures never escape the resolver: they resolve to `Anonymous` (session check)
//! or `RoleStatus::Unavailable` (role lookup) and are logged.

use std::sync::Arc;
use tokio::sync::{broadcast::error::RecvError, mpsc, watch};
use tracing::{debug, error, info, info_span, warn, Instrument, Span};

use super::{
    role::Role,
    session::{AuthUser, Identity, RoleStatus, Session, Visitor},
};
use crate::backend::{AuthEvent, AuthService, BackendError, NewProfile, ProfileStore};

#[derive(Clone, Debug, Eq, PartialEq)]
struct LookupTicket {
    identity: Identity,
    epoch: u64,
}

#[derive(Debug)]
struct RoleOutcome {
    ticket: LookupTicket,
    status: RoleStatus,
}

/// Read side of the session cell. Cheap to clone; any number of readers.
#[derive(Clone, Debug)]
pub struct SessionHandle {
    rx: watch::Receiver<Session>,
}

impl SessionHandle {
    /// Snapshot of the current session.
    #[must_use]
    pub fn current(&self) -> Session {
        self.rx.borrow().clone()
    }

    /// Receiver notified on every session change.
    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<Session> {
        self.rx.clone()
    }

    /// Waits for the first resolution and returns the session at that point.
    pub async fn resolved(&self) -> Session {
        let mut rx = self.rx.clone();
        if rx.wait_for(Session::is_resolved).await.is_err() {
            debug!("session resolver stopped before resolution");
        }
        let session = rx.borrow().clone();
        session
    }
}

impl From<watch::Receiver<Session>> for SessionHandle {
    fn from(rx: watch::Receiver<Session>) -> Self {
        Self { rx }
    }
}

pub struct SessionResolver<A, P> {
    auth: Arc<A>,
    profiles: Arc<P>,
    state: watch::Sender<Session>,
    epoch: u64,
    outcomes_tx: mpsc::UnboundedSender<RoleOutcome>,
    outcomes_rx: mpsc::UnboundedReceiver<RoleOutcome>,
}

impl<A: AuthService, P: ProfileStore> SessionResolver<A, P> {
    /// Creates an unresolved resolver and the handle readers use to observe it.
    pub fn new(auth: Arc<A>, profiles: Arc<P>) -> (Self, SessionHandle) {
        let (state, rx) = watch::channel(Session::Unresolved);
        let (outcomes_tx, outcomes_rx) = mpsc::unbounded_channel();

        let resolver = Self {
            auth,
            profiles,
            state,
            epoch: 0,
            outcomes_tx,
            outcomes_rx,
        };

        (resolver, SessionHandle { rx })
    }

    /// Starts the resolver on the current runtime for the lifetime of the process.
    pub fn spawn(auth: Arc<A>, profiles: Arc<P>) -> SessionHandle {
        let (resolver, handle) = Self::new(auth, profiles);
        tokio::spawn(resolver.run().instrument(info_span!("session.resolver")));
        handle
    }

    pub async fn run(mut self) {
        // Subscribe first so transitions racing the initial check are queued, not lost.
        let mut events = self.auth.subscribe();

        let initial = self.auth.current_session().await;
        self.apply_initial(initial);

        loop {
            tokio::select! {
                biased;

                event = events.recv() => match event {
                    Ok(event) => self.apply_event(event),
                    Err(RecvError::Lagged(skipped)) => {
                        warn!(skipped, "auth events lagged, re-checking session");
                        let current = self.auth.current_session().await;
                        self.reconcile(current);
                    }
                    Err(RecvError::Closed) => {
                        info!("auth event stream closed, session resolver stopping");
                        break;
                    }
                },

                Some(outcome) = self.outcomes_rx.recv() => self.apply_outcome(outcome),
            }
        }
    }

    fn apply_initial(&mut self, result: Result<Option<AuthUser>, BackendError>) {
        match result {
            Ok(Some(user)) => {
                info!(identity = %user.identity, "session resolved with identity");
                self.identity_present(user, false);
            }
            Ok(None) => {
                info!("session resolved without identity");
                self.publish(Session::Anonymous);
            }
            Err(err) => {
                error!("Session check failed, continuing without identity: {err}");
                self.publish(Session::Anonymous);
            }
        }
    }

    fn reconcile(&mut self, result: Result<Option<AuthUser>, BackendError>) {
        match result {
            Ok(Some(user)) => self.identity_present(user, false),
            Ok(None) => self.clear(),
            Err(err) => warn!("Session re-check failed, keeping current state: {err}"),
        }
    }

    fn apply_event(&mut self, event: AuthEvent) {
        debug!(event = event.name(), "auth state change");

        match event {
            AuthEvent::SignedIn(user) => self.identity_present(user, true),
            AuthEvent::TokenRefreshed(user) => self.identity_present(user, false),
            AuthEvent::SignedOut => self.clear(),
        }
    }

    fn identity_present(&mut self, user: AuthUser, provision: bool) {
        let unchanged = self.state.borrow().identity() == Some(&user.identity);
        if unchanged {
            debug!(identity = %user.identity, "identity unchanged, keeping role");
            return;
        }

        self.epoch += 1;
        self.publish(Session::Authenticated(Visitor::new(&user)));
        self.spawn_lookup(user, provision);
    }

    fn clear(&mut self) {
        self.epoch += 1;
        self.publish(Session::Anonymous);
    }

    fn publish(&self, session: Session) {
        self.state.send_replace(session);
    }

    fn spawn_lookup(&self, user: AuthUser, provision: bool) {
        let ticket = LookupTicket {
            identity: user.identity.clone(),
            epoch: self.epoch,
        };
        let profiles = Arc::clone(&self.profiles);
        let outcomes = self.outcomes_tx.clone();
        let span = info_span!("session.role_lookup", identity = %user.identity, provision);

        tokio::spawn(
            async move {
                let status = lookup_role(&profiles, &user, provision).await;
                if outcomes.send(RoleOutcome { ticket, status }).is_err() {
                    debug!("session resolver stopped before role lookup completed");
                }
            }
            .instrument(span),
        );
    }

    fn apply_outcome(&mut self, outcome: RoleOutcome) {
        let RoleOutcome { ticket, status } = outcome;

        if ticket.epoch != self.epoch {
            debug!(identity = %ticket.identity, "discarding stale role lookup");
            return;
        }

        let applied = self.state.send_if_modified(|session| match session {
            Session::Authenticated(visitor) if visitor.identity == ticket.identity => {
                visitor.role = status;
                true
            }
            _ => false,
        });

        if applied {
            info!(
                identity = %ticket.identity,
                role = status.role().map_or("none", Role::as_str),
                "role resolved"
            );
        } else {
            debug!(identity = %ticket.identity, "discarding role lookup for replaced identity");
        }
    }
}

async fn lookup_role<P: ProfileStore>(
    profiles: &Arc<P>,
    user: &AuthUser,
    provision: bool,
) -> RoleStatus {
    match profiles.get_role(&user.identity).await {
        Ok(Some(role)) => RoleStatus::Assigned(role),
        Ok(None) if provision => {
            provision_default(Arc::clone(profiles), user);
            RoleStatus::Assigned(Role::DEFAULT)
        }
        Ok(None) => {
            warn!("No profile found for identity, role unavailable");
            RoleStatus::Unavailable
        }
        Err(err) => {
            error!("Error fetching user role: {err}");
            RoleStatus::Unavailable
        }
    }
}

/// Writes the default profile without waiting for it. The caller already grants
/// the default role in memory, so a failed write is only logged.
fn provision_default<P: ProfileStore>(profiles: Arc<P>, user: &AuthUser) {
    let profile = NewProfile::from(user);

    tokio::spawn(
        async move {
            match profiles.create_profile(&profile).await {
                Ok(()) => info!(identity = %profile.user_id, "provisioned default profile"),
                Err(err) => error!(identity = %profile.user_id, "Error creating profile: {err}"),
            }
        }
        .instrument(Span::current()),
    );
}
