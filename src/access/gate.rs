//! Role gate: `Pending`, `Allow` or `Redirect` for one destination.
//!
//! Checks run in a fixed order: resolution, public destinations, identity, role.
//! An unresolved session is never read as "no identity", and a role that is still
//! loading is never read as "not admin". Decisions are recomputed from the current
//! session on every evaluation; only the previous outcome is kept, to detect
//! transitions into `Redirect` for the audit trail.
//!
//! Only the destination the visitor is on has a mounted gate. Navigating mounts
//! the new destination in place of the old one. Session changes keep the mounted
//! gate current without writing audit records; records come from navigation.

use std::sync::{Arc, Mutex};
use tokio::{sync::watch, task::JoinHandle};
use tracing::{debug, warn};
use ulid::Ulid;

use super::{
    audit::{AccessAttempt, AuditSink, DenyReason},
    resolver::SessionHandle,
    role::MinimumRole,
    routes,
    session::{RoleStatus, Session},
};

pub const AUTH_PATH: &str = "/auth";
pub const HOME_PATH: &str = "/";

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Decision {
    /// Session (or the role needed for this destination) not known yet.
    Pending,
    Allow,
    Redirect(&'static str),
}

impl Decision {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Allow => "allow",
            Self::Redirect(_) => "redirect",
        }
    }

    #[must_use]
    pub const fn redirect_target(self) -> Option<&'static str> {
        match self {
            Self::Redirect(target) => Some(target),
            Self::Pending | Self::Allow => None,
        }
    }
}

fn evaluate(session: &Session, requirement: MinimumRole) -> (Decision, Option<DenyReason>) {
    if !session.is_resolved() {
        return (Decision::Pending, None);
    }

    if !requirement.requires_identity() {
        return (Decision::Allow, None);
    }

    let Some(visitor) = session.visitor() else {
        return (
            Decision::Redirect(AUTH_PATH),
            Some(DenyReason::Unauthenticated),
        );
    };

    if requirement == MinimumRole::Admin {
        return match visitor.role {
            RoleStatus::Loading => (Decision::Pending, None),
            RoleStatus::Assigned(role) if role.is_admin() => (Decision::Allow, None),
            RoleStatus::Assigned(_) | RoleStatus::Unavailable => (
                Decision::Redirect(HOME_PATH),
                Some(DenyReason::InsufficientRole),
            ),
        };
    }

    (Decision::Allow, None)
}

/// Pure decision for `session` against `requirement`.
#[must_use]
pub fn decide(session: &Session, requirement: MinimumRole) -> Decision {
    evaluate(session, requirement).0
}

/// Gate mounted on one destination for as long as that destination is shown.
pub struct RoleGate {
    destination: String,
    requirement: MinimumRole,
    last: Decision,
    audit: Arc<dyn AuditSink>,
}

impl RoleGate {
    pub fn new(
        destination: impl Into<String>,
        requirement: MinimumRole,
        audit: Arc<dyn AuditSink>,
    ) -> Self {
        Self {
            destination: destination.into(),
            requirement,
            last: Decision::Pending,
            audit,
        }
    }

    /// Mounts a gate using the requirement declared in the route table.
    pub fn for_path(path: &str, audit: Arc<dyn AuditSink>) -> Self {
        let destination = routes::normalize(path);
        Self::new(destination, routes::requirement_for(destination), audit)
    }

    #[must_use]
    pub fn destination(&self) -> &str {
        &self.destination
    }

    #[must_use]
    pub const fn requirement(&self) -> MinimumRole {
        self.requirement
    }

    /// Outcome of the most recent evaluation; `Pending` before the first one.
    #[must_use]
    pub const fn last(&self) -> Decision {
        self.last
    }

    pub fn evaluate(&mut self, session: &Session) -> Decision {
        let (decision, reason) = evaluate(session, self.requirement);

        if decision != self.last {
            match (decision, reason) {
                (Decision::Redirect(target), Some(reason)) => self.record(session, target, reason),
                (Decision::Allow, _) => debug!(
                    destination = %self.destination,
                    identity = session.identity().map_or("anonymous", |id| id.as_str()),
                    "access granted"
                ),
                _ => {}
            }
        }

        self.last = decision;
        decision
    }

    /// Re-evaluates after a session change the visitor did not navigate for.
    /// Keeps `last` current without recording an access attempt.
    pub fn observe(&mut self, session: &Session) -> Decision {
        self.last = decide(session, self.requirement);
        self.last
    }

    /// Waits for the next session change and re-evaluates. `None` once the
    /// resolver is gone.
    pub async fn follow(&mut self, rx: &mut watch::Receiver<Session>) -> Option<Decision> {
        rx.changed().await.ok()?;
        let session = rx.borrow_and_update().clone();
        Some(self.evaluate(&session))
    }

    fn record(&self, session: &Session, target: &'static str, reason: DenyReason) {
        let attempt = AccessAttempt {
            id: Ulid::new(),
            destination: self.destination.clone(),
            identity: session.identity().cloned(),
            role: session.role(),
            reason,
            redirect_to: target,
        };

        // Recording is best effort; the redirect stands either way.
        if let Err(err) = self.audit.record(&attempt) {
            warn!(destination = %self.destination, "Failed to record access attempt: {err}");
        }
    }
}

/// The gate of the destination currently shown to the visitor.
pub struct ActiveGate {
    session: SessionHandle,
    mounted: Mutex<Option<RoleGate>>,
    audit: Arc<dyn AuditSink>,
}

impl ActiveGate {
    pub fn new(session: SessionHandle, audit: Arc<dyn AuditSink>) -> Self {
        Self {
            session,
            mounted: Mutex::new(None),
            audit,
        }
    }

    /// Navigates to `path`: its gate replaces the mounted one unless it is already
    /// mounted, and is evaluated against the session current under the lock.
    pub fn navigate(&self, path: &str) -> (Decision, MinimumRole) {
        let destination = routes::normalize(path);

        let Ok(mut mounted) = self.mounted.lock() else {
            warn!("active gate lock poisoned, evaluating unmounted gate");
            let mut gate = RoleGate::for_path(destination, Arc::clone(&self.audit));
            return (gate.evaluate(&self.session.current()), gate.requirement());
        };

        if let Some(previous) = mounted.as_ref() {
            if previous.destination() != destination {
                debug!(from = %previous.destination(), to = %destination, "unmounting gate");
                *mounted = None;
            }
        }

        let gate = mounted
            .get_or_insert_with(|| RoleGate::for_path(destination, Arc::clone(&self.audit)));
        (gate.evaluate(&self.session.current()), gate.requirement())
    }

    /// Brings the mounted gate in line with the current session.
    pub fn refresh(&self) {
        match self.mounted.lock() {
            Ok(mut mounted) => {
                if let Some(gate) = mounted.as_mut() {
                    gate.observe(&self.session.current());
                }
            }
            Err(_) => warn!("active gate lock poisoned, skipping refresh"),
        }
    }

    /// Destination of the mounted gate, if the visitor navigated anywhere yet.
    #[must_use]
    pub fn destination(&self) -> Option<String> {
        self.mounted
            .lock()
            .ok()
            .and_then(|mounted| mounted.as_ref().map(|gate| gate.destination().to_string()))
    }
}

/// Keeps the mounted gate in step with the session.
pub fn spawn_gate_refresh(gate: Arc<ActiveGate>, session: &SessionHandle) -> JoinHandle<()> {
    let mut rx = session.subscribe();

    tokio::spawn(async move {
        while rx.changed().await.is_ok() {
            gate.refresh();
        }
        debug!("session closed, gate refresh stopping");
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::access::{
        audit::AuditLog,
        role::Role,
        session::{AuthUser, Identity, Visitor},
    };

    fn signed_in(id: &str, role: RoleStatus) -> Session {
        let user = AuthUser::new(Identity::new(id));
        Session::Authenticated(Visitor::new(&user).with_role(role))
    }

    fn all_sessions() -> Vec<Session> {
        vec![
            Session::Unresolved,
            Session::Anonymous,
            signed_in("u1", RoleStatus::Loading),
            signed_in("u1", RoleStatus::Assigned(Role::User)),
            signed_in("u1", RoleStatus::Assigned(Role::Admin)),
            signed_in("u1", RoleStatus::Unavailable),
        ]
    }

    const REQUIREMENTS: [MinimumRole; 3] =
        [MinimumRole::None, MinimumRole::User, MinimumRole::Admin];

    #[test]
    fn unresolved_is_pending_for_every_destination() {
        for requirement in REQUIREMENTS {
            assert_eq!(
                decide(&Session::Unresolved, requirement),
                Decision::Pending
            );
        }
    }

    #[test]
    fn anonymous_is_redirected_to_auth() {
        assert_eq!(
            decide(&Session::Anonymous, MinimumRole::User),
            Decision::Redirect(AUTH_PATH)
        );
        assert_eq!(
            decide(&Session::Anonymous, MinimumRole::Admin),
            Decision::Redirect(AUTH_PATH)
        );
        assert_eq!(decide(&Session::Anonymous, MinimumRole::None), Decision::Allow);
    }

    #[test]
    fn admin_destinations_redirect_resolved_non_admins_home() {
        for role in [RoleStatus::Assigned(Role::User), RoleStatus::Unavailable] {
            assert_eq!(
                decide(&signed_in("u1", role), MinimumRole::Admin),
                Decision::Redirect(HOME_PATH)
            );
        }
        assert_eq!(
            decide(
                &signed_in("u1", RoleStatus::Assigned(Role::Admin)),
                MinimumRole::Admin
            ),
            Decision::Allow
        );
    }

    #[test]
    fn loading_role_is_pending_on_admin_destinations_only() {
        let session = signed_in("u1", RoleStatus::Loading);
        assert_eq!(decide(&session, MinimumRole::Admin), Decision::Pending);
        assert_eq!(decide(&session, MinimumRole::User), Decision::Allow);
    }

    #[test]
    fn evaluation_is_idempotent() {
        for session in all_sessions() {
            for requirement in REQUIREMENTS {
                assert_eq!(
                    decide(&session, requirement),
                    decide(&session, requirement)
                );
            }
        }
    }

    #[test]
    fn gate_records_only_transitions_into_redirect() {
        let log = Arc::new(AuditLog::new(16));
        let mut gate = RoleGate::for_path("/users", log.clone());
        assert_eq!(gate.requirement(), MinimumRole::Admin);
        assert_eq!(gate.last(), Decision::Pending);

        let user = signed_in("u1", RoleStatus::Assigned(Role::User));
        assert_eq!(gate.evaluate(&user), Decision::Redirect(HOME_PATH));
        assert_eq!(gate.evaluate(&user), Decision::Redirect(HOME_PATH));
        assert_eq!(log.recent().map(|r| r.len()).ok(), Some(1));

        assert_eq!(
            gate.evaluate(&Session::Anonymous),
            Decision::Redirect(AUTH_PATH)
        );
        let recent = log.recent().unwrap_or_default();
        assert_eq!(recent.len(), 2);
        assert_eq!(recent[0].reason, DenyReason::Unauthenticated);
        assert_eq!(recent[0].identity, None);
        assert_eq!(recent[1].reason, DenyReason::InsufficientRole);
        assert_eq!(recent[1].identity, Some(Identity::new("u1")));
        assert_eq!(recent[1].role, Some(Role::User));
        assert_eq!(recent[1].destination, "/users");
    }

    #[test]
    fn anonymous_visitor_on_settings_is_pending_then_redirected() {
        let log = Arc::new(AuditLog::new(16));
        let mut gate = RoleGate::for_path("/settings", log.clone());

        assert_eq!(gate.evaluate(&Session::Unresolved), Decision::Pending);
        assert_eq!(log.recent().map(|r| r.len()).ok(), Some(0));
        assert_eq!(
            gate.evaluate(&Session::Anonymous),
            Decision::Redirect(AUTH_PATH)
        );
        assert_eq!(log.recent().map(|r| r.len()).ok(), Some(1));
    }

    struct RejectingSink;

    impl AuditSink for RejectingSink {
        fn record(&self, _attempt: &AccessAttempt) -> Result<(), crate::access::audit::AuditError> {
            Err(crate::access::audit::AuditError::Poisoned)
        }
    }

    #[test]
    fn audit_failure_does_not_block_redirect() {
        let mut gate = RoleGate::for_path("/users", Arc::new(RejectingSink));
        assert_eq!(
            gate.evaluate(&Session::Anonymous),
            Decision::Redirect(AUTH_PATH)
        );
    }

    #[tokio::test]
    async fn followed_gate_tracks_session_changes() {
        let (tx, mut rx) = watch::channel(Session::Unresolved);
        let mut gate = RoleGate::for_path("/notice/7/edit", Arc::new(AuditLog::new(4)));
        assert_eq!(gate.destination(), "/notice/7/edit");

        tx.send_replace(signed_in("admin", RoleStatus::Loading));
        assert_eq!(gate.follow(&mut rx).await, Some(Decision::Pending));

        tx.send_replace(signed_in("admin", RoleStatus::Assigned(Role::Admin)));
        assert_eq!(gate.follow(&mut rx).await, Some(Decision::Allow));

        drop(tx);
        assert_eq!(gate.follow(&mut rx).await, None);
    }

    fn active_gate(initial: Session) -> (watch::Sender<Session>, ActiveGate, Arc<AuditLog>) {
        let (tx, rx) = watch::channel(initial);
        let log = Arc::new(AuditLog::new(16));
        let gate = ActiveGate::new(SessionHandle::from(rx), log.clone());
        (tx, gate, log)
    }

    #[test]
    fn navigation_mounts_one_destination_at_a_time() {
        let (_tx, gate, log) = active_gate(Session::Anonymous);
        assert_eq!(gate.destination(), None);

        let (decision, requirement) = gate.navigate("/users/");
        assert_eq!(decision, Decision::Redirect(AUTH_PATH));
        assert_eq!(requirement, MinimumRole::Admin);
        gate.navigate("/users?tab=all");
        assert_eq!(gate.destination().as_deref(), Some("/users"));
        assert_eq!(log.recent().map(|r| r.len()).ok(), Some(1));

        gate.navigate("/calendar");
        assert_eq!(gate.destination().as_deref(), Some("/calendar"));
        assert_eq!(log.recent().map(|r| r.len()).ok(), Some(2));
    }

    #[test]
    fn session_change_without_navigation_records_nothing() {
        let (tx, gate, log) = active_gate(signed_in("u1", RoleStatus::Assigned(Role::User)));
        for path in ["/notices", "/calendar", "/archive", "/notice/1"] {
            assert_eq!(gate.navigate(path).0, Decision::Allow);
        }

        tx.send_replace(Session::Anonymous);
        gate.refresh();
        assert_eq!(log.recent().map(|r| r.len()).ok(), Some(0));

        // Staying on the page the visitor signed out from is not a new attempt.
        assert_eq!(gate.navigate("/notice/1").0, Decision::Redirect(AUTH_PATH));
        assert_eq!(log.recent().map(|r| r.len()).ok(), Some(0));

        assert_eq!(gate.navigate("/archive").0, Decision::Redirect(AUTH_PATH));
        let recent = log.recent().unwrap_or_default();
        assert_eq!(recent.len(), 1);
        assert_eq!(recent[0].destination, "/archive");
    }

    #[test]
    fn navigation_reads_the_session_current_at_evaluation() {
        let (tx, gate, log) = active_gate(Session::Unresolved);
        assert_eq!(gate.navigate("/settings").0, Decision::Pending);

        tx.send_replace(signed_in("admin", RoleStatus::Assigned(Role::Admin)));
        assert_eq!(gate.navigate("/settings").0, Decision::Allow);
        assert_eq!(log.recent().map(|r| r.len()).ok(), Some(0));
    }

    #[tokio::test]
    async fn refresh_task_follows_the_session() {
        let (tx, rx) = watch::channel(signed_in("u1", RoleStatus::Assigned(Role::Admin)));
        let handle = SessionHandle::from(rx);
        let log = Arc::new(AuditLog::new(16));
        let gate = Arc::new(ActiveGate::new(handle.clone(), log.clone()));
        let task = spawn_gate_refresh(Arc::clone(&gate), &handle);

        assert_eq!(gate.navigate("/users").0, Decision::Allow);
        tx.send_replace(signed_in("u1", RoleStatus::Assigned(Role::User)));
        drop(tx);
        assert!(task.await.is_ok());

        // The demotion was applied in the background, so returning to the same
        // destination is no transition.
        assert_eq!(gate.navigate("/users").0, Decision::Redirect(HOME_PATH));
        assert_eq!(log.recent().map(|r| r.len()).ok(), Some(0));
    }
}
