//! Capability predicates and the affordances derived from them.
//!
//! Affordances only decide what a view shows. Every privileged mutation re-checks
//! the same predicates at request time (see [`super::actions`]).

use serde::Serialize;
use utoipa::ToSchema;

use super::{
    role::MinimumRole,
    session::{Identity, Session},
};

/// Acting identity created the resource, or the visitor is an admin.
#[must_use]
pub fn owner_or_admin(session: &Session, creator: &Identity) -> bool {
    session.is_admin() || session.identity() == Some(creator)
}

/// Board management: only admins, ownership is irrelevant.
#[must_use]
pub fn admin_only(session: &Session) -> bool {
    session.is_admin()
}

/// Owner-or-admin for a resource whose creator may be unknown. Without a creator
/// nobody owns the resource and only admins qualify.
#[must_use]
pub fn may_modify(session: &Session, creator: Option<&Identity>) -> bool {
    creator.map_or_else(|| admin_only(session), |creator| owner_or_admin(session, creator))
}

#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize, ToSchema)]
pub struct NavItem {
    pub label: &'static str,
    pub path: &'static str,
}

const fn nav(label: &'static str, path: &'static str) -> NavItem {
    NavItem { label, path }
}

pub const MAIN_NAVIGATION: &[NavItem] = &[
    nav("Dashboard", "/"),
    nav("All Notices", "/notices"),
    nav("Calendar View", "/calendar"),
];

pub const ADMIN_NAVIGATION: &[NavItem] = &[
    nav("Archive", "/archive"),
    nav("User Management", "/users"),
    nav("Settings", "/settings"),
];

#[derive(Clone, Debug, Default, Eq, PartialEq, Serialize, ToSchema)]
pub struct Navigation {
    pub main: Vec<NavItem>,
    /// Empty unless the visitor is an admin.
    pub administration: Vec<NavItem>,
}

/// Navigation visible to the visitor. Nothing is shown before an identity is known.
#[must_use]
pub fn navigation(session: &Session) -> Navigation {
    if session.identity().is_none() {
        return Navigation::default();
    }

    Navigation {
        main: MAIN_NAVIGATION.to_vec(),
        administration: if admin_only(session) {
            ADMIN_NAVIGATION.to_vec()
        } else {
            Vec::new()
        },
    }
}

/// Board-wide controls.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq, Serialize, ToSchema)]
pub struct BoardAffordances {
    pub create_notice: bool,
    pub manage_users: bool,
    pub manage_settings: bool,
    pub view_audit: bool,
}

#[must_use]
pub fn board_affordances(session: &Session) -> BoardAffordances {
    let admin = admin_only(session);
    BoardAffordances {
        create_notice: admin,
        manage_users: admin,
        manage_settings: admin,
        view_audit: admin,
    }
}

/// Controls shown next to one notice.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq, Serialize, ToSchema)]
pub struct NoticeAffordances {
    pub edit: bool,
    pub delete: bool,
    pub archive: bool,
}

#[must_use]
pub fn notice_affordances(session: &Session, creator: Option<&Identity>) -> NoticeAffordances {
    let allowed = may_modify(session, creator);
    NoticeAffordances {
        edit: allowed,
        delete: allowed,
        archive: allowed,
    }
}

/// Requirement a view declares for showing an affordance; mirrors the route table.
#[must_use]
pub fn satisfies(session: &Session, requirement: MinimumRole) -> bool {
    match requirement {
        MinimumRole::None => true,
        MinimumRole::User => session.identity().is_some(),
        MinimumRole::Admin => admin_only(session),
    }
}
