//! # Noticeboard (Department Notice Board Access Control)
//!
//! `noticeboard` decides what a visitor of the department notice board may see and
//! do. Persistence, authentication and row-level security live in a hosted
//! backend (GoTrue auth + PostgREST tables); this crate resolves the visitor's
//! session against it and gates every destination and privileged action.
//!
//! ## Session Resolution
//!
//! The [`access::resolver::SessionResolver`] is the single writer of the session
//! cell. It starts `Unresolved`, performs one session check, then follows the auth
//! event stream (`SIGNED_IN`, `SIGNED_OUT`, `TOKEN_REFRESHED`). Roles are looked up
//! asynchronously; a lookup whose identity no longer matches the session when it
//! completes is discarded.
//!
//! ## Gating
//!
//! - **Destinations:** every route declares a minimum role (`none`, `user`,
//!   `admin`). The [`access::gate::RoleGate`] answers `Pending`, `Allow` or
//!   `Redirect`, and never decides before the session is resolved.
//! - **Actions:** affordances are hints only. Edit, delete, archive and restore
//!   re-check *owner-or-admin* at request time; board management (users,
//!   settings, audit) requires *admin*.

pub mod access;
pub mod backend;
pub mod cli;
pub mod noticeboard;

#[allow(clippy::doc_markdown, clippy::needless_raw_string_hashes)]
pub mod built_info {
    include!(concat!(env!("OUT_DIR"), "/built.rs"));
}

pub const GIT_COMMIT_HASH: &str = match built_info::GIT_COMMIT_HASH {
    Some(hash) => hash,
    None => "unknown",
};

pub const APP_USER_AGENT: &str = concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION"),);
