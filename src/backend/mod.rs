//! Contracts of the hosted backend consumed by the access-control core.
//!
//! The backend owns persistence, authentication and row-level security. The core
//! only depends on the observable behavior described by these traits, so the
//! resolver and the actions can run against the Supabase client in production and
//! against in-memory doubles in tests.

pub mod supabase;

use secrecy::SecretString;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::future::Future;
use thiserror::Error;
use tokio::sync::broadcast;
use utoipa::ToSchema;
use uuid::Uuid;

use crate::access::{
    role::Role,
    session::{AuthUser, Identity},
};

#[derive(Debug, Error)]
pub enum BackendError {
    #[error("request failed: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("{url} - {status}, {message}")]
    Status {
        url: String,
        status: u16,
        message: String,
    },
    #[error("invalid response: {0}")]
    Decode(String),
    #[error("no active session")]
    NoSession,
    #[error("invalid endpoint: {0}")]
    Endpoint(#[from] url::ParseError),
}

/// Auth state transition delivered by [`AuthService::subscribe`].
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum AuthEvent {
    SignedIn(AuthUser),
    SignedOut,
    TokenRefreshed(AuthUser),
}

impl AuthEvent {
    #[must_use]
    pub const fn name(&self) -> &'static str {
        match self {
            Self::SignedIn(_) => "SIGNED_IN",
            Self::SignedOut => "SIGNED_OUT",
            Self::TokenRefreshed(_) => "TOKEN_REFRESHED",
        }
    }
}

pub trait AuthService: Send + Sync + 'static {
    /// Password sign-in. Emits [`AuthEvent::SignedIn`] on success.
    fn sign_in_with_password(
        &self,
        email: &str,
        password: &SecretString,
    ) -> impl Future<Output = Result<AuthUser, BackendError>> + Send;

    /// One-shot check of the current session.
    fn current_session(
        &self,
    ) -> impl Future<Output = Result<Option<AuthUser>, BackendError>> + Send;

    /// Auth state changes in chronological order.
    fn subscribe(&self) -> broadcast::Receiver<AuthEvent>;

    fn sign_out(&self) -> impl Future<Output = Result<(), BackendError>> + Send;
}

/// Defaults written for an identity seen for the first time.
#[derive(Clone, Debug, Serialize)]
pub struct NewProfile {
    pub user_id: Identity,
    pub email: Option<String>,
    pub display_name: String,
    pub department: String,
    pub role: Role,
}

impl From<&AuthUser> for NewProfile {
    fn from(user: &AuthUser) -> Self {
        Self {
            user_id: user.identity.clone(),
            email: user.email.clone(),
            display_name: user.display_name.clone().unwrap_or_default(),
            department: user.department.clone().unwrap_or_default(),
            role: Role::DEFAULT,
        }
    }
}

pub trait ProfileStore: Send + Sync + 'static {
    /// Role of the profile keyed by `identity`, `None` when no profile exists.
    fn get_role(
        &self,
        identity: &Identity,
    ) -> impl Future<Output = Result<Option<Role>, BackendError>> + Send;

    fn create_profile(
        &self,
        profile: &NewProfile,
    ) -> impl Future<Output = Result<(), BackendError>> + Send;

    fn set_active(
        &self,
        identity: &Identity,
        active: bool,
    ) -> impl Future<Output = Result<(), BackendError>> + Send;
}

#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NoticeId(pub Uuid);

impl std::fmt::Display for NoticeId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.0.fmt(f)
    }
}

#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    Low,
    Medium,
    High,
    Urgent,
}

/// Editable fields of a notice; absent fields are left untouched.
#[derive(Clone, Debug, Default, Serialize, Deserialize, ToSchema)]
#[serde(deny_unknown_fields)]
pub struct NoticeUpdate {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub department: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub priority: Option<Priority>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub author: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tags: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub image_url: Option<String>,
}

impl NoticeUpdate {
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.title.is_none()
            && self.content.is_none()
            && self.department.is_none()
            && self.priority.is_none()
            && self.author.is_none()
            && self.tags.is_none()
            && self.image_url.is_none()
    }
}

/// Notice as submitted for publishing; the creator is the acting identity.
#[derive(Clone, Debug, Serialize, Deserialize, ToSchema)]
#[serde(deny_unknown_fields)]
pub struct NewNotice {
    pub title: String,
    pub content: String,
    pub department: String,
    pub priority: Priority,
    pub author: String,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image_url: Option<String>,
}

impl NewNotice {
    /// First required field left blank, if any.
    #[must_use]
    pub fn missing_field(&self) -> Option<&'static str> {
        [
            ("title", &self.title),
            ("content", &self.content),
            ("department", &self.department),
            ("author", &self.author),
        ]
        .into_iter()
        .find(|(_, value)| value.trim().is_empty())
        .map(|(name, _)| name)
    }
}

/// Ownership view of a stored notice.
#[derive(Clone, Debug, Eq, PartialEq, Deserialize)]
pub struct NoticeRecord {
    pub id: NoticeId,
    /// Creator reference; `None` for notices whose creator was removed.
    #[serde(rename = "user_id")]
    pub creator: Option<Identity>,
    #[serde(default, rename = "is_archived")]
    pub archived: bool,
}

pub trait NoticeStore: Send + Sync + 'static {
    /// The notice keyed by `id`, `None` when it does not exist.
    fn notice(
        &self,
        id: NoticeId,
    ) -> impl Future<Output = Result<Option<NoticeRecord>, BackendError>> + Send;

    fn update_notice(
        &self,
        id: NoticeId,
        update: &NoticeUpdate,
    ) -> impl Future<Output = Result<(), BackendError>> + Send;

    fn delete_notice(&self, id: NoticeId) -> impl Future<Output = Result<(), BackendError>> + Send;

    fn set_archived(
        &self,
        id: NoticeId,
        archived: bool,
    ) -> impl Future<Output = Result<(), BackendError>> + Send;

    /// Inserts `notice` owned by `creator` and returns its id.
    fn create_notice(
        &self,
        creator: &Identity,
        notice: &NewNotice,
    ) -> impl Future<Output = Result<NoticeId, BackendError>> + Send;
}

/// Application settings editable from the settings page.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum SettingKey {
    AppName,
    MaxNoticeAgeDays,
    DefaultDepartment,
    AllowedDepartments,
    EmailNotifications,
    AutoArchiveEnabled,
}

impl SettingKey {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::AppName => "app_name",
            Self::MaxNoticeAgeDays => "max_notice_age_days",
            Self::DefaultDepartment => "default_department",
            Self::AllowedDepartments => "allowed_departments",
            Self::EmailNotifications => "email_notifications",
            Self::AutoArchiveEnabled => "auto_archive_enabled",
        }
    }

    #[must_use]
    pub const fn description(self) -> &'static str {
        match self {
            Self::AppName => "The display name of the application",
            Self::MaxNoticeAgeDays => {
                "Number of days after which notices are automatically archived"
            }
            Self::DefaultDepartment => "Default department for new notices",
            Self::AllowedDepartments => "List of departments that can create notices",
            Self::EmailNotifications => "Enable email notifications for new notices",
            Self::AutoArchiveEnabled => "Automatically archive old notices",
        }
    }

    /// Whether `value` has the shape stored for this setting.
    #[must_use]
    pub fn accepts(self, value: &Value) -> bool {
        match self {
            Self::AppName | Self::DefaultDepartment => {
                value.as_str().is_some_and(|text| !text.trim().is_empty())
            }
            Self::MaxNoticeAgeDays => value.as_u64().is_some_and(|days| days > 0),
            Self::AllowedDepartments => value
                .as_array()
                .is_some_and(|items| items.iter().all(Value::is_string)),
            Self::EmailNotifications | Self::AutoArchiveEnabled => value.is_boolean(),
        }
    }
}

/// New value for one setting.
#[derive(Clone, Debug, Deserialize, ToSchema)]
#[serde(deny_unknown_fields)]
pub struct SettingUpdate {
    pub key: SettingKey,
    #[schema(value_type = Object)]
    pub value: Value,
}

impl SettingUpdate {
    /// Value as written to the settings table: lists and flags are stored as
    /// JSON text, numbers and strings as they are.
    #[must_use]
    pub fn stored_value(&self) -> Value {
        match &self.value {
            Value::Array(_) | Value::Object(_) | Value::Bool(_) => {
                Value::String(self.value.to_string())
            }
            other => other.clone(),
        }
    }
}

pub trait SettingsStore: Send + Sync + 'static {
    /// Inserts the setting, or replaces the row with the same key.
    fn upsert_setting(
        &self,
        update: &SettingUpdate,
    ) -> impl Future<Output = Result<(), BackendError>> + Send;
}

/// Everything the server needs from one backend.
pub trait Backend: AuthService + ProfileStore + NoticeStore + SettingsStore {}

impl<T: AuthService + ProfileStore + NoticeStore + SettingsStore> Backend for T {}
