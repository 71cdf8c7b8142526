//! Client for the hosted backend: GoTrue auth under `/auth/v1` and PostgREST
//! tables under `/rest/v1`.

pub mod auth;
mod rest;

use anyhow::{Context, Result};
use reqwest::{Client, RequestBuilder, Response};
use secrecy::{ExposeSecret, SecretString};
use serde::{de::DeserializeOwned, Deserialize};
use serde_json::Value;
use std::{
    sync::{atomic::AtomicU64, Arc},
    time::Duration,
};
use tokio::sync::{broadcast, Mutex, RwLock};
use url::Url;

use super::{AuthEvent, BackendError};
use crate::{
    access::session::{AuthUser, Identity},
    cli::globals::GlobalArgs,
    APP_USER_AGENT,
};

/// Auth events buffered per subscriber before it is reported as lagging.
const EVENT_CAPACITY: usize = 64;

/// Tokens of the signed-in visitor.
struct Tokens {
    access: SecretString,
    refresh: SecretString,
    /// Lifetime of the access token in seconds.
    expires_in: u64,
    user: AuthUser,
}

struct Inner {
    http: Client,
    base_url: Url,
    anon_key: SecretString,
    tokens: RwLock<Option<Tokens>>,
    /// Bumped under the `tokens` write lock whenever the slot is replaced.
    generation: AtomicU64,
    /// Persisted refresh token, consumed by the first session check.
    persisted_refresh: Mutex<Option<SecretString>>,
    events: broadcast::Sender<AuthEvent>,
}

#[derive(Clone)]
pub struct Supabase {
    inner: Arc<Inner>,
}

impl Supabase {
    /// # Errors
    /// Fails when the project URL is invalid or the HTTP client cannot be built.
    pub fn new(globals: &GlobalArgs, timeout: Duration) -> Result<Self> {
        let mut base_url = Url::parse(&globals.supabase_url)
            .with_context(|| format!("Invalid Supabase URL: {}", globals.supabase_url))?;

        // Relative joins must keep any path prefix of the project URL.
        if !base_url.path().ends_with('/') {
            let path = format!("{}/", base_url.path());
            base_url.set_path(&path);
        }

        let http = Client::builder()
            .user_agent(APP_USER_AGENT)
            .timeout(timeout)
            .build()
            .context("Failed to build HTTP client")?;

        let (events, _) = broadcast::channel(EVENT_CAPACITY);

        Ok(Self {
            inner: Arc::new(Inner {
                http,
                base_url,
                anon_key: globals.supabase_anon_key.clone(),
                tokens: RwLock::new(None),
                generation: AtomicU64::new(0),
                persisted_refresh: Mutex::new(globals.refresh_token.clone()),
                events,
            }),
        })
    }

    fn endpoint(&self, path: &str) -> Result<Url, BackendError> {
        Ok(self.inner.base_url.join(path)?)
    }

    fn emit(&self, event: AuthEvent) {
        // No receivers only means nobody is resolving a session yet.
        let _ = self.inner.events.send(event);
    }

    /// Adds the project key and the bearer token: the visitor's access token when
    /// signed in, the anon key otherwise.
    async fn authorized(&self, request: RequestBuilder) -> RequestBuilder {
        let tokens = self.inner.tokens.read().await;
        let bearer = tokens
            .as_ref()
            .map_or(&self.inner.anon_key, |tokens| &tokens.access);

        request
            .header("apikey", self.inner.anon_key.expose_secret())
            .bearer_auth(bearer.expose_secret())
    }
}

async fn decode<T: DeserializeOwned>(response: Response) -> Result<T, BackendError> {
    response
        .json()
        .await
        .map_err(|err| BackendError::Decode(err.to_string()))
}

/// Turns a non-success response into [`BackendError::Status`].
async fn check(response: Response) -> Result<Response, BackendError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let url = response.url().to_string();
    let body: Value = response.json().await.unwrap_or_default();
    let message = ["msg", "message", "error_description", "error"]
        .iter()
        .find_map(|key| body[*key].as_str())
        .unwrap_or("")
        .to_string();

    Err(BackendError::Status {
        url,
        status: status.as_u16(),
        message,
    })
}

#[derive(Debug, Default, Deserialize)]
struct UserMetadata {
    display_name: Option<String>,
    department: Option<String>,
}

/// User object as returned by GoTrue.
#[derive(Debug, Deserialize)]
struct GoTrueUser {
    id: String,
    email: Option<String>,
    #[serde(default)]
    user_metadata: UserMetadata,
}

impl From<GoTrueUser> for AuthUser {
    fn from(user: GoTrueUser) -> Self {
        Self {
            identity: Identity::new(user.id),
            email: user.email,
            display_name: user.user_metadata.display_name.filter(|name| !name.is_empty()),
            department: user.user_metadata.department.filter(|dept| !dept.is_empty()),
        }
    }
}
