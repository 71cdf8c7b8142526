use rand::{rngs::StdRng, Rng, SeedableRng};
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use serde_json::{json, Value};
use std::{mem, sync::atomic::Ordering};
use tokio::{
    sync::broadcast::{self, error::RecvError},
    task::JoinHandle,
    time::{sleep, Duration},
};
use tracing::{debug, error, info, instrument, warn};

use super::{check, decode, GoTrueUser, Supabase, Tokens};
use crate::{
    access::session::AuthUser,
    backend::{AuthEvent, AuthService, BackendError},
};

const REFRESH_ATTEMPTS: u32 = 3;

#[derive(Deserialize)]
struct TokenResponse {
    access_token: String,
    refresh_token: String,
    expires_in: u64,
    user: GoTrueUser,
}

impl From<TokenResponse> for Tokens {
    fn from(response: TokenResponse) -> Self {
        Self {
            access: SecretString::from(response.access_token),
            refresh: SecretString::from(response.refresh_token),
            expires_in: response.expires_in,
            user: AuthUser::from(response.user),
        }
    }
}

impl Supabase {
    async fn token_grant(&self, grant_type: &str, payload: Value) -> Result<Tokens, BackendError> {
        let mut url = self.endpoint("auth/v1/token")?;
        url.query_pairs_mut().append_pair("grant_type", grant_type);

        let response = self
            .inner
            .http
            .post(url)
            .header("apikey", self.inner.anon_key.expose_secret())
            .json(&payload)
            .send()
            .await?;

        let response: TokenResponse = decode(check(response).await?).await?;
        Ok(Tokens::from(response))
    }

    /// Swaps the token slot and emits `event` before releasing the lock, so
    /// subscribers see events in the order the slot changed.
    async fn replace(&self, tokens: Option<Tokens>, event: Option<AuthEvent>) -> Option<Tokens> {
        let mut slot = self.inner.tokens.write().await;
        self.inner.generation.fetch_add(1, Ordering::SeqCst);
        let previous = mem::replace(&mut *slot, tokens);
        if let Some(event) = event {
            self.emit(event);
        }
        previous
    }

    /// Stores refreshed tokens unless the slot was replaced after `generation`
    /// was read.
    async fn store_refreshed(
        &self,
        tokens: Tokens,
        generation: u64,
    ) -> Result<AuthUser, BackendError> {
        let mut slot = self.inner.tokens.write().await;
        if self.inner.generation.load(Ordering::SeqCst) != generation {
            debug!("session replaced during refresh, discarding tokens");
            return Err(BackendError::NoSession);
        }

        self.inner.generation.fetch_add(1, Ordering::SeqCst);
        let user = tokens.user.clone();
        *slot = Some(tokens);
        self.emit(AuthEvent::TokenRefreshed(user.clone()));
        Ok(user)
    }

    async fn refresh_with(
        &self,
        refresh_token: &SecretString,
        generation: u64,
    ) -> Result<AuthUser, BackendError> {
        let payload = json!({ "refresh_token": refresh_token.expose_secret() });
        let tokens = self.token_grant("refresh_token", payload).await?;
        self.store_refreshed(tokens, generation).await
    }

    /// Exchanges the refresh token for a new session and emits `TOKEN_REFRESHED`.
    ///
    /// # Errors
    /// [`BackendError::NoSession`] when nobody is signed in, or when the visitor
    /// signed in or out while the request was in flight.
    #[instrument(skip(self))]
    pub async fn refresh(&self) -> Result<AuthUser, BackendError> {
        let (refresh_token, generation) = {
            let slot = self.inner.tokens.read().await;
            let tokens = slot.as_ref().ok_or(BackendError::NoSession)?;
            (tokens.refresh.clone(), self.inner.generation.load(Ordering::SeqCst))
        };

        self.refresh_with(&refresh_token, generation).await
    }

    async fn expires_in(&self) -> Option<u64> {
        self.inner
            .tokens
            .read()
            .await
            .as_ref()
            .map(|tokens| tokens.expires_in)
    }

    /// Keeps the session alive: refreshes at 70-90% of the token lifetime and signs
    /// the visitor out when refreshing keeps failing.
    pub fn spawn_refresh(&self) -> JoinHandle<()> {
        let client = self.clone();
        let mut events = self.subscribe();

        tokio::spawn(async move {
            let mut rng = StdRng::from_entropy();

            loop {
                let Some(expires_in) = client.expires_in().await else {
                    // Nothing to refresh until somebody signs in.
                    if let Err(RecvError::Closed) = events.recv().await {
                        break;
                    }
                    continue;
                };

                let delay = (expires_in as f64 * rng.gen_range(0.7..0.9)) as u64;
                debug!("Will refresh session in {} seconds", delay);

                tokio::select! {
                    () = sleep(Duration::from_secs(delay)) => {}
                    event = events.recv() => {
                        // Session changed in the meantime, reschedule.
                        if let Err(RecvError::Closed) = event {
                            break;
                        }
                        continue;
                    }
                }

                if !client.refresh_with_retries().await {
                    error!("Failed to refresh session after {REFRESH_ATTEMPTS} attempts, signing out");
                    if let Err(err) = client.sign_out().await {
                        warn!("Error signing out after failed refresh: {err}");
                    }
                }
            }
        })
    }

    async fn refresh_with_retries(&self) -> bool {
        for attempt in 1..=REFRESH_ATTEMPTS {
            if attempt > 1 {
                let backoff_time = 2u64.pow(attempt - 1);
                warn!("Backing off for {} seconds", backoff_time);
                sleep(Duration::from_secs(backoff_time)).await;
            }

            match self.refresh().await {
                Ok(user) => {
                    info!(identity = %user.identity, "session refreshed");
                    return true;
                }
                // Signed out while waiting; nothing left to keep alive.
                Err(BackendError::NoSession) => return true,
                Err(err) => error!("Error refreshing session: {err}"),
            }
        }
        false
    }
}

impl AuthService for Supabase {
    #[instrument(skip(self, password))]
    async fn sign_in_with_password(
        &self,
        email: &str,
        password: &SecretString,
    ) -> Result<AuthUser, BackendError> {
        let payload = json!({
            "email": email,
            "password": password.expose_secret(),
        });

        let tokens = self.token_grant("password", payload).await?;
        let user = tokens.user.clone();
        self.replace(Some(tokens), Some(AuthEvent::SignedIn(user.clone()))).await;
        info!(identity = %user.identity, "signed in");

        Ok(user)
    }

    #[instrument(skip(self))]
    async fn current_session(&self) -> Result<Option<AuthUser>, BackendError> {
        let persisted = self.inner.persisted_refresh.lock().await.take();
        if let Some(refresh_token) = persisted {
            let generation = self.inner.generation.load(Ordering::SeqCst);
            return match self.refresh_with(&refresh_token, generation).await {
                Ok(user) => {
                    info!(identity = %user.identity, "restored persisted session");
                    Ok(Some(user))
                }
                // A sign-in or sign-out landed first and owns the slot now.
                Err(BackendError::NoSession) => Ok(self
                    .inner
                    .tokens
                    .read()
                    .await
                    .as_ref()
                    .map(|tokens| tokens.user.clone())),
                Err(err) => Err(err),
            };
        }

        if self.inner.tokens.read().await.is_none() {
            return Ok(None);
        }

        let request = self.inner.http.get(self.endpoint("auth/v1/user")?);
        let response = self.authorized(request).await.send().await?;

        match check(response).await {
            Ok(response) => {
                let user: GoTrueUser = decode(response).await?;
                Ok(Some(AuthUser::from(user)))
            }
            Err(BackendError::Status { status: 401 | 403, .. }) => {
                debug!("access token rejected, clearing local session");
                self.replace(None, None).await;
                Ok(None)
            }
            Err(err) => Err(err),
        }
    }

    fn subscribe(&self) -> broadcast::Receiver<AuthEvent> {
        self.inner.events.subscribe()
    }

    #[instrument(skip(self))]
    async fn sign_out(&self) -> Result<(), BackendError> {
        let tokens = self.replace(None, Some(AuthEvent::SignedOut)).await;

        let Some(tokens) = tokens else {
            return Ok(());
        };

        let response = self
            .inner
            .http
            .post(self.endpoint("auth/v1/logout")?)
            .header("apikey", self.inner.anon_key.expose_secret())
            .bearer_auth(tokens.access.expose_secret())
            .send()
            .await?;

        check(response).await?;
        info!(identity = %tokens.user.identity, "signed out");
        Ok(())
    }
}
