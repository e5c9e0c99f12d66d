//! Session state on top of `tower-sessions`.
//!
//! The cookie session holds the signed-in user's [`AuthSession`] plus a
//! [`ClientKey`] that identifies the browser across sign-ins. Every change to
//! the auth session is published on a broadcast channel so that open views of
//! the same browser can react (see [`crate::guard`] and [`crate::live`]).

use std::fmt;

use axum::{
    extract::{FromRef, FromRequestParts, Request, State},
    http::request::Parts,
    middleware::Next,
    response::{IntoResponse, Redirect, Response},
};
use rand::{Rng, distr::Alphanumeric};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast::{self, error::RecvError};
use tower_sessions::Session;
use uuid::Uuid;

use crate::{AppResult, guard, res};

pub const CSRF_STATE: &str = "csrf_state";
pub const PKCE_VERIFIER: &str = "pkce_verifier";
pub const OAUTH_PROVIDER: &str = "oauth_provider";
pub const RETURN_URL: &str = "return_url";
pub const AUTH_SESSION: &str = "auth_session";
pub const CLIENT_KEY: &str = "client_key";

pub const TOKEN_TTL_SECS: i64 = 60 * 60;
const TOKEN_LEN: usize = 48;

fn now() -> i64 {
    time::OffsetDateTime::now_utc().unix_timestamp()
}

fn new_token() -> String {
    rand::rng()
        .sample_iter(&Alphanumeric)
        .take(TOKEN_LEN)
        .map(char::from)
        .collect()
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthSession {
    pub user_id: Uuid,
    pub access_token: String,
    pub issued_at: i64,
    pub expires_at: i64,
}

impl AuthSession {
    fn issue(user_id: Uuid, now: i64) -> AuthSession {
        AuthSession {
            user_id,
            access_token: new_token(),
            issued_at: now,
            expires_at: now + TOKEN_TTL_SECS,
        }
    }

    pub fn is_expired(&self, now: i64) -> bool {
        now >= self.expires_at
    }

    /// Tokens are rotated once they are past half their lifetime.
    fn needs_refresh(&self, now: i64) -> bool {
        now >= self.issued_at + (self.expires_at - self.issued_at) / 2
    }
}

/// Stable per-browser id, kept across sign-in and sign-out.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ClientKey(Uuid);

impl ClientKey {
    pub fn new() -> ClientKey {
        ClientKey(Uuid::now_v7())
    }
}

impl Default for ClientKey {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ClientKey {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.0.simple())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AuthEvent {
    SignedIn,
    SignedOut,
    TokenRefreshed,
    UserUpdated,
}

#[derive(Debug, Clone)]
pub struct SessionChange {
    pub client: ClientKey,
    pub event: AuthEvent,
    pub session: Option<AuthSession>,
}

/// Process-wide handle to the session change stream. Built once at startup
/// and handed to whoever needs it through the router state.
#[derive(Clone)]
pub struct SessionStore {
    tx: broadcast::Sender<SessionChange>,
}

impl SessionStore {
    pub fn new(capacity: usize) -> SessionStore {
        SessionStore {
            tx: broadcast::channel(capacity).0,
        }
    }

    pub async fn client_key(&self, session: &Session) -> AppResult<ClientKey> {
        if let Some(key) = session.get::<ClientKey>(CLIENT_KEY).await? {
            return Ok(key);
        }
        let key = ClientKey::new();
        session.insert(CLIENT_KEY, key).await?;
        Ok(key)
    }

    /// One-shot lookup of the signed-in user. Expired sessions count as absent.
    pub async fn current_session(&self, session: &Session) -> AppResult<Option<AuthSession>> {
        Ok(session
            .get::<AuthSession>(AUTH_SESSION)
            .await?
            .filter(|auth| !auth.is_expired(now())))
    }

    pub async fn sign_in(&self, session: &Session, user_id: Uuid) -> AppResult<AuthSession> {
        let client = self.client_key(session).await?;
        session.cycle_id().await?;

        let auth = AuthSession::issue(user_id, now());
        session.insert(AUTH_SESSION, &auth).await?;

        tracing::info!(user = %user_id, %client, "signed in");
        self.publish(client, AuthEvent::SignedIn, Some(auth.clone()));
        Ok(auth)
    }

    pub async fn sign_out(&self, session: &Session) -> AppResult<()> {
        let client = self.client_key(session).await?;
        let previous = session.remove::<AuthSession>(AUTH_SESSION).await?;
        session.cycle_id().await?;

        if let Some(previous) = previous {
            tracing::info!(user = %previous.user_id, %client, "signed out");
        }
        self.publish(client, AuthEvent::SignedOut, None);
        Ok(())
    }

    /// Keeps the cookie session fresh: hands out a client key, drops expired
    /// auth sessions and rotates tokens that are past half-life.
    pub async fn touch(&self, session: &Session) -> AppResult<()> {
        self.touch_at(session, now()).await
    }

    async fn touch_at(&self, session: &Session, now: i64) -> AppResult<()> {
        let client = self.client_key(session).await?;
        let Some(auth) = session.get::<AuthSession>(AUTH_SESSION).await? else {
            return Ok(());
        };

        if auth.is_expired(now) {
            session.remove::<AuthSession>(AUTH_SESSION).await?;
            tracing::info!(user = %auth.user_id, %client, "session expired");
            self.publish(client, AuthEvent::SignedOut, None);
        } else if auth.needs_refresh(now) {
            let refreshed = AuthSession::issue(auth.user_id, now);
            session.insert(AUTH_SESSION, &refreshed).await?;
            tracing::debug!(user = %auth.user_id, %client, "token refreshed");
            self.publish(client, AuthEvent::TokenRefreshed, Some(refreshed));
        }
        Ok(())
    }

    pub async fn notify_user_updated(&self, session: &Session) -> AppResult<()> {
        let client = self.client_key(session).await?;
        let auth = self.current_session(session).await?;
        self.publish(client, AuthEvent::UserUpdated, auth);
        Ok(())
    }

    /// Subscribes to changes for one browser. Dropping the returned
    /// [`Subscription`] releases it.
    pub fn subscribe(&self, client: ClientKey) -> Subscription {
        tracing::debug!(%client, "session subscription acquired");
        Subscription {
            client,
            rx: self.tx.subscribe(),
        }
    }

    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }

    fn publish(&self, client: ClientKey, event: AuthEvent, session: Option<AuthSession>) {
        // nobody listening is fine
        let _ = self.tx.send(SessionChange { client, event, session });
    }
}

pub struct Subscription {
    client: ClientKey,
    rx: broadcast::Receiver<SessionChange>,
}

impl Subscription {
    /// Next change for this browser, or `None` once the store is gone.
    pub async fn recv(&mut self) -> Option<SessionChange> {
        loop {
            match self.rx.recv().await {
                Ok(change) if change.client == self.client => return Some(change),
                Ok(_) => continue,
                Err(RecvError::Lagged(skipped)) => {
                    tracing::warn!(client = %self.client, skipped, "session subscription lagged");
                }
                Err(RecvError::Closed) => return None,
            }
        }
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        tracing::debug!(client = %self.client, "session subscription released");
    }
}

/// Request filter run on every non-static request before the handlers.
pub async fn refresh_session(
    State(sessions): State<SessionStore>,
    session: Session,
    request: Request,
    next: Next,
) -> Response {
    if !res::is_static_path(request.uri().path()) {
        if let Err(err) = sessions.touch(&session).await {
            tracing::warn!(error = %err.0, "session refresh failed");
        }
    }
    next.run(request).await
}

/// The signed-in caller. Anonymous requests are sent to the login page.
pub struct CurrentUser(pub AuthSession);

impl<S> FromRequestParts<S> for CurrentUser
where
    S: Send + Sync,
    SessionStore: FromRef<S>,
{
    type Rejection = Response;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let session = Session::from_request_parts(parts, state)
            .await
            .map_err(IntoResponse::into_response)?;
        let sessions = SessionStore::from_ref(state);
        match sessions.current_session(&session).await {
            Ok(Some(auth)) => Ok(CurrentUser(auth)),
            Ok(None) => {
                let next = parts
                    .uri
                    .path_and_query()
                    .map(|pq| pq.as_str())
                    .unwrap_or("/");
                Err(Redirect::to(&guard::login_redirect(next)).into_response())
            }
            Err(err) => Err(err.into_response()),
        }
    }
}

/// The caller if signed in.
pub struct MaybeUser(pub Option<AuthSession>);

impl<S> FromRequestParts<S> for MaybeUser
where
    S: Send + Sync,
    SessionStore: FromRef<S>,
{
    type Rejection = Response;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let session = Session::from_request_parts(parts, state)
            .await
            .map_err(IntoResponse::into_response)?;
        SessionStore::from_ref(state)
            .current_session(&session)
            .await
            .map(MaybeUser)
            .map_err(IntoResponse::into_response)
    }
}
