use axum::{debug_handler, extract::{Query, State}, response::Redirect};
use oauth2::{AuthorizationCode, PkceCodeVerifier, TokenResponse};
use serde::Deserialize;
use tower_sessions::Session;
use uuid::Uuid;

use crate::{AppResult, AppState, db::Db, session::{CSRF_STATE, OAUTH_PROVIDER, PKCE_VERIFIER, RETURN_URL, SessionStore}};

use super::{Clients, clients::ClientProvider, login_error, safe_next};

#[derive(Deserialize)]
pub(crate) struct CallbackQuery {
    pub(crate) code: Option<String>,
    pub(crate) state: Option<String>,
    pub(crate) next: Option<String>,
    pub(crate) error: Option<String>,
}

struct Failure {
    error: &'static str,
    message: &'static str,
}

const fn failure(error: &'static str, message: &'static str) -> Failure {
    Failure { error, message }
}

async fn complete(
    query: CallbackQuery,
    db: &Db,
    clients: &Clients,
    session: &Session,
) -> Result<Uuid, Failure> {
    let bad_state = || failure("invalid-state", "Your sign in request could not be verified");

    if let Some(error) = query.error {
        tracing::info!(%error, "provider rejected sign-in");
        return Err(failure("access-denied", "Sign in was cancelled"));
    }
    let code = query.code.ok_or(failure("missing-code", "The sign in link is missing its code"))?;
    let state = query.state.ok_or_else(bad_state)?;

    let stored = async {
        let provider = session.remove::<ClientProvider>(OAUTH_PROVIDER).await?;
        let csrf = session.remove::<String>(CSRF_STATE).await?;
        let verifier = session.remove::<String>(PKCE_VERIFIER).await?;
        Ok::<_, tower_sessions::session::Error>((provider, csrf, verifier))
    };
    let (Some(provider), Some(csrf), Some(verifier)) = stored.await.map_err(|err| {
        tracing::warn!(error = %err, "session unavailable during oauth callback");
        bad_state()
    })? else {
        return Err(bad_state());
    };
    if csrf != state {
        tracing::warn!(provider = provider.id(), "oauth state mismatch");
        return Err(bad_state());
    }

    let client = clients
        .get_client(provider)
        .map_err(|_| failure("provider-unavailable", "That sign in provider is not available"))?;
    let token_result = client
        .exchange_code(AuthorizationCode::new(code))
        .set_pkce_verifier(PkceCodeVerifier::new(verifier))
        .request_async(clients.http())
        .await
        .map_err(|err| {
            tracing::warn!(provider = provider.id(), error = %err, "code exchange failed");
            failure("exchange-failed", "Could not exchange the code for a session")
        })?;

    let profile = clients
        .fetch_profile(provider, token_result.access_token().secret())
        .await
        .map_err(|err| {
            tracing::warn!(provider = provider.id(), error = %err.0, "userinfo request failed");
            failure("profile-failed", "Could not read your account from the provider")
        })?;

    let identity = db.find_or_create_oauth_identity(profile).await.map_err(|err| {
        tracing::error!(provider = provider.id(), error = %err, "could not store identity");
        failure("account-failed", "Could not create your account")
    })?;
    Ok(identity.id)
}

#[debug_handler(state = AppState)]
pub(crate) async fn auth_callback(
    Query(query): Query<CallbackQuery>,
    State(db): State<Db>,
    State(clients): State<Clients>,
    State(sessions): State<SessionStore>,
    session: Session,
) -> AppResult<Redirect> {
    let stored_next = session.remove::<String>(RETURN_URL).await?;
    let next = safe_next(query.next.as_deref().or(stored_next.as_deref()));

    match complete(query, &db, &clients, &session).await {
        Ok(user_id) => {
            sessions.sign_in(&session, user_id).await?;
            Ok(Redirect::to(&next))
        }
        Err(Failure { error, message }) => Ok(Redirect::to(&login_error(error, message))),
    }
}
