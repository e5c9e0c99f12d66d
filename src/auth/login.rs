use axum::{Form, debug_handler, extract::{Path, Query, State}, http::StatusCode, response::{Html, IntoResponse, Redirect, Response}};
use oauth2::{CsrfToken, PkceCodeChallenge};
use serde::Deserialize;
use tower_sessions::Session;

use crate::{AppResult, AppState, db::{DataError, Db}, include_res, res::{self, escape, render}, session::{CSRF_STATE, OAUTH_PROVIDER, PKCE_VERIFIER, RETURN_URL, SessionStore}};

use super::{Clients, clients::ClientProvider, login_error, password::verify_password_blocking, provider_buttons, safe_next};

#[derive(Deserialize)]
pub(crate) struct LoginQuery {
    pub(crate) next: Option<String>,
    pub(crate) error: Option<String>,
    pub(crate) message: Option<String>,
}

#[derive(Deserialize)]
pub(crate) struct LoginForm {
    email: String,
    password: String,
    next: Option<String>,
}

fn login_html(clients: &Clients, next: &str, email: &str, alert: Option<&str>) -> Html<String> {
    let body = render(
        include_res!(str, "/pages/login.html"),
        &[
            ("alert", res::alert(alert).as_str()),
            ("next", escape(next).as_str()),
            ("next_query", escape(&urlencoding::encode(next)).as_str()),
            ("email", escape(email).as_str()),
            ("providers", provider_buttons(clients, next).as_str()),
        ],
    );
    res::page("Log in", false, &body)
}

#[debug_handler(state = AppState)]
pub(crate) async fn login_page(
    Query(LoginQuery { next, error, message }): Query<LoginQuery>,
    State(clients): State<Clients>,
) -> impl IntoResponse {
    let next = safe_next(next.as_deref());
    let alert = message
        .map(|m| m.replace('-', " "))
        .or(error.map(|e| format!("Sign in failed ({e})")));
    login_html(&clients, &next, "", alert.as_deref())
}

#[debug_handler(state = AppState)]
pub(crate) async fn login(
    State(db): State<Db>,
    State(clients): State<Clients>,
    State(sessions): State<SessionStore>,
    session: Session,
    Form(LoginForm { email, password, next }): Form<LoginForm>,
) -> AppResult<Response> {
    let next = safe_next(next.as_deref());

    let identity = match db.find_identity_by_email(&email).await {
        Ok(identity) => Some(identity),
        Err(DataError::NotFound(_) | DataError::InvalidArgument(_)) => None,
        Err(err) => return Err(err.into()),
    };
    let verified = match identity.as_ref().and_then(|i| i.password_hash.clone()) {
        Some(hash) => verify_password_blocking(hash, password).await,
        None => false,
    };
    let Some(identity) = identity.filter(|_| verified) else {
        tracing::info!("rejected password sign-in");
        return Ok((
            StatusCode::UNAUTHORIZED,
            login_html(&clients, &next, &email, Some("Invalid email or password")),
        ).into_response());
    };

    sessions.sign_in(&session, identity.id).await?;
    Ok(Redirect::to(&next).into_response())
}

#[debug_handler(state = AppState)]
pub(crate) async fn oauth_start(
    Path(provider): Path<ClientProvider>,
    Query(LoginQuery { next, .. }): Query<LoginQuery>,
    State(clients): State<Clients>,
    session: Session,
) -> AppResult<Response> {
    let Ok(client) = clients.get_client(provider) else {
        return Ok(Redirect::to(&login_error("provider-unavailable", "That sign in provider is not available")).into_response());
    };

    let (pkce_code_challenge, pkce_verifier) = PkceCodeChallenge::new_random_sha256();

    let (authorize_url, csrf_state) = client.authorize_url(CsrfToken::new_random)
        .add_scopes(provider.scopes())
        .set_pkce_challenge(pkce_code_challenge)
        .url();

    session.insert(CSRF_STATE, csrf_state.secret()).await?;
    session.insert(PKCE_VERIFIER, pkce_verifier.secret()).await?;
    session.insert(OAUTH_PROVIDER, provider).await?;
    session.insert(RETURN_URL, safe_next(next.as_deref())).await?;

    tracing::debug!(provider = provider.id(), "starting oauth sign-in");
    Ok(Redirect::to(authorize_url.as_str()).into_response())
}
