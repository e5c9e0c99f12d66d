//! Navigation policy between public, authenticated and auth-only pages.
//!
//! [`policy`] decides where a request for a location should go given whether
//! the caller is signed in. It is applied to every page request by
//! [`guard_pages`], and to every open view by a [`RouteGuard`] reacting to
//! session changes.

use axum::{
    extract::{Request, State},
    middleware::Next,
    response::{IntoResponse, Redirect, Response},
};
use tower_sessions::Session;
use uuid::Uuid;

use crate::{
    res,
    session::{AuthEvent, AuthSession, SessionChange, SessionStore},
};

pub const LOGIN_PATH: &str = "/login";
pub const SIGNUP_PATH: &str = "/signup";
pub const HOME_PATH: &str = "/";

fn path_of(location: &str) -> &str {
    location.split(['?', '#']).next().unwrap_or(location)
}

/// `/prefix/{one segment}`
fn single_segment_under(path: &str, prefix: &str) -> bool {
    path.strip_prefix(prefix)
        .map(|rest| !rest.is_empty() && !rest.contains('/'))
        .unwrap_or(false)
}

pub fn is_public(path: &str) -> bool {
    path == HOME_PATH
        || path == "/search"
        || single_segment_under(path, "/pin/")
        || single_segment_under(path, "/u/")
}

pub fn is_auth_page(path: &str) -> bool {
    path == LOGIN_PATH || path == SIGNUP_PATH || single_segment_under(path, "/login/")
}

fn is_exempt(path: &str) -> bool {
    res::is_static_path(path)
        || path == "/live"
        || path.starts_with("/auth/")
        || path == "/logout"
        || path == "/not-found"
}

pub fn login_redirect(next: &str) -> String {
    format!("{LOGIN_PATH}?next={}", urlencoding::encode(next))
}

/// Where `location` should send a caller, or `None` to stay put.
pub fn policy(signed_in: bool, location: &str) -> Option<String> {
    let path = path_of(location);
    if is_exempt(path) {
        return None;
    }
    match (signed_in, is_auth_page(path)) {
        (true, true) => Some(HOME_PATH.to_owned()),
        (false, false) if !is_public(path) => Some(login_redirect(location)),
        _ => None,
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GuardState {
    Loading,
    Authenticated,
    Anonymous,
}

impl GuardState {
    fn of(session: Option<&AuthSession>) -> GuardState {
        match session {
            Some(_) => GuardState::Authenticated,
            None => GuardState::Anonymous,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Navigation {
    Stay,
    Redirect(String),
    Refresh,
}

/// Per-view guard. Redirects only fire when the resolved state changes, so a
/// stream of identical session events never bounces the view around. A view
/// that stays signed in is refreshed when the user behind it changes or their
/// profile is updated; token refreshes leave it alone.
#[derive(Debug)]
pub struct RouteGuard {
    state: GuardState,
    user: Option<Uuid>,
}

impl Default for RouteGuard {
    fn default() -> Self {
        Self::new()
    }
}

impl RouteGuard {
    pub fn new() -> RouteGuard {
        RouteGuard { state: GuardState::Loading, user: None }
    }

    pub fn state(&self) -> GuardState {
        self.state
    }

    /// First resolution of the session for a freshly mounted view.
    pub fn resolve(&mut self, session: Option<&AuthSession>, location: &str) -> Navigation {
        self.state = GuardState::of(session);
        self.user = session.map(|s| s.user_id);
        match policy(self.state == GuardState::Authenticated, location) {
            Some(to) => Navigation::Redirect(to),
            None => Navigation::Stay,
        }
    }

    pub fn on_change(&mut self, change: &SessionChange, location: &str) -> Navigation {
        if self.state == GuardState::Loading {
            return Navigation::Stay;
        }
        let next = GuardState::of(change.session.as_ref());
        let user = change.session.as_ref().map(|s| s.user_id);
        if next == self.state {
            let same_user = user == self.user;
            self.user = user;
            return if same_user && change.event != AuthEvent::UserUpdated {
                Navigation::Stay
            } else {
                Navigation::Refresh
            };
        }

        tracing::debug!(?next, event = ?change.event, %location, "route guard transition");
        self.state = next;
        self.user = user;
        match policy(next == GuardState::Authenticated, location) {
            Some(to) => Navigation::Redirect(to),
            None => Navigation::Refresh,
        }
    }
}

/// Applies [`policy`] to every incoming page request.
pub async fn guard_pages(
    State(sessions): State<SessionStore>,
    session: Session,
    request: Request,
    next: Next,
) -> Response {
    let location = request
        .uri()
        .path_and_query()
        .map(|pq| pq.as_str())
        .unwrap_or(HOME_PATH)
        .to_owned();

    let signed_in = match sessions.current_session(&session).await {
        Ok(auth) => auth.is_some(),
        Err(err) => return err.into_response(),
    };

    if let Some(to) = policy(signed_in, &location) {
        tracing::debug!(%location, %to, "redirecting");
        return Redirect::to(&to).into_response();
    }
    next.run(request).await
}
