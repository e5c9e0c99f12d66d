use axum::{debug_handler, extract::{Query, State}, response::Redirect};
use serde::Deserialize;
use tower_sessions::Session;

use crate::{AppResult, AppState, session::SessionStore};

use super::safe_next;

#[derive(Deserialize)]
pub(crate) struct LogoutQuery {
    pub(crate) next: Option<String>,
}

#[debug_handler(state = AppState)]
pub(crate) async fn logout(
    Query(LogoutQuery { next }): Query<LogoutQuery>,
    State(sessions): State<SessionStore>,
    session: Session
) -> AppResult<Redirect> {
    sessions.sign_out(&session).await?;
    Ok(Redirect::to(&safe_next(next.as_deref())))
}
