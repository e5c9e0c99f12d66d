use axum::{Form, debug_handler, extract::{Query, State}, http::StatusCode, response::{Html, IntoResponse, Redirect, Response}};
use serde::Deserialize;
use tower_sessions::Session;

use crate::{AppResult, AppState, db::Db, include_res, res::{self, escape, render}, session::SessionStore};

use super::{Clients, password::{MIN_PASSWORD_LEN, hash_password_blocking}, provider_buttons, safe_next};

#[derive(Deserialize)]
pub(crate) struct SignupQuery {
    pub(crate) next: Option<String>,
}

#[derive(Deserialize, Default)]
pub(crate) struct SignupForm {
    #[serde(default)]
    email: String,
    #[serde(default)]
    username: String,
    #[serde(default)]
    password: String,
    next: Option<String>,
}

fn signup_html(clients: &Clients, next: &str, form: &SignupForm, alert: Option<&str>) -> Html<String> {
    let body = render(
        include_res!(str, "/pages/signup.html"),
        &[
            ("alert", res::alert(alert).as_str()),
            ("next", escape(next).as_str()),
            ("next_query", escape(&urlencoding::encode(next)).as_str()),
            ("email", escape(&form.email).as_str()),
            ("username", escape(&form.username).as_str()),
            ("providers", provider_buttons(clients, next).as_str()),
        ],
    );
    res::page("Sign up", false, &body)
}

#[debug_handler(state = AppState)]
pub(crate) async fn signup_page(
    Query(SignupQuery { next }): Query<SignupQuery>,
    State(clients): State<Clients>,
) -> impl IntoResponse {
    signup_html(&clients, &safe_next(next.as_deref()), &SignupForm::default(), None)
}

#[debug_handler(state = AppState)]
pub(crate) async fn signup(
    State(db): State<Db>,
    State(clients): State<Clients>,
    State(sessions): State<SessionStore>,
    session: Session,
    Form(form): Form<SignupForm>,
) -> AppResult<Response> {
    let next = safe_next(form.next.as_deref());
    let rejected = |message: &str| {
        (StatusCode::UNPROCESSABLE_ENTITY, signup_html(&clients, &next, &form, Some(message))).into_response()
    };

    if form.password.chars().count() < MIN_PASSWORD_LEN {
        return Ok(rejected(&format!("Password must be at least {MIN_PASSWORD_LEN} characters")));
    }

    let hash = hash_password_blocking(form.password.clone()).await?;
    match db.create_email_identity(&form.email, &hash, &form.username).await {
        Ok(identity) => {
            sessions.sign_in(&session, identity.id).await?;
            Ok(Redirect::to(&next).into_response())
        }
        Err(err) if err.is_user_facing() => Ok(rejected(&err.to_string())),
        Err(err) => Err(err.into()),
    }
}
