use axum::{Form, debug_handler, extract::State, http::StatusCode, response::{Html, IntoResponse, Redirect, Response}};
use serde::Deserialize;
use tower_sessions::Session;

use crate::{AppResult, AppState, db::{Db, Profile, ProfileUpdate}, include_res, res::{self, escape, render}, session::{CurrentUser, SessionStore}};

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub(crate) struct SettingsForm {
    username: String,
    full_name: String,
    avatar_url: String,
    website: String,
    bio: String,
}

impl From<Profile> for SettingsForm {
    fn from(profile: Profile) -> Self {
        SettingsForm {
            username: profile.username,
            full_name: profile.full_name.unwrap_or_default(),
            avatar_url: profile.avatar_url.unwrap_or_default(),
            website: profile.website.unwrap_or_default(),
            bio: profile.bio.unwrap_or_default(),
        }
    }
}

impl From<&SettingsForm> for ProfileUpdate {
    fn from(form: &SettingsForm) -> Self {
        ProfileUpdate {
            username: Some(form.username.clone()),
            full_name: Some(form.full_name.clone()),
            avatar_url: Some(form.avatar_url.clone()),
            bio: Some(form.bio.clone()),
            website: Some(form.website.clone()),
        }
    }
}

fn settings_html(form: &SettingsForm, alert: Option<&str>) -> Html<String> {
    let body = render(
        include_res!(str, "/pages/settings.html"),
        &[
            ("alert", res::alert(alert).as_str()),
            ("username", escape(&form.username).as_str()),
            ("full_name", escape(&form.full_name).as_str()),
            ("avatar_url", escape(&form.avatar_url).as_str()),
            ("website", escape(&form.website).as_str()),
            ("bio", escape(&form.bio).as_str()),
        ],
    );
    res::page("Edit profile", true, &body)
}

#[debug_handler(state = AppState)]
pub(crate) async fn settings_page(
    CurrentUser(user): CurrentUser,
    State(db): State<Db>,
) -> AppResult<Html<String>> {
    let profile = db.fetch_profile(user.user_id).await?;
    Ok(settings_html(&profile.into(), None))
}

#[debug_handler(state = AppState)]
pub(crate) async fn update_settings(
    CurrentUser(user): CurrentUser,
    State(db): State<Db>,
    State(sessions): State<SessionStore>,
    session: Session,
    Form(form): Form<SettingsForm>,
) -> AppResult<Response> {
    match db.update_profile(user.user_id, (&form).into()).await {
        Ok(profile) => {
            sessions.notify_user_updated(&session).await?;
            Ok(Redirect::to(&format!("/u/{}", urlencoding::encode(&profile.username))).into_response())
        }
        Err(err) if err.is_user_facing() => {
            Ok((StatusCode::UNPROCESSABLE_ENTITY, settings_html(&form, Some(&err.to_string()))).into_response())
        }
        Err(err) => Err(err.into()),
    }
}
