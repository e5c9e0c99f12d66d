mod follow;
mod page;
mod search;
mod settings;

use axum::{Router, routing::{get, post}};

use crate::AppState;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/u/{username}", get(page::profile))
        .route("/profile", get(page::own_profile))
        .route("/search", get(search::search))
        .route("/settings/profile", get(settings::settings_page).post(settings::update_settings))
        .route("/follow/{username}", post(follow::follow))
        .route("/unfollow/{username}", post(follow::unfollow))
}
