use axum::{debug_handler, response::Html};

use crate::{AppResult, AppState, include_res, pagination::FeedKey, res::{self, render}, session::MaybeUser};

use super::feed;

#[debug_handler(state = AppState)]
pub(crate) async fn index(MaybeUser(user): MaybeUser) -> AppResult<Html<String>> {
    let body = render(
        include_res!(str, "/pages/index.html"),
        &[("feed", feed(&FeedKey::All, "You've seen everything")?.as_str())],
    );
    Ok(res::page("Home", user.is_some(), &body))
}
