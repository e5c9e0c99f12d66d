use axum::{debug_handler, extract::{Path, State}, response::Redirect};

use crate::{AppResult, AppState, db::Db, session::CurrentUser};

fn back_to(username: &str) -> Redirect {
    Redirect::to(&format!("/u/{}", urlencoding::encode(username)))
}

#[debug_handler(state = AppState)]
pub(crate) async fn follow(
    Path(username): Path<String>,
    CurrentUser(user): CurrentUser,
    State(db): State<Db>,
) -> AppResult<Redirect> {
    let followee = db.fetch_profile_by_username(&username).await?;
    db.follow(user.user_id, followee.id).await?;
    tracing::debug!(follower = %user.user_id, followee = %followee.id, "followed");
    Ok(back_to(&followee.username))
}

#[debug_handler(state = AppState)]
pub(crate) async fn unfollow(
    Path(username): Path<String>,
    CurrentUser(user): CurrentUser,
    State(db): State<Db>,
) -> AppResult<Redirect> {
    let followee = db.fetch_profile_by_username(&username).await?;
    db.unfollow(user.user_id, followee.id).await?;
    tracing::debug!(follower = %user.user_id, followee = %followee.id, "unfollowed");
    Ok(back_to(&followee.username))
}
