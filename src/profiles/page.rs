use axum::{debug_handler, extract::{Path, State}, response::Html};
use uuid::Uuid;

use crate::{AppResult, AppState, db::{Db, Profile, is_web_url}, include_res, pagination::FeedKey, pins, res::{self, escape, render}, session::{CurrentUser, MaybeUser}};

/// Rows written before URLs were checked may still hold other schemes.
fn website_link(url: Option<&str>) -> String {
    match url {
        Some(url) if is_web_url(url) => {
            format!(r#"<a class="website" href="{0}" rel="nofollow noopener">{0}</a>"#, escape(url))
        }
        _ => String::new(),
    }
}

fn actions(profile: &Profile, viewer: Option<Uuid>, following: bool) -> String {
    let username = escape(&profile.username);
    match viewer {
        Some(viewer) if viewer == profile.id => {
            r#"<a class="button" href="/settings/profile">Edit profile</a>"#.to_owned()
        }
        Some(_) if following => format!(
            r#"<form action="/unfollow/{username}" method="post"><button type="submit">Unfollow</button></form>"#
        ),
        Some(_) => format!(
            r#"<form action="/follow/{username}" method="post"><button class="primary" type="submit">Follow</button></form>"#
        ),
        None => String::new(),
    }
}

async fn profile_html(db: &Db, profile: Profile, viewer: Option<Uuid>) -> AppResult<Html<String>> {
    let counts = db.follow_counts(profile.id).await?;
    let following = match viewer {
        Some(viewer) if viewer != profile.id => db.is_following(viewer, profile.id).await?,
        _ => false,
    };

    let avatar = match &profile.avatar_url {
        Some(url) => format!(r#"<img class="avatar large" src="{}" alt="">"#, escape(url)),
        None => String::new(),
    };
    let website = website_link(profile.website.as_deref());
    let end_text = format!("{} has no more pins", profile.display_name());

    let body = render(
        include_res!(str, "/pages/profile.html"),
        &[
            ("avatar", avatar.as_str()),
            ("display_name", escape(profile.display_name()).as_str()),
            ("username", escape(&profile.username).as_str()),
            ("bio", res::markdown(profile.bio.as_deref().unwrap_or("")).as_str()),
            ("website", website.as_str()),
            ("followers", counts.followers.to_string().as_str()),
            ("following", counts.following.to_string().as_str()),
            ("actions", actions(&profile, viewer, following).as_str()),
            ("feed", pins::feed(&FeedKey::Owner { user_id: profile.id }, &end_text)?.as_str()),
        ],
    );
    Ok(res::page(profile.display_name(), viewer.is_some(), &body))
}

#[debug_handler(state = AppState)]
pub(crate) async fn profile(
    Path(username): Path<String>,
    State(db): State<Db>,
    MaybeUser(user): MaybeUser,
) -> AppResult<Html<String>> {
    let profile = db.fetch_profile_by_username(&username).await?;
    profile_html(&db, profile, user.map(|u| u.user_id)).await
}

#[debug_handler(state = AppState)]
pub(crate) async fn own_profile(
    CurrentUser(user): CurrentUser,
    State(db): State<Db>,
) -> AppResult<Html<String>> {
    let profile = db.fetch_profile(user.user_id).await?;
    profile_html(&db, profile, Some(user.user_id)).await
}
