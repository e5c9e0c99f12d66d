use axum::{debug_handler, extract::{Path, State}, response::Html};
use uuid::Uuid;

use crate::{AppResult, AppState, db::Db, include_res, pagination::FeedKey, res::{self, escape, render}, session::MaybeUser};

use super::feed;

#[debug_handler(state = AppState)]
pub(crate) async fn pin(
    Path(id): Path<Uuid>,
    State(db): State<Db>,
    MaybeUser(user): MaybeUser,
) -> AppResult<Html<String>> {
    let pin = db.fetch_pin(id).await?;

    let title = pin.title.as_deref().unwrap_or("Untitled");
    let author = pin.author.full_name.as_deref().unwrap_or(&pin.author.username);
    let avatar = match &pin.author.avatar_url {
        Some(url) => format!(r#"<img class="avatar" src="{}" alt="">"#, escape(url)),
        None => String::new(),
    };

    let body = render(
        include_res!(str, "/pages/pin.html"),
        &[
            ("image_url", escape(&pin.image_url).as_str()),
            ("width", pin.width.to_string().as_str()),
            ("height", pin.height.to_string().as_str()),
            ("title", escape(title).as_str()),
            ("description", res::markdown(pin.description.as_deref().unwrap_or("")).as_str()),
            ("username", escape(&pin.author.username).as_str()),
            ("author", escape(author).as_str()),
            ("avatar", avatar.as_str()),
            ("created_at", escape(&pin.created_at).as_str()),
            ("feed", feed(&FeedKey::Related { pin_id: pin.id }, "No more pins")?.as_str()),
        ],
    );
    Ok(res::page(title, user.is_some(), &body))
}
