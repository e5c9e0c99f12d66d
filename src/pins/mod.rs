mod create;
mod detail;
mod index;

use axum::{Router, routing::get};

use crate::{AppResult, AppState, include_res, pagination::FeedKey, res::{escape, render}};

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", get(index::index))
        .route("/pin/{id}", get(detail::pin))
        .route("/create", get(create::create_page).post(create::create))
}

/// Empty grid for `key`. Items arrive over the live channel once the page
/// mounts.
pub(crate) fn feed(key: &FeedKey, end_text: &str) -> AppResult<String> {
    let key_json = serde_json::to_string(key)?;
    Ok(render(
        include_res!(str, "/pages/feed.html"),
        &[
            ("feed", escape(&key_json).as_str()),
            ("threshold", key.threshold().to_string().as_str()),
            ("end_text", escape(end_text).as_str()),
        ],
    ))
}

#[cfg(test)]
mod tests {
    use uuid::Uuid;

    use super::*;

    #[test]
    fn feed_carries_its_key() {
        let user_id = Uuid::now_v7();
        let html = feed(&FeedKey::Owner { user_id }, "That's all").unwrap();
        assert!(html.contains(&format!("{{&quot;kind&quot;:&quot;owner&quot;,&quot;user_id&quot;:&quot;{user_id}&quot;}}")));
        assert!(html.contains(r#"data-threshold="1""#));
        assert!(html.contains("That&#39;s all"));
    }
}
