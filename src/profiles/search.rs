use axum::{debug_handler, extract::{Query, State}, response::Html};
use serde::Deserialize;

use crate::{AppResult, AppState, db::Db, include_res, res::{self, escape, render}, session::MaybeUser};

#[derive(Deserialize)]
pub(crate) struct SearchQuery {
    #[serde(default)]
    q: String,
}

#[debug_handler(state = AppState)]
pub(crate) async fn search(
    Query(SearchQuery { q }): Query<SearchQuery>,
    State(db): State<Db>,
    MaybeUser(user): MaybeUser,
) -> AppResult<Html<String>> {
    let profiles = db.search_users(&q).await?;
    tracing::debug!(query = %q, results = profiles.len(), "user search");

    let results: String = profiles.iter().map(res::user_row).collect();
    let empty = if profiles.is_empty() {
        r#"<p class="empty">No people found.</p>"#
    } else {
        ""
    };

    let body = render(
        include_res!(str, "/pages/search.html"),
        &[
            ("query", escape(q.trim()).as_str()),
            ("results", results.as_str()),
            ("empty", empty),
        ],
    );
    Ok(res::page("Search", user.is_some(), &body))
}
