//! The live view channel: one WebSocket per open page.
//!
//! A page mounts itself with its location and, if it shows a pin grid, the
//! [`FeedKey`](crate::pagination::FeedKey) of that grid. From then on the
//! socket carries page loads requested by the grid's sentinel, and navigation
//! orders produced by the view's [`RouteGuard`](crate::guard::RouteGuard)
//! whenever the browser's session changes.

mod msg;
mod view;

use axum::{Router, routing::get};

use crate::AppState;

pub use msg::{ClientMessage, ServerMessage};
pub use view::LiveView;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/live", get(view::live))
}
