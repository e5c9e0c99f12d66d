pub mod auth;
pub mod config;
pub mod db;
pub mod guard;
pub mod live;
pub mod pagination;
pub mod pins;
pub mod profiles;
pub mod res;
pub mod session;

use axum::{Router, extract::FromRef, http::StatusCode, middleware, response::{IntoResponse, Response}, routing::get};
use serde_json::Value;

use crate::{db::{DataError, Db}, pagination::FeedSettings, session::SessionStore};

#[derive(Clone, FromRef)]
pub struct AppState {
    pub db: Db,
    pub clients: auth::Clients,
    pub sessions: SessionStore,
    pub feed: FeedSettings,
}

/// Every route of the site, with the session refresh and page guard applied.
/// The caller supplies the cookie session layer.
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/static/app.js", get(res::app_js))
        .route("/static/style.css", get(res::style_css))
        .route(res::NOT_FOUND_PATH, get(res::not_found_page))

        .merge(auth::router())
        .merge(pins::router())
        .merge(profiles::router())
        .merge(live::router())
        .fallback(res::fallback)

        .route_layer(middleware::from_fn_with_state(state.clone(), guard::guard_pages))
        .layer(middleware::from_fn_with_state(state.clone(), session::refresh_session))
        .with_state(state)
}

pub trait GetField {
    fn get_str_field(&self, field: &str) -> AppResult<String>;
}

impl GetField for Value {
    fn get_str_field(&self, field: &str) -> AppResult<String> {
        Ok(
            self.get(field)
            .ok_or(format!("expected {field} in {self}"))?
            .as_str()
            .ok_or(format!("expected {field} in {self} to be string"))?
            .to_owned()
        )
    }
}

pub type AppResult<T> = Result<T, AppError>;
#[derive(Debug)]
pub struct AppError(pub anyhow::Error);

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        if let Some(err) = self.0.downcast_ref::<DataError>() {
            if err.is_not_found() {
                return res::not_found();
            }
            if err.is_user_facing() {
                return (StatusCode::BAD_REQUEST, err.to_string()).into_response();
            }
        }

        tracing::error!(error = %self.0, backtrace = %self.0.backtrace(), "request failed");
        (
            StatusCode::INTERNAL_SERVER_ERROR,
            res::page("Something went wrong", false, &res::alert(Some("Something went wrong. Please try again."))),
        )
            .into_response()
    }
}

impl From<anyhow::Error> for AppError {
    fn from(err: anyhow::Error) -> Self {
        Self(err)
    }
}

impl From<String> for AppError {
    fn from(err: String) -> Self {
        Self(anyhow::Error::msg(err))
    }
}

impl From<&str> for AppError {
    fn from(err: &str) -> Self {
        Self(anyhow::Error::msg(err.to_owned()))
    }
}

macro_rules! apperr_impl {
    ($E:ty) => {
        impl From<$E> for AppError {
            fn from(err: $E) -> Self {
                Self(anyhow::Error::from(err))
            }
        }
    };
}

apperr_impl!(serde_json::Error);
apperr_impl!(sqlx::Error);
apperr_impl!(tower_sessions::session::Error);
apperr_impl!(axum::Error);
apperr_impl!(reqwest::Error);
apperr_impl!(DataError);

impl<E: core::error::Error + Send + Sync + 'static, R: oauth2::ErrorResponse + Send + Sync + 'static> From<oauth2::RequestTokenError<E, R>> for AppError {
    fn from(err: oauth2::RequestTokenError<E, R>) -> Self {
        Self(anyhow::Error::from(err))
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use axum::{body::Body, http::{Request, header}};
    use parking_lot::Mutex;
    use serde_json::json;
    use tower::ServiceExt;
    use tower_sessions::{MemoryStore, SessionManagerLayer};

    use super::*;
    use crate::config::Config;

    async fn app() -> (Router, Db) {
        let config = Config::from_lookup(|name| match name {
            "DATABASE_URL" => Some("sqlite::memory:".to_owned()),
            "SESSION_KEY" => Some("k".repeat(64)),
            _ => None,
        })
        .unwrap();
        let db = Db::in_memory().await;
        let state = AppState {
            db: db.clone(),
            clients: auth::Clients::from_config(&config).unwrap(),
            sessions: SessionStore::new(16),
            feed: FeedSettings { page_size: config.page_size },
        };
        let app = router(state).layer(SessionManagerLayer::new(MemoryStore::default()));
        (app, db)
    }

    fn get(uri: &str) -> Request<Body> {
        Request::get(uri).body(Body::empty()).unwrap()
    }

    fn location(response: &Response) -> &str {
        response.headers().get(header::LOCATION).unwrap().to_str().unwrap()
    }

    #[tokio::test]
    async fn anonymous_create_goes_to_login() {
        let (app, _) = app().await;
        let response = app.oneshot(get("/create")).await.unwrap();
        assert_eq!(response.status(), StatusCode::SEE_OTHER);
        assert_eq!(location(&response), "/login?next=%2Fcreate");
    }

    /// Signs up a fresh account and returns its session cookie.
    async fn sign_up(app: &Router) -> String {
        let signup = Request::post("/signup")
            .header(header::CONTENT_TYPE, "application/x-www-form-urlencoded")
            .body(Body::from("email=bo%40example.com&username=bobby&password=hunter22"))
            .unwrap();
        let response = app.clone().oneshot(signup).await.unwrap();
        assert_eq!(location(&response), "/");

        response.headers()[header::SET_COOKIE]
            .to_str()
            .unwrap()
            .split(';')
            .next()
            .unwrap()
            .to_owned()
    }

    #[derive(Clone, Default)]
    struct Captured(Arc<Mutex<Vec<u8>>>);

    impl std::io::Write for Captured {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            self.0.lock().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    #[tokio::test]
    async fn signed_in_visitors_skip_the_login_page() {
        let (app, _) = app().await;
        let cookie = sign_up(&app).await;

        let login = Request::get("/login")
            .header(header::COOKIE, cookie)
            .body(Body::empty())
            .unwrap();
        let response = app.oneshot(login).await.unwrap();
        assert_eq!(location(&response), "/");
    }

    fn form_post(uri: &str, cookie: &str, body: &'static str) -> Request<Body> {
        Request::post(uri)
            .header(header::CONTENT_TYPE, "application/x-www-form-urlencoded")
            .header(header::COOKIE, cookie)
            .body(Body::from(body))
            .unwrap()
    }

    #[tokio::test]
    async fn writes_are_logged_once() {
        let (app, _) = app().await;
        let cookie = sign_up(&app).await;

        let captured = Captured::default();
        let writer = captured.clone();
        let subscriber = tracing_subscriber::fmt()
            .with_ansi(false)
            .with_writer(move || writer.clone())
            .finish();
        let _guard = tracing::subscriber::set_default(subscriber);

        let create = form_post("/create", &cookie, "image_url=https%3A%2F%2Fimg.example%2F1.jpg&width=10&height=20");
        let response = app.clone().oneshot(create).await.unwrap();
        assert!(location(&response).starts_with("/pin/"));

        let rejected = form_post("/settings/profile", &cookie, "username=bobby&website=javascript%3Aalert(1)");
        let response = app.clone().oneshot(rejected).await.unwrap();
        assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);

        let update = form_post("/settings/profile", &cookie, "username=bobby&website=https%3A%2F%2Fbo.example");
        let response = app.oneshot(update).await.unwrap();
        assert_eq!(location(&response), "/u/bobby");

        let logs = String::from_utf8(captured.0.lock().clone()).unwrap();
        assert_eq!(logs.matches("pin created").count(), 1, "{logs}");
        assert_eq!(logs.matches("profile updated").count(), 1, "{logs}");
    }

    #[tokio::test]
    async fn public_pages_render_for_anyone() {
        let (app, db) = app().await;
        db.seed_user("alice").await;

        for uri in ["/", "/search?q=ali", "/u/alice", "/login", "/static/app.js"] {
            let response = app.clone().oneshot(get(uri)).await.unwrap();
            assert_eq!(response.status(), StatusCode::OK, "{uri}");
        }
    }

    #[tokio::test]
    async fn missing_things_redirect_to_not_found() {
        let (app, _) = app().await;
        let response = app.oneshot(get("/u/nobody")).await.unwrap();
        assert_eq!(location(&response), "/not-found");
    }

    #[tokio::test]
    async fn unknown_paths_go_to_not_found_even_when_anonymous() {
        let (app, _) = app().await;
        for uri in ["/nope", "/pin/x/y"] {
            let response = app.clone().oneshot(get(uri)).await.unwrap();
            assert_eq!(location(&response), "/not-found", "{uri}");
        }

        let response = app.oneshot(get("/profile")).await.unwrap();
        assert_eq!(location(&response), "/login?next=%2Fprofile");
    }

    #[tokio::test]
    async fn callback_failures_return_to_login_with_a_message() {
        let (router, _) = app().await;
        let response = router.clone().oneshot(get("/auth/callback?error=access_denied")).await.unwrap();
        assert_eq!(location(&response), "/login?error=access-denied&message=Sign-in-was-cancelled");

        let response = router.oneshot(get("/auth/callback?code=abc&state=xyz")).await.unwrap();
        assert_eq!(
            location(&response),
            "/login?error=invalid-state&message=Your-sign-in-request-could-not-be-verified"
        );
    }

    #[test]
    fn get_field_reports_missing_fields() {
        let body = json!({"sub": "1", "n": 2});
        assert_eq!(body.get_str_field("sub").unwrap(), "1");
        assert!(body.get_str_field("n").is_err());
        assert!(body.get_str_field("missing").is_err());
    }
}
