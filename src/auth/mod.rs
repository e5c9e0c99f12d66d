mod callback;
mod clients;
mod login;
mod logout;
mod password;
mod signup;

use axum::{Router, routing::get};

use crate::{AppState, res};

pub use clients::{CALLBACK_PATH, ClientProvider, Clients, ProviderKeys};
pub use password::{MIN_PASSWORD_LEN, hash_password, verify_password};

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/login", get(login::login_page).post(login::login))
        .route("/login/{provider}", get(login::oauth_start))
        .route("/signup", get(signup::signup_page).post(signup::signup))
        .route(CALLBACK_PATH, get(callback::auth_callback))
        .route("/logout", get(logout::logout).post(logout::logout))
}

/// Where to continue after authenticating. Only same-site paths are honoured.
pub(crate) fn safe_next(next: Option<&str>) -> String {
    match next {
        Some(next) if next.starts_with('/') && !next.starts_with("//") && !next.contains('\\') => next.to_owned(),
        _ => "/".to_owned(),
    }
}

/// `Human readable message` → `Human-readable-message`, for query strings.
pub(crate) fn hyphenate(message: &str) -> String {
    message.split_whitespace().collect::<Vec<_>>().join("-")
}

pub(crate) fn login_error(error: &str, message: &str) -> String {
    format!(
        "/login?error={}&message={}",
        urlencoding::encode(error),
        urlencoding::encode(&hyphenate(message))
    )
}

fn provider_buttons(clients: &Clients, next: &str) -> String {
    clients
        .enabled()
        .into_iter()
        .map(|provider| {
            format!(
                r#"<a class="primary" href="/login/{}?next={}">Continue with {}</a>"#,
                provider.id(),
                res::escape(&urlencoding::encode(next)),
                provider.label()
            )
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn next_must_stay_on_site() {
        assert_eq!(safe_next(Some("/pin/1?x=2")), "/pin/1?x=2");
        assert_eq!(safe_next(Some("https://evil.example")), "/");
        assert_eq!(safe_next(Some("//evil.example")), "/");
        assert_eq!(safe_next(Some("/\\evil.example")), "/");
        assert_eq!(safe_next(None), "/");
    }

    #[test]
    fn error_messages_are_hyphen_separated() {
        assert_eq!(
            login_error("exchange-failed", "Could not complete  sign in"),
            "/login?error=exchange-failed&message=Could-not-complete-sign-in"
        );
    }
}
