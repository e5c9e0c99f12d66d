use axum::{
    debug_handler,
    http::header,
    response::{Html, IntoResponse, Redirect, Response},
};

use crate::db::{Pin, Profile};

pub const NOT_FOUND_PATH: &str = "/not-found";

#[macro_export]
macro_rules! include_res {
    (bytes, $p:expr) => {
        include_bytes!(concat!(env!("CARGO_MANIFEST_DIR"), "/res", $p))
    };
    (str, $p:expr) => {
        include_str!(concat!(env!("CARGO_MANIFEST_DIR"), "/res", $p))
    };
}

pub fn is_static_path(path: &str) -> bool {
    path.starts_with("/static/") || path == "/favicon.ico"
}

#[debug_handler]
pub async fn app_js() -> impl IntoResponse {
    (
        [(header::CONTENT_TYPE, "text/javascript; charset=utf-8")],
        include_res!(str, "/static/app.js"),
    )
}

#[debug_handler]
pub async fn style_css() -> impl IntoResponse {
    (
        [(header::CONTENT_TYPE, "text/css; charset=utf-8")],
        include_res!(str, "/static/style.css"),
    )
}

pub fn escape(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(c),
        }
    }
    out
}

/// Relative links, or absolute ones with an http(s) or mailto scheme.
fn safe_link(dest: &str) -> bool {
    match dest.split_once(':') {
        Some((scheme, _)) if !scheme.contains(['/', '?', '#']) => {
            matches!(scheme.to_ascii_lowercase().as_str(), "http" | "https" | "mailto")
        }
        _ => true,
    }
}

/// Renders user-written Markdown. Raw HTML in the source is shown as text and
/// link or image targets with any other scheme are replaced by `#`.
pub fn markdown(text: &str) -> String {
    use pulldown_cmark::{CowStr, Event, Options, Parser, Tag};

    let parser = Parser::new_ext(text, Options::ENABLE_STRIKETHROUGH).map(|event| match event {
        Event::Html(raw) | Event::InlineHtml(raw) => Event::Text(raw),
        Event::Start(Tag::Link { link_type, dest_url, title, id }) if !safe_link(&dest_url) => {
            Event::Start(Tag::Link { link_type, dest_url: CowStr::Borrowed("#"), title, id })
        }
        Event::Start(Tag::Image { link_type, dest_url, title, id }) if !safe_link(&dest_url) => {
            Event::Start(Tag::Image { link_type, dest_url: CowStr::Borrowed("#"), title, id })
        }
        _ => event,
    });

    let mut html_output = String::new();
    pulldown_cmark::html::push_html(&mut html_output, parser);
    html_output
}

/// Fills `{name}` placeholders in one pass, so values are never rescanned for
/// placeholders of their own.
pub fn render(template: &str, values: &[(&str, &str)]) -> String {
    let mut out = String::with_capacity(template.len());
    let mut rest = template;
    while let Some(open) = rest.find('{') {
        out.push_str(&rest[..open]);
        let after = &rest[open + 1..];
        let value = after.find('}').and_then(|close| {
            let name = &after[..close];
            values
                .iter()
                .find(|(key, _)| *key == name)
                .map(|(_, value)| (*value, close))
        });
        match value {
            Some((value, close)) => {
                out.push_str(value);
                rest = &after[close + 1..];
            }
            None => {
                out.push('{');
                rest = after;
            }
        }
    }
    out.push_str(rest);
    out
}

pub fn page(title: &str, signed_in: bool, body: &str) -> Html<String> {
    let nav = if signed_in {
        include_res!(str, "/pages/nav_user.html")
    } else {
        include_res!(str, "/pages/nav_guest.html")
    };
    Html(render(
        include_res!(str, "/pages/layout.html"),
        &[("title", escape(title).as_str()), ("nav", nav), ("body", body)],
    ))
}

pub fn not_found() -> Response {
    Redirect::to(NOT_FOUND_PATH).into_response()
}

/// Unknown routes.
#[debug_handler]
pub async fn fallback() -> Response {
    not_found()
}

#[debug_handler]
pub async fn not_found_page() -> impl IntoResponse {
    page("Not found", false, include_res!(str, "/pages/not_found.html"))
}

/// An error banner, or nothing.
pub fn alert(message: Option<&str>) -> String {
    match message {
        Some(message) => format!(r#"<p class="alert">{}</p>"#, escape(message)),
        None => String::new(),
    }
}

fn avatar(url: Option<&str>, name: &str) -> String {
    match url {
        Some(url) => format!(r#"<img class="avatar" src="{}" alt="">"#, escape(url)),
        None => format!(
            r#"<span class="avatar">{}</span>"#,
            escape(&name.chars().next().unwrap_or('?').to_uppercase().to_string())
        ),
    }
}

pub fn pin_card(pin: &Pin) -> String {
    let author = pin.author.full_name.as_deref().unwrap_or(&pin.author.username);
    render(
        include_res!(str, "/pages/pin_card.html"),
        &[
            ("id", pin.id.to_string().as_str()),
            ("image_url", escape(&pin.image_url).as_str()),
            ("width", pin.width.to_string().as_str()),
            ("height", pin.height.to_string().as_str()),
            ("title", escape(pin.title.as_deref().unwrap_or("")).as_str()),
            ("username", escape(&pin.author.username).as_str()),
            ("author", escape(author).as_str()),
            ("avatar", avatar(pin.author.avatar_url.as_deref(), author).as_str()),
        ],
    )
}

pub fn user_row(profile: &Profile) -> String {
    render(
        include_res!(str, "/pages/user_row.html"),
        &[
            ("username", escape(&profile.username).as_str()),
            ("display_name", escape(profile.display_name()).as_str()),
            ("avatar", avatar(profile.avatar_url.as_deref(), profile.display_name()).as_str()),
        ],
    )
}
