//! Data access for the relational store.
//!
//! Every function here validates its identifiers before touching the store,
//! issues parameterized queries, and maps raw rows into domain types. Failures
//! come back as [`DataError`]; nothing in this module panics on bad input.

mod follows;
mod identities;
mod pins;
mod profiles;

use std::str::FromStr;

use sqlx::{
    SqlitePool,
    sqlite::{SqliteConnectOptions, SqlitePoolOptions},
};
use thiserror::Error;
use uuid::Uuid;

pub use follows::FollowCounts;
pub use identities::{Identity, OAuthProfile};
pub use pins::{NewPin, Pin, PinAuthor};
pub use profiles::{Profile, ProfileUpdate, SEARCH_LIMIT, is_username_char, validate_username};

#[derive(Debug, Error)]
pub enum DataError {
    #[error("{0} is required")]
    InvalidArgument(&'static str),
    #[error("{0}")]
    Validation(String),
    #[error("{0} not found")]
    NotFound(&'static str),
    #[error("username is already taken")]
    UsernameTaken,
    #[error("email is already registered")]
    EmailTaken,
    #[error(transparent)]
    Store(#[from] sqlx::Error),
}

impl DataError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, DataError::NotFound(_))
    }

    /// Errors the user can fix by changing their input.
    pub fn is_user_facing(&self) -> bool {
        matches!(
            self,
            DataError::InvalidArgument(_)
                | DataError::Validation(_)
                | DataError::UsernameTaken
                | DataError::EmailTaken
        )
    }
}

pub type DataResult<T> = Result<T, DataError>;

#[derive(Clone)]
pub struct Db {
    pool: SqlitePool,
}

impl Db {
    pub async fn connect(url: &str) -> DataResult<Db> {
        let options = SqliteConnectOptions::from_str(url)?
            .create_if_missing(true)
            .foreign_keys(true);

        let pool = SqlitePoolOptions::new()
            .max_connections(16)
            .connect_with(options)
            .await?;

        Ok(Db { pool })
    }

    pub async fn migrate(&self) -> Result<(), sqlx::migrate::MigrateError> {
        sqlx::migrate!("./migrations").run(&self.pool).await
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// A private in-memory database with the schema applied. The pool keeps a
    /// single connection alive forever, otherwise the database would vanish.
    #[cfg(test)]
    pub(crate) async fn in_memory() -> Db {
        let options = SqliteConnectOptions::from_str("sqlite::memory:")
            .unwrap()
            .foreign_keys(true);
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect_with(options)
            .await
            .unwrap();
        let db = Db { pool };
        db.migrate().await.unwrap();
        db
    }

    #[cfg(test)]
    pub(crate) async fn seed_user(&self, username: &str) -> Uuid {
        self.create_email_identity(&format!("{username}@example.com"), "phc-unused", username)
            .await
            .unwrap()
            .id
    }
}

fn require_id(id: Uuid, what: &'static str) -> DataResult<Uuid> {
    if id.is_nil() {
        return Err(DataError::InvalidArgument(what));
    }
    Ok(id)
}

fn require_str<'a>(value: &'a str, what: &'static str) -> DataResult<&'a str> {
    let value = value.trim();
    if value.is_empty() {
        return Err(DataError::InvalidArgument(what));
    }
    Ok(value)
}

fn require_page(page: u32, page_size: u32) -> DataResult<(i64, i64)> {
    if page == 0 {
        return Err(DataError::InvalidArgument("page (starting at 1)"));
    }
    if page_size == 0 {
        return Err(DataError::InvalidArgument("page size"));
    }
    let limit = i64::from(page_size);
    Ok((limit, (i64::from(page) - 1) * limit))
}

fn parse_id(raw: &str) -> DataResult<Uuid> {
    Uuid::parse_str(raw).map_err(|e| DataError::Store(sqlx::Error::Decode(Box::new(e))))
}

/// Trims a free-text field, mapping blank input to `None`.
fn trimmed(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_owned())
        .filter(|v| !v.is_empty())
}

/// Absolute `http://` or `https://` URL.
pub fn is_web_url(url: &str) -> bool {
    let (scheme, rest) = url.split_once("://").unwrap_or(("", ""));
    matches!(scheme.to_ascii_lowercase().as_str(), "http" | "https") && !rest.is_empty()
}

/// Like [`trimmed`], but anything left must be a web URL.
fn web_url(value: Option<String>, what: &str) -> DataResult<Option<String>> {
    match trimmed(value) {
        Some(url) if !is_web_url(&url) => Err(DataError::Validation(format!("{what} must start with http:// or https://"))),
        url => Ok(url),
    }
}

fn is_unique_violation(err: &sqlx::Error, column: &str) -> bool {
    match err {
        sqlx::Error::Database(db_err) => db_err.is_unique_violation() && db_err.message().contains(column),
        _ => false,
    }
}
