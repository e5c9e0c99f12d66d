use serde::Serialize;
use sqlx::{FromRow, QueryBuilder, Sqlite};
use uuid::Uuid;

use super::{DataError, DataResult, Db, is_unique_violation, parse_id, require_id, require_str, trimmed, web_url};

pub const SEARCH_LIMIT: i64 = 20;
pub const MIN_USERNAME_LEN: usize = 3;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Profile {
    pub id: Uuid,
    pub username: String,
    pub full_name: Option<String>,
    pub avatar_url: Option<String>,
    pub bio: Option<String>,
    pub website: Option<String>,
    pub created_at: String,
    pub updated_at: String,
}

impl Profile {
    pub fn display_name(&self) -> &str {
        self.full_name.as_deref().unwrap_or(&self.username)
    }
}

/// Fields to change on a profile. `None` leaves a field untouched; a blank
/// string clears an optional field.
#[derive(Debug, Default, Clone)]
pub struct ProfileUpdate {
    pub username: Option<String>,
    pub full_name: Option<String>,
    pub avatar_url: Option<String>,
    pub bio: Option<String>,
    pub website: Option<String>,
}

#[derive(FromRow)]
struct ProfileRow {
    id: String,
    username: String,
    full_name: Option<String>,
    avatar_url: Option<String>,
    bio: Option<String>,
    website: Option<String>,
    created_at: String,
    updated_at: String,
}

impl TryFrom<ProfileRow> for Profile {
    type Error = DataError;

    fn try_from(row: ProfileRow) -> DataResult<Profile> {
        Ok(Profile {
            id: parse_id(&row.id)?,
            username: row.username,
            full_name: row.full_name,
            avatar_url: row.avatar_url,
            bio: row.bio,
            website: row.website,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

const PROFILE_COLUMNS: &str = "id,username,full_name,avatar_url,bio,website,created_at,updated_at";

/// Usernames end up in `/u/{username}` paths.
pub fn is_username_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || matches!(c, '_' | '-' | '.')
}

pub fn validate_username(username: &str) -> DataResult<String> {
    let username = username.trim();
    if username.is_empty() {
        return Err(DataError::Validation("username cannot be blank".to_owned()));
    }
    if username.chars().count() < MIN_USERNAME_LEN {
        return Err(DataError::Validation(format!(
            "username must be at least {MIN_USERNAME_LEN} characters"
        )));
    }
    if !username.chars().all(is_username_char) {
        return Err(DataError::Validation(
            "username may only use letters, digits, '_', '-' and '.'".to_owned(),
        ));
    }
    Ok(username.to_owned())
}

/// Escapes LIKE wildcards so user input only ever matches literally.
fn like_pattern(query: &str) -> String {
    let mut pattern = String::with_capacity(query.len() + 2);
    pattern.push('%');
    for c in query.chars() {
        if matches!(c, '%' | '_' | '\\') {
            pattern.push('\\');
        }
        pattern.push(c);
    }
    pattern.push('%');
    pattern
}

impl Db {
    pub async fn fetch_profile(&self, id: Uuid) -> DataResult<Profile> {
        let id = require_id(id, "profile id")?;

        sqlx::query_as::<_, ProfileRow>(&format!("SELECT {PROFILE_COLUMNS} FROM profiles WHERE id=?"))
            .bind(id.to_string())
            .fetch_optional(self.pool())
            .await?
            .ok_or(DataError::NotFound("profile"))?
            .try_into()
    }

    pub async fn fetch_profile_by_username(&self, username: &str) -> DataResult<Profile> {
        let username = require_str(username, "username")?;

        sqlx::query_as::<_, ProfileRow>(&format!(
            "SELECT {PROFILE_COLUMNS} FROM profiles WHERE username=? COLLATE NOCASE"
        ))
        .bind(username)
        .fetch_optional(self.pool())
        .await?
        .ok_or(DataError::NotFound("profile"))?
        .try_into()
    }

    pub async fn update_profile(&self, id: Uuid, update: ProfileUpdate) -> DataResult<Profile> {
        let id = require_id(id, "profile id")?;
        let username = update.username.as_deref().map(validate_username).transpose()?;
        let avatar_url = update.avatar_url.map(|url| web_url(Some(url), "avatar URL")).transpose()?;
        let website = update.website.map(|url| web_url(Some(url), "website")).transpose()?;

        let mut query: QueryBuilder<Sqlite> =
            QueryBuilder::new("UPDATE profiles SET updated_at=strftime('%Y-%m-%dT%H:%M:%fZ','now')");
        if let Some(username) = username {
            query.push(", username=").push_bind(username);
        }
        let optional = [
            ("full_name", update.full_name.map(|name| trimmed(Some(name)))),
            ("avatar_url", avatar_url),
            ("bio", update.bio.map(|bio| trimmed(Some(bio)))),
            ("website", website),
        ];
        for (column, value) in optional {
            if let Some(value) = value {
                query.push(format!(", {column}=")).push_bind(value);
            }
        }
        query.push(" WHERE id=").push_bind(id.to_string());

        let result = query.build().execute(self.pool()).await.map_err(|e| {
            if is_unique_violation(&e, "profiles.username") {
                DataError::UsernameTaken
            } else {
                DataError::Store(e)
            }
        })?;
        if result.rows_affected() == 0 {
            return Err(DataError::NotFound("profile"));
        }

        tracing::info!(profile = %id, "profile updated");
        self.fetch_profile(id).await
    }

    /// Case-insensitive substring search over username or full name. SQLite
    /// only folds ASCII letters, so `É` and `é` stay distinct.
    pub async fn search_users(&self, query: &str) -> DataResult<Vec<Profile>> {
        let query = query.trim();
        if query.is_empty() {
            return Ok(Vec::new());
        }
        let pattern = like_pattern(query);

        let rows = sqlx::query_as::<_, ProfileRow>(&format!(
            "SELECT {PROFILE_COLUMNS} FROM profiles \
             WHERE username LIKE ?1 ESCAPE '\\' OR full_name LIKE ?1 ESCAPE '\\' \
             ORDER BY username COLLATE NOCASE LIMIT ?2"
        ))
        .bind(pattern)
        .bind(SEARCH_LIMIT)
        .fetch_all(self.pool())
        .await?;

        rows.into_iter().map(Profile::try_from).collect()
    }
}
