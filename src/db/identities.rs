use sqlx::FromRow;
use uuid::Uuid;

use super::{DataError, DataResult, Db, is_unique_violation, is_web_url, parse_id, profiles::{is_username_char, validate_username}, require_str};

pub const EMAIL_PROVIDER: &str = "email";

#[derive(Debug, Clone)]
pub struct Identity {
    pub id: Uuid,
    pub email: Option<String>,
    pub password_hash: Option<String>,
    pub provider: String,
}

/// What an OAuth provider told us about the user signing in.
#[derive(Debug, Clone)]
pub struct OAuthProfile {
    pub provider: &'static str,
    pub subject: String,
    pub username: Option<String>,
    pub full_name: Option<String>,
    pub avatar_url: Option<String>,
}

#[derive(FromRow)]
struct IdentityRow {
    id: String,
    email: Option<String>,
    password_hash: Option<String>,
    provider: String,
}

impl TryFrom<IdentityRow> for Identity {
    type Error = DataError;

    fn try_from(row: IdentityRow) -> DataResult<Identity> {
        Ok(Identity {
            id: parse_id(&row.id)?,
            email: row.email,
            password_hash: row.password_hash,
            provider: row.provider,
        })
    }
}

/// Turns a provider handle into something usable as a username, or nothing.
fn username_hint(raw: Option<&str>) -> Option<String> {
    let hint: String = raw?
        .chars()
        .filter(|c| is_username_char(*c))
        .take(32)
        .collect();
    validate_username(&hint).ok()
}

impl Db {
    pub async fn create_email_identity(&self, email: &str, password_hash: &str, username: &str) -> DataResult<Identity> {
        let email = require_str(email, "email")?;
        if !email.contains('@') {
            return Err(DataError::Validation("enter a valid email address".to_owned()));
        }
        let password_hash = require_str(password_hash, "password hash")?;
        let username = validate_username(username)?;

        let id = Uuid::now_v7();
        sqlx::query("INSERT INTO identities (id,email,password_hash,provider,username_hint) VALUES (?,?,?,?,?)")
            .bind(id.to_string())
            .bind(email)
            .bind(password_hash)
            .bind(EMAIL_PROVIDER)
            .bind(&username)
            .execute(self.pool())
            .await
            .map_err(|e| {
                if is_unique_violation(&e, "identities.email") {
                    DataError::EmailTaken
                } else if is_unique_violation(&e, "profiles.username") {
                    DataError::UsernameTaken
                } else {
                    DataError::Store(e)
                }
            })?;

        tracing::info!(identity = %id, %username, "email identity registered");
        Ok(Identity {
            id,
            email: Some(email.to_owned()),
            password_hash: Some(password_hash.to_owned()),
            provider: EMAIL_PROVIDER.to_owned(),
        })
    }

    pub async fn find_identity_by_email(&self, email: &str) -> DataResult<Identity> {
        let email = require_str(email, "email")?;

        sqlx::query_as::<_, IdentityRow>(
            "SELECT id,email,password_hash,provider FROM identities WHERE email=? COLLATE NOCASE AND provider=?",
        )
        .bind(email)
        .bind(EMAIL_PROVIDER)
        .fetch_optional(self.pool())
        .await?
        .ok_or(DataError::NotFound("identity"))?
        .try_into()
    }

    /// Looks the provider's subject up, registering a new identity (and with it
    /// a profile) the first time we see it.
    pub async fn find_or_create_oauth_identity(&self, oauth: OAuthProfile) -> DataResult<Identity> {
        let subject = require_str(&oauth.subject, "provider subject")?;

        let existing = sqlx::query_as::<_, IdentityRow>(
            "SELECT id,email,password_hash,provider FROM identities WHERE provider=? AND provider_subject=?",
        )
        .bind(oauth.provider)
        .bind(subject)
        .fetch_optional(self.pool())
        .await?;
        if let Some(row) = existing {
            return row.try_into();
        }

        let mut hint = username_hint(oauth.username.as_deref());
        loop {
            let id = Uuid::now_v7();
            let inserted = sqlx::query(
                "INSERT INTO identities (id,provider,provider_subject,username_hint,full_name_hint,avatar_url_hint) \
                 VALUES (?,?,?,?,?,?)",
            )
            .bind(id.to_string())
            .bind(oauth.provider)
            .bind(subject)
            .bind(&hint)
            .bind(&oauth.full_name)
            .bind(oauth.avatar_url.as_deref().filter(|url| is_web_url(url)))
            .execute(self.pool())
            .await;

            match inserted {
                Ok(_) => {
                    tracing::info!(identity = %id, provider = oauth.provider, "oauth identity registered");
                    return Ok(Identity {
                        id,
                        email: None,
                        password_hash: None,
                        provider: oauth.provider.to_owned(),
                    });
                }
                // fall back to a generated username
                Err(e) if hint.is_some() && is_unique_violation(&e, "profiles.username") => {
                    hint = None;
                }
                Err(e) => return Err(e.into()),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn github(subject: &str, login: &str) -> OAuthProfile {
        OAuthProfile {
            provider: "github",
            subject: subject.to_owned(),
            username: Some(login.to_owned()),
            full_name: Some("Octo Cat".to_owned()),
            avatar_url: None,
        }
    }

    #[tokio::test]
    async fn registering_creates_a_profile() {
        let db = Db::in_memory().await;
        let identity = db.create_email_identity("a@example.com", "phc", "alice").await.unwrap();

        let profile = db.fetch_profile(identity.id).await.unwrap();
        assert_eq!(profile.username, "alice");
        assert_eq!(db.find_identity_by_email("A@EXAMPLE.COM").await.unwrap().id, identity.id);
    }

    #[tokio::test]
    async fn duplicate_registrations_are_distinguished() {
        let db = Db::in_memory().await;
        db.create_email_identity("a@example.com", "phc", "alice").await.unwrap();

        let err = db.create_email_identity("a@example.com", "phc", "other").await.unwrap_err();
        assert!(matches!(err, DataError::EmailTaken));
        let err = db.create_email_identity("b@example.com", "phc", "Alice").await.unwrap_err();
        assert!(matches!(err, DataError::UsernameTaken));
        let err = db.create_email_identity("nope", "phc", "carol").await.unwrap_err();
        assert!(matches!(err, DataError::Validation(_)));
    }

    #[tokio::test]
    async fn oauth_identity_is_reused() {
        let db = Db::in_memory().await;
        let first = db.find_or_create_oauth_identity(github("42", "octocat")).await.unwrap();
        let again = db.find_or_create_oauth_identity(github("42", "octocat")).await.unwrap();
        assert_eq!(first.id, again.id);

        let profile = db.fetch_profile(first.id).await.unwrap();
        assert_eq!(profile.username, "octocat");
        assert_eq!(profile.full_name.as_deref(), Some("Octo Cat"));
    }

    #[tokio::test]
    async fn oauth_username_clash_falls_back_to_generated() {
        let db = Db::in_memory().await;
        db.seed_user("octocat").await;

        let identity = db.find_or_create_oauth_identity(github("7", "octocat")).await.unwrap();
        let profile = db.fetch_profile(identity.id).await.unwrap();
        assert!(profile.username.starts_with("user_"), "{}", profile.username);
    }

    #[tokio::test]
    async fn oauth_avatar_must_be_a_web_url() {
        let db = Db::in_memory().await;
        let bad = OAuthProfile { avatar_url: Some("javascript:alert(1)".to_owned()), ..github("1", "mallory") };
        let good = OAuthProfile { avatar_url: Some("https://a.example/o.png".to_owned()), ..github("2", "octocat") };

        let bad = db.find_or_create_oauth_identity(bad).await.unwrap();
        let good = db.find_or_create_oauth_identity(good).await.unwrap();
        assert_eq!(db.fetch_profile(bad.id).await.unwrap().avatar_url, None);
        assert_eq!(db.fetch_profile(good.id).await.unwrap().avatar_url.as_deref(), Some("https://a.example/o.png"));
    }

    #[test]
    fn hints_are_sanitised() {
        assert_eq!(username_hint(Some("jane doe!")), Some("janedoe".to_owned()));
        assert_eq!(username_hint(Some("a!")), None);
        assert_eq!(username_hint(None), None);
    }
}
