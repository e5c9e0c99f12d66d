use serde::Serialize;
use sqlx::FromRow;
use uuid::Uuid;

use super::{DataError, DataResult, Db, parse_id, require_id, require_page, trimmed, web_url};

/// Uploader summary joined onto every pin read.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PinAuthor {
    pub username: String,
    pub avatar_url: Option<String>,
    pub full_name: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Pin {
    pub id: Uuid,
    pub user_id: Uuid,
    pub image_url: String,
    pub title: Option<String>,
    pub description: Option<String>,
    pub width: u32,
    pub height: u32,
    pub created_at: String,
    pub author: PinAuthor,
}

#[derive(Debug, Default, Clone)]
pub struct NewPin {
    pub image_url: Option<String>,
    pub title: Option<String>,
    pub description: Option<String>,
    pub width: Option<u32>,
    pub height: Option<u32>,
}

#[derive(FromRow)]
struct PinRow {
    id: String,
    user_id: String,
    image_url: String,
    title: Option<String>,
    description: Option<String>,
    width: i64,
    height: i64,
    created_at: String,
    username: String,
    avatar_url: Option<String>,
    full_name: Option<String>,
}

impl TryFrom<PinRow> for Pin {
    type Error = DataError;

    fn try_from(row: PinRow) -> DataResult<Pin> {
        let dimension = |v: i64| {
            u32::try_from(v).map_err(|e| DataError::Store(sqlx::Error::Decode(Box::new(e))))
        };
        Ok(Pin {
            id: parse_id(&row.id)?,
            user_id: parse_id(&row.user_id)?,
            image_url: row.image_url,
            title: row.title,
            description: row.description,
            width: dimension(row.width)?,
            height: dimension(row.height)?,
            created_at: row.created_at,
            author: PinAuthor {
                username: row.username,
                avatar_url: row.avatar_url,
                full_name: row.full_name,
            },
        })
    }
}

const PIN_SELECT: &str = "SELECT p.id,p.user_id,p.image_url,p.title,p.description,p.width,p.height,p.created_at,\
    u.username,u.avatar_url,u.full_name \
    FROM pins p JOIN profiles u ON u.id=p.user_id";

const NEWEST_FIRST: &str = "ORDER BY p.created_at DESC, p.id DESC";

impl NewPin {
    /// Checks everything a pin needs before it may be written.
    fn validate(self) -> DataResult<(String, Option<String>, Option<String>, u32, u32)> {
        let Some(image_url) = web_url(self.image_url, "image URL")? else {
            return Err(DataError::Validation("an image URL is required".to_owned()));
        };
        let (Some(width), Some(height)) = (self.width, self.height) else {
            return Err(DataError::Validation("image width and height are required".to_owned()));
        };
        if width == 0 || height == 0 {
            return Err(DataError::Validation("image dimensions must be positive".to_owned()));
        }
        Ok((image_url, trimmed(self.title), trimmed(self.description), width, height))
    }
}

impl Db {
    pub async fn fetch_pins(&self, page: u32, page_size: u32) -> DataResult<Vec<Pin>> {
        let (limit, offset) = require_page(page, page_size)?;

        let rows = sqlx::query_as::<_, PinRow>(&format!("{PIN_SELECT} {NEWEST_FIRST} LIMIT ? OFFSET ?"))
            .bind(limit)
            .bind(offset)
            .fetch_all(self.pool())
            .await?;

        rows.into_iter().map(Pin::try_from).collect()
    }

    pub async fn fetch_pin(&self, id: Uuid) -> DataResult<Pin> {
        let id = require_id(id, "pin id")?;

        sqlx::query_as::<_, PinRow>(&format!("{PIN_SELECT} WHERE p.id=?"))
            .bind(id.to_string())
            .fetch_optional(self.pool())
            .await?
            .ok_or(DataError::NotFound("pin"))?
            .try_into()
    }

    pub async fn fetch_pins_by_user(&self, user_id: Uuid, page: u32, page_size: u32) -> DataResult<Vec<Pin>> {
        let user_id = require_id(user_id, "user id")?;
        let (limit, offset) = require_page(page, page_size)?;

        let rows = sqlx::query_as::<_, PinRow>(&format!(
            "{PIN_SELECT} WHERE p.user_id=? {NEWEST_FIRST} LIMIT ? OFFSET ?"
        ))
        .bind(user_id.to_string())
        .bind(limit)
        .bind(offset)
        .fetch_all(self.pool())
        .await?;

        rows.into_iter().map(Pin::try_from).collect()
    }

    /// Writes a pin owned by `owner`, the authenticated caller.
    pub async fn create_pin(&self, owner: Uuid, pin: NewPin) -> DataResult<Pin> {
        let owner = require_id(owner, "owner id")?;
        let (image_url, title, description, width, height) = pin.validate()?;

        let id = Uuid::now_v7();
        sqlx::query("INSERT INTO pins (id,user_id,image_url,title,description,width,height) VALUES (?,?,?,?,?,?,?)")
            .bind(id.to_string())
            .bind(owner.to_string())
            .bind(&image_url)
            .bind(title)
            .bind(description)
            .bind(i64::from(width))
            .bind(i64::from(height))
            .execute(self.pool())
            .await?;

        tracing::info!(pin = %id, owner = %owner, "pin created");
        self.fetch_pin(id).await
    }
}
