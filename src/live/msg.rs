use serde::{Deserialize, Serialize};

use crate::{db::DataError, pagination::FeedKey};

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientMessage {
    Mount {
        path: String,
        #[serde(default)]
        feed: Option<FeedKey>,
    },
    LoadMore,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerMessage {
    Items { html: String, exhausted: bool },
    Error { message: String },
    Redirect { to: String },
    Refresh,
}

impl ServerMessage {
    pub fn failed(err: &DataError) -> ServerMessage {
        let message = if err.is_user_facing() {
            err.to_string()
        } else {
            "Could not load more pins".to_owned()
        };
        ServerMessage::Error { message }
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;
    use uuid::Uuid;

    use super::*;

    #[test]
    fn mount_with_and_without_a_feed() {
        let user_id = Uuid::now_v7();
        let msg: ClientMessage = serde_json::from_value(json!({
            "type": "mount",
            "path": "/u/alice",
            "feed": {"kind": "owner", "user_id": user_id},
        }))
        .unwrap();
        assert_eq!(msg, ClientMessage::Mount {
            path: "/u/alice".to_owned(),
            feed: Some(FeedKey::Owner { user_id }),
        });

        let msg: ClientMessage = serde_json::from_str(r#"{"type":"mount","path":"/settings/profile"}"#).unwrap();
        assert_eq!(msg, ClientMessage::Mount { path: "/settings/profile".to_owned(), feed: None });

        let msg: ClientMessage = serde_json::from_str(r#"{"type":"load_more"}"#).unwrap();
        assert_eq!(msg, ClientMessage::LoadMore);
    }

    #[test]
    fn server_messages_are_tagged() {
        assert_eq!(
            serde_json::to_value(ServerMessage::Items { html: "<a>".to_owned(), exhausted: true }).unwrap(),
            json!({"type": "items", "html": "<a>", "exhausted": true})
        );
        assert_eq!(serde_json::to_value(ServerMessage::Refresh).unwrap(), json!({"type": "refresh"}));
        assert_eq!(
            serde_json::to_value(ServerMessage::Redirect { to: "/".to_owned() }).unwrap(),
            json!({"type": "redirect", "to": "/"})
        );
    }

    #[test]
    fn store_failures_are_not_leaked() {
        let msg = ServerMessage::failed(&DataError::Store(sqlx::Error::PoolClosed));
        assert_eq!(msg, ServerMessage::Error { message: "Could not load more pins".to_owned() });
    }
}
