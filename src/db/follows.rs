use uuid::Uuid;

use super::{DataError, DataResult, Db, require_id};

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct FollowCounts {
    pub followers: i64,
    pub following: i64,
}

impl Db {
    /// Idempotent: following someone twice is not an error.
    pub async fn follow(&self, follower: Uuid, followee: Uuid) -> DataResult<()> {
        let follower = require_id(follower, "follower id")?;
        let followee = require_id(followee, "followee id")?;
        if follower == followee {
            return Err(DataError::Validation("you cannot follow yourself".to_owned()));
        }

        sqlx::query("INSERT OR IGNORE INTO follows (follower_id,followee_id) VALUES (?,?)")
            .bind(follower.to_string())
            .bind(followee.to_string())
            .execute(self.pool())
            .await?;
        Ok(())
    }

    pub async fn unfollow(&self, follower: Uuid, followee: Uuid) -> DataResult<()> {
        let follower = require_id(follower, "follower id")?;
        let followee = require_id(followee, "followee id")?;

        sqlx::query("DELETE FROM follows WHERE follower_id=? AND followee_id=?")
            .bind(follower.to_string())
            .bind(followee.to_string())
            .execute(self.pool())
            .await?;
        Ok(())
    }

    pub async fn is_following(&self, follower: Uuid, followee: Uuid) -> DataResult<bool> {
        let follower = require_id(follower, "follower id")?;
        let followee = require_id(followee, "followee id")?;

        Ok(sqlx::query("SELECT 1 FROM follows WHERE follower_id=? AND followee_id=?")
            .bind(follower.to_string())
            .bind(followee.to_string())
            .fetch_optional(self.pool())
            .await?
            .is_some())
    }

    pub async fn follow_counts(&self, user_id: Uuid) -> DataResult<FollowCounts> {
        let user_id = require_id(user_id, "user id")?;

        let (followers, following): (i64, i64) = sqlx::query_as(
            "SELECT (SELECT count(*) FROM follows WHERE followee_id=?1), \
                    (SELECT count(*) FROM follows WHERE follower_id=?1)",
        )
        .bind(user_id.to_string())
        .fetch_one(self.pool())
        .await?;

        Ok(FollowCounts { followers, following })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn follow_round_trip() {
        let db = Db::in_memory().await;
        let alice = db.seed_user("alice").await;
        let bob = db.seed_user("bob").await;

        db.follow(alice, bob).await.unwrap();
        db.follow(alice, bob).await.unwrap();
        assert!(db.is_following(alice, bob).await.unwrap());
        assert!(!db.is_following(bob, alice).await.unwrap());
        assert_eq!(db.follow_counts(bob).await.unwrap(), FollowCounts { followers: 1, following: 0 });
        assert_eq!(db.follow_counts(alice).await.unwrap(), FollowCounts { followers: 0, following: 1 });

        db.unfollow(alice, bob).await.unwrap();
        assert!(!db.is_following(alice, bob).await.unwrap());
    }

    #[tokio::test]
    async fn following_yourself_is_rejected() {
        let db = Db::in_memory().await;
        let alice = db.seed_user("alice").await;
        assert!(matches!(db.follow(alice, alice).await, Err(DataError::Validation(_))));
    }
}
