use super::{group_into_sequences, LikeStore, StoryDataSource, StoryRow};
use crate::error::Result;
use crate::models::{LikeState, StorySequence};
use sqlx::PgPool;
use uuid::Uuid;

/// Postgres-backed story and like storage
#[derive(Clone)]
pub struct PgStoryRepository {
    pool: PgPool,
}

impl PgStoryRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    fn is_missing_table(err: &sqlx::Error) -> bool {
        err.as_database_error()
            .and_then(|db_err| db_err.code())
            .map(|code| code == "42P01")
            .unwrap_or(false)
    }
}

#[async_trait::async_trait]
impl StoryDataSource for PgStoryRepository {
    async fn list_active_story_sequences(
        &self,
        viewer_id: Uuid,
        window_hours: i32,
    ) -> Result<Vec<StorySequence>> {
        // Visibility:
        // - public: everyone
        // - followers: only accounts following the owner
        // - close_friends: only the owner's close friends list
        // - the viewer always sees their own stories
        let rows = sqlx::query_as::<_, StoryRow>(
            r#"
            SELECT s.id, s.user_id, s.content_url, s.created_at,
                   u.username, u.display_name, u.avatar_url
            FROM stories s
            JOIN users u ON u.id = s.user_id
            WHERE s.deleted_at IS NULL
              AND s.expires_at > NOW()
              AND s.created_at > NOW() - make_interval(hours => $2)
              AND (
                    s.privacy_level = 'public'
                 OR (s.privacy_level = 'followers' AND EXISTS (
                        SELECT 1 FROM follows f
                        WHERE f.follower_id = $1 AND f.following_id = s.user_id
                    ))
                 OR (s.privacy_level = 'close_friends' AND EXISTS (
                        SELECT 1 FROM story_close_friends cf
                        WHERE cf.owner_id = s.user_id AND cf.friend_id = $1
                    ))
                 OR s.user_id = $1
              )
            ORDER BY s.created_at ASC
            "#,
        )
        .bind(viewer_id)
        .bind(window_hours)
        .fetch_all(&self.pool)
        .await?;

        let sequences = group_into_sequences(rows);
        tracing::debug!(
            viewer_id = %viewer_id,
            sequences = sequences.len(),
            "loaded active story sequences"
        );
        Ok(sequences)
    }

    async fn record_view(&self, story_id: Uuid, viewer_id: Uuid) -> Result<()> {
        let result = sqlx::query(
            r#"INSERT INTO story_views (story_id, viewer_id) VALUES ($1, $2)
               ON CONFLICT (story_id, viewer_id) DO NOTHING"#,
        )
        .bind(story_id)
        .bind(viewer_id)
        .execute(&self.pool)
        .await;

        match result {
            Ok(_) => Ok(()),
            Err(err) if Self::is_missing_table(&err) => {
                tracing::debug!(
                    "story view skipped because table does not exist (migration pending)"
                );
                Ok(())
            }
            Err(err) => Err(err.into()),
        }
    }
}

#[async_trait::async_trait]
impl LikeStore for PgStoryRepository {
    async fn fetch_like_state(&self, story_id: Uuid, viewer_id: Uuid) -> Result<LikeState> {
        let (count, is_liked): (i64, bool) = sqlx::query_as(
            r#"
            SELECT COUNT(*), COALESCE(BOOL_OR(user_id = $2), FALSE)
            FROM story_likes
            WHERE story_id = $1
            "#,
        )
        .bind(story_id)
        .bind(viewer_id)
        .fetch_one(&self.pool)
        .await?;

        Ok(LikeState::new(is_liked, count))
    }

    /// Idempotent: liking an already liked story is a no-op
    async fn insert_like(&self, story_id: Uuid, viewer_id: Uuid) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO story_likes (story_id, user_id)
            VALUES ($1, $2)
            ON CONFLICT (story_id, user_id) DO NOTHING
            "#,
        )
        .bind(story_id)
        .bind(viewer_id)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Idempotent: unliking a story that is not liked is a no-op
    async fn delete_like(&self, story_id: Uuid, viewer_id: Uuid) -> Result<()> {
        sqlx::query(r#"DELETE FROM story_likes WHERE story_id = $1 AND user_id = $2"#)
            .bind(story_id)
            .bind(viewer_id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}
