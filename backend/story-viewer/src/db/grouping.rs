//! Shapes flat story rows into per-owner sequences.

use crate::models::{Story, StorySequence};
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use uuid::Uuid;

/// One active story joined with its owner's profile.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct StoryRow {
    pub id: Uuid,
    pub user_id: Uuid,
    pub content_url: String,
    pub created_at: DateTime<Utc>,
    pub username: String,
    pub display_name: Option<String>,
    pub avatar_url: Option<String>,
}

/// Group rows by owner. Stories inside a sequence run oldest to newest;
/// sequences are ordered by their newest story, most recent first.
/// Rows with an empty media URL are dropped.
pub fn group_into_sequences(rows: Vec<StoryRow>) -> Vec<StorySequence> {
    let mut order: Vec<Uuid> = Vec::new();
    let mut grouped: HashMap<Uuid, (String, Option<String>, Vec<Story>)> = HashMap::new();

    for row in rows {
        if row.content_url.trim().is_empty() {
            tracing::debug!(story_id = %row.id, "skipping story without media url");
            continue;
        }

        let entry = grouped.entry(row.user_id).or_insert_with(|| {
            order.push(row.user_id);
            let name = row
                .display_name
                .clone()
                .filter(|n| !n.trim().is_empty())
                .unwrap_or_else(|| row.username.clone());
            (name, row.avatar_url.clone(), Vec::new())
        });

        entry.2.push(Story {
            id: row.id,
            owner_id: row.user_id,
            media_url: row.content_url,
            created_at: row.created_at,
        });
    }

    let mut sequences: Vec<StorySequence> = order
        .into_iter()
        .filter_map(|owner_id| {
            let (name, avatar, stories) = grouped.remove(&owner_id)?;
            StorySequence::new(owner_id, name, avatar, stories)
        })
        .collect();

    // stable: owners with equal newest timestamps keep row order
    sequences.sort_by(|a, b| b.newest_at().cmp(&a.newest_at()));
    sequences
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn row(user_id: Uuid, username: &str, minutes_ago: i64) -> StoryRow {
        StoryRow {
            id: Uuid::new_v4(),
            user_id,
            content_url: format!("https://cdn.example.com/{}/{}.jpg", username, minutes_ago),
            created_at: Utc::now() - Duration::minutes(minutes_ago),
            username: username.to_string(),
            display_name: None,
            avatar_url: None,
        }
    }

    #[test]
    fn test_groups_by_owner_newest_owner_first() {
        let ada = Uuid::new_v4();
        let bob = Uuid::new_v4();
        let rows = vec![
            row(ada, "ada", 300),
            row(bob, "bob", 10),
            row(ada, "ada", 120),
            row(bob, "bob", 200),
        ];

        let sequences = group_into_sequences(rows);

        assert_eq!(sequences.len(), 2);
        assert_eq!(sequences[0].owner_id, bob);
        assert_eq!(sequences[1].owner_id, ada);
        for seq in &sequences {
            let stories = seq.stories();
            assert!(stories.windows(2).all(|w| w[0].created_at <= w[1].created_at));
        }
    }

    #[test]
    fn test_display_name_falls_back_to_username() {
        let ada = Uuid::new_v4();
        let mut named = row(ada, "ada", 5);
        named.display_name = Some("  ".to_string());

        let sequences = group_into_sequences(vec![named]);
        assert_eq!(sequences[0].display_name, "ada");
    }

    #[test]
    fn test_owner_without_media_is_dropped() {
        let ada = Uuid::new_v4();
        let mut blank = row(ada, "ada", 5);
        blank.content_url = String::new();

        assert!(group_into_sequences(vec![blank]).is_empty());
    }
}
