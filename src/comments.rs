use crate::client::StoreClient;
use crate::errors::StoreError;
use crate::models::Comment;
use crate::storage::Collection;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::debug;

pub const MAX_COMMENT_CHARS: usize = 500;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum CommentOutcome {
    Added { comment: Comment },
    /// Target was removed in the meantime.
    Gone,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommentTarget {
    Habit,
    Report,
}

impl CommentTarget {
    fn collection(self) -> Collection {
        match self {
            CommentTarget::Habit => Collection::SharedHabits,
            CommentTarget::Report => Collection::SharedReports,
        }
    }
}

/// Trims the text and rejects empty or oversized comments.
pub fn normalize_text(text: &str) -> Result<String, String> {
    let trimmed = text.trim();
    if trimmed.is_empty() {
        return Err("comment text must not be empty".to_string());
    }
    if trimmed.chars().count() > MAX_COMMENT_CHARS {
        return Err(format!("comment must be at most {MAX_COMMENT_CHARS} characters"));
    }
    Ok(trimmed.to_string())
}

pub async fn add_comment(
    client: &StoreClient,
    target: CommentTarget,
    target_id: &str,
    author: &str,
    text: String,
) -> Result<CommentOutcome, StoreError> {
    let _guard = client.write().await;
    let existing = match target {
        CommentTarget::Habit => client.habit(target_id).await?.map(|habit| habit.comments),
        CommentTarget::Report => client.report(target_id).await?.map(|report| report.comments),
    };
    let Some(mut comments) = existing else {
        debug!("comment on missing {target:?} {target_id}");
        return Ok(CommentOutcome::Gone);
    };

    let comment = Comment {
        author: author.to_string(),
        text,
        timestamp: Utc::now(),
    };
    comments.push(comment.clone());

    match client
        .save_field(target.collection(), target_id, "comments", &comments)
        .await
    {
        Ok(()) => Ok(CommentOutcome::Added { comment }),
        Err(StoreError::NotFound { .. }) => Ok(CommentOutcome::Gone),
        Err(err) => Err(err),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::NewHabit;
    use crate::models::{Avatar, Category};
    use crate::storage::JsonStore;
    use crate::verification::check_habit;
    use std::sync::Arc;

    #[test]
    fn blank_comments_are_rejected() {
        assert!(normalize_text("   ").is_err());
        assert_eq!(normalize_text("  nice work ").unwrap(), "nice work");
        assert!(normalize_text(&"x".repeat(MAX_COMMENT_CHARS + 1)).is_err());
    }

    #[tokio::test]
    async fn same_author_may_comment_repeatedly() {
        let client = StoreClient::new(Arc::new(JsonStore::in_memory()));
        let habit = client
            .create_habit(NewHabit {
                user_id: "u1".to_string(),
                user_nickname: "owner".to_string(),
                user_avatar: Avatar::default(),
                category: Category::Paper,
                description: None,
                image_url: None,
            })
            .await
            .unwrap();

        for text in ["first", "second"] {
            let outcome =
                add_comment(&client, CommentTarget::Habit, &habit.id, "alice", text.into())
                    .await
                    .unwrap();
            assert!(matches!(outcome, CommentOutcome::Added { .. }));
        }
        let stored = client.habit(&habit.id).await.unwrap().unwrap();
        let texts: Vec<_> = stored.comments.iter().map(|c| c.text.as_str()).collect();
        assert_eq!(texts, vec!["first", "second"]);
        assert!(stored.comments.iter().all(|c| c.author == "alice"));
        assert!(stored.checks.is_empty());

        for endorser in ["a", "b", "c"] {
            check_habit(&client, &habit.id, endorser).await.unwrap();
        }
        let outcome = add_comment(&client, CommentTarget::Habit, &habit.id, "alice", "late".into())
            .await
            .unwrap();
        assert_eq!(outcome, CommentOutcome::Gone);
    }
}
