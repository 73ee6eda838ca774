// src/models/activity.rs

use serde::{Deserialize, Serialize};
use sqlx::FromRow;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "snake_case")]
#[sqlx(rename_all = "snake_case")]
pub enum ActivityVerb {
    CreatedRecipe,
    RatedRecipe,
    CreatedPost,
    CommentedPost,
    AskedQuestion,
    AnsweredQuestion,
    FollowedUser,
}

/// What an activity points at.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "snake_case")]
#[sqlx(rename_all = "snake_case")]
pub enum ActivityObject {
    Recipe,
    ForumPost,
    ForumComment,
    QaQuestion,
    QaAnswer,
    User,
}

/// One row of the activity stream, joined with the actor's username.
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct Activity {
    pub id: i64,
    pub actor_id: i64,
    pub actor_username: String,
    pub verb: ActivityVerb,
    pub object_type: ActivityObject,
    pub object_id: i64,
    pub created_at: chrono::DateTime<chrono::Utc>,
}

#[derive(Debug, Deserialize)]
pub struct ActivityListParams {
    pub cursor: Option<i64>,
    pub limit: Option<i64>,
}
