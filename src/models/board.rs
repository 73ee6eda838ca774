// src/models/board.rs

use serde::{Deserialize, Serialize};
use sqlx::{FromRow, types::Json};
use validator::Validate;

use crate::models::activity::{ActivityObject, ActivityVerb};

/// Names everything that differs between the forum and the Q&A board.
/// Both share one set of handlers and identical table layouts.
pub trait Board: Send + Sync + 'static {
    const THREADS: &'static str;
    const REPLIES: &'static str;
    const THREAD_VOTES: &'static str;
    const REPLY_VOTES: &'static str;

    /// Human-readable names used in error messages.
    const THREAD_LABEL: &'static str;
    const REPLY_LABEL: &'static str;

    const THREAD_VERB: ActivityVerb;
    const REPLY_VERB: ActivityVerb;
    const THREAD_OBJECT: ActivityObject;
    const REPLY_OBJECT: ActivityObject;
}

pub struct Forum;

impl Board for Forum {
    const THREADS: &'static str = "forum_posts";
    const REPLIES: &'static str = "forum_comments";
    const THREAD_VOTES: &'static str = "forum_post_votes";
    const REPLY_VOTES: &'static str = "forum_comment_votes";
    const THREAD_LABEL: &'static str = "Post";
    const REPLY_LABEL: &'static str = "Comment";
    const THREAD_VERB: ActivityVerb = ActivityVerb::CreatedPost;
    const REPLY_VERB: ActivityVerb = ActivityVerb::CommentedPost;
    const THREAD_OBJECT: ActivityObject = ActivityObject::ForumPost;
    const REPLY_OBJECT: ActivityObject = ActivityObject::ForumComment;
}

pub struct Qa;

impl Board for Qa {
    const THREADS: &'static str = "qa_questions";
    const REPLIES: &'static str = "qa_answers";
    const THREAD_VOTES: &'static str = "qa_question_votes";
    const REPLY_VOTES: &'static str = "qa_answer_votes";
    const THREAD_LABEL: &'static str = "Question";
    const REPLY_LABEL: &'static str = "Answer";
    const THREAD_VERB: ActivityVerb = ActivityVerb::AskedQuestion;
    const REPLY_VERB: ActivityVerb = ActivityVerb::AnsweredQuestion;
    const THREAD_OBJECT: ActivityObject = ActivityObject::QaQuestion;
    const REPLY_OBJECT: ActivityObject = ActivityObject::QaAnswer;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "lowercase")]
#[sqlx(rename_all = "lowercase")]
pub enum VoteType {
    Upvote,
    Downvote,
}

impl VoteType {
    /// Counter column on the voted row.
    pub fn counter(self) -> &'static str {
        match self {
            VoteType::Upvote => "upvote_count",
            VoteType::Downvote => "downvote_count",
        }
    }
}

/// A forum post or a question.
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct Thread {
    pub id: i64,
    pub author_id: i64,
    pub author_username: String,
    pub title: String,
    pub body: String,
    pub tags: Json<Vec<String>>,
    pub upvote_count: i64,
    pub downvote_count: i64,
    pub reply_count: i64,
    pub created_at: chrono::DateTime<chrono::Utc>,
    pub updated_at: chrono::DateTime<chrono::Utc>,
}

/// A forum comment or an answer.
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct Reply {
    pub id: i64,
    pub thread_id: i64,
    pub author_id: i64,
    pub author_username: String,
    pub body: String,
    pub upvote_count: i64,
    pub downvote_count: i64,
    pub created_at: chrono::DateTime<chrono::Utc>,
    pub updated_at: chrono::DateTime<chrono::Utc>,
}

fn validate_tags(tags: &[String]) -> Result<(), validator::ValidationError> {
    if tags.len() > 10 {
        return Err(validator::ValidationError::new("too_many_tags"));
    }
    for tag in tags {
        if tag.trim().is_empty() || tag.len() > 30 {
            return Err(validator::ValidationError::new("invalid_tag"));
        }
    }
    Ok(())
}

#[derive(Debug, Deserialize, Validate)]
pub struct CreateThreadRequest {
    #[validate(length(
        min = 1,
        max = 200,
        message = "Title length must be between 1 and 200 chars"
    ))]
    pub title: String,

    #[validate(length(
        min = 1,
        max = 10000,
        message = "Body length must be between 1 and 10000 chars"
    ))]
    pub body: String,

    #[serde(default)]
    #[validate(custom(function = validate_tags))]
    pub tags: Vec<String>,
}

#[derive(Debug, Deserialize, Validate)]
pub struct UpdateThreadRequest {
    #[validate(length(min = 1, max = 200))]
    pub title: Option<String>,
    #[validate(length(min = 1, max = 10000))]
    pub body: Option<String>,
    pub tags: Option<Vec<String>>,
}

impl UpdateThreadRequest {
    pub fn validate_tags(&self) -> Result<(), validator::ValidationError> {
        match &self.tags {
            Some(tags) => validate_tags(tags),
            None => Ok(()),
        }
    }
}

#[derive(Debug, Deserialize, Validate)]
pub struct ReplyRequest {
    #[validate(length(
        min = 1,
        max = 5000,
        message = "Reply must be between 1 and 5000 characters"
    ))]
    pub body: String,
}

#[derive(Debug, Deserialize)]
pub struct VoteRequest {
    pub vote_type: VoteType,
}

/// Query parameters for listing threads.
#[derive(Debug, Deserialize)]
pub struct ThreadListParams {
    /// Id of the last thread of the previous page.
    pub cursor: Option<i64>,
    pub limit: Option<i64>,
    /// Title search.
    pub q: Option<String>,
    /// Only threads carrying this tag.
    pub tag: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn vote_type_maps_to_counter_column() {
        assert_eq!(VoteType::Upvote.counter(), "upvote_count");
        assert_eq!(VoteType::Downvote.counter(), "downvote_count");
        let vote: VoteRequest = serde_json::from_str(r#"{"vote_type":"downvote"}"#).unwrap();
        assert_eq!(vote.vote_type, VoteType::Downvote);
    }

    #[test]
    fn thread_tags_are_bounded() {
        let too_many: Vec<String> = (0..11).map(|i| format!("tag{}", i)).collect();
        assert!(validate_tags(&too_many).is_err());
        assert!(validate_tags(&["vegan".to_string()]).is_ok());
    }
}
