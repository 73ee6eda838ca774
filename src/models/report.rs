// src/models/report.rs

use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use validator::Validate;

/// Kinds of content a report can point at.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "snake_case")]
#[sqlx(rename_all = "snake_case")]
pub enum ContentType {
    Recipe,
    ForumPost,
    ForumComment,
    QaQuestion,
    QaAnswer,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "snake_case")]
#[sqlx(rename_all = "snake_case")]
pub enum ReportReason {
    Spam,
    Inappropriate,
    Harassment,
    Misinformation,
    Other,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "snake_case")]
#[sqlx(rename_all = "snake_case")]
pub enum ReportStatus {
    Pending,
    Resolved,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "snake_case")]
#[sqlx(rename_all = "snake_case")]
pub enum Resolution {
    Dismissed,
    ContentRemoved,
}

/// What a moderator does with a pending report.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResolveAction {
    Dismiss,
    RemoveContent,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AlreadyResolved;

impl ReportStatus {
    /// The only transition is pending → resolved.
    pub fn resolve(self, action: ResolveAction) -> Result<(ReportStatus, Resolution), AlreadyResolved> {
        match self {
            ReportStatus::Pending => {
                let resolution = match action {
                    ResolveAction::Dismiss => Resolution::Dismissed,
                    ResolveAction::RemoveContent => Resolution::ContentRemoved,
                };
                Ok((ReportStatus::Resolved, resolution))
            }
            ReportStatus::Resolved => Err(AlreadyResolved),
        }
    }
}

/// Represents the 'reports' table.
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct Report {
    pub id: i64,
    pub reporter_id: i64,
    pub content_type: ContentType,
    pub object_id: i64,
    pub reason: ReportReason,
    pub description: Option<String>,
    pub status: ReportStatus,
    pub resolution: Option<Resolution>,
    pub resolved_by: Option<i64>,
    pub created_at: chrono::DateTime<chrono::Utc>,
    pub resolved_at: Option<chrono::DateTime<chrono::Utc>>,
}

#[derive(Debug, Deserialize, Validate)]
pub struct CreateReportRequest {
    pub content_type: ContentType,
    pub object_id: i64,
    pub reason: ReportReason,
    #[validate(length(max = 2000))]
    pub description: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct ResolveReportRequest {
    pub action: ResolveAction,
}

#[derive(Debug, Deserialize)]
pub struct ReportListParams {
    pub status: Option<ReportStatus>,
    pub cursor: Option<i64>,
    pub limit: Option<i64>,
}
