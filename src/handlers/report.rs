// src/handlers/report.rs

use axum::{
    Json,
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
};
use sqlx::{QueryBuilder, Sqlite, SqliteConnection, SqlitePool};
use validator::Validate;

use crate::{
    error::{AppError, is_unique_violation},
    handlers::{
        board::{is_live, soft_delete_reply, soft_delete_thread},
        recipe::soft_delete_recipe,
    },
    models::{
        board::{Board, Forum, Qa},
        page_limit,
        report::{
            AlreadyResolved, ContentType, CreateReportRequest, Report, ReportListParams,
            Resolution, ResolveReportRequest,
        },
    },
    utils::jwt::AuthUser,
};

const REPORT_COLUMNS: &str = "id, reporter_id, content_type, object_id, reason, description, \
     status, resolution, resolved_by, created_at, resolved_at";

fn content_table(content_type: ContentType) -> &'static str {
    match content_type {
        ContentType::Recipe => "recipes",
        ContentType::ForumPost => Forum::THREADS,
        ContentType::ForumComment => Forum::REPLIES,
        ContentType::QaQuestion => Qa::THREADS,
        ContentType::QaAnswer => Qa::REPLIES,
    }
}

async fn remove_content(
    conn: &mut SqliteConnection,
    content_type: ContentType,
    object_id: i64,
) -> Result<(), AppError> {
    match content_type {
        ContentType::Recipe => soft_delete_recipe(conn, object_id).await,
        ContentType::ForumPost => soft_delete_thread::<Forum>(conn, object_id).await,
        ContentType::ForumComment => soft_delete_reply::<Forum>(conn, object_id).await,
        ContentType::QaQuestion => soft_delete_thread::<Qa>(conn, object_id).await,
        ContentType::QaAnswer => soft_delete_reply::<Qa>(conn, object_id).await,
    }
}

/// Report a piece of content. One pending report per reporter and target.
pub async fn create_report(
    State(pool): State<SqlitePool>,
    user: AuthUser,
    Json(payload): Json<CreateReportRequest>,
) -> Result<impl IntoResponse, AppError> {
    payload.validate()?;

    if !is_live(&pool, content_table(payload.content_type), payload.object_id).await? {
        return Err(AppError::NotFound("Reported content not found".to_string()));
    }

    let description = payload
        .description
        .as_deref()
        .map(str::trim)
        .filter(|d| !d.is_empty());

    let report = sqlx::query_as::<_, Report>(&format!(
        r#"
        INSERT INTO reports (reporter_id, content_type, object_id, reason, description, created_at)
        VALUES ($1, $2, $3, $4, $5, $6)
        RETURNING {REPORT_COLUMNS}
        "#
    ))
    .bind(user.id)
    .bind(payload.content_type)
    .bind(payload.object_id)
    .bind(payload.reason)
    .bind(description)
    .bind(chrono::Utc::now())
    .fetch_one(&pool)
    .await
    .map_err(|e| {
        if is_unique_violation(&e) {
            AppError::Conflict("You already have a pending report on this content".to_string())
        } else {
            tracing::error!("Failed to create report: {:?}", e);
            AppError::from(e)
        }
    })?;

    tracing::info!(
        report_id = report.id,
        content_type = ?report.content_type,
        object_id = report.object_id,
        "Content reported"
    );

    Ok((StatusCode::CREATED, Json(report)))
}

async fn query_reports(
    pool: &SqlitePool,
    reporter_id: Option<i64>,
    params: &ReportListParams,
) -> Result<Vec<Report>, AppError> {
    let mut builder: QueryBuilder<Sqlite> =
        QueryBuilder::new(format!("SELECT {REPORT_COLUMNS} FROM reports WHERE 1 = 1"));

    if let Some(reporter_id) = reporter_id {
        builder.push(" AND reporter_id = ");
        builder.push_bind(reporter_id);
    }
    if let Some(status) = params.status {
        builder.push(" AND status = ");
        builder.push_bind(status);
    }
    if let Some(cursor) = params.cursor {
        builder.push(" AND id < ");
        builder.push_bind(cursor);
    }
    builder.push(" ORDER BY id DESC LIMIT ");
    builder.push_bind(page_limit(params.limit));

    Ok(builder.build_query_as::<Report>().fetch_all(pool).await?)
}

/// Reports filed by the caller.
pub async fn list_my_reports(
    State(pool): State<SqlitePool>,
    user: AuthUser,
    Query(params): Query<ReportListParams>,
) -> Result<impl IntoResponse, AppError> {
    Ok(Json(query_reports(&pool, Some(user.id), &params).await?))
}

/// Moderation queue (Admin).
pub async fn list_reports(
    State(pool): State<SqlitePool>,
    Query(params): Query<ReportListParams>,
) -> Result<impl IntoResponse, AppError> {
    Ok(Json(query_reports(&pool, None, &params).await?))
}

/// Resolve a pending report (Admin).
///
/// `remove_content` soft-deletes the target and closes every other pending
/// report on it as well.
pub async fn resolve_report(
    State(pool): State<SqlitePool>,
    admin: AuthUser,
    Path(id): Path<i64>,
    Json(payload): Json<ResolveReportRequest>,
) -> Result<impl IntoResponse, AppError> {
    let mut tx = pool.begin().await?;

    // The no-op write takes the lock before the status is read.
    let report = sqlx::query_as::<_, Report>(&format!(
        "UPDATE reports SET status = status WHERE id = $1 RETURNING {REPORT_COLUMNS}"
    ))
    .bind(id)
    .fetch_optional(&mut *tx)
    .await?
    .ok_or(AppError::NotFound("Report not found".to_string()))?;

    let (status, resolution) = report
        .status
        .resolve(payload.action)
        .map_err(|AlreadyResolved| AppError::Conflict("Report is already resolved".to_string()))?;

    let now = chrono::Utc::now();

    if resolution == Resolution::ContentRemoved {
        match remove_content(&mut tx, report.content_type, report.object_id).await {
            // Already gone through another path; the report still closes.
            Ok(()) | Err(AppError::NotFound(_)) => {}
            Err(e) => return Err(e),
        }

        sqlx::query(
            r#"
            UPDATE reports
            SET status = $1, resolution = $2, resolved_by = $3, resolved_at = $4
            WHERE content_type = $5 AND object_id = $6 AND status = 'pending' AND id <> $7
            "#,
        )
        .bind(status)
        .bind(resolution)
        .bind(admin.id)
        .bind(now)
        .bind(report.content_type)
        .bind(report.object_id)
        .bind(id)
        .execute(&mut *tx)
        .await?;
    }

    let resolved = sqlx::query_as::<_, Report>(&format!(
        r#"
        UPDATE reports
        SET status = $1, resolution = $2, resolved_by = $3, resolved_at = $4
        WHERE id = $5
        RETURNING {REPORT_COLUMNS}
        "#
    ))
    .bind(status)
    .bind(resolution)
    .bind(admin.id)
    .bind(now)
    .bind(id)
    .fetch_one(&mut *tx)
    .await?;

    tx.commit().await?;

    tracing::info!(report_id = id, resolution = ?resolution, by = admin.id, "Report resolved");

    Ok(Json(resolved))
}
