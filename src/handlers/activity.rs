// src/handlers/activity.rs

use axum::{
    Json,
    extract::{Query, State},
    response::IntoResponse,
};
use sqlx::{SqliteConnection, SqlitePool};

use crate::{
    error::AppError,
    models::{
        activity::{Activity, ActivityListParams, ActivityObject, ActivityVerb},
        page_limit,
    },
    utils::jwt::AuthUser,
};

/// Appends an entry to the actor's activity log.
/// Called inside the transaction of the action being logged.
pub(crate) async fn record_activity(
    conn: &mut SqliteConnection,
    actor_id: i64,
    verb: ActivityVerb,
    object_type: ActivityObject,
    object_id: i64,
) -> Result<(), AppError> {
    sqlx::query(
        r#"
        INSERT INTO activities (actor_id, verb, object_type, object_id, created_at)
        VALUES ($1, $2, $3, $4, $5)
        "#,
    )
    .bind(actor_id)
    .bind(verb)
    .bind(object_type)
    .bind(object_id)
    .bind(chrono::Utc::now())
    .execute(&mut *conn)
    .await?;
    Ok(())
}

/// Activity of everyone the caller follows, newest first.
/// Entries pointing at soft-deleted content are left out.
pub async fn activity_stream(
    State(pool): State<SqlitePool>,
    user: AuthUser,
    Query(params): Query<ActivityListParams>,
) -> Result<impl IntoResponse, AppError> {
    let limit = page_limit(params.limit);

    let activities = sqlx::query_as::<_, Activity>(
        r#"
        SELECT a.id, a.actor_id, u.username AS actor_username,
               a.verb, a.object_type, a.object_id, a.created_at
        FROM activities a
        JOIN user_follows f ON f.followed_id = a.actor_id AND f.follower_id = $1
        JOIN users u ON u.id = a.actor_id
        WHERE ($2 IS NULL OR a.id < $2)
          AND CASE a.object_type
                WHEN 'recipe' THEN EXISTS
                    (SELECT 1 FROM recipes o WHERE o.id = a.object_id AND o.deleted_on IS NULL)
                WHEN 'forum_post' THEN EXISTS
                    (SELECT 1 FROM forum_posts o WHERE o.id = a.object_id AND o.deleted_on IS NULL)
                WHEN 'forum_comment' THEN EXISTS
                    (SELECT 1 FROM forum_comments o WHERE o.id = a.object_id AND o.deleted_on IS NULL)
                WHEN 'qa_question' THEN EXISTS
                    (SELECT 1 FROM qa_questions o WHERE o.id = a.object_id AND o.deleted_on IS NULL)
                WHEN 'qa_answer' THEN EXISTS
                    (SELECT 1 FROM qa_answers o WHERE o.id = a.object_id AND o.deleted_on IS NULL)
                ELSE 1
              END
        ORDER BY a.id DESC
        LIMIT $3
        "#,
    )
    .bind(user.id)
    .bind(params.cursor)
    .bind(limit)
    .fetch_all(&pool)
    .await
    .map_err(|e| {
        tracing::error!("Failed to load activity stream: {:?}", e);
        AppError::InternalServerError(e.to_string())
    })?;

    Ok(Json(activities))
}
