// src/handlers/board.rs
//
// Forum and Q&A handlers. Every handler is generic over the `Board` it serves
// and is mounted once per board in `routes.rs`.

use axum::{
    Json,
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
};
use serde_json::json;
use sqlx::{Executor, QueryBuilder, Sqlite, SqliteConnection, SqlitePool, types::Json as SqlJson};
use validator::Validate;

use crate::{
    error::AppError,
    handlers::activity::record_activity,
    models::{
        board::{
            Board, CreateThreadRequest, Reply, ReplyRequest, Thread, ThreadListParams,
            UpdateThreadRequest, VoteRequest, VoteType,
        },
        page_limit,
    },
    utils::{
        html::{clean_all, clean_html},
        jwt::AuthUser,
    },
};

fn thread_select<B: Board>() -> String {
    format!(
        r#"
        SELECT t.id, t.author_id, u.username AS author_username, t.title, t.body, t.tags,
               t.upvote_count, t.downvote_count, t.reply_count, t.created_at, t.updated_at
        FROM {} t
        JOIN users u ON u.id = t.author_id
        "#,
        B::THREADS
    )
}

fn reply_select<B: Board>() -> String {
    format!(
        r#"
        SELECT c.id, c.thread_id, c.author_id, u.username AS author_username, c.body,
               c.upvote_count, c.downvote_count, c.created_at, c.updated_at
        FROM {} c
        JOIN users u ON u.id = c.author_id
        "#,
        B::REPLIES
    )
}

async fn fetch_thread<'e, B, E>(executor: E, id: i64) -> Result<Thread, AppError>
where
    B: Board,
    E: Executor<'e, Database = Sqlite>,
{
    sqlx::query_as::<_, Thread>(&format!(
        "{} WHERE t.id = $1 AND t.deleted_on IS NULL",
        thread_select::<B>()
    ))
    .bind(id)
    .fetch_optional(executor)
    .await?
    .ok_or_else(|| AppError::NotFound(format!("{} not found", B::THREAD_LABEL)))
}

async fn fetch_reply<'e, B, E>(executor: E, id: i64) -> Result<Reply, AppError>
where
    B: Board,
    E: Executor<'e, Database = Sqlite>,
{
    sqlx::query_as::<_, Reply>(&format!(
        "{} WHERE c.id = $1 AND c.deleted_on IS NULL",
        reply_select::<B>()
    ))
    .bind(id)
    .fetch_optional(executor)
    .await?
    .ok_or_else(|| AppError::NotFound(format!("{} not found", B::REPLY_LABEL)))
}

/// Takes the write lock on a live row of `table` and returns its author.
async fn lock_live(
    conn: &mut SqliteConnection,
    table: &str,
    label: &str,
    id: i64,
) -> Result<i64, AppError> {
    sqlx::query_scalar::<_, i64>(&format!(
        "UPDATE {table} SET updated_at = updated_at WHERE id = $1 AND deleted_on IS NULL RETURNING author_id"
    ))
    .bind(id)
    .fetch_optional(&mut *conn)
    .await?
    .ok_or_else(|| AppError::NotFound(format!("{label} not found")))
}

/// Soft-deletes a thread together with its replies and every vote on either.
pub(crate) async fn soft_delete_thread<B: Board>(conn: &mut SqliteConnection, id: i64) -> Result<(), AppError> {
    let now = chrono::Utc::now();

    let deleted = sqlx::query(&format!(
        "UPDATE {} SET deleted_on = $1 WHERE id = $2 AND deleted_on IS NULL",
        B::THREADS
    ))
    .bind(now)
    .bind(id)
    .execute(&mut *conn)
    .await?
    .rows_affected();

    if deleted == 0 {
        return Err(AppError::NotFound(format!("{} not found", B::THREAD_LABEL)));
    }

    sqlx::query(&format!(
        "UPDATE {} SET deleted_on = $1 WHERE deleted_on IS NULL AND target_id IN (SELECT id FROM {} WHERE thread_id = $2)",
        B::REPLY_VOTES,
        B::REPLIES
    ))
    .bind(now)
    .bind(id)
    .execute(&mut *conn)
    .await?;

    sqlx::query(&format!(
        "UPDATE {} SET deleted_on = $1 WHERE thread_id = $2 AND deleted_on IS NULL",
        B::REPLIES
    ))
    .bind(now)
    .bind(id)
    .execute(&mut *conn)
    .await?;

    sqlx::query(&format!(
        "UPDATE {} SET deleted_on = $1 WHERE target_id = $2 AND deleted_on IS NULL",
        B::THREAD_VOTES
    ))
    .bind(now)
    .bind(id)
    .execute(&mut *conn)
    .await?;

    Ok(())
}

/// Soft-deletes a reply and its votes, releasing it from the thread's count.
pub(crate) async fn soft_delete_reply<B: Board>(conn: &mut SqliteConnection, id: i64) -> Result<(), AppError> {
    let now = chrono::Utc::now();

    let thread_id = sqlx::query_scalar::<_, i64>(&format!(
        "UPDATE {} SET deleted_on = $1 WHERE id = $2 AND deleted_on IS NULL RETURNING thread_id",
        B::REPLIES
    ))
    .bind(now)
    .bind(id)
    .fetch_optional(&mut *conn)
    .await?
    .ok_or_else(|| AppError::NotFound(format!("{} not found", B::REPLY_LABEL)))?;

    sqlx::query(&format!(
        "UPDATE {} SET deleted_on = $1 WHERE target_id = $2 AND deleted_on IS NULL",
        B::REPLY_VOTES
    ))
    .bind(now)
    .bind(id)
    .execute(&mut *conn)
    .await?;

    sqlx::query(&format!(
        "UPDATE {} SET reply_count = MAX(0, reply_count - 1) WHERE id = $1",
        B::THREADS
    ))
    .bind(thread_id)
    .execute(&mut *conn)
    .await?;

    Ok(())
}

/// Whether a live thread or reply with this id exists on the board.
pub(crate) async fn is_live(pool: &SqlitePool, table: &str, id: i64) -> Result<bool, AppError> {
    let found = sqlx::query_scalar::<_, i64>(&format!(
        "SELECT id FROM {table} WHERE id = $1 AND deleted_on IS NULL"
    ))
    .bind(id)
    .fetch_optional(pool)
    .await?;
    Ok(found.is_some())
}

/// List threads (Recent first).
/// Filter out soft-deleted threads. Supports id-cursor pagination.
pub async fn list_threads<B: Board>(
    State(pool): State<SqlitePool>,
    Query(params): Query<ThreadListParams>,
) -> Result<impl IntoResponse, AppError> {
    let mut builder: QueryBuilder<Sqlite> = QueryBuilder::new(thread_select::<B>());
    builder.push(" WHERE t.deleted_on IS NULL");

    if let Some(q) = params.q.as_deref().map(str::trim).filter(|q| !q.is_empty()) {
        builder.push(" AND instr(lower(t.title), lower(");
        builder.push_bind(q.to_string());
        builder.push(")) > 0");
    }
    if let Some(tag) = params.tag.as_deref() {
        builder.push(" AND EXISTS (SELECT 1 FROM json_each(t.tags) WHERE json_each.value = ");
        builder.push_bind(tag.to_string());
        builder.push(")");
    }
    if let Some(cursor) = params.cursor {
        builder.push(" AND t.id < ");
        builder.push_bind(cursor);
    }
    builder.push(" ORDER BY t.id DESC LIMIT ");
    builder.push_bind(page_limit(params.limit));

    let threads = builder
        .build_query_as::<Thread>()
        .fetch_all(&pool)
        .await
        .map_err(|e| {
            tracing::error!("Failed to list {}: {:?}", B::THREADS, e);
            AppError::InternalServerError(e.to_string())
        })?;

    Ok(Json(threads))
}

pub async fn get_thread<B: Board>(
    State(pool): State<SqlitePool>,
    Path(id): Path<i64>,
) -> Result<impl IntoResponse, AppError> {
    Ok(Json(fetch_thread::<B, _>(&pool, id).await?))
}

/// Sanitised body; rejects bodies that sanitise to nothing.
fn clean_body(raw: &str) -> Result<String, AppError> {
    let body = clean_html(raw);
    if body.trim().is_empty() {
        return Err(AppError::BadRequest("Body must not be empty".to_string()));
    }
    Ok(body)
}

/// Start a thread. Any signed-in user may post.
pub async fn create_thread<B: Board>(
    State(pool): State<SqlitePool>,
    user: AuthUser,
    Json(payload): Json<CreateThreadRequest>,
) -> Result<impl IntoResponse, AppError> {
    payload.validate()?;

    let body = clean_body(&payload.body)?;
    let tags = clean_all(&payload.tags);
    let now = chrono::Utc::now();

    let mut tx = pool.begin().await?;

    let id = sqlx::query_scalar::<_, i64>(&format!(
        r#"
        INSERT INTO {} (author_id, title, body, tags, created_at, updated_at)
        VALUES ($1, $2, $3, $4, $5, $5)
        RETURNING id
        "#,
        B::THREADS
    ))
    .bind(user.id)
    .bind(payload.title.trim())
    .bind(&body)
    .bind(SqlJson(&tags))
    .bind(now)
    .fetch_one(&mut *tx)
    .await
    .map_err(|e| {
        tracing::error!("Failed to create {}: {:?}", B::THREAD_LABEL, e);
        AppError::InternalServerError(e.to_string())
    })?;

    record_activity(&mut tx, user.id, B::THREAD_VERB, B::THREAD_OBJECT, id).await?;
    let thread = fetch_thread::<B, _>(&mut *tx, id).await?;

    tx.commit().await?;

    Ok((StatusCode::CREATED, Json(thread)))
}

/// Edit a thread. Requires: author.
pub async fn update_thread<B: Board>(
    State(pool): State<SqlitePool>,
    user: AuthUser,
    Path(id): Path<i64>,
    Json(payload): Json<UpdateThreadRequest>,
) -> Result<impl IntoResponse, AppError> {
    payload.validate()?;
    payload
        .validate_tags()
        .map_err(|e| AppError::BadRequest(e.to_string()))?;
    let body = payload.body.as_deref().map(clean_body).transpose()?;

    let mut tx = pool.begin().await?;

    let author = lock_live(&mut tx, B::THREADS, B::THREAD_LABEL, id).await?;
    if author != user.id {
        return Err(AppError::Forbidden(format!(
            "Only the author can edit this {}",
            B::THREAD_LABEL.to_lowercase()
        )));
    }

    let mut builder: QueryBuilder<Sqlite> = QueryBuilder::new(format!("UPDATE {} SET ", B::THREADS));
    let mut separated = builder.separated(", ");
    separated.push("updated_at = ");
    separated.push_bind_unseparated(chrono::Utc::now());

    if let Some(title) = &payload.title {
        separated.push("title = ");
        separated.push_bind_unseparated(title.trim().to_string());
    }
    if let Some(body) = body {
        separated.push("body = ");
        separated.push_bind_unseparated(body);
    }
    if let Some(tags) = &payload.tags {
        separated.push("tags = ");
        separated.push_bind_unseparated(SqlJson(clean_all(tags)));
    }

    builder.push(" WHERE id = ");
    builder.push_bind(id);
    builder.build().execute(&mut *tx).await?;

    let thread = fetch_thread::<B, _>(&mut *tx, id).await?;
    tx.commit().await?;

    Ok(Json(thread))
}

/// Delete a thread (Soft Delete), cascading to replies and votes.
/// Requires: author or admin.
pub async fn delete_thread<B: Board>(
    State(pool): State<SqlitePool>,
    user: AuthUser,
    Path(id): Path<i64>,
) -> Result<impl IntoResponse, AppError> {
    let mut tx = pool.begin().await?;

    let author = lock_live(&mut tx, B::THREADS, B::THREAD_LABEL, id).await?;
    if author != user.id && !user.is_admin() {
        return Err(AppError::Forbidden(format!(
            "You are not authorized to delete this {}",
            B::THREAD_LABEL.to_lowercase()
        )));
    }

    soft_delete_thread::<B>(&mut tx, id).await?;
    tx.commit().await?;

    tracing::info!(table = B::THREADS, id, by = user.id, "Thread deleted");

    Ok(StatusCode::NO_CONTENT)
}

/// Live replies of a thread, oldest first.
pub async fn list_replies<B: Board>(
    State(pool): State<SqlitePool>,
    Path(thread_id): Path<i64>,
    Query(params): Query<ThreadListParams>,
) -> Result<impl IntoResponse, AppError> {
    fetch_thread::<B, _>(&pool, thread_id).await?;

    let replies = sqlx::query_as::<_, Reply>(&format!(
        r#"
        {}
        WHERE c.thread_id = $1 AND c.deleted_on IS NULL
          AND ($2 IS NULL OR c.id > $2)
        ORDER BY c.id
        LIMIT $3
        "#,
        reply_select::<B>()
    ))
    .bind(thread_id)
    .bind(params.cursor)
    .bind(page_limit(params.limit))
    .fetch_all(&pool)
    .await?;

    Ok(Json(replies))
}

/// Reply to a live thread.
pub async fn create_reply<B: Board>(
    State(pool): State<SqlitePool>,
    user: AuthUser,
    Path(thread_id): Path<i64>,
    Json(payload): Json<ReplyRequest>,
) -> Result<impl IntoResponse, AppError> {
    payload.validate()?;

    let body = clean_body(&payload.body)?;
    let now = chrono::Utc::now();

    let mut tx = pool.begin().await?;

    // Counting first takes the thread's write lock and proves it is live.
    sqlx::query_scalar::<_, i64>(&format!(
        "UPDATE {} SET reply_count = reply_count + 1 WHERE id = $1 AND deleted_on IS NULL RETURNING id",
        B::THREADS
    ))
    .bind(thread_id)
    .fetch_optional(&mut *tx)
    .await?
    .ok_or_else(|| AppError::NotFound(format!("{} not found", B::THREAD_LABEL)))?;

    let id = sqlx::query_scalar::<_, i64>(&format!(
        r#"
        INSERT INTO {} (thread_id, author_id, body, created_at, updated_at)
        VALUES ($1, $2, $3, $4, $4)
        RETURNING id
        "#,
        B::REPLIES
    ))
    .bind(thread_id)
    .bind(user.id)
    .bind(&body)
    .bind(now)
    .fetch_one(&mut *tx)
    .await?;

    record_activity(&mut tx, user.id, B::REPLY_VERB, B::REPLY_OBJECT, id).await?;
    let reply = fetch_reply::<B, _>(&mut *tx, id).await?;

    tx.commit().await?;

    Ok((StatusCode::CREATED, Json(reply)))
}

/// Edit a reply. Requires: author.
pub async fn update_reply<B: Board>(
    State(pool): State<SqlitePool>,
    user: AuthUser,
    Path(id): Path<i64>,
    Json(payload): Json<ReplyRequest>,
) -> Result<impl IntoResponse, AppError> {
    payload.validate()?;
    let body = clean_body(&payload.body)?;

    let mut tx = pool.begin().await?;

    let author = lock_live(&mut tx, B::REPLIES, B::REPLY_LABEL, id).await?;
    if author != user.id {
        return Err(AppError::Forbidden(format!(
            "Only the author can edit this {}",
            B::REPLY_LABEL.to_lowercase()
        )));
    }

    sqlx::query(&format!(
        "UPDATE {} SET body = $1, updated_at = $2 WHERE id = $3",
        B::REPLIES
    ))
    .bind(&body)
    .bind(chrono::Utc::now())
    .bind(id)
    .execute(&mut *tx)
    .await?;

    let reply = fetch_reply::<B, _>(&mut *tx, id).await?;
    tx.commit().await?;

    Ok(Json(reply))
}

/// Delete a reply (Soft Delete). Requires: author or admin.
pub async fn delete_reply<B: Board>(
    State(pool): State<SqlitePool>,
    user: AuthUser,
    Path(id): Path<i64>,
) -> Result<impl IntoResponse, AppError> {
    let mut tx = pool.begin().await?;

    let author = lock_live(&mut tx, B::REPLIES, B::REPLY_LABEL, id).await?;
    if author != user.id && !user.is_admin() {
        return Err(AppError::Forbidden(format!(
            "You are not authorized to delete this {}",
            B::REPLY_LABEL.to_lowercase()
        )));
    }

    soft_delete_reply::<B>(&mut tx, id).await?;
    tx.commit().await?;

    Ok(StatusCode::NO_CONTENT)
}

/// Records `vote` by `user_id` on a live row of `target_table`.
///
/// Repeating the same vote changes nothing. Switching sides moves one count
/// from the old counter to the new one.
async fn cast_vote(
    pool: &SqlitePool,
    target_table: &str,
    votes_table: &str,
    label: &str,
    target_id: i64,
    user_id: i64,
    vote: VoteType,
) -> Result<serde_json::Value, AppError> {
    let mut tx = pool.begin().await?;
    lock_live(&mut tx, target_table, label, target_id).await?;

    let previous = sqlx::query_scalar::<_, VoteType>(&format!(
        "SELECT vote_type FROM {votes_table} WHERE target_id = $1 AND user_id = $2"
    ))
    .bind(target_id)
    .bind(user_id)
    .fetch_optional(&mut *tx)
    .await?;

    match previous {
        Some(previous) if previous == vote => {}
        Some(previous) => {
            sqlx::query(&format!(
                "UPDATE {votes_table} SET vote_type = $1 WHERE target_id = $2 AND user_id = $3"
            ))
            .bind(vote)
            .bind(target_id)
            .bind(user_id)
            .execute(&mut *tx)
            .await?;

            sqlx::query(&format!(
                "UPDATE {target_table} SET {old} = MAX(0, {old} - 1), {new} = {new} + 1 WHERE id = $1",
                old = previous.counter(),
                new = vote.counter()
            ))
            .bind(target_id)
            .execute(&mut *tx)
            .await?;
        }
        None => {
            sqlx::query(&format!(
                "INSERT INTO {votes_table} (target_id, user_id, vote_type, created_at) VALUES ($1, $2, $3, $4)"
            ))
            .bind(target_id)
            .bind(user_id)
            .bind(vote)
            .bind(chrono::Utc::now())
            .execute(&mut *tx)
            .await?;

            sqlx::query(&format!(
                "UPDATE {target_table} SET {counter} = {counter} + 1 WHERE id = $1",
                counter = vote.counter()
            ))
            .bind(target_id)
            .execute(&mut *tx)
            .await?;
        }
    }

    let counts = vote_counts(&mut tx, target_table, target_id, Some(vote)).await?;
    tx.commit().await?;
    Ok(counts)
}

/// Withdraws the caller's vote. Withdrawing a missing vote changes nothing.
async fn retract_vote(
    pool: &SqlitePool,
    target_table: &str,
    votes_table: &str,
    label: &str,
    target_id: i64,
    user_id: i64,
) -> Result<serde_json::Value, AppError> {
    let mut tx = pool.begin().await?;
    lock_live(&mut tx, target_table, label, target_id).await?;

    let removed = sqlx::query_scalar::<_, VoteType>(&format!(
        "DELETE FROM {votes_table} WHERE target_id = $1 AND user_id = $2 RETURNING vote_type"
    ))
    .bind(target_id)
    .bind(user_id)
    .fetch_optional(&mut *tx)
    .await?;

    if let Some(vote) = removed {
        sqlx::query(&format!(
            "UPDATE {target_table} SET {counter} = MAX(0, {counter} - 1) WHERE id = $1",
            counter = vote.counter()
        ))
        .bind(target_id)
        .execute(&mut *tx)
        .await?;
    }

    let counts = vote_counts(&mut tx, target_table, target_id, None).await?;
    tx.commit().await?;
    Ok(counts)
}

async fn vote_counts(
    conn: &mut SqliteConnection,
    target_table: &str,
    target_id: i64,
    vote: Option<VoteType>,
) -> Result<serde_json::Value, AppError> {
    let (upvotes, downvotes) = sqlx::query_as::<_, (i64, i64)>(&format!(
        "SELECT upvote_count, downvote_count FROM {target_table} WHERE id = $1"
    ))
    .bind(target_id)
    .fetch_one(&mut *conn)
    .await?;

    Ok(json!({
        "vote_type": vote,
        "upvote_count": upvotes,
        "downvote_count": downvotes,
    }))
}

pub async fn vote_thread<B: Board>(
    State(pool): State<SqlitePool>,
    user: AuthUser,
    Path(id): Path<i64>,
    Json(payload): Json<VoteRequest>,
) -> Result<impl IntoResponse, AppError> {
    let counts = cast_vote(
        &pool,
        B::THREADS,
        B::THREAD_VOTES,
        B::THREAD_LABEL,
        id,
        user.id,
        payload.vote_type,
    )
    .await?;
    Ok(Json(counts))
}

pub async fn unvote_thread<B: Board>(
    State(pool): State<SqlitePool>,
    user: AuthUser,
    Path(id): Path<i64>,
) -> Result<impl IntoResponse, AppError> {
    let counts = retract_vote(&pool, B::THREADS, B::THREAD_VOTES, B::THREAD_LABEL, id, user.id).await?;
    Ok(Json(counts))
}

pub async fn vote_reply<B: Board>(
    State(pool): State<SqlitePool>,
    user: AuthUser,
    Path(id): Path<i64>,
    Json(payload): Json<VoteRequest>,
) -> Result<impl IntoResponse, AppError> {
    let counts = cast_vote(
        &pool,
        B::REPLIES,
        B::REPLY_VOTES,
        B::REPLY_LABEL,
        id,
        user.id,
        payload.vote_type,
    )
    .await?;
    Ok(Json(counts))
}

pub async fn unvote_reply<B: Board>(
    State(pool): State<SqlitePool>,
    user: AuthUser,
    Path(id): Path<i64>,
) -> Result<impl IntoResponse, AppError> {
    let counts = retract_vote(&pool, B::REPLIES, B::REPLY_VOTES, B::REPLY_LABEL, id, user.id).await?;
    Ok(Json(counts))
}
