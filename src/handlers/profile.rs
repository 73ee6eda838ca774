// src/handlers/profile.rs

use axum::{
    Json,
    extract::{Path, Query, State},
    response::IntoResponse,
};
use serde_json::json;
use sqlx::{QueryBuilder, Sqlite, SqlitePool};
use validator::Validate;

use crate::{
    error::AppError,
    handlers::activity::record_activity,
    models::{
        activity::{ActivityObject, ActivityVerb},
        page_limit,
        recipe::{RECIPE_COLUMNS, Recipe, RecipeListParams},
        user::{MeResponse, ProfileResponse, UpdateProfileRequest, UserSummary},
    },
    utils::jwt::AuthUser,
};

async fn fetch_profile(pool: &SqlitePool, user_id: i64) -> Result<ProfileResponse, AppError> {
    // Subqueries are cheap here: both follow columns are indexed.
    sqlx::query_as::<_, ProfileResponse>(
        r#"
        SELECT
            u.id, u.username, u.role, u.name, u.surname, u.bio, u.profile_picture,
            u.recipe_count,
            (SELECT COUNT(*) FROM user_follows WHERE followed_id = u.id) AS follower_count,
            (SELECT COUNT(*) FROM user_follows WHERE follower_id = u.id) AS following_count,
            u.created_at
        FROM users u
        WHERE u.id = $1
        "#,
    )
    .bind(user_id)
    .fetch_optional(pool)
    .await?
    .ok_or(AppError::NotFound("User not found".to_string()))
}

/// Get current user's profile and statistics.
pub async fn get_me(
    State(pool): State<SqlitePool>,
    user: AuthUser,
) -> Result<impl IntoResponse, AppError> {
    let profile = fetch_profile(&pool, user.id).await?;
    let email = sqlx::query_scalar::<_, String>("SELECT email FROM users WHERE id = $1")
        .bind(user.id)
        .fetch_one(&pool)
        .await?;

    Ok(Json(MeResponse { profile, email }))
}

/// Edit the current user's profile fields.
pub async fn update_me(
    State(pool): State<SqlitePool>,
    user: AuthUser,
    Json(payload): Json<UpdateProfileRequest>,
) -> Result<impl IntoResponse, AppError> {
    payload.validate()?;

    if payload.name.is_some()
        || payload.surname.is_some()
        || payload.bio.is_some()
        || payload.profile_picture.is_some()
    {
        let mut builder: QueryBuilder<Sqlite> = QueryBuilder::new("UPDATE users SET ");
        let mut separated = builder.separated(", ");

        if let Some(name) = payload.name {
            separated.push("name = ");
            separated.push_bind_unseparated(name);
        }
        if let Some(surname) = payload.surname {
            separated.push("surname = ");
            separated.push_bind_unseparated(surname);
        }
        if let Some(bio) = payload.bio {
            separated.push("bio = ");
            separated.push_bind_unseparated(bio);
        }
        if let Some(picture) = payload.profile_picture {
            separated.push("profile_picture = ");
            separated.push_bind_unseparated(picture);
        }

        builder.push(" WHERE id = ");
        builder.push_bind(user.id);

        builder.build().execute(&pool).await.map_err(|e| {
            tracing::error!("Failed to update profile: {:?}", e);
            AppError::InternalServerError(e.to_string())
        })?;
    }

    Ok(Json(fetch_profile(&pool, user.id).await?))
}

/// Public profile of any user.
pub async fn get_user(
    State(pool): State<SqlitePool>,
    Path(id): Path<i64>,
) -> Result<impl IntoResponse, AppError> {
    Ok(Json(fetch_profile(&pool, id).await?))
}

async fn ensure_user_exists(pool: &SqlitePool, id: i64) -> Result<(), AppError> {
    sqlx::query_scalar::<_, i64>("SELECT id FROM users WHERE id = $1")
        .bind(id)
        .fetch_optional(pool)
        .await?
        .ok_or(AppError::NotFound("User not found".to_string()))?;
    Ok(())
}

/// Follow a user. Following someone already followed changes nothing.
pub async fn follow_user(
    State(pool): State<SqlitePool>,
    user: AuthUser,
    Path(id): Path<i64>,
) -> Result<impl IntoResponse, AppError> {
    if id == user.id {
        return Err(AppError::BadRequest("You cannot follow yourself".to_string()));
    }
    ensure_user_exists(&pool, id).await?;

    let mut tx = pool.begin().await?;

    let inserted = sqlx::query(
        "INSERT OR IGNORE INTO user_follows (follower_id, followed_id, created_at) VALUES ($1, $2, $3)",
    )
    .bind(user.id)
    .bind(id)
    .bind(chrono::Utc::now())
    .execute(&mut *tx)
    .await?
    .rows_affected();

    if inserted == 1 {
        record_activity(&mut tx, user.id, ActivityVerb::FollowedUser, ActivityObject::User, id).await?;
    }

    tx.commit().await?;

    Ok(Json(json!({ "following": true })))
}

/// Unfollow a user. Unfollowing someone not followed changes nothing.
pub async fn unfollow_user(
    State(pool): State<SqlitePool>,
    user: AuthUser,
    Path(id): Path<i64>,
) -> Result<impl IntoResponse, AppError> {
    ensure_user_exists(&pool, id).await?;

    sqlx::query("DELETE FROM user_follows WHERE follower_id = $1 AND followed_id = $2")
        .bind(user.id)
        .bind(id)
        .execute(&pool)
        .await?;

    Ok(Json(json!({ "following": false })))
}

/// Users following `id`.
pub async fn list_followers(
    State(pool): State<SqlitePool>,
    Path(id): Path<i64>,
) -> Result<impl IntoResponse, AppError> {
    ensure_user_exists(&pool, id).await?;

    let users = sqlx::query_as::<_, UserSummary>(
        r#"
        SELECT u.id, u.username, u.profile_picture
        FROM user_follows f
        JOIN users u ON u.id = f.follower_id
        WHERE f.followed_id = $1
        ORDER BY f.created_at DESC
        "#,
    )
    .bind(id)
    .fetch_all(&pool)
    .await?;

    Ok(Json(users))
}

/// Users `id` follows.
pub async fn list_following(
    State(pool): State<SqlitePool>,
    Path(id): Path<i64>,
) -> Result<impl IntoResponse, AppError> {
    ensure_user_exists(&pool, id).await?;

    let users = sqlx::query_as::<_, UserSummary>(
        r#"
        SELECT u.id, u.username, u.profile_picture
        FROM user_follows f
        JOIN users u ON u.id = f.followed_id
        WHERE f.follower_id = $1
        ORDER BY f.created_at DESC
        "#,
    )
    .bind(id)
    .fetch_all(&pool)
    .await?;

    Ok(Json(users))
}

/// Live recipes in one of the caller's collections (`recipe_bookmarks` or
/// `recipe_likes`), newest recipe first.
async fn collection(
    pool: &SqlitePool,
    table: &str,
    user_id: i64,
    params: &RecipeListParams,
) -> Result<Vec<Recipe>, AppError> {
    let sql = format!(
        r#"
        SELECT {RECIPE_COLUMNS}
        FROM {table} c
        JOIN recipes r ON r.id = c.recipe_id
        JOIN users u ON u.id = r.user_id
        WHERE c.user_id = $1 AND r.deleted_on IS NULL
          AND ($2 IS NULL OR r.id < $2)
        ORDER BY r.id DESC
        LIMIT $3
        "#
    );

    let recipes = sqlx::query_as::<_, Recipe>(&sql)
        .bind(user_id)
        .bind(params.cursor)
        .bind(page_limit(params.limit))
        .fetch_all(pool)
        .await?;

    Ok(recipes)
}

/// Recipes bookmarked by the current user.
pub async fn list_my_bookmarks(
    State(pool): State<SqlitePool>,
    user: AuthUser,
    Query(params): Query<RecipeListParams>,
) -> Result<impl IntoResponse, AppError> {
    Ok(Json(collection(&pool, "recipe_bookmarks", user.id, &params).await?))
}

/// Recipes liked by the current user.
pub async fn list_my_likes(
    State(pool): State<SqlitePool>,
    user: AuthUser,
    Query(params): Query<RecipeListParams>,
) -> Result<impl IntoResponse, AppError> {
    Ok(Json(collection(&pool, "recipe_likes", user.id, &params).await?))
}
