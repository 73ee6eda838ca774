// src/handlers/recipe.rs

use std::collections::BTreeMap;

use axum::{
    Json,
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
};
use serde_json::json;
use sqlx::{Executor, FromRow, QueryBuilder, Sqlite, SqliteConnection, SqlitePool, types::Json as SqlJson};
use validator::Validate;

use crate::{
    error::{AppError, is_unique_violation},
    handlers::activity::record_activity,
    models::{
        activity::{ActivityObject, ActivityVerb},
        nutrition::{PricedLine, RecipeTotals, market_costs},
        page_limit,
        rating::{HealthRatingRequest, RateRecipeRequest, RatingChange, RatingKind, RecipeRating},
        recipe::{
            CreateRecipeRequest, IngredientLineRequest, RECIPE_COLUMNS, Recipe, RecipeDetail,
            RecipeIngredientLine, RecipeListParams, RecipeRatingState, UpdateRecipeRequest,
        },
        units::Unit,
        user::Role,
    },
    utils::{html::clean_all, jwt::AuthUser},
};

/// Recipe line joined with its catalogue entry, as read from the database.
#[derive(Debug, FromRow)]
struct PricedLineRow {
    name: String,
    quantity: f64,
    unit: Unit,
    base_quantity: f64,
    base_unit: Unit,
    calories: f64,
    protein: f64,
    fat: f64,
    carbs: f64,
    prices: SqlJson<BTreeMap<String, f64>>,
}

impl From<PricedLineRow> for PricedLine {
    fn from(row: PricedLineRow) -> Self {
        PricedLine {
            ingredient_name: row.name,
            quantity: row.quantity,
            unit: row.unit,
            base_quantity: row.base_quantity,
            base_unit: row.base_unit,
            calories: row.calories,
            protein: row.protein,
            fat: row.fat,
            carbs: row.carbs,
            prices: row.prices.0,
        }
    }
}

/// Loads a live recipe. Works on the pool or inside a transaction.
pub(crate) async fn fetch_recipe<'e, E>(executor: E, id: i64) -> Result<Recipe, AppError>
where
    E: Executor<'e, Database = Sqlite>,
{
    sqlx::query_as::<_, Recipe>(&format!(
        r#"
        SELECT {RECIPE_COLUMNS}
        FROM recipes r
        JOIN users u ON u.id = r.user_id
        WHERE r.id = $1 AND r.deleted_on IS NULL
        "#
    ))
    .bind(id)
    .fetch_optional(executor)
    .await?
    .ok_or(AppError::NotFound("Recipe not found".to_string()))
}

async fn fetch_detail(pool: &SqlitePool, id: i64) -> Result<RecipeDetail, AppError> {
    let recipe = fetch_recipe(pool, id).await?;

    let lines = sqlx::query_as::<_, RecipeIngredientLine>(
        r#"
        SELECT ri.ingredient_id, i.name, ri.quantity, ri.unit, i.allergens, i.dietary_info
        FROM recipe_ingredients ri
        JOIN ingredients i ON i.id = ri.ingredient_id
        WHERE ri.recipe_id = $1
        ORDER BY ri.id
        "#,
    )
    .bind(id)
    .fetch_all(pool)
    .await?;

    Ok(RecipeDetail::new(recipe, lines))
}

async fn load_priced_lines(conn: &mut SqliteConnection, recipe_id: i64) -> Result<Vec<PricedLine>, AppError> {
    let rows = sqlx::query_as::<_, PricedLineRow>(
        r#"
        SELECT i.name, ri.quantity, ri.unit, i.base_quantity, i.base_unit,
               i.calories, i.protein, i.fat, i.carbs, i.prices
        FROM recipe_ingredients ri
        JOIN ingredients i ON i.id = ri.ingredient_id
        WHERE ri.recipe_id = $1
        ORDER BY ri.id
        "#,
    )
    .bind(recipe_id)
    .fetch_all(&mut *conn)
    .await?;

    Ok(rows.into_iter().map(PricedLine::from).collect())
}

/// Recomputes nutrition and cost of a recipe from all of its lines.
pub(crate) async fn recompute_recipe(conn: &mut SqliteConnection, recipe_id: i64) -> Result<RecipeTotals, AppError> {
    let servings = sqlx::query_scalar::<_, i64>("SELECT servings FROM recipes WHERE id = $1")
        .bind(recipe_id)
        .fetch_one(&mut *conn)
        .await?;

    let lines = load_priced_lines(conn, recipe_id).await?;
    let totals = RecipeTotals::compute(&lines, servings)
        .map_err(|e| AppError::BadRequest(e.to_string()))?;

    sqlx::query(
        r#"
        UPDATE recipes
        SET calories = $1, protein = $2, fat = $3, carbs = $4, cost_per_serving = $5
        WHERE id = $6
        "#,
    )
    .bind(totals.calories)
    .bind(totals.protein)
    .bind(totals.fat)
    .bind(totals.carbs)
    .bind(totals.cost_per_serving)
    .bind(recipe_id)
    .execute(&mut *conn)
    .await?;

    Ok(totals)
}

/// Inserts ingredient lines, checking that every ingredient exists.
async fn insert_lines(
    conn: &mut SqliteConnection,
    recipe_id: i64,
    lines: &[IngredientLineRequest],
) -> Result<(), AppError> {
    for line in lines {
        let exists = sqlx::query_scalar::<_, i64>("SELECT id FROM ingredients WHERE id = $1")
            .bind(line.ingredient_id)
            .fetch_optional(&mut *conn)
            .await?;
        if exists.is_none() {
            return Err(AppError::NotFound(format!(
                "Ingredient {} not found",
                line.ingredient_id
            )));
        }

        sqlx::query(
            "INSERT INTO recipe_ingredients (recipe_id, ingredient_id, quantity, unit) VALUES ($1, $2, $3, $4)",
        )
        .bind(recipe_id)
        .bind(line.ingredient_id)
        .bind(line.quantity)
        .bind(line.unit)
        .execute(&mut *conn)
        .await
        .map_err(|e| {
            if is_unique_violation(&e) {
                AppError::Conflict(format!(
                    "Ingredient {} is already part of this recipe",
                    line.ingredient_id
                ))
            } else {
                AppError::from(e)
            }
        })?;
    }
    Ok(())
}

/// Locks a live recipe for the rest of the transaction and returns its owner.
///
/// The no-op write makes SQLite hand this transaction the write lock before
/// any derived state is read, so concurrent rating or ingredient changes
/// serialize instead of losing updates.
async fn lock_recipe(conn: &mut SqliteConnection, recipe_id: i64) -> Result<i64, AppError> {
    sqlx::query_scalar::<_, i64>(
        "UPDATE recipes SET updated_at = updated_at WHERE id = $1 AND deleted_on IS NULL RETURNING user_id",
    )
    .bind(recipe_id)
    .fetch_optional(&mut *conn)
    .await?
    .ok_or(AppError::NotFound("Recipe not found".to_string()))
}

/// Locks the recipe and checks that `user` owns it.
async fn lock_owned_recipe(conn: &mut SqliteConnection, recipe_id: i64, user: &AuthUser) -> Result<(), AppError> {
    let owner = lock_recipe(conn, recipe_id).await?;
    if owner != user.id {
        return Err(AppError::Forbidden(
            "Only the author can change this recipe".to_string(),
        ));
    }
    Ok(())
}

/// Soft-deletes a recipe and releases it from the owner's recipe count.
pub(crate) async fn soft_delete_recipe(conn: &mut SqliteConnection, recipe_id: i64) -> Result<(), AppError> {
    let owner = sqlx::query_scalar::<_, i64>(
        "UPDATE recipes SET deleted_on = $1 WHERE id = $2 AND deleted_on IS NULL RETURNING user_id",
    )
    .bind(chrono::Utc::now())
    .bind(recipe_id)
    .fetch_optional(&mut *conn)
    .await?
    .ok_or(AppError::NotFound("Recipe not found".to_string()))?;

    sqlx::query("UPDATE users SET recipe_count = MAX(0, recipe_count - 1) WHERE id = $1")
        .bind(owner)
        .execute(&mut *conn)
        .await?;

    Ok(())
}

/// Applies rating changes to the recipe's running averages.
/// The caller must already hold the recipe lock.
async fn apply_rating_changes(
    conn: &mut SqliteConnection,
    recipe_id: i64,
    changes: &[(RatingKind, RatingChange)],
) -> Result<(), AppError> {
    if changes.is_empty() {
        return Ok(());
    }

    let state = sqlx::query_as::<_, RecipeRatingState>(
        r#"
        SELECT taste_rating, taste_rating_count, difficulty_rating, difficulty_rating_count,
               health_rating, health_rating_count
        FROM recipes WHERE id = $1
        "#,
    )
    .bind(recipe_id)
    .fetch_one(&mut *conn)
    .await?;

    for (kind, change) in changes {
        let current = match kind {
            RatingKind::Taste => state.taste(),
            RatingKind::Difficulty => state.difficulty(),
            RatingKind::Health => state.health(),
        };
        let updated = current.apply(*change);
        let (mean_col, count_col) = kind.columns();

        sqlx::query(&format!(
            "UPDATE recipes SET {mean_col} = $1, {count_col} = $2 WHERE id = $3"
        ))
        .bind(updated.mean)
        .bind(updated.count)
        .bind(recipe_id)
        .execute(&mut *conn)
        .await?;
    }

    Ok(())
}

/// List recipes.
/// Filter out soft-deleted recipes. Supports id-cursor pagination for the
/// default 'new' ordering; 'top' returns the best-rated page.
pub async fn list_recipes(
    State(pool): State<SqlitePool>,
    Query(params): Query<RecipeListParams>,
) -> Result<impl IntoResponse, AppError> {
    let limit = page_limit(params.limit);
    let top = params.sort.as_deref() == Some("top");

    let mut builder: QueryBuilder<Sqlite> = QueryBuilder::new(format!(
        "SELECT {RECIPE_COLUMNS} FROM recipes r JOIN users u ON u.id = r.user_id WHERE r.deleted_on IS NULL"
    ));

    if let Some(q) = params.q.as_deref().map(str::trim).filter(|q| !q.is_empty()) {
        builder.push(" AND instr(lower(r.name), lower(");
        builder.push_bind(q.to_string());
        builder.push(")) > 0");
    }
    if let Some(meal_type) = params.meal_type {
        builder.push(" AND r.meal_type = ");
        builder.push_bind(meal_type);
    }
    if let Some(user_id) = params.user_id {
        builder.push(" AND r.user_id = ");
        builder.push_bind(user_id);
    }

    if top {
        builder.push(" ORDER BY r.taste_rating DESC, r.like_count DESC, r.id DESC");
    } else {
        if let Some(cursor) = params.cursor {
            builder.push(" AND r.id < ");
            builder.push_bind(cursor);
        }
        builder.push(" ORDER BY r.id DESC");
    }
    builder.push(" LIMIT ");
    builder.push_bind(limit);

    let recipes = builder
        .build_query_as::<Recipe>()
        .fetch_all(&pool)
        .await
        .map_err(|e| {
            tracing::error!("Failed to list recipes: {:?}", e);
            AppError::InternalServerError(e.to_string())
        })?;

    Ok(Json(recipes))
}

/// Get a single recipe with its ingredient lines.
#[utoipa::path(
    get,
    path = "/api/recipes/{id}",
    params(("id" = i64, Path, description = "Recipe id")),
    responses(
        (status = 200, description = "Recipe with ingredient lines"),
        (status = 404, description = "No live recipe with this id")
    )
)]
pub async fn get_recipe(
    State(pool): State<SqlitePool>,
    Path(id): Path<i64>,
) -> Result<impl IntoResponse, AppError> {
    Ok(Json(fetch_detail(&pool, id).await?))
}

/// Create a recipe together with its ingredient lines.
#[utoipa::path(
    post,
    path = "/api/recipes",
    request_body = CreateRecipeRequest,
    responses(
        (status = 201, description = "Recipe created"),
        (status = 400, description = "Validation failed or incompatible units"),
        (status = 401, description = "Missing or invalid token"),
        (status = 404, description = "Unknown ingredient")
    ),
    security(("BearerAuth" = []))
)]
pub async fn create_recipe(
    State(pool): State<SqlitePool>,
    user: AuthUser,
    Json(payload): Json<CreateRecipeRequest>,
) -> Result<impl IntoResponse, AppError> {
    payload.validate()?;

    let steps = clean_all(&payload.steps);
    if steps.is_empty() {
        return Err(AppError::BadRequest("A recipe needs at least one step".to_string()));
    }
    let now = chrono::Utc::now();

    let mut tx = pool.begin().await?;

    let recipe_id = sqlx::query_scalar::<_, i64>(
        r#"
        INSERT INTO recipes (user_id, name, steps, prep_time, cook_time, meal_type, servings, created_at, updated_at)
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $8)
        RETURNING id
        "#,
    )
    .bind(user.id)
    .bind(payload.name.trim())
    .bind(SqlJson(&steps))
    .bind(payload.prep_time)
    .bind(payload.cook_time)
    .bind(payload.meal_type)
    .bind(payload.servings)
    .bind(now)
    .fetch_one(&mut *tx)
    .await
    .map_err(|e| {
        tracing::error!("Failed to create recipe: {:?}", e);
        AppError::InternalServerError(e.to_string())
    })?;

    insert_lines(&mut tx, recipe_id, &payload.ingredients).await?;
    recompute_recipe(&mut tx, recipe_id).await?;

    sqlx::query("UPDATE users SET recipe_count = recipe_count + 1 WHERE id = $1")
        .bind(user.id)
        .execute(&mut *tx)
        .await?;

    record_activity(&mut tx, user.id, ActivityVerb::CreatedRecipe, ActivityObject::Recipe, recipe_id).await?;

    tx.commit().await?;

    tracing::info!(recipe_id, user_id = user.id, "Recipe created");

    Ok((StatusCode::CREATED, Json(fetch_detail(&pool, recipe_id).await?)))
}

/// Edit a recipe. Requires: author.
pub async fn update_recipe(
    State(pool): State<SqlitePool>,
    user: AuthUser,
    Path(id): Path<i64>,
    Json(payload): Json<UpdateRecipeRequest>,
) -> Result<impl IntoResponse, AppError> {
    payload.validate()?;
    payload
        .validate_lists()
        .map_err(|e| AppError::BadRequest(e.to_string()))?;

    let mut tx = pool.begin().await?;
    lock_owned_recipe(&mut tx, id, &user).await?;

    let mut builder: QueryBuilder<Sqlite> = QueryBuilder::new("UPDATE recipes SET ");
    let mut separated = builder.separated(", ");
    separated.push("updated_at = ");
    separated.push_bind_unseparated(chrono::Utc::now());

    if let Some(name) = &payload.name {
        separated.push("name = ");
        separated.push_bind_unseparated(name.trim().to_string());
    }
    if let Some(steps) = &payload.steps {
        let steps = clean_all(steps);
        if steps.is_empty() {
            return Err(AppError::BadRequest("A recipe needs at least one step".to_string()));
        }
        separated.push("steps = ");
        separated.push_bind_unseparated(SqlJson(steps));
    }
    if let Some(prep_time) = payload.prep_time {
        separated.push("prep_time = ");
        separated.push_bind_unseparated(prep_time);
    }
    if let Some(cook_time) = payload.cook_time {
        separated.push("cook_time = ");
        separated.push_bind_unseparated(cook_time);
    }
    if let Some(meal_type) = payload.meal_type {
        separated.push("meal_type = ");
        separated.push_bind_unseparated(meal_type);
    }
    if let Some(servings) = payload.servings {
        separated.push("servings = ");
        separated.push_bind_unseparated(servings);
    }

    builder.push(" WHERE id = ");
    builder.push_bind(id);
    builder.build().execute(&mut *tx).await.map_err(|e| {
        tracing::error!("Failed to update recipe: {:?}", e);
        AppError::InternalServerError(e.to_string())
    })?;

    if let Some(lines) = &payload.ingredients {
        sqlx::query("DELETE FROM recipe_ingredients WHERE recipe_id = $1")
            .bind(id)
            .execute(&mut *tx)
            .await?;
        insert_lines(&mut tx, id, lines).await?;
    }

    if payload.ingredients.is_some() || payload.servings.is_some() {
        recompute_recipe(&mut tx, id).await?;
    }

    tx.commit().await?;

    Ok(Json(fetch_detail(&pool, id).await?))
}

/// Delete a recipe (Soft Delete).
/// Requires: author or admin.
pub async fn delete_recipe(
    State(pool): State<SqlitePool>,
    user: AuthUser,
    Path(id): Path<i64>,
) -> Result<impl IntoResponse, AppError> {
    let mut tx = pool.begin().await?;

    let owner = lock_recipe(&mut tx, id).await?;
    if owner != user.id && !user.is_admin() {
        return Err(AppError::Forbidden(
            "You are not authorized to delete this recipe".to_string(),
        ));
    }

    soft_delete_recipe(&mut tx, id).await?;
    tx.commit().await?;

    tracing::info!(recipe_id = id, by = user.id, "Recipe deleted");

    Ok(StatusCode::NO_CONTENT)
}

/// Add one ingredient line and recompute the rollup.
pub async fn add_ingredient(
    State(pool): State<SqlitePool>,
    user: AuthUser,
    Path(id): Path<i64>,
    Json(payload): Json<IngredientLineRequest>,
) -> Result<impl IntoResponse, AppError> {
    payload.validate()?;

    let mut tx = pool.begin().await?;
    lock_owned_recipe(&mut tx, id, &user).await?;
    insert_lines(&mut tx, id, std::slice::from_ref(&payload)).await?;
    recompute_recipe(&mut tx, id).await?;
    tx.commit().await?;

    Ok((StatusCode::CREATED, Json(fetch_detail(&pool, id).await?)))
}

/// Remove one ingredient line and recompute the rollup.
pub async fn remove_ingredient(
    State(pool): State<SqlitePool>,
    user: AuthUser,
    Path((id, ingredient_id)): Path<(i64, i64)>,
) -> Result<impl IntoResponse, AppError> {
    let mut tx = pool.begin().await?;
    lock_owned_recipe(&mut tx, id, &user).await?;

    let removed = sqlx::query("DELETE FROM recipe_ingredients WHERE recipe_id = $1 AND ingredient_id = $2")
        .bind(id)
        .bind(ingredient_id)
        .execute(&mut *tx)
        .await?
        .rows_affected();

    if removed == 0 {
        return Err(AppError::NotFound(
            "Ingredient is not part of this recipe".to_string(),
        ));
    }

    recompute_recipe(&mut tx, id).await?;
    tx.commit().await?;

    Ok(Json(fetch_detail(&pool, id).await?))
}

/// What the recipe costs per serving at each market.
pub async fn recipe_costs(
    State(pool): State<SqlitePool>,
    Path(id): Path<i64>,
) -> Result<impl IntoResponse, AppError> {
    let mut conn = pool.acquire().await?;
    let recipe = fetch_recipe(&mut *conn, id).await?;
    let lines = load_priced_lines(&mut conn, id).await?;

    let markets = market_costs(&lines, recipe.servings)
        .map_err(|e| AppError::BadRequest(e.to_string()))?;

    Ok(Json(json!({
        "recipe_id": recipe.id,
        "servings": recipe.servings,
        "cost_per_serving": recipe.cost_per_serving,
        "markets": markets,
    })))
}

/// Adds the recipe to one of the caller's collections, bumping `counter`
/// only when the row is new.
async fn add_to_collection(
    pool: &SqlitePool,
    table: &str,
    counter: &str,
    user_id: i64,
    recipe_id: i64,
) -> Result<i64, AppError> {
    let mut tx = pool.begin().await?;
    lock_recipe(&mut tx, recipe_id).await?;

    let inserted = sqlx::query(&format!(
        "INSERT OR IGNORE INTO {table} (user_id, recipe_id, created_at) VALUES ($1, $2, $3)"
    ))
    .bind(user_id)
    .bind(recipe_id)
    .bind(chrono::Utc::now())
    .execute(&mut *tx)
    .await?
    .rows_affected();

    if inserted == 1 {
        sqlx::query(&format!("UPDATE recipes SET {counter} = {counter} + 1 WHERE id = $1"))
            .bind(recipe_id)
            .execute(&mut *tx)
            .await?;
    }

    let count = sqlx::query_scalar::<_, i64>(&format!("SELECT {counter} FROM recipes WHERE id = $1"))
        .bind(recipe_id)
        .fetch_one(&mut *tx)
        .await?;

    tx.commit().await?;
    Ok(count)
}

async fn remove_from_collection(
    pool: &SqlitePool,
    table: &str,
    counter: &str,
    user_id: i64,
    recipe_id: i64,
) -> Result<i64, AppError> {
    let mut tx = pool.begin().await?;
    lock_recipe(&mut tx, recipe_id).await?;

    let removed = sqlx::query(&format!("DELETE FROM {table} WHERE user_id = $1 AND recipe_id = $2"))
        .bind(user_id)
        .bind(recipe_id)
        .execute(&mut *tx)
        .await?
        .rows_affected();

    if removed == 1 {
        sqlx::query(&format!(
            "UPDATE recipes SET {counter} = MAX(0, {counter} - 1) WHERE id = $1"
        ))
        .bind(recipe_id)
        .execute(&mut *tx)
        .await?;
    }

    let count = sqlx::query_scalar::<_, i64>(&format!("SELECT {counter} FROM recipes WHERE id = $1"))
        .bind(recipe_id)
        .fetch_one(&mut *tx)
        .await?;

    tx.commit().await?;
    Ok(count)
}

/// Like a recipe. Repeating the request changes nothing.
pub async fn like_recipe(
    State(pool): State<SqlitePool>,
    user: AuthUser,
    Path(id): Path<i64>,
) -> Result<impl IntoResponse, AppError> {
    let like_count = add_to_collection(&pool, "recipe_likes", "like_count", user.id, id).await?;
    Ok(Json(json!({ "liked": true, "like_count": like_count })))
}

pub async fn unlike_recipe(
    State(pool): State<SqlitePool>,
    user: AuthUser,
    Path(id): Path<i64>,
) -> Result<impl IntoResponse, AppError> {
    let like_count = remove_from_collection(&pool, "recipe_likes", "like_count", user.id, id).await?;
    Ok(Json(json!({ "liked": false, "like_count": like_count })))
}

/// Bookmark a recipe. Repeating the request changes nothing.
pub async fn bookmark_recipe(
    State(pool): State<SqlitePool>,
    user: AuthUser,
    Path(id): Path<i64>,
) -> Result<impl IntoResponse, AppError> {
    let bookmark_count =
        add_to_collection(&pool, "recipe_bookmarks", "bookmark_count", user.id, id).await?;
    Ok(Json(json!({ "bookmarked": true, "bookmark_count": bookmark_count })))
}

pub async fn unbookmark_recipe(
    State(pool): State<SqlitePool>,
    user: AuthUser,
    Path(id): Path<i64>,
) -> Result<impl IntoResponse, AppError> {
    let bookmark_count =
        remove_from_collection(&pool, "recipe_bookmarks", "bookmark_count", user.id, id).await?;
    Ok(Json(json!({ "bookmarked": false, "bookmark_count": bookmark_count })))
}

/// Submit or edit the caller's taste/difficulty rating.
///
/// Omitted fields keep their previous value, `null` withdraws that score.
pub async fn rate_recipe(
    State(pool): State<SqlitePool>,
    user: AuthUser,
    Path(id): Path<i64>,
    Json(payload): Json<RateRecipeRequest>,
) -> Result<impl IntoResponse, AppError> {
    payload.validate()?;

    let mut tx = pool.begin().await?;
    lock_recipe(&mut tx, id).await?;

    let existing = sqlx::query_as::<_, RecipeRating>(
        r#"
        SELECT id, user_id, recipe_id, taste_rating, difficulty_rating, created_at, updated_at
        FROM recipe_ratings WHERE user_id = $1 AND recipe_id = $2
        "#,
    )
    .bind(user.id)
    .bind(id)
    .fetch_optional(&mut *tx)
    .await?;

    let (old_taste, old_difficulty) = existing
        .as_ref()
        .map(|r| (r.taste_rating, r.difficulty_rating))
        .unwrap_or((None, None));

    let taste = payload.taste_rating.unwrap_or(old_taste);
    let difficulty = payload.difficulty_rating.unwrap_or(old_difficulty);

    if existing.is_none() && taste.is_none() && difficulty.is_none() {
        return Err(AppError::BadRequest(
            "Provide a taste_rating or a difficulty_rating".to_string(),
        ));
    }

    let mut changes = Vec::new();
    if let Some(change) = RatingChange::between(old_taste, payload.taste_rating) {
        changes.push((RatingKind::Taste, change));
    }
    if let Some(change) = RatingChange::between(old_difficulty, payload.difficulty_rating) {
        changes.push((RatingKind::Difficulty, change));
    }

    let now = chrono::Utc::now();
    match (&existing, taste, difficulty) {
        (Some(row), None, None) => {
            sqlx::query("DELETE FROM recipe_ratings WHERE id = $1")
                .bind(row.id)
                .execute(&mut *tx)
                .await?;
        }
        (Some(row), _, _) => {
            sqlx::query(
                "UPDATE recipe_ratings SET taste_rating = $1, difficulty_rating = $2, updated_at = $3 WHERE id = $4",
            )
            .bind(taste)
            .bind(difficulty)
            .bind(now)
            .bind(row.id)
            .execute(&mut *tx)
            .await?;
        }
        (None, _, _) => {
            sqlx::query(
                r#"
                INSERT INTO recipe_ratings (user_id, recipe_id, taste_rating, difficulty_rating, created_at, updated_at)
                VALUES ($1, $2, $3, $4, $5, $5)
                "#,
            )
            .bind(user.id)
            .bind(id)
            .bind(taste)
            .bind(difficulty)
            .bind(now)
            .execute(&mut *tx)
            .await?;

            record_activity(&mut tx, user.id, ActivityVerb::RatedRecipe, ActivityObject::Recipe, id).await?;
        }
    }

    apply_rating_changes(&mut tx, id, &changes).await?;
    tx.commit().await?;

    Ok(Json(json!({
        "taste_rating": taste,
        "difficulty_rating": difficulty,
        "recipe": fetch_recipe(&pool, id).await?,
    })))
}

/// Withdraw the caller's rating entirely.
pub async fn delete_rating(
    State(pool): State<SqlitePool>,
    user: AuthUser,
    Path(id): Path<i64>,
) -> Result<impl IntoResponse, AppError> {
    let mut tx = pool.begin().await?;
    lock_recipe(&mut tx, id).await?;

    let removed = sqlx::query_as::<_, (Option<f64>, Option<f64>)>(
        "DELETE FROM recipe_ratings WHERE user_id = $1 AND recipe_id = $2 RETURNING taste_rating, difficulty_rating",
    )
    .bind(user.id)
    .bind(id)
    .fetch_optional(&mut *tx)
    .await?
    .ok_or(AppError::NotFound("You have not rated this recipe".to_string()))?;

    let mut changes = Vec::new();
    if let Some(taste) = removed.0 {
        changes.push((RatingKind::Taste, RatingChange::Drop(taste)));
    }
    if let Some(difficulty) = removed.1 {
        changes.push((RatingKind::Difficulty, RatingChange::Drop(difficulty)));
    }

    apply_rating_changes(&mut tx, id, &changes).await?;
    tx.commit().await?;

    Ok(StatusCode::NO_CONTENT)
}

fn require_dietitian(user: &AuthUser) -> Result<(), AppError> {
    if user.role() != Role::Dietitian {
        return Err(AppError::Forbidden(
            "Only dietitians can give health ratings".to_string(),
        ));
    }
    Ok(())
}

/// Submit or edit a dietitian's health rating.
pub async fn rate_health(
    State(pool): State<SqlitePool>,
    user: AuthUser,
    Path(id): Path<i64>,
    Json(payload): Json<HealthRatingRequest>,
) -> Result<impl IntoResponse, AppError> {
    require_dietitian(&user)?;
    payload.validate()?;

    let mut tx = pool.begin().await?;
    lock_recipe(&mut tx, id).await?;

    let now = chrono::Utc::now();
    let old = sqlx::query_scalar::<_, f64>(
        "SELECT health_score FROM health_ratings WHERE dietitian_id = $1 AND recipe_id = $2",
    )
    .bind(user.id)
    .bind(id)
    .fetch_optional(&mut *tx)
    .await?;

    sqlx::query(
        r#"
        INSERT INTO health_ratings (dietitian_id, recipe_id, health_score, comment, created_at, updated_at)
        VALUES ($1, $2, $3, $4, $5, $5)
        ON CONFLICT (dietitian_id, recipe_id)
        DO UPDATE SET health_score = excluded.health_score, comment = excluded.comment, updated_at = excluded.updated_at
        "#,
    )
    .bind(user.id)
    .bind(id)
    .bind(payload.health_score)
    .bind(payload.comment.as_deref())
    .bind(now)
    .execute(&mut *tx)
    .await?;

    if let Some(change) = RatingChange::between(old, Some(Some(payload.health_score))) {
        apply_rating_changes(&mut tx, id, &[(RatingKind::Health, change)]).await?;
    }

    tx.commit().await?;

    let status = if old.is_some() { StatusCode::OK } else { StatusCode::CREATED };
    Ok((status, Json(fetch_recipe(&pool, id).await?)))
}

/// Withdraw a dietitian's health rating.
pub async fn delete_health_rating(
    State(pool): State<SqlitePool>,
    user: AuthUser,
    Path(id): Path<i64>,
) -> Result<impl IntoResponse, AppError> {
    require_dietitian(&user)?;

    let mut tx = pool.begin().await?;
    lock_recipe(&mut tx, id).await?;

    let score = sqlx::query_scalar::<_, f64>(
        "DELETE FROM health_ratings WHERE dietitian_id = $1 AND recipe_id = $2 RETURNING health_score",
    )
    .bind(user.id)
    .bind(id)
    .fetch_optional(&mut *tx)
    .await?
    .ok_or(AppError::NotFound("You have not rated this recipe".to_string()))?;

    apply_rating_changes(&mut tx, id, &[(RatingKind::Health, RatingChange::Drop(score))]).await?;
    tx.commit().await?;

    Ok(StatusCode::NO_CONTENT)
}
