// src/handlers/ingredient.rs

use axum::{
    Json,
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
};
use sqlx::{QueryBuilder, Sqlite, SqlitePool, types::Json as SqlJson};
use validator::Validate;

use crate::{
    error::{AppError, is_unique_violation},
    handlers::recipe::recompute_recipe,
    models::{
        ingredient::{CreateIngredientRequest, Ingredient, IngredientListParams, UpdateIngredientRequest},
        page_limit,
    },
};

const INGREDIENT_COLUMNS: &str = "id, name, category, allergens, dietary_info, base_quantity, \
     base_unit, calories, protein, fat, carbs, prices, created_at";

fn name_taken(e: sqlx::Error) -> AppError {
    if is_unique_violation(&e) {
        AppError::Conflict("An ingredient with this name already exists".to_string())
    } else {
        tracing::error!("Failed to save ingredient: {:?}", e);
        AppError::from(e)
    }
}

/// Browse the ingredient catalogue in id order.
pub async fn list_ingredients(
    State(pool): State<SqlitePool>,
    Query(params): Query<IngredientListParams>,
) -> Result<impl IntoResponse, AppError> {
    let mut builder: QueryBuilder<Sqlite> =
        QueryBuilder::new(format!("SELECT {INGREDIENT_COLUMNS} FROM ingredients WHERE 1 = 1"));

    if let Some(q) = params.q.as_deref().map(str::trim).filter(|q| !q.is_empty()) {
        builder.push(" AND instr(lower(name), lower(");
        builder.push_bind(q.to_string());
        builder.push(")) > 0");
    }
    if let Some(category) = params.category.as_deref() {
        builder.push(" AND category = ");
        builder.push_bind(category.to_string());
    }
    if let Some(cursor) = params.cursor {
        builder.push(" AND id > ");
        builder.push_bind(cursor);
    }
    builder.push(" ORDER BY id LIMIT ");
    builder.push_bind(page_limit(params.limit));

    let ingredients = builder
        .build_query_as::<Ingredient>()
        .fetch_all(&pool)
        .await?;

    Ok(Json(ingredients))
}

pub async fn get_ingredient(
    State(pool): State<SqlitePool>,
    Path(id): Path<i64>,
) -> Result<impl IntoResponse, AppError> {
    let ingredient = sqlx::query_as::<_, Ingredient>(&format!(
        "SELECT {INGREDIENT_COLUMNS} FROM ingredients WHERE id = $1"
    ))
    .bind(id)
    .fetch_optional(&pool)
    .await?
    .ok_or(AppError::NotFound("Ingredient not found".to_string()))?;

    Ok(Json(ingredient))
}

/// Add an ingredient to the catalogue (Admin).
pub async fn create_ingredient(
    State(pool): State<SqlitePool>,
    Json(payload): Json<CreateIngredientRequest>,
) -> Result<impl IntoResponse, AppError> {
    payload.validate()?;

    let ingredient = sqlx::query_as::<_, Ingredient>(&format!(
        r#"
        INSERT INTO ingredients
            (name, category, allergens, dietary_info, base_quantity, base_unit,
             calories, protein, fat, carbs, prices, created_at)
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12)
        RETURNING {INGREDIENT_COLUMNS}
        "#
    ))
    .bind(payload.name.trim())
    .bind(payload.category.trim())
    .bind(SqlJson(&payload.allergens))
    .bind(SqlJson(&payload.dietary_info))
    .bind(payload.base_quantity)
    .bind(payload.base_unit)
    .bind(payload.calories)
    .bind(payload.protein)
    .bind(payload.fat)
    .bind(payload.carbs)
    .bind(SqlJson(&payload.prices))
    .bind(chrono::Utc::now())
    .fetch_one(&pool)
    .await
    .map_err(name_taken)?;

    tracing::info!(ingredient_id = ingredient.id, name = %ingredient.name, "Ingredient added");

    Ok((StatusCode::CREATED, Json(ingredient)))
}

/// Edit an ingredient (Admin).
///
/// Nutrition, unit or price changes are pushed into every live recipe that
/// uses the ingredient, in the same transaction.
pub async fn update_ingredient(
    State(pool): State<SqlitePool>,
    Path(id): Path<i64>,
    Json(payload): Json<UpdateIngredientRequest>,
) -> Result<impl IntoResponse, AppError> {
    payload.validate()?;
    payload
        .validate_collections()
        .map_err(|e| AppError::BadRequest(e.to_string()))?;

    let mut tx = pool.begin().await?;

    let mut builder: QueryBuilder<Sqlite> = QueryBuilder::new("UPDATE ingredients SET ");
    let mut separated = builder.separated(", ");
    // Keeps the statement valid when the body is empty.
    separated.push("id = id");

    if let Some(name) = &payload.name {
        separated.push("name = ");
        separated.push_bind_unseparated(name.trim().to_string());
    }
    if let Some(category) = &payload.category {
        separated.push("category = ");
        separated.push_bind_unseparated(category.trim().to_string());
    }
    if let Some(allergens) = &payload.allergens {
        separated.push("allergens = ");
        separated.push_bind_unseparated(SqlJson(allergens.clone()));
    }
    if let Some(dietary_info) = &payload.dietary_info {
        separated.push("dietary_info = ");
        separated.push_bind_unseparated(SqlJson(dietary_info.clone()));
    }
    if let Some(base_quantity) = payload.base_quantity {
        separated.push("base_quantity = ");
        separated.push_bind_unseparated(base_quantity);
    }
    if let Some(base_unit) = payload.base_unit {
        separated.push("base_unit = ");
        separated.push_bind_unseparated(base_unit);
    }
    for (column, value) in [
        ("calories", payload.calories),
        ("protein", payload.protein),
        ("fat", payload.fat),
        ("carbs", payload.carbs),
    ] {
        if let Some(value) = value {
            separated.push(format!("{column} = "));
            separated.push_bind_unseparated(value);
        }
    }
    if let Some(prices) = &payload.prices {
        separated.push("prices = ");
        separated.push_bind_unseparated(SqlJson(prices.clone()));
    }

    builder.push(" WHERE id = ");
    builder.push_bind(id);

    let updated = builder
        .build()
        .execute(&mut *tx)
        .await
        .map_err(name_taken)?
        .rows_affected();

    if updated == 0 {
        return Err(AppError::NotFound("Ingredient not found".to_string()));
    }

    if payload.affects_recipes() {
        let recipe_ids = sqlx::query_scalar::<_, i64>(
            r#"
            SELECT DISTINCT ri.recipe_id
            FROM recipe_ingredients ri
            JOIN recipes r ON r.id = ri.recipe_id
            WHERE ri.ingredient_id = $1 AND r.deleted_on IS NULL
            "#,
        )
        .bind(id)
        .fetch_all(&mut *tx)
        .await?;

        for recipe_id in &recipe_ids {
            recompute_recipe(&mut tx, *recipe_id).await?;
        }

        tracing::info!(ingredient_id = id, recipes = recipe_ids.len(), "Recipes recomputed");
    }

    let ingredient = sqlx::query_as::<_, Ingredient>(&format!(
        "SELECT {INGREDIENT_COLUMNS} FROM ingredients WHERE id = $1"
    ))
    .bind(id)
    .fetch_one(&mut *tx)
    .await?;

    tx.commit().await?;

    Ok(Json(ingredient))
}
