// src/routes/category_routes.rs

use axum::{
    Json, Router,
    extract::State,
    http::StatusCode,
    routing::get,
};
use serde::Deserialize;
use uuid::Uuid;

use crate::{
    db,
    error::ApiError,
    extract::{ApiJson, ApiPath},
    middleware::auth_context::AuthContext,
    models::{ApiOk, AppState, CategoryRow, Role},
};

#[derive(Debug, Deserialize)]
pub struct CreateCategoryRequest {
    pub name: String,
    #[serde(default)]
    pub description: String,
}

#[derive(Debug, Deserialize)]
pub struct UpdateCategoryRequest {
    pub name: Option<String>,
    pub description: Option<String>,
}

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", get(list_categories).post(create_category))
        .route(
            "/{category_id}",
            get(get_category).put(update_category).delete(delete_category),
        )
}

fn validate_category_name(name: &str) -> Result<&str, ApiError> {
    let name = name.trim();
    let len = name.chars().count();
    if !(2..=100).contains(&len) {
        return Err(ApiError::validation(
            "name must be between 2 and 100 characters",
        ));
    }
    Ok(name)
}

fn map_write_error(e: sqlx::Error) -> ApiError {
    if db::is_unique_violation(&e, "categories_name_key") {
        ApiError::Conflict("CATEGORY_EXISTS", "Category name already exists".into())
    } else {
        ApiError::db(e)
    }
}

pub async fn list_categories(
    State(state): State<AppState>,
) -> Result<Json<ApiOk<Vec<CategoryRow>>>, ApiError> {
    let rows: Vec<CategoryRow> = sqlx::query_as::<_, CategoryRow>(
        r#"
        SELECT id, name, description, created_at, updated_at
        FROM categories
        ORDER BY name
        "#,
    )
    .fetch_all(&state.db)
    .await
    .map_err(ApiError::db)?;

    Ok(Json(ApiOk::new(rows)))
}

pub async fn get_category(
    State(state): State<AppState>,
    ApiPath(category_id): ApiPath<Uuid>,
) -> Result<Json<ApiOk<CategoryRow>>, ApiError> {
    let row: CategoryRow = sqlx::query_as::<_, CategoryRow>(
        r#"
        SELECT id, name, description, created_at, updated_at
        FROM categories
        WHERE id = $1
        "#,
    )
    .bind(category_id)
    .fetch_optional(&state.db)
    .await
    .map_err(ApiError::db)?
    .ok_or_else(|| ApiError::not_found("Category"))?;

    Ok(Json(ApiOk::new(row)))
}

pub async fn create_category(
    State(state): State<AppState>,
    auth: AuthContext,
    ApiJson(req): ApiJson<CreateCategoryRequest>,
) -> Result<(StatusCode, Json<ApiOk<CategoryRow>>), ApiError> {
    auth.require(Role::Admin)?;
    let name = validate_category_name(&req.name)?;

    let row: CategoryRow = sqlx::query_as::<_, CategoryRow>(
        r#"
        INSERT INTO categories (name, description)
        VALUES ($1, $2)
        RETURNING id, name, description, created_at, updated_at
        "#,
    )
    .bind(name)
    .bind(req.description.trim())
    .fetch_one(&state.db)
    .await
    .map_err(map_write_error)?;

    Ok((StatusCode::CREATED, Json(ApiOk::new(row))))
}

pub async fn update_category(
    State(state): State<AppState>,
    auth: AuthContext,
    ApiPath(category_id): ApiPath<Uuid>,
    ApiJson(req): ApiJson<UpdateCategoryRequest>,
) -> Result<Json<ApiOk<CategoryRow>>, ApiError> {
    auth.require(Role::Admin)?;
    if req.name.is_none() && req.description.is_none() {
        return Err(ApiError::validation("at least one field must be provided"));
    }
    let name = req.name.as_deref().map(validate_category_name).transpose()?;

    let row: CategoryRow = sqlx::query_as::<_, CategoryRow>(
        r#"
        UPDATE categories
        SET
          name        = COALESCE($2, name),
          description = COALESCE($3, description),
          updated_at  = now()
        WHERE id = $1
        RETURNING id, name, description, created_at, updated_at
        "#,
    )
    .bind(category_id)
    .bind(name)
    .bind(req.description.as_deref().map(str::trim))
    .fetch_optional(&state.db)
    .await
    .map_err(map_write_error)?
    .ok_or_else(|| ApiError::not_found("Category"))?;

    Ok(Json(ApiOk::new(row)))
}

pub async fn delete_category(
    State(state): State<AppState>,
    auth: AuthContext,
    ApiPath(category_id): ApiPath<Uuid>,
) -> Result<Json<ApiOk<()>>, ApiError> {
    auth.require(Role::Admin)?;

    let res = sqlx::query(r#"DELETE FROM categories WHERE id = $1"#)
        .bind(category_id)
        .execute(&state.db)
        .await
        .map_err(|e| {
            if db::is_foreign_key_violation(&e) {
                ApiError::Conflict(
                    "CATEGORY_IN_USE",
                    "Category still has doctors assigned".into(),
                )
            } else {
                ApiError::db(e)
            }
        })?;

    if res.rows_affected() == 0 {
        return Err(ApiError::not_found("Category"));
    }
    Ok(Json(ApiOk::new(())))
}
