use crate::{
    api::{BulkDelete, BulkDeleteResponse, bulk_delete, delete_error, message, page_bounds},
    db::{self, Table},
    error::{AppError, AppResult},
    model::position::Position,
    utils::validation::{ValidationErrors, check_max_len, check_name},
};
use actix_web::{HttpResponse, http::StatusCode, web};
use serde::{Deserialize, Serialize};
use sqlx::MySqlPool;
use tracing::{debug, info};
use utoipa::{IntoParams, ToSchema};

const REFERENCED: &str = "Position is assigned to employees and cannot be deleted";

#[derive(Deserialize, ToSchema)]
pub struct CreatePosition {
    #[schema(example = "Auxiliar de Limpieza")]
    pub name: String,
    #[schema(example = "Personal de limpieza")]
    pub description: Option<String>,
}

#[derive(Deserialize, ToSchema)]
pub struct UpdatePosition {
    pub name: Option<String>,
    pub description: Option<String>,
}

#[derive(Debug, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct PositionQuery {
    pub page: Option<u32>,
    pub per_page: Option<u32>,
    /// Matches on name
    pub search: Option<String>,
}

#[derive(Serialize, ToSchema)]
pub struct PositionListResponse {
    pub data: Vec<Position>,
    pub page: u32,
    pub per_page: u32,
    pub total: i64,
}

fn validate(name: &str, description: Option<&str>) -> ValidationErrors {
    let mut errors = ValidationErrors::default();
    check_name(&mut errors, "name", name, 5, 255, "position name");
    if let Some(description) = description {
        check_max_len(&mut errors, "description", description, 1000);
    }
    errors
}

async fn name_taken(pool: &MySqlPool, name: &str, except_id: u64) -> AppResult<bool> {
    let count = sqlx::query_scalar::<_, i64>(
        "SELECT COUNT(*) FROM positions WHERE name = ? AND id <> ?",
    )
    .bind(name)
    .bind(except_id)
    .fetch_one(pool)
    .await?;
    Ok(count > 0)
}

async fn find(pool: &MySqlPool, id: u64) -> AppResult<Position> {
    sqlx::query_as::<_, Position>("SELECT * FROM positions WHERE id = ?")
        .bind(id)
        .fetch_optional(pool)
        .await?
        .ok_or(AppError::NotFound("Position not found"))
}

async fn validate_unique(
    pool: &MySqlPool,
    name: &str,
    description: Option<&str>,
    except_id: u64,
) -> AppResult<()> {
    let mut errors = validate(name, description);
    if !errors.has("name") && name_taken(pool, name.trim(), except_id).await? {
        errors.add("name", "The position name has already been taken");
    }
    Ok(errors.into_result()?)
}

fn unique_conflict(e: sqlx::Error) -> AppError {
    if db::is_unique_violation(&e) {
        AppError::Conflict("The position name has already been taken".into())
    } else {
        AppError::Database(e)
    }
}

/// Create Position
#[utoipa::path(
    post,
    path = "/api/positions",
    request_body = CreatePosition,
    responses(
        (status = 201, description = "Position created", body = Position),
        (status = 422, description = "Validation failed"),
        (status = 409, description = "Name already taken")
    ),
    tag = "Position",
    security(("bearer_auth" = []))
)]
pub async fn create_position(
    pool: web::Data<MySqlPool>,
    payload: web::Json<CreatePosition>,
) -> AppResult<HttpResponse> {
    validate_unique(&pool, &payload.name, payload.description.as_deref(), 0).await?;

    let result = sqlx::query("INSERT INTO positions (name, description) VALUES (?, ?)")
        .bind(payload.name.trim())
        .bind(&payload.description)
        .execute(pool.get_ref())
        .await
        .map_err(unique_conflict)?;

    let position = find(&pool, result.last_insert_id()).await?;
    info!(position_id = position.id, "Position created");
    Ok(HttpResponse::Created().json(position))
}

/// List Positions
#[utoipa::path(
    get,
    path = "/api/positions",
    params(PositionQuery),
    responses((status = 200, description = "Paginated positions", body = PositionListResponse)),
    tag = "Position",
    security(("bearer_auth" = []))
)]
pub async fn list_positions(
    pool: web::Data<MySqlPool>,
    query: web::Query<PositionQuery>,
) -> AppResult<HttpResponse> {
    let (page, per_page, offset) = page_bounds(query.page, query.per_page, 20);
    let like = query.search.as_ref().map(|s| format!("%{}%", s.trim()));

    let where_clause = if like.is_some() { "WHERE name LIKE ?" } else { "" };

    let count_sql = format!("SELECT COUNT(*) FROM positions {where_clause}");
    let mut count_query = sqlx::query_scalar::<_, i64>(&count_sql);
    if let Some(like) = &like {
        count_query = count_query.bind(like);
    }
    let total = count_query.fetch_one(pool.get_ref()).await?;

    let data_sql =
        format!("SELECT * FROM positions {where_clause} ORDER BY name LIMIT ? OFFSET ?");
    debug!(sql = %data_sql, page, per_page, "Fetching positions");
    let mut data_query = sqlx::query_as::<_, Position>(&data_sql);
    if let Some(like) = &like {
        data_query = data_query.bind(like);
    }
    let data = data_query
        .bind(per_page as i64)
        .bind(offset as i64)
        .fetch_all(pool.get_ref())
        .await?;

    Ok(HttpResponse::Ok().json(PositionListResponse {
        data,
        page,
        per_page,
        total,
    }))
}

/// Get Position
#[utoipa::path(
    get,
    path = "/api/positions/{id}",
    params(("id" = u64, Path, description = "Position id")),
    responses(
        (status = 200, description = "Position found", body = Position),
        (status = 404, description = "Position not found")
    ),
    tag = "Position",
    security(("bearer_auth" = []))
)]
pub async fn get_position(
    pool: web::Data<MySqlPool>,
    path: web::Path<u64>,
) -> AppResult<HttpResponse> {
    let position = find(&pool, path.into_inner()).await?;
    Ok(HttpResponse::Ok().json(position))
}

/// Update Position
#[utoipa::path(
    put,
    path = "/api/positions/{id}",
    params(("id" = u64, Path, description = "Position id")),
    request_body = UpdatePosition,
    responses(
        (status = 200, description = "Position updated", body = Position),
        (status = 404, description = "Position not found"),
        (status = 422, description = "Validation failed")
    ),
    tag = "Position",
    security(("bearer_auth" = []))
)]
pub async fn update_position(
    pool: web::Data<MySqlPool>,
    path: web::Path<u64>,
    body: web::Json<UpdatePosition>,
) -> AppResult<HttpResponse> {
    let id = path.into_inner();
    let current = find(&pool, id).await?;
    let body = body.into_inner();

    let name = body.name.unwrap_or(current.name);
    let description = body.description.or(current.description);
    validate_unique(&pool, &name, description.as_deref(), id).await?;

    sqlx::query("UPDATE positions SET name = ?, description = ? WHERE id = ?")
        .bind(name.trim())
        .bind(&description)
        .bind(id)
        .execute(pool.get_ref())
        .await
        .map_err(unique_conflict)?;

    info!(position_id = id, "Position updated");
    Ok(HttpResponse::Ok().json(find(&pool, id).await?))
}

/// Delete Position
#[utoipa::path(
    delete,
    path = "/api/positions/{id}",
    params(("id" = u64, Path, description = "Position id")),
    responses(
        (status = 200, description = "Successfully deleted"),
        (status = 404, description = "Position not found"),
        (status = 409, description = "Position still assigned to employees")
    ),
    tag = "Position",
    security(("bearer_auth" = []))
)]
pub async fn delete_position(
    pool: web::Data<MySqlPool>,
    path: web::Path<u64>,
) -> AppResult<HttpResponse> {
    let id = path.into_inner();
    let result = sqlx::query("DELETE FROM positions WHERE id = ?")
        .bind(id)
        .execute(pool.get_ref())
        .await
        .map_err(|e| delete_error(e, REFERENCED))?;

    if result.rows_affected() == 0 {
        return Err(AppError::NotFound("Position not found"));
    }
    Ok(message(StatusCode::OK, "Successfully deleted"))
}

/// Bulk delete Positions
#[utoipa::path(
    post,
    path = "/api/positions/bulk-delete",
    request_body = BulkDelete,
    responses(
        (status = 200, description = "Deleted", body = BulkDeleteResponse),
        (status = 409, description = "A position is still assigned to employees")
    ),
    tag = "Position",
    security(("bearer_auth" = []))
)]
pub async fn bulk_delete_positions(
    pool: web::Data<MySqlPool>,
    body: web::Json<BulkDelete>,
) -> AppResult<HttpResponse> {
    bulk_delete(&pool, Table::Positions, &body.ids, REFERENCED).await
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn position_names_need_five_letters() {
        assert!(validate("Chofer", None).is_empty());
        assert!(validate("Jefe", None).has("name"));
        assert!(validate("Jefe 2", None).has("name"));
    }

    #[test]
    fn description_is_capped() {
        let long = "a".repeat(1001);
        assert!(validate("Chofer", Some(&long)).has("description"));
    }
}
