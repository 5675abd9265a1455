use crate::{
    api::{BulkDelete, BulkDeleteResponse, bulk_delete, delete_error, message},
    db::{self, Table},
    error::{AppError, AppResult},
    model::attendance_type::AttendanceType,
    utils::{
        type_cache,
        validation::{ValidationErrors, check_max_len, check_name},
    },
};
use actix_web::{HttpResponse, http::StatusCode, web};
use serde::Deserialize;
use sqlx::MySqlPool;
use tracing::info;
use utoipa::ToSchema;

#[derive(Deserialize, ToSchema)]
pub struct CreateAttendanceType {
    #[schema(example = "Entrada")]
    pub name: String,
    #[schema(example = "Marcación de entrada")]
    pub description: Option<String>,
}

#[derive(Deserialize, ToSchema)]
pub struct UpdateAttendanceType {
    pub name: Option<String>,
    pub description: Option<String>,
}

fn validate(name: &str, description: Option<&str>) -> ValidationErrors {
    let mut errors = ValidationErrors::default();
    check_name(&mut errors, "name", name, 3, 255, "attendance type name");
    if let Some(description) = description {
        check_max_len(&mut errors, "description", description, 1000);
    }
    errors
}

async fn find(pool: &MySqlPool, id: u64) -> AppResult<AttendanceType> {
    sqlx::query_as::<_, AttendanceType>("SELECT * FROM attendance_types WHERE id = ?")
        .bind(id)
        .fetch_optional(pool)
        .await?
        .ok_or(AppError::NotFound("Attendance type not found"))
}

async fn validate_unique(
    pool: &MySqlPool,
    name: &str,
    description: Option<&str>,
    except_id: u64,
) -> AppResult<()> {
    let mut errors = validate(name, description);
    if !errors.has("name") {
        let taken = sqlx::query_scalar::<_, i64>(
            "SELECT COUNT(*) FROM attendance_types WHERE name = ? AND id <> ?",
        )
        .bind(name.trim())
        .bind(except_id)
        .fetch_one(pool)
        .await?;
        if taken > 0 {
            errors.add("name", "The attendance type name has already been taken");
        }
    }
    Ok(errors.into_result()?)
}

fn unique_conflict(e: sqlx::Error) -> AppError {
    if db::is_unique_violation(&e) {
        AppError::Conflict("The attendance type name has already been taken".into())
    } else {
        AppError::Database(e)
    }
}

/// Create Attendance Type
#[utoipa::path(
    post,
    path = "/api/attendance-types",
    request_body = CreateAttendanceType,
    responses(
        (status = 201, description = "Attendance type created", body = AttendanceType),
        (status = 422, description = "Validation failed")
    ),
    tag = "Attendance Type",
    security(("bearer_auth" = []))
)]
pub async fn create_attendance_type(
    pool: web::Data<MySqlPool>,
    payload: web::Json<CreateAttendanceType>,
) -> AppResult<HttpResponse> {
    validate_unique(&pool, &payload.name, payload.description.as_deref(), 0).await?;

    let result = sqlx::query("INSERT INTO attendance_types (name, description) VALUES (?, ?)")
        .bind(payload.name.trim())
        .bind(&payload.description)
        .execute(pool.get_ref())
        .await
        .map_err(unique_conflict)?;

    type_cache::invalidate();
    let created = find(&pool, result.last_insert_id()).await?;
    info!(attendance_type_id = created.id, "Attendance type created");
    Ok(HttpResponse::Created().json(created))
}

/// List Attendance Types
#[utoipa::path(
    get,
    path = "/api/attendance-types",
    responses((status = 200, description = "All attendance types", body = [AttendanceType])),
    tag = "Attendance Type",
    security(("bearer_auth" = []))
)]
pub async fn list_attendance_types(pool: web::Data<MySqlPool>) -> AppResult<HttpResponse> {
    let data = sqlx::query_as::<_, AttendanceType>("SELECT * FROM attendance_types ORDER BY id")
        .fetch_all(pool.get_ref())
        .await?;
    Ok(HttpResponse::Ok().json(data))
}

/// Get Attendance Type
#[utoipa::path(
    get,
    path = "/api/attendance-types/{id}",
    params(("id" = u64, Path, description = "Attendance type id")),
    responses(
        (status = 200, description = "Attendance type found", body = AttendanceType),
        (status = 404, description = "Attendance type not found")
    ),
    tag = "Attendance Type",
    security(("bearer_auth" = []))
)]
pub async fn get_attendance_type(
    pool: web::Data<MySqlPool>,
    path: web::Path<u64>,
) -> AppResult<HttpResponse> {
    Ok(HttpResponse::Ok().json(find(&pool, path.into_inner()).await?))
}

/// Update Attendance Type
#[utoipa::path(
    put,
    path = "/api/attendance-types/{id}",
    params(("id" = u64, Path, description = "Attendance type id")),
    request_body = UpdateAttendanceType,
    responses(
        (status = 200, description = "Attendance type updated", body = AttendanceType),
        (status = 404, description = "Attendance type not found"),
        (status = 422, description = "Validation failed")
    ),
    tag = "Attendance Type",
    security(("bearer_auth" = []))
)]
pub async fn update_attendance_type(
    pool: web::Data<MySqlPool>,
    path: web::Path<u64>,
    body: web::Json<UpdateAttendanceType>,
) -> AppResult<HttpResponse> {
    let id = path.into_inner();
    let current = find(&pool, id).await?;
    let body = body.into_inner();

    let name = body.name.unwrap_or(current.name);
    let description = body.description.or(current.description);
    validate_unique(&pool, &name, description.as_deref(), id).await?;

    sqlx::query("UPDATE attendance_types SET name = ?, description = ? WHERE id = ?")
        .bind(name.trim())
        .bind(&description)
        .bind(id)
        .execute(pool.get_ref())
        .await
        .map_err(unique_conflict)?;

    type_cache::invalidate();
    info!(attendance_type_id = id, "Attendance type updated");
    Ok(HttpResponse::Ok().json(find(&pool, id).await?))
}

/// Delete Attendance Type
///
/// Marks of this type are deleted with it.
#[utoipa::path(
    delete,
    path = "/api/attendance-types/{id}",
    params(("id" = u64, Path, description = "Attendance type id")),
    responses(
        (status = 200, description = "Successfully deleted"),
        (status = 404, description = "Attendance type not found")
    ),
    tag = "Attendance Type",
    security(("bearer_auth" = []))
)]
pub async fn delete_attendance_type(
    pool: web::Data<MySqlPool>,
    path: web::Path<u64>,
) -> AppResult<HttpResponse> {
    let id = path.into_inner();
    let result = sqlx::query("DELETE FROM attendance_types WHERE id = ?")
        .bind(id)
        .execute(pool.get_ref())
        .await
        .map_err(|e| delete_error(e, "Attendance type is in use"))?;

    type_cache::invalidate();
    if result.rows_affected() == 0 {
        return Err(AppError::NotFound("Attendance type not found"));
    }
    Ok(message(StatusCode::OK, "Successfully deleted"))
}

/// Bulk delete Attendance Types
#[utoipa::path(
    post,
    path = "/api/attendance-types/bulk-delete",
    request_body = BulkDelete,
    responses((status = 200, description = "Deleted", body = BulkDeleteResponse)),
    tag = "Attendance Type",
    security(("bearer_auth" = []))
)]
pub async fn bulk_delete_attendance_types(
    pool: web::Data<MySqlPool>,
    body: web::Json<BulkDelete>,
) -> AppResult<HttpResponse> {
    let response = bulk_delete(
        &pool,
        Table::AttendanceTypes,
        &body.ids,
        "Attendance type is in use",
    )
    .await;
    type_cache::invalidate();
    response
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn seeded_names_are_valid() {
        assert!(validate("Entrada", Some("Marcación de entrada")).is_empty());
        assert!(validate("Salida", None).is_empty());
    }

    #[test]
    fn short_or_symbolic_names_are_rejected() {
        assert!(validate("In", None).has("name"));
        assert!(validate("Entrada-1", None).has("name"));
    }
}
