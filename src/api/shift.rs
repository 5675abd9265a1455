use crate::{
    api::{BulkDelete, BulkDeleteResponse, bulk_delete, day_end, day_start, delete_error, message, page_bounds},
    db::{self, Table},
    error::{AppError, AppResult},
    model::shift::Shift,
    utils::validation::{ValidationErrors, check_max_len, check_name},
};
use actix_web::{HttpResponse, http::StatusCode, web};
use chrono::{NaiveDate, NaiveTime};
use serde::{Deserialize, Serialize};
use sqlx::MySqlPool;
use tracing::{debug, info};
use utoipa::{IntoParams, ToSchema};

#[derive(Deserialize, ToSchema)]
pub struct CreateShift {
    #[schema(example = "Mañana")]
    pub name: String,
    #[schema(example = "Turno de mañana")]
    pub description: Option<String>,
    #[schema(example = "06:00:00", value_type = String, format = "time")]
    pub start_time: NaiveTime,
    #[schema(example = "12:30:00", value_type = String, format = "time")]
    pub end_time: NaiveTime,
}

#[derive(Deserialize, ToSchema)]
pub struct UpdateShift {
    pub name: Option<String>,
    pub description: Option<String>,
    #[schema(value_type = Option<String>, format = "time")]
    pub start_time: Option<NaiveTime>,
    #[schema(value_type = Option<String>, format = "time")]
    pub end_time: Option<NaiveTime>,
}

#[derive(Debug, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct ShiftQuery {
    pub page: Option<u32>,
    pub per_page: Option<u32>,
    /// Created on or after (yyyy-mm-dd)
    #[param(value_type = Option<String>, format = "date")]
    pub created_from: Option<NaiveDate>,
    /// Created on or before (yyyy-mm-dd)
    #[param(value_type = Option<String>, format = "date")]
    pub created_until: Option<NaiveDate>,
}

#[derive(Serialize, ToSchema)]
pub struct ShiftView {
    #[serde(flatten)]
    #[schema(inline)]
    pub shift: Shift,
    /// End time falls before start time
    pub overnight: bool,
}

impl From<Shift> for ShiftView {
    fn from(shift: Shift) -> Self {
        Self {
            overnight: shift.is_overnight(),
            shift,
        }
    }
}

#[derive(Serialize, ToSchema)]
pub struct ShiftListResponse {
    pub data: Vec<ShiftView>,
    pub page: u32,
    pub per_page: u32,
    pub total: i64,
}

struct ShiftInput<'a> {
    name: &'a str,
    description: Option<&'a str>,
    start_time: NaiveTime,
    end_time: NaiveTime,
}

fn validate(input: &ShiftInput<'_>) -> ValidationErrors {
    let mut errors = ValidationErrors::default();
    check_name(&mut errors, "name", input.name, 3, 255, "shift name");
    if let Some(description) = input.description {
        check_max_len(&mut errors, "description", description, 1000);
    }
    errors
}

async fn validate_unique(pool: &MySqlPool, input: &ShiftInput<'_>, except_id: u64) -> AppResult<()> {
    let mut errors = validate(input);

    if !errors.has("name") {
        let taken = sqlx::query_scalar::<_, i64>(
            "SELECT COUNT(*) FROM shifts WHERE name = ? AND id <> ?",
        )
        .bind(input.name.trim())
        .bind(except_id)
        .fetch_one(pool)
        .await?;
        if taken > 0 {
            errors.add("name", "The shift name has already been taken");
        }
    }

    let same_hours = sqlx::query_scalar::<_, i64>(
        "SELECT COUNT(*) FROM shifts WHERE start_time = ? AND end_time = ? AND id <> ?",
    )
    .bind(input.start_time)
    .bind(input.end_time)
    .bind(except_id)
    .fetch_one(pool)
    .await?;
    if same_hours > 0 {
        errors.add("start_time", "These hours are already registered for another shift");
    }

    Ok(errors.into_result()?)
}

async fn find(pool: &MySqlPool, id: u64) -> AppResult<Shift> {
    sqlx::query_as::<_, Shift>("SELECT * FROM shifts WHERE id = ?")
        .bind(id)
        .fetch_optional(pool)
        .await?
        .ok_or(AppError::NotFound("Shift not found"))
}

fn unique_conflict(e: sqlx::Error) -> AppError {
    if db::is_unique_violation(&e) {
        AppError::Conflict("A shift with this name or these hours already exists".into())
    } else {
        AppError::Database(e)
    }
}

/// Create Shift
#[utoipa::path(
    post,
    path = "/api/shifts",
    request_body = CreateShift,
    responses(
        (status = 201, description = "Shift created", body = ShiftView),
        (status = 422, description = "Validation failed")
    ),
    tag = "Shift",
    security(("bearer_auth" = []))
)]
pub async fn create_shift(
    pool: web::Data<MySqlPool>,
    payload: web::Json<CreateShift>,
) -> AppResult<HttpResponse> {
    let input = ShiftInput {
        name: &payload.name,
        description: payload.description.as_deref(),
        start_time: payload.start_time,
        end_time: payload.end_time,
    };
    validate_unique(&pool, &input, 0).await?;

    let result = sqlx::query(
        "INSERT INTO shifts (name, description, start_time, end_time) VALUES (?, ?, ?, ?)",
    )
    .bind(input.name.trim())
    .bind(input.description)
    .bind(input.start_time)
    .bind(input.end_time)
    .execute(pool.get_ref())
    .await
    .map_err(unique_conflict)?;

    let shift = find(&pool, result.last_insert_id()).await?;
    info!(shift_id = shift.id, overnight = shift.is_overnight(), "Shift created");
    Ok(HttpResponse::Created().json(ShiftView::from(shift)))
}

/// List Shifts
#[utoipa::path(
    get,
    path = "/api/shifts",
    params(ShiftQuery),
    responses((status = 200, description = "Paginated shifts", body = ShiftListResponse)),
    tag = "Shift",
    security(("bearer_auth" = []))
)]
pub async fn list_shifts(
    pool: web::Data<MySqlPool>,
    query: web::Query<ShiftQuery>,
) -> AppResult<HttpResponse> {
    let (page, per_page, offset) = page_bounds(query.page, query.per_page, 20);

    let mut conditions = Vec::new();
    let mut bindings = Vec::new();
    if let Some(from) = query.created_from {
        conditions.push("created_at >= ?");
        bindings.push(day_start(from));
    }
    if let Some(until) = query.created_until {
        conditions.push("created_at < ?");
        bindings.push(day_end(until));
    }
    let where_clause = if conditions.is_empty() {
        String::new()
    } else {
        format!("WHERE {}", conditions.join(" AND "))
    };

    let count_sql = format!("SELECT COUNT(*) FROM shifts {where_clause}");
    let mut count_query = sqlx::query_scalar::<_, i64>(&count_sql);
    for b in &bindings {
        count_query = count_query.bind(*b);
    }
    let total = count_query.fetch_one(pool.get_ref()).await?;

    let data_sql =
        format!("SELECT * FROM shifts {where_clause} ORDER BY start_time, name LIMIT ? OFFSET ?");
    debug!(sql = %data_sql, page, per_page, "Fetching shifts");
    let mut data_query = sqlx::query_as::<_, Shift>(&data_sql);
    for b in &bindings {
        data_query = data_query.bind(*b);
    }
    let shifts = data_query
        .bind(per_page as i64)
        .bind(offset as i64)
        .fetch_all(pool.get_ref())
        .await?;

    Ok(HttpResponse::Ok().json(ShiftListResponse {
        data: shifts.into_iter().map(ShiftView::from).collect(),
        page,
        per_page,
        total,
    }))
}

/// Get Shift
#[utoipa::path(
    get,
    path = "/api/shifts/{id}",
    params(("id" = u64, Path, description = "Shift id")),
    responses(
        (status = 200, description = "Shift found", body = ShiftView),
        (status = 404, description = "Shift not found")
    ),
    tag = "Shift",
    security(("bearer_auth" = []))
)]
pub async fn get_shift(
    pool: web::Data<MySqlPool>,
    path: web::Path<u64>,
) -> AppResult<HttpResponse> {
    let shift = find(&pool, path.into_inner()).await?;
    Ok(HttpResponse::Ok().json(ShiftView::from(shift)))
}

/// Update Shift
#[utoipa::path(
    put,
    path = "/api/shifts/{id}",
    params(("id" = u64, Path, description = "Shift id")),
    request_body = UpdateShift,
    responses(
        (status = 200, description = "Shift updated", body = ShiftView),
        (status = 404, description = "Shift not found"),
        (status = 422, description = "Validation failed")
    ),
    tag = "Shift",
    security(("bearer_auth" = []))
)]
pub async fn update_shift(
    pool: web::Data<MySqlPool>,
    path: web::Path<u64>,
    body: web::Json<UpdateShift>,
) -> AppResult<HttpResponse> {
    let id = path.into_inner();
    let current = find(&pool, id).await?;
    let body = body.into_inner();

    let name = body.name.unwrap_or(current.name);
    let description = body.description.or(current.description);
    let input = ShiftInput {
        name: &name,
        description: description.as_deref(),
        start_time: body.start_time.unwrap_or(current.start_time),
        end_time: body.end_time.unwrap_or(current.end_time),
    };
    validate_unique(&pool, &input, id).await?;

    sqlx::query(
        "UPDATE shifts SET name = ?, description = ?, start_time = ?, end_time = ? WHERE id = ?",
    )
    .bind(input.name.trim())
    .bind(input.description)
    .bind(input.start_time)
    .bind(input.end_time)
    .bind(id)
    .execute(pool.get_ref())
    .await
    .map_err(unique_conflict)?;

    info!(shift_id = id, "Shift updated");
    Ok(HttpResponse::Ok().json(ShiftView::from(find(&pool, id).await?)))
}

/// Delete Shift
///
/// Marks recorded against this shift are deleted with it.
#[utoipa::path(
    delete,
    path = "/api/shifts/{id}",
    params(("id" = u64, Path, description = "Shift id")),
    responses(
        (status = 200, description = "Successfully deleted"),
        (status = 404, description = "Shift not found")
    ),
    tag = "Shift",
    security(("bearer_auth" = []))
)]
pub async fn delete_shift(
    pool: web::Data<MySqlPool>,
    path: web::Path<u64>,
) -> AppResult<HttpResponse> {
    let id = path.into_inner();
    let result = sqlx::query("DELETE FROM shifts WHERE id = ?")
        .bind(id)
        .execute(pool.get_ref())
        .await
        .map_err(|e| delete_error(e, "Shift is in use"))?;

    if result.rows_affected() == 0 {
        return Err(AppError::NotFound("Shift not found"));
    }
    Ok(message(StatusCode::OK, "Successfully deleted"))
}

/// Bulk delete Shifts
#[utoipa::path(
    post,
    path = "/api/shifts/bulk-delete",
    request_body = BulkDelete,
    responses((status = 200, description = "Deleted", body = BulkDeleteResponse)),
    tag = "Shift",
    security(("bearer_auth" = []))
)]
pub async fn bulk_delete_shifts(
    pool: web::Data<MySqlPool>,
    body: web::Json<BulkDelete>,
) -> AppResult<HttpResponse> {
    bulk_delete(&pool, Table::Shifts, &body.ids, "Shift is in use").await
}
