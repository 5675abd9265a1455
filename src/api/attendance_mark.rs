use std::collections::HashMap;

use crate::{
    api::message,
    attendance::{
        guard::{GuardOutcome, ManualMark, create_guarded},
        notification::Notification,
        store::MySqlMarkStore,
    },
    auth::auth::AuthUser,
    error::{AppError, AppResult},
    model::attendance_mark::MarkDetail,
    utils::validation::ValidationErrors,
};
use actix_web::{HttpResponse, http::StatusCode, web};
use chrono::NaiveTime;
use serde::{Deserialize, Serialize};
use serde_json::json;
use sqlx::{MySql, MySqlPool, QueryBuilder};
use tracing::info;
use utoipa::ToSchema;

const SELECT_DETAIL: &str = r#"
    SELECT m.id, m.attendance_record_id, m.shift_id,
           s.name AS shift_name, s.start_time AS shift_start_time,
           m.attendance_type_id, t.name AS attendance_type_name, m.marked_time
    FROM attendance_marks m
    JOIN shifts s ON s.id = m.shift_id
    JOIN attendance_types t ON t.id = m.attendance_type_id
"#;

#[derive(Deserialize, ToSchema)]
pub struct UpdateMark {
    pub shift_id: Option<u64>,
    pub attendance_type_id: Option<u64>,
    #[schema(example = "08:05:00", value_type = Option<String>, format = "time")]
    pub marked_time: Option<NaiveTime>,
}

#[derive(Serialize, ToSchema)]
pub struct MarkCreated {
    pub id: u64,
    pub notification: Notification,
}

/// Marks of one record, by shift start then time.
pub async fn marks_of_record(pool: &MySqlPool, record_id: u64) -> Result<Vec<MarkDetail>, sqlx::Error> {
    sqlx::query_as::<_, MarkDetail>(&format!(
        "{SELECT_DETAIL} WHERE m.attendance_record_id = ? ORDER BY s.start_time, m.marked_time, m.id"
    ))
    .bind(record_id)
    .fetch_all(pool)
    .await
}

/// Marks of many records keyed by record id.
pub async fn marks_by_record(
    pool: &MySqlPool,
    record_ids: &[u64],
) -> Result<HashMap<u64, Vec<MarkDetail>>, sqlx::Error> {
    let mut grouped: HashMap<u64, Vec<MarkDetail>> = HashMap::new();
    if record_ids.is_empty() {
        return Ok(grouped);
    }

    let mut qb = QueryBuilder::<MySql>::new(SELECT_DETAIL);
    qb.push(" WHERE m.attendance_record_id IN (");
    let mut ids = qb.separated(", ");
    for id in record_ids {
        ids.push_bind(*id);
    }
    ids.push_unseparated(") ORDER BY m.id");

    for mark in qb.build_query_as::<MarkDetail>().fetch_all(pool).await? {
        grouped.entry(mark.attendance_record_id).or_default().push(mark);
    }
    Ok(grouped)
}

async fn find(pool: &MySqlPool, id: u64) -> AppResult<MarkDetail> {
    sqlx::query_as::<_, MarkDetail>(&format!("{SELECT_DETAIL} WHERE m.id = ?"))
        .bind(id)
        .fetch_optional(pool)
        .await?
        .ok_or(AppError::NotFound("Attendance mark not found"))
}

async fn ensure_record(pool: &MySqlPool, record_id: u64) -> AppResult<()> {
    let count = sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM attendance_records WHERE id = ?")
        .bind(record_id)
        .fetch_one(pool)
        .await?;
    if count == 0 {
        return Err(AppError::NotFound("Attendance record not found"));
    }
    Ok(())
}

async fn exists(pool: &MySqlPool, table: &str, id: u64) -> Result<bool, sqlx::Error> {
    let sql = format!("SELECT COUNT(*) FROM {table} WHERE id = ?");
    let count = sqlx::query_scalar::<_, i64>(&sql)
        .bind(id)
        .fetch_one(pool)
        .await?;
    Ok(count > 0)
}

/// List Marks of a Record
#[utoipa::path(
    get,
    path = "/api/attendance-records/{id}/marks",
    params(("id" = u64, Path, description = "Attendance record id")),
    responses(
        (status = 200, description = "Marks of the record", body = [MarkDetail]),
        (status = 404, description = "Attendance record not found")
    ),
    tag = "Attendance Mark",
    security(("bearer_auth" = []))
)]
pub async fn list_marks(
    pool: web::Data<MySqlPool>,
    path: web::Path<u64>,
) -> AppResult<HttpResponse> {
    let record_id = path.into_inner();
    ensure_record(&pool, record_id).await?;
    Ok(HttpResponse::Ok().json(marks_of_record(&pool, record_id).await?))
}

/// Create Mark
///
/// Rejected with 409 when the record already has a mark of the same type
/// for the same shift.
#[utoipa::path(
    post,
    path = "/api/attendance-records/{id}/marks",
    params(("id" = u64, Path, description = "Attendance record id")),
    request_body = ManualMark,
    responses(
        (status = 201, description = "Mark created", body = MarkCreated),
        (status = 404, description = "Record, shift or attendance type not found"),
        (status = 409, description = "Duplicate mark", body = Object, example = json!({
            "message": "There is already a entrada mark for shift mañana on this day.",
            "notification": {
                "level": "danger",
                "title": "Mark rejected",
                "body": "There is already a entrada mark for shift mañana on this day."
            }
        }))
    ),
    tag = "Attendance Mark",
    security(("bearer_auth" = []))
)]
pub async fn create_mark(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    path: web::Path<u64>,
    payload: web::Json<ManualMark>,
) -> AppResult<HttpResponse> {
    let record_id = path.into_inner();

    let mut tx = pool.begin().await?;
    let outcome = create_guarded(&mut MySqlMarkStore::new(&mut *tx), record_id, &payload).await?;

    match outcome {
        GuardOutcome::Created {
            mark_id,
            notification,
        } => {
            tx.commit().await?;
            info!(record_id, mark_id, user = %auth.username, "Attendance mark created");
            Ok(HttpResponse::Created().json(MarkCreated {
                id: mark_id,
                notification,
            }))
        }
        GuardOutcome::Rejected { notification } => {
            tx.rollback().await?;
            let text = notification
                .body
                .clone()
                .unwrap_or_else(|| notification.title.clone());
            Ok(HttpResponse::Conflict().json(json!({
                "message": text,
                "notification": notification,
            })))
        }
    }
}

/// Update Mark
#[utoipa::path(
    put,
    path = "/api/attendance-marks/{id}",
    params(("id" = u64, Path, description = "Attendance mark id")),
    request_body = UpdateMark,
    responses(
        (status = 200, description = "Mark updated", body = MarkDetail),
        (status = 404, description = "Attendance mark not found"),
        (status = 422, description = "Unknown shift or attendance type")
    ),
    tag = "Attendance Mark",
    security(("bearer_auth" = []))
)]
pub async fn update_mark(
    pool: web::Data<MySqlPool>,
    path: web::Path<u64>,
    body: web::Json<UpdateMark>,
) -> AppResult<HttpResponse> {
    let id = path.into_inner();
    let current = find(&pool, id).await?;

    let shift_id = body.shift_id.unwrap_or(current.shift_id);
    let attendance_type_id = body.attendance_type_id.unwrap_or(current.attendance_type_id);
    let marked_time = body.marked_time.unwrap_or(current.marked_time);

    let mut errors = ValidationErrors::default();
    if !exists(&pool, "shifts", shift_id).await? {
        errors.add("shift_id", "The selected shift is invalid");
    }
    if !exists(&pool, "attendance_types", attendance_type_id).await? {
        errors.add("attendance_type_id", "The selected attendance type is invalid");
    }
    errors.into_result()?;

    sqlx::query(
        "UPDATE attendance_marks SET shift_id = ?, attendance_type_id = ?, marked_time = ? WHERE id = ?",
    )
    .bind(shift_id)
    .bind(attendance_type_id)
    .bind(marked_time)
    .bind(id)
    .execute(pool.get_ref())
    .await?;

    info!(mark_id = id, "Attendance mark updated");
    Ok(HttpResponse::Ok().json(find(&pool, id).await?))
}

/// Delete Mark
#[utoipa::path(
    delete,
    path = "/api/attendance-marks/{id}",
    params(("id" = u64, Path, description = "Attendance mark id")),
    responses(
        (status = 200, description = "Successfully deleted"),
        (status = 404, description = "Attendance mark not found")
    ),
    tag = "Attendance Mark",
    security(("bearer_auth" = []))
)]
pub async fn delete_mark(
    pool: web::Data<MySqlPool>,
    path: web::Path<u64>,
) -> AppResult<HttpResponse> {
    let result = sqlx::query("DELETE FROM attendance_marks WHERE id = ?")
        .bind(path.into_inner())
        .execute(pool.get_ref())
        .await?;

    if result.rows_affected() == 0 {
        return Err(AppError::NotFound("Attendance mark not found"));
    }
    Ok(message(StatusCode::OK, "Successfully deleted"))
}
