use crate::{
    api::{
        BulkDelete, BulkDeleteResponse,
        attendance_mark::{marks_by_record, marks_of_record},
        bulk_delete, message, page_bounds, today,
    },
    attendance::{
        export,
        notification::Notification,
        reconcile::{RecordKind, ReconcileRequest, reconcile},
        store::MySqlMarkStore,
    },
    auth::auth::AuthUser,
    db::{self, Table},
    error::{AppError, AppResult},
    model::{
        attendance_mark::MarkDetail,
        attendance_record::{AttendanceRecord, AttendanceRecordRow},
        employee::Employee,
    },
    utils::validation::{ValidationErrors, check_max_len},
};
use actix_web::{HttpResponse, http::StatusCode, web};
use chrono::{NaiveDate, NaiveTime};
use serde::{Deserialize, Serialize};
use sqlx::{MySql, MySqlPool, QueryBuilder};
use tracing::{debug, info};
use utoipa::{IntoParams, ToSchema};

const XLSX_CONTENT_TYPE: &str = "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet";

const SELECT_ROW: &str = r#"
    SELECT r.id, r.employee_id, r.date, r.observations,
           e.dni, e.paternal_surname, e.maternal_surname, e.names
    FROM attendance_records r
    JOIN employees e ON e.id = r.employee_id
"#;

#[derive(Deserialize, ToSchema)]
pub struct CreateAttendanceRecord {
    #[schema(example = 1)]
    pub employee_id: u64,
    /// Defaults to today
    #[schema(example = "2025-04-18", value_type = Option<String>, format = "date")]
    pub date: Option<NaiveDate>,
    pub observations: Option<String>,
    #[schema(example = "present")]
    pub record_type: RecordKind,
    #[schema(example = 1)]
    pub shift_id: Option<u64>,
    #[schema(example = "06:02:00", value_type = Option<String>, format = "time")]
    pub manual_start_time: Option<NaiveTime>,
    #[schema(example = "12:31:00", value_type = Option<String>, format = "time")]
    pub manual_end_time: Option<NaiveTime>,
}

/// Omitting `record_type` leaves the marks untouched.
#[derive(Deserialize, ToSchema)]
pub struct UpdateAttendanceRecord {
    pub employee_id: Option<u64>,
    #[schema(value_type = Option<String>, format = "date")]
    pub date: Option<NaiveDate>,
    pub observations: Option<String>,
    pub record_type: Option<RecordKind>,
    pub shift_id: Option<u64>,
    #[schema(value_type = Option<String>, format = "time")]
    pub manual_start_time: Option<NaiveTime>,
    #[schema(value_type = Option<String>, format = "time")]
    pub manual_end_time: Option<NaiveTime>,
}

#[derive(Debug, Default, Deserialize, ToSchema)]
pub struct RecordFilter {
    /// First day, defaults to today
    #[schema(value_type = Option<String>, format = "date")]
    pub from: Option<NaiveDate>,
    /// Last day, defaults to today
    #[schema(value_type = Option<String>, format = "date")]
    pub until: Option<NaiveDate>,
    pub employee_id: Option<u64>,
}

#[derive(Debug, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct RecordQuery {
    pub page: Option<u32>,
    pub per_page: Option<u32>,
    /// First day, defaults to today
    #[param(value_type = Option<String>, format = "date")]
    pub from: Option<NaiveDate>,
    /// Last day, defaults to today
    #[param(value_type = Option<String>, format = "date")]
    pub until: Option<NaiveDate>,
    pub employee_id: Option<u64>,
}

impl RecordQuery {
    fn filter(&self) -> RecordFilter {
        RecordFilter {
            from: self.from,
            until: self.until,
            employee_id: self.employee_id,
        }
    }
}

/// Explicit `ids` take precedence over the filter.
#[derive(Debug, Default, Deserialize, ToSchema)]
pub struct ExportRequest {
    #[serde(default)]
    pub ids: Vec<u64>,
    #[serde(flatten)]
    #[schema(inline)]
    pub filter: RecordFilter,
}

#[derive(Serialize, ToSchema)]
pub struct RecordListResponse {
    pub data: Vec<AttendanceRecordRow>,
    pub page: u32,
    pub per_page: u32,
    pub total: i64,
}

#[derive(Serialize, ToSchema)]
pub struct RecordSaved {
    pub record: AttendanceRecord,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub notification: Option<Notification>,
}

#[derive(Serialize, ToSchema)]
pub struct RecordDetail {
    pub record: AttendanceRecord,
    pub employee: Employee,
    pub marks: Vec<MarkDetail>,
}

impl RecordFilter {
    /// Inclusive day range with today as the default for either end.
    fn range(&self, today: NaiveDate) -> (NaiveDate, NaiveDate) {
        (self.from.unwrap_or(today), self.until.unwrap_or(today))
    }

    fn push_where(&self, qb: &mut QueryBuilder<'_, MySql>, today: NaiveDate) {
        let (from, until) = self.range(today);
        qb.push(" WHERE r.date >= ")
            .push_bind(from)
            .push(" AND r.date <= ")
            .push_bind(until);
        if let Some(employee_id) = self.employee_id {
            qb.push(" AND r.employee_id = ").push_bind(employee_id);
        }
    }
}

/// Stored and submitted values of one record.
struct RecordInput {
    employee_id: u64,
    date: NaiveDate,
    observations: Option<String>,
}

/// Blank observations are stored as NULL.
fn normalize_observations(observations: Option<String>) -> Option<String> {
    observations
        .map(|o| o.trim().to_string())
        .filter(|o| !o.is_empty())
}

/// A submitted value replaces the stored one, a blank one clears it.
fn merge_observations(submitted: Option<String>, current: Option<String>) -> Option<String> {
    match submitted {
        Some(observations) => normalize_observations(Some(observations)),
        None => current,
    }
}

fn validate_observations(errors: &mut ValidationErrors, observations: Option<&str>) {
    if let Some(observations) = observations {
        check_max_len(errors, "observations", observations, 1000);
    }
}

async fn validate_record(
    pool: &MySqlPool,
    input: &RecordInput,
    request: Option<&ReconcileRequest>,
    except_id: u64,
) -> AppResult<()> {
    let mut errors = match request.map(ReconcileRequest::validate) {
        Some(Err(errors)) => errors,
        _ => ValidationErrors::default(),
    };
    validate_observations(&mut errors, input.observations.as_deref());

    let employee = sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM employees WHERE id = ?")
        .bind(input.employee_id)
        .fetch_one(pool)
        .await?;
    if employee == 0 {
        errors.add("employee_id", "The selected employee is invalid");
    } else {
        let same_day = sqlx::query_scalar::<_, i64>(
            "SELECT COUNT(*) FROM attendance_records WHERE employee_id = ? AND date = ? AND id <> ?",
        )
        .bind(input.employee_id)
        .bind(input.date)
        .bind(except_id)
        .fetch_one(pool)
        .await?;
        if same_day > 0 {
            errors.add(
                "employee_id",
                "The employee already has an attendance record for this date",
            );
        }
    }

    Ok(errors.into_result()?)
}

fn write_error(e: sqlx::Error) -> AppError {
    if db::is_unique_violation(&e) {
        AppError::Conflict("The employee already has an attendance record for this date".into())
    } else if db::is_fk_missing_parent(&e) {
        ValidationErrors::single("employee_id", "The selected employee is invalid").into()
    } else {
        AppError::Database(e)
    }
}

async fn find(pool: &MySqlPool, id: u64) -> AppResult<AttendanceRecord> {
    sqlx::query_as::<_, AttendanceRecord>("SELECT * FROM attendance_records WHERE id = ?")
        .bind(id)
        .fetch_optional(pool)
        .await?
        .ok_or(AppError::NotFound("Attendance record not found"))
}

/// Create Attendance Record
///
/// `present` with a shift and both times writes the entry and exit
/// marks, `absent` clears them. Both run in the same transaction as the
/// record insert.
#[utoipa::path(
    post,
    path = "/api/attendance-records",
    request_body = CreateAttendanceRecord,
    responses(
        (status = 201, description = "Record created", body = RecordSaved),
        (status = 422, description = "Validation failed"),
        (status = 409, description = "Employee already has a record for the date")
    ),
    tag = "Attendance Record",
    security(("bearer_auth" = []))
)]
pub async fn create_record(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    payload: web::Json<CreateAttendanceRecord>,
) -> AppResult<HttpResponse> {
    let payload = payload.into_inner();
    let request = ReconcileRequest {
        kind: payload.record_type,
        shift_id: payload.shift_id,
        start: payload.manual_start_time,
        end: payload.manual_end_time,
    };
    let input = RecordInput {
        employee_id: payload.employee_id,
        date: payload.date.unwrap_or_else(today),
        observations: normalize_observations(payload.observations),
    };
    validate_record(&pool, &input, Some(&request), 0).await?;

    let mut tx = pool.begin().await?;
    let record_id = sqlx::query(
        "INSERT INTO attendance_records (employee_id, date, observations) VALUES (?, ?, ?)",
    )
    .bind(input.employee_id)
    .bind(input.date)
    .bind(&input.observations)
    .execute(&mut *tx)
    .await
    .map_err(write_error)?
    .last_insert_id();

    let outcome = reconcile(&mut MySqlMarkStore::new(&mut *tx), record_id, &request).await?;
    tx.commit().await?;

    info!(
        record_id,
        employee_id = input.employee_id,
        kind = %request.kind,
        user = %auth.username,
        "Attendance record created"
    );
    Ok(HttpResponse::Created().json(RecordSaved {
        record: find(&pool, record_id).await?,
        notification: outcome.notification(),
    }))
}

/// List Attendance Records
#[utoipa::path(
    get,
    path = "/api/attendance-records",
    params(RecordQuery),
    responses((status = 200, description = "Paginated records", body = RecordListResponse)),
    tag = "Attendance Record",
    security(("bearer_auth" = []))
)]
pub async fn list_records(
    pool: web::Data<MySqlPool>,
    query: web::Query<RecordQuery>,
) -> AppResult<HttpResponse> {
    let (page, per_page, offset) = page_bounds(query.page, query.per_page, 20);
    let today = today();
    let filter = query.filter();

    let mut count = QueryBuilder::<MySql>::new(
        "SELECT COUNT(*) FROM attendance_records r JOIN employees e ON e.id = r.employee_id",
    );
    filter.push_where(&mut count, today);
    let total = count
        .build_query_scalar::<i64>()
        .fetch_one(pool.get_ref())
        .await?;

    let mut data = QueryBuilder::<MySql>::new(SELECT_ROW);
    filter.push_where(&mut data, today);
    data.push(" ORDER BY r.date DESC, e.paternal_surname, e.names LIMIT ")
        .push_bind(per_page as i64)
        .push(" OFFSET ")
        .push_bind(offset as i64);
    debug!(sql = %data.sql(), page, per_page, "Fetching attendance records");

    let rows = data
        .build_query_as::<AttendanceRecordRow>()
        .fetch_all(pool.get_ref())
        .await?;

    Ok(HttpResponse::Ok().json(RecordListResponse {
        data: rows,
        page,
        per_page,
        total,
    }))
}

/// Get Attendance Record
#[utoipa::path(
    get,
    path = "/api/attendance-records/{id}",
    params(("id" = u64, Path, description = "Attendance record id")),
    responses(
        (status = 200, description = "Record with employee and marks", body = RecordDetail),
        (status = 404, description = "Attendance record not found")
    ),
    tag = "Attendance Record",
    security(("bearer_auth" = []))
)]
pub async fn get_record(
    pool: web::Data<MySqlPool>,
    path: web::Path<u64>,
) -> AppResult<HttpResponse> {
    let record = find(&pool, path.into_inner()).await?;
    let employee = sqlx::query_as::<_, Employee>("SELECT * FROM employees WHERE id = ?")
        .bind(record.employee_id)
        .fetch_one(pool.get_ref())
        .await?;
    let marks = marks_of_record(&pool, record.id).await?;

    Ok(HttpResponse::Ok().json(RecordDetail {
        record,
        employee,
        marks,
    }))
}

/// Update Attendance Record
#[utoipa::path(
    put,
    path = "/api/attendance-records/{id}",
    params(("id" = u64, Path, description = "Attendance record id")),
    request_body = UpdateAttendanceRecord,
    responses(
        (status = 200, description = "Record updated", body = RecordSaved),
        (status = 404, description = "Attendance record not found"),
        (status = 422, description = "Validation failed")
    ),
    tag = "Attendance Record",
    security(("bearer_auth" = []))
)]
pub async fn update_record(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    path: web::Path<u64>,
    body: web::Json<UpdateAttendanceRecord>,
) -> AppResult<HttpResponse> {
    let id = path.into_inner();
    let current = find(&pool, id).await?;
    let body = body.into_inner();

    let request = body.record_type.map(|kind| ReconcileRequest {
        kind,
        shift_id: body.shift_id,
        start: body.manual_start_time,
        end: body.manual_end_time,
    });
    let input = RecordInput {
        employee_id: body.employee_id.unwrap_or(current.employee_id),
        date: body.date.unwrap_or(current.date),
        observations: merge_observations(body.observations, current.observations),
    };
    validate_record(&pool, &input, request.as_ref(), id).await?;

    let mut tx = pool.begin().await?;
    sqlx::query(
        "UPDATE attendance_records SET employee_id = ?, date = ?, observations = ? WHERE id = ?",
    )
    .bind(input.employee_id)
    .bind(input.date)
    .bind(&input.observations)
    .bind(id)
    .execute(&mut *tx)
    .await
    .map_err(write_error)?;

    let notification = match &request {
        Some(request) => reconcile(&mut MySqlMarkStore::new(&mut *tx), id, request)
            .await?
            .notification(),
        None => None,
    };
    tx.commit().await?;

    info!(record_id = id, user = %auth.username, "Attendance record updated");
    Ok(HttpResponse::Ok().json(RecordSaved {
        record: find(&pool, id).await?,
        notification,
    }))
}

/// Delete Attendance Record
///
/// Its marks are deleted with it.
#[utoipa::path(
    delete,
    path = "/api/attendance-records/{id}",
    params(("id" = u64, Path, description = "Attendance record id")),
    responses(
        (status = 200, description = "Successfully deleted"),
        (status = 404, description = "Attendance record not found")
    ),
    tag = "Attendance Record",
    security(("bearer_auth" = []))
)]
pub async fn delete_record(
    pool: web::Data<MySqlPool>,
    path: web::Path<u64>,
) -> AppResult<HttpResponse> {
    let result = sqlx::query("DELETE FROM attendance_records WHERE id = ?")
        .bind(path.into_inner())
        .execute(pool.get_ref())
        .await?;

    if result.rows_affected() == 0 {
        return Err(AppError::NotFound("Attendance record not found"));
    }
    Ok(message(StatusCode::OK, "Successfully deleted"))
}

/// Bulk delete Attendance Records
#[utoipa::path(
    post,
    path = "/api/attendance-records/bulk-delete",
    request_body = BulkDelete,
    responses((status = 200, description = "Deleted", body = BulkDeleteResponse)),
    tag = "Attendance Record",
    security(("bearer_auth" = []))
)]
pub async fn bulk_delete_records(
    pool: web::Data<MySqlPool>,
    body: web::Json<BulkDelete>,
) -> AppResult<HttpResponse> {
    bulk_delete(&pool, Table::AttendanceRecords, &body.ids, "Attendance record is in use").await
}

/// Export Attendance Records
///
/// One spreadsheet row per record and shift.
#[utoipa::path(
    post,
    path = "/api/attendance-records/export",
    request_body = ExportRequest,
    responses(
        (status = 200, description = "xlsx workbook", content_type = "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet")
    ),
    tag = "Attendance Record",
    security(("bearer_auth" = []))
)]
pub async fn export_records(
    pool: web::Data<MySqlPool>,
    body: web::Json<ExportRequest>,
) -> AppResult<HttpResponse> {
    let today = today();

    let mut qb = QueryBuilder::<MySql>::new(SELECT_ROW);
    if body.ids.is_empty() {
        body.filter.push_where(&mut qb, today);
    } else {
        qb.push(" WHERE r.id IN (");
        let mut ids = qb.separated(", ");
        for id in &body.ids {
            ids.push_bind(*id);
        }
        ids.push_unseparated(")");
    }
    let records = qb
        .build_query_as::<AttendanceRecordRow>()
        .fetch_all(pool.get_ref())
        .await?;

    let record_ids: Vec<u64> = records.iter().map(|r| r.id).collect();
    let marks = marks_by_record(&pool, &record_ids).await?;
    let rows = export::project_all(&records, &marks);
    let workbook = export::write_workbook(&rows)?;

    let filename = export::filename(today);
    info!(records = records.len(), rows = rows.len(), %filename, "Attendance exported");
    Ok(HttpResponse::Ok()
        .content_type(XLSX_CONTENT_TYPE)
        .insert_header((
            "Content-Disposition",
            format!("attachment; filename=\"{filename}\""),
        ))
        .body(workbook))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::fixtures;
    use actix_web::ResponseError;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn filter_defaults_to_today() {
        let today = date(2025, 4, 18);
        assert_eq!(RecordFilter::default().range(today), (today, today));

        let filter = RecordFilter {
            from: Some(date(2025, 4, 1)),
            ..Default::default()
        };
        assert_eq!(filter.range(today), (date(2025, 4, 1), today));
    }

    #[test]
    fn filter_builds_date_and_employee_conditions() {
        let filter = RecordFilter {
            employee_id: Some(3),
            ..Default::default()
        };
        let mut qb = QueryBuilder::<MySql>::new("SELECT 1 FROM attendance_records r");
        filter.push_where(&mut qb, date(2025, 4, 18));

        assert_eq!(
            qb.sql(),
            "SELECT 1 FROM attendance_records r WHERE r.date >= ? AND r.date <= ? AND r.employee_id = ?"
        );
    }

    #[test]
    fn export_request_accepts_ids_or_filter() {
        let by_ids: ExportRequest = serde_json::from_str(r#"{"ids":[4,5]}"#).unwrap();
        assert_eq!(by_ids.ids, [4, 5]);
        assert!(by_ids.filter.from.is_none());

        let by_filter: ExportRequest =
            serde_json::from_str(r#"{"from":"2025-04-01","employee_id":2}"#).unwrap();
        assert!(by_filter.ids.is_empty());
        assert_eq!(by_filter.filter.from, Some(date(2025, 4, 1)));
        assert_eq!(by_filter.filter.employee_id, Some(2));
    }

    #[test]
    fn create_payload_accepts_spanish_record_types() {
        let payload: CreateAttendanceRecord = serde_json::from_str(
            r#"{"employee_id":1,"record_type":"falta"}"#,
        )
        .unwrap();
        assert_eq!(payload.record_type, RecordKind::Absent);
        assert!(payload.date.is_none());
    }

    #[test]
    fn observations_are_capped() {
        let mut errors = ValidationErrors::default();
        validate_observations(&mut errors, Some(&"x".repeat(1001)));
        assert!(errors.has("observations"));
    }

    #[test]
    fn blank_observations_clear_the_stored_text() {
        let stored = Some("Llegó tarde".to_string());

        assert_eq!(merge_observations(Some("  ".into()), stored.clone()), None);
        assert_eq!(merge_observations(Some(String::new()), stored.clone()), None);
        assert_eq!(merge_observations(None, stored.clone()), stored);
        assert_eq!(
            merge_observations(Some(" Permiso médico ".into()), stored),
            Some("Permiso médico".to_string())
        );
        assert_eq!(normalize_observations(Some(" ".into())), None);
    }

    #[sqlx::test(migrations = "./migrations")]
    #[ignore = "needs a MySQL server in DATABASE_URL"]
    async fn second_record_for_the_same_day_is_rejected(pool: MySqlPool) {
        let position_id = fixtures::position(&pool, "Auxiliar").await;
        let employee_id = fixtures::employee(&pool, position_id, "45871236", "987654321").await;
        let existing = fixtures::record(&pool, employee_id, "2025-04-18").await.unwrap();

        let input = RecordInput {
            employee_id,
            date: date(2025, 4, 18),
            observations: None,
        };
        match validate_record(&pool, &input, None, 0).await {
            Err(AppError::Validation(errors)) => assert_eq!(
                errors.messages("employee_id"),
                ["The employee already has an attendance record for this date"]
            ),
            other => panic!("expected validation errors, got {other:?}"),
        }

        // the record itself may keep its own date
        validate_record(&pool, &input, None, existing).await.unwrap();

        let err = fixtures::record(&pool, employee_id, "2025-04-18").await.unwrap_err();
        assert_eq!(write_error(err).status_code(), StatusCode::CONFLICT);

        fixtures::record(&pool, employee_id, "2025-04-19").await.unwrap();
    }

    #[sqlx::test(migrations = "./migrations")]
    #[ignore = "needs a MySQL server in DATABASE_URL"]
    async fn record_for_unknown_employee_is_invalid(pool: MySqlPool) {
        let err = fixtures::record(&pool, 404, "2025-04-18").await.unwrap_err();

        match write_error(err) {
            AppError::Validation(errors) => assert!(errors.has("employee_id")),
            other => panic!("expected validation errors, got {other:?}"),
        }
    }
}
