use crate::{
    api::{BulkDelete, BulkDeleteResponse, bulk_delete, day_end, day_start, delete_error, message, page_bounds, today},
    db::{self, Table},
    error::{AppError, AppResult},
    model::employee::Employee,
    utils::validation::{
        ValidationErrors, check_adult, check_dni, check_email, check_name, check_phone,
    },
};
use actix_web::{HttpResponse, http::StatusCode, web};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, MySql, MySqlPool, QueryBuilder};
use tracing::{debug, info};
use utoipa::{IntoParams, ToSchema};

const REFERENCED: &str = "Employee has attendance records and cannot be deleted";

#[derive(Deserialize, ToSchema)]
pub struct CreateEmployee {
    #[schema(example = "45871236")]
    pub dni: String,
    #[schema(example = "Quispe")]
    pub paternal_surname: String,
    #[schema(example = "Huamán")]
    pub maternal_surname: String,
    #[schema(example = "María Elena")]
    pub names: String,
    #[schema(example = 1)]
    pub position_id: u64,
    #[schema(example = "maria.quispe@gmail.com")]
    pub email: Option<String>,
    #[schema(example = "1990-05-14", format = "date", value_type = String)]
    pub date_of_birth: NaiveDate,
    #[schema(example = "987654321")]
    pub phone: String,
}

#[derive(Deserialize, ToSchema)]
pub struct UpdateEmployee {
    pub dni: Option<String>,
    pub paternal_surname: Option<String>,
    pub maternal_surname: Option<String>,
    pub names: Option<String>,
    pub position_id: Option<u64>,
    pub email: Option<String>,
    #[schema(format = "date", value_type = Option<String>)]
    pub date_of_birth: Option<NaiveDate>,
    pub phone: Option<String>,
}

#[derive(Debug, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct EmployeeQuery {
    pub page: Option<u32>,
    pub per_page: Option<u32>,
    pub position_id: Option<u64>,
    /// Created on or after (yyyy-mm-dd)
    #[param(value_type = Option<String>, format = "date")]
    pub created_from: Option<NaiveDate>,
    /// Created on or before (yyyy-mm-dd)
    #[param(value_type = Option<String>, format = "date")]
    pub created_until: Option<NaiveDate>,
    /// Matches on DNI, names or surnames
    pub search: Option<String>,
}

/// Employee with the name of its position.
#[derive(Debug, Serialize, FromRow, ToSchema)]
pub struct EmployeeView {
    #[serde(flatten)]
    #[sqlx(flatten)]
    #[schema(inline)]
    pub employee: Employee,
    #[schema(example = "Auxiliar de Limpieza")]
    pub position_name: String,
}

#[derive(Serialize, ToSchema)]
pub struct EmployeeListResponse {
    pub data: Vec<EmployeeView>,
    #[schema(example = 1)]
    pub page: u32,
    #[schema(example = 20)]
    pub per_page: u32,
    #[schema(example = 10)]
    pub total: i64,
}

/// Field values after merging an update over the stored row.
struct EmployeeInput {
    dni: String,
    paternal_surname: String,
    maternal_surname: String,
    names: String,
    position_id: u64,
    email: Option<String>,
    date_of_birth: NaiveDate,
    phone: String,
}

impl From<CreateEmployee> for EmployeeInput {
    fn from(p: CreateEmployee) -> Self {
        Self {
            dni: p.dni.trim().to_string(),
            paternal_surname: p.paternal_surname.trim().to_string(),
            maternal_surname: p.maternal_surname.trim().to_string(),
            names: p.names.trim().to_string(),
            position_id: p.position_id,
            email: normalize_email(p.email),
            date_of_birth: p.date_of_birth,
            phone: p.phone.trim().to_string(),
        }
    }
}

impl EmployeeInput {
    fn merged(current: Employee, body: UpdateEmployee) -> Self {
        Self {
            dni: body.dni.unwrap_or(current.dni).trim().to_string(),
            paternal_surname: body
                .paternal_surname
                .unwrap_or(current.paternal_surname)
                .trim()
                .to_string(),
            maternal_surname: body
                .maternal_surname
                .unwrap_or(current.maternal_surname)
                .trim()
                .to_string(),
            names: body.names.unwrap_or(current.names).trim().to_string(),
            position_id: body.position_id.unwrap_or(current.position_id),
            email: match body.email {
                Some(email) => normalize_email(Some(email)),
                None => current.email,
            },
            date_of_birth: body.date_of_birth.unwrap_or(current.date_of_birth),
            phone: body.phone.unwrap_or(current.phone).trim().to_string(),
        }
    }

    fn validate(&self, today: NaiveDate) -> ValidationErrors {
        let mut errors = ValidationErrors::default();
        check_dni(&mut errors, &self.dni);
        check_name(&mut errors, "paternal_surname", &self.paternal_surname, 2, 255, "paternal surname");
        check_name(&mut errors, "maternal_surname", &self.maternal_surname, 2, 255, "maternal surname");
        check_name(&mut errors, "names", &self.names, 2, 255, "names");
        if let Some(email) = &self.email {
            check_email(&mut errors, email);
        }
        check_adult(&mut errors, self.date_of_birth, today);
        check_phone(&mut errors, &self.phone);
        errors
    }
}

/// Blank email clears it.
fn normalize_email(email: Option<String>) -> Option<String> {
    email
        .map(|e| e.trim().to_string())
        .filter(|e| !e.is_empty())
}

async fn taken(
    pool: &MySqlPool,
    column: &str,
    value: &str,
    except_id: u64,
) -> Result<bool, sqlx::Error> {
    let sql = format!("SELECT COUNT(*) FROM employees WHERE {column} = ? AND id <> ?");
    let count = sqlx::query_scalar::<_, i64>(&sql)
        .bind(value)
        .bind(except_id)
        .fetch_one(pool)
        .await?;
    Ok(count > 0)
}

async fn validate_all(pool: &MySqlPool, input: &EmployeeInput, except_id: u64) -> AppResult<()> {
    let mut errors = input.validate(today());

    if !errors.has("dni") && taken(pool, "dni", &input.dni, except_id).await? {
        errors.add("dni", "The DNI has already been taken");
    }
    if let Some(email) = &input.email {
        if !errors.has("email") && taken(pool, "email", email, except_id).await? {
            errors.add("email", "The email has already been taken");
        }
    }
    if !errors.has("phone") && taken(pool, "phone", &input.phone, except_id).await? {
        errors.add("phone", "The phone has already been taken");
    }

    let position = sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM positions WHERE id = ?")
        .bind(input.position_id)
        .fetch_one(pool)
        .await?;
    if position == 0 {
        errors.add("position_id", "The selected position is invalid");
    }

    Ok(errors.into_result()?)
}

fn write_error(e: sqlx::Error) -> AppError {
    if db::is_unique_violation(&e) {
        AppError::Conflict("An employee with this DNI, email or phone already exists".into())
    } else if db::is_fk_missing_parent(&e) {
        ValidationErrors::single("position_id", "The selected position is invalid").into()
    } else {
        AppError::Database(e)
    }
}

const SELECT_VIEW: &str = r#"
    SELECT e.*, p.name AS position_name
    FROM employees e
    JOIN positions p ON p.id = e.position_id
"#;

async fn find(pool: &MySqlPool, id: u64) -> AppResult<EmployeeView> {
    sqlx::query_as::<_, EmployeeView>(&format!("{SELECT_VIEW} WHERE e.id = ?"))
        .bind(id)
        .fetch_optional(pool)
        .await?
        .ok_or(AppError::NotFound("Employee not found"))
}

fn push_filters(qb: &mut QueryBuilder<'_, MySql>, query: &EmployeeQuery) {
    qb.push(" WHERE 1 = 1");
    if let Some(position_id) = query.position_id {
        qb.push(" AND e.position_id = ").push_bind(position_id);
    }
    if let Some(from) = query.created_from {
        qb.push(" AND e.created_at >= ").push_bind(day_start(from));
    }
    if let Some(until) = query.created_until {
        qb.push(" AND e.created_at < ").push_bind(day_end(until));
    }
    if let Some(search) = query.search.as_deref().map(str::trim).filter(|s| !s.is_empty()) {
        let like = format!("%{search}%");
        qb.push(" AND (e.dni LIKE ")
            .push_bind(like.clone())
            .push(" OR e.names LIKE ")
            .push_bind(like.clone())
            .push(" OR e.paternal_surname LIKE ")
            .push_bind(like.clone())
            .push(" OR e.maternal_surname LIKE ")
            .push_bind(like)
            .push(")");
    }
}

/// Create Employee
#[utoipa::path(
    post,
    path = "/api/employees",
    request_body = CreateEmployee,
    responses(
        (status = 201, description = "Employee created", body = EmployeeView),
        (status = 422, description = "Validation failed"),
        (status = 409, description = "DNI, email or phone already taken")
    ),
    tag = "Employee",
    security(("bearer_auth" = []))
)]
pub async fn create_employee(
    pool: web::Data<MySqlPool>,
    payload: web::Json<CreateEmployee>,
) -> AppResult<HttpResponse> {
    let input = EmployeeInput::from(payload.into_inner());
    validate_all(&pool, &input, 0).await?;

    let result = sqlx::query(
        r#"
        INSERT INTO employees
        (dni, paternal_surname, maternal_surname, names, position_id, email, date_of_birth, phone)
        VALUES (?, ?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(&input.dni)
    .bind(&input.paternal_surname)
    .bind(&input.maternal_surname)
    .bind(&input.names)
    .bind(input.position_id)
    .bind(&input.email)
    .bind(input.date_of_birth)
    .bind(&input.phone)
    .execute(pool.get_ref())
    .await
    .map_err(write_error)?;

    let employee = find(&pool, result.last_insert_id()).await?;
    info!(employee_id = employee.employee.id, "Employee created");
    Ok(HttpResponse::Created().json(employee))
}

/// List Employees
#[utoipa::path(
    get,
    path = "/api/employees",
    params(EmployeeQuery),
    responses(
        (status = 200, description = "Paginated employee list", body = EmployeeListResponse)
    ),
    tag = "Employee",
    security(("bearer_auth" = []))
)]
pub async fn list_employees(
    pool: web::Data<MySqlPool>,
    query: web::Query<EmployeeQuery>,
) -> AppResult<HttpResponse> {
    let (page, per_page, offset) = page_bounds(query.page, query.per_page, 20);

    let mut count = QueryBuilder::<MySql>::new("SELECT COUNT(*) FROM employees e");
    push_filters(&mut count, &query);
    let total = count
        .build_query_scalar::<i64>()
        .fetch_one(pool.get_ref())
        .await?;

    let mut data = QueryBuilder::<MySql>::new(SELECT_VIEW);
    push_filters(&mut data, &query);
    data.push(" ORDER BY e.id DESC LIMIT ")
        .push_bind(per_page as i64)
        .push(" OFFSET ")
        .push_bind(offset as i64);
    debug!(sql = %data.sql(), page, per_page, "Fetching employees");

    let employees = data
        .build_query_as::<EmployeeView>()
        .fetch_all(pool.get_ref())
        .await?;

    Ok(HttpResponse::Ok().json(EmployeeListResponse {
        data: employees,
        page,
        per_page,
        total,
    }))
}

/// Get Employee
#[utoipa::path(
    get,
    path = "/api/employees/{id}",
    params(("id" = u64, Path, description = "Employee id")),
    responses(
        (status = 200, description = "Employee found", body = EmployeeView),
        (status = 404, description = "Employee not found")
    ),
    tag = "Employee",
    security(("bearer_auth" = []))
)]
pub async fn get_employee(
    pool: web::Data<MySqlPool>,
    path: web::Path<u64>,
) -> AppResult<HttpResponse> {
    Ok(HttpResponse::Ok().json(find(&pool, path.into_inner()).await?))
}

/// Update Employee
#[utoipa::path(
    put,
    path = "/api/employees/{id}",
    params(("id" = u64, Path, description = "Employee id")),
    request_body = UpdateEmployee,
    responses(
        (status = 200, description = "Employee updated", body = EmployeeView),
        (status = 404, description = "Employee not found"),
        (status = 422, description = "Validation failed")
    ),
    tag = "Employee",
    security(("bearer_auth" = []))
)]
pub async fn update_employee(
    pool: web::Data<MySqlPool>,
    path: web::Path<u64>,
    body: web::Json<UpdateEmployee>,
) -> AppResult<HttpResponse> {
    let id = path.into_inner();
    let current = find(&pool, id).await?.employee;
    let input = EmployeeInput::merged(current, body.into_inner());
    validate_all(&pool, &input, id).await?;

    sqlx::query(
        r#"
        UPDATE employees
        SET dni = ?, paternal_surname = ?, maternal_surname = ?, names = ?,
            position_id = ?, email = ?, date_of_birth = ?, phone = ?
        WHERE id = ?
        "#,
    )
    .bind(&input.dni)
    .bind(&input.paternal_surname)
    .bind(&input.maternal_surname)
    .bind(&input.names)
    .bind(input.position_id)
    .bind(&input.email)
    .bind(input.date_of_birth)
    .bind(&input.phone)
    .bind(id)
    .execute(pool.get_ref())
    .await
    .map_err(write_error)?;

    info!(employee_id = id, "Employee updated");
    Ok(HttpResponse::Ok().json(find(&pool, id).await?))
}

/// Delete Employee
#[utoipa::path(
    delete,
    path = "/api/employees/{id}",
    params(("id" = u64, Path, description = "Employee id")),
    responses(
        (status = 200, description = "Successfully deleted"),
        (status = 404, description = "Employee not found"),
        (status = 409, description = "Employee has attendance records")
    ),
    tag = "Employee",
    security(("bearer_auth" = []))
)]
pub async fn delete_employee(
    pool: web::Data<MySqlPool>,
    path: web::Path<u64>,
) -> AppResult<HttpResponse> {
    let id = path.into_inner();
    let result = sqlx::query("DELETE FROM employees WHERE id = ?")
        .bind(id)
        .execute(pool.get_ref())
        .await
        .map_err(|e| delete_error(e, REFERENCED))?;

    if result.rows_affected() == 0 {
        return Err(AppError::NotFound("Employee not found"));
    }
    Ok(message(StatusCode::OK, "Successfully deleted"))
}

/// Bulk delete Employees
#[utoipa::path(
    post,
    path = "/api/employees/bulk-delete",
    request_body = BulkDelete,
    responses(
        (status = 200, description = "Deleted", body = BulkDeleteResponse),
        (status = 409, description = "An employee has attendance records")
    ),
    tag = "Employee",
    security(("bearer_auth" = []))
)]
pub async fn bulk_delete_employees(
    pool: web::Data<MySqlPool>,
    body: web::Json<BulkDelete>,
) -> AppResult<HttpResponse> {
    bulk_delete(&pool, Table::Employees, &body.ids, REFERENCED).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::fixtures;
    use actix_web::ResponseError;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn input() -> EmployeeInput {
        EmployeeInput::from(CreateEmployee {
            dni: " 45871236 ".into(),
            paternal_surname: "Quispe".into(),
            maternal_surname: "Huamán".into(),
            names: "María Elena".into(),
            position_id: 1,
            email: Some("maria.quispe@gmail.com".into()),
            date_of_birth: date(1990, 5, 14),
            phone: "987654321".into(),
        })
    }

    #[test]
    fn valid_employee_passes() {
        let input = input();
        assert_eq!(input.dni, "45871236");
        assert!(input.validate(date(2025, 4, 18)).is_empty());
    }

    #[test]
    fn minors_and_bad_contacts_are_rejected() {
        let mut input = input();
        input.date_of_birth = date(2010, 1, 1);
        input.email = Some("maria@company.pe".into());
        input.phone = "887654321".into();

        let errors = input.validate(date(2025, 4, 18));

        assert!(errors.has("date_of_birth"));
        assert!(errors.has("email"));
        assert!(errors.has("phone"));
        assert!(!errors.has("dni"));
    }

    #[test]
    fn blank_email_is_treated_as_absent() {
        assert_eq!(normalize_email(Some("  ".into())), None);
        assert_eq!(
            normalize_email(Some(" a@gmail.com ".into())),
            Some("a@gmail.com".to_string())
        );
    }

    #[test]
    fn update_merges_over_stored_values() {
        let stored = Employee {
            id: 4,
            dni: "45871236".into(),
            paternal_surname: "Quispe".into(),
            maternal_surname: "Huamán".into(),
            names: "María".into(),
            position_id: 1,
            email: Some("maria@gmail.com".into()),
            date_of_birth: date(1990, 5, 14),
            phone: "987654321".into(),
            created_at: chrono::Utc::now(),
            updated_at: chrono::Utc::now(),
        };
        let body = UpdateEmployee {
            dni: None,
            paternal_surname: None,
            maternal_surname: None,
            names: Some("María Elena".into()),
            position_id: Some(2),
            email: Some(String::new()),
            date_of_birth: None,
            phone: None,
        };

        let merged = EmployeeInput::merged(stored, body);

        assert_eq!(merged.names, "María Elena");
        assert_eq!(merged.position_id, 2);
        assert_eq!(merged.email, None);
        assert_eq!(merged.dni, "45871236");
    }

    #[sqlx::test(migrations = "./migrations")]
    #[ignore = "needs a MySQL server in DATABASE_URL"]
    async fn duplicate_dni_is_rejected(pool: MySqlPool) {
        let position_id = fixtures::position(&pool, "Auxiliar").await;
        fixtures::employee(&pool, position_id, "45871236", "987654321").await;

        let mut duplicate = input();
        duplicate.position_id = position_id;
        duplicate.phone = "912345678".into();
        match validate_all(&pool, &duplicate, 0).await {
            Err(AppError::Validation(errors)) => {
                assert_eq!(errors.messages("dni"), ["The DNI has already been taken"]);
                assert!(!errors.has("phone"));
                assert!(!errors.has("position_id"));
            }
            other => panic!("expected validation errors, got {other:?}"),
        }

        let err = sqlx::query(
            r#"
            INSERT INTO employees
                (dni, paternal_surname, maternal_surname, names, position_id, date_of_birth, phone)
            VALUES ('45871236', 'Rojas', 'Díaz', 'Luis', ?, '1985-01-01', '912345678')
            "#,
        )
        .bind(position_id)
        .execute(&pool)
        .await
        .unwrap_err();
        assert_eq!(write_error(err).status_code(), StatusCode::CONFLICT);
    }

    #[sqlx::test(migrations = "./migrations")]
    #[ignore = "needs a MySQL server in DATABASE_URL"]
    async fn employee_with_records_cannot_be_deleted(pool: MySqlPool) {
        let position_id = fixtures::position(&pool, "Auxiliar").await;
        let employee_id = fixtures::employee(&pool, position_id, "45871236", "987654321").await;
        fixtures::record(&pool, employee_id, "2025-04-18").await.unwrap();

        let err = sqlx::query("DELETE FROM employees WHERE id = ?")
            .bind(employee_id)
            .execute(&pool)
            .await
            .map_err(|e| delete_error(e, REFERENCED))
            .unwrap_err();

        assert_eq!(err.status_code(), StatusCode::CONFLICT);
        assert_eq!(err.to_string(), REFERENCED);
    }
}
