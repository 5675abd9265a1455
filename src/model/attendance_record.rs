use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow, ToSchema)]
pub struct AttendanceRecord {
    pub id: u64,
    pub employee_id: u64,
    #[schema(example = "2025-04-18", value_type = String, format = "date")]
    pub date: NaiveDate,
    #[schema(nullable = true)]
    pub observations: Option<String>,
    #[schema(value_type = String, format = "date-time")]
    pub created_at: DateTime<Utc>,
    #[schema(value_type = String, format = "date-time")]
    pub updated_at: DateTime<Utc>,
}

/// Record joined with the employee columns shown in lists and exports.
#[derive(Debug, Clone, Serialize, sqlx::FromRow, ToSchema)]
pub struct AttendanceRecordRow {
    pub id: u64,
    pub employee_id: u64,
    #[schema(example = "2025-04-18", value_type = String, format = "date")]
    pub date: NaiveDate,
    #[schema(nullable = true)]
    pub observations: Option<String>,
    #[schema(example = "45871236")]
    pub dni: String,
    pub paternal_surname: String,
    pub maternal_surname: String,
    pub names: String,
}
