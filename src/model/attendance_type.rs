use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// Seeded name of the entry mark type.
pub const ENTRY_TYPE_NAME: &str = "Entrada";
/// Seeded name of the exit mark type.
pub const EXIT_TYPE_NAME: &str = "Salida";

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow, ToSchema)]
#[schema(example = json!({
    "id": 1,
    "name": "Entrada",
    "description": "Marcación de entrada",
    "created_at": "2025-04-18T01:02:54Z",
    "updated_at": "2025-04-18T01:02:54Z"
}))]
pub struct AttendanceType {
    pub id: u64,
    pub name: String,
    #[schema(nullable = true)]
    pub description: Option<String>,
    #[schema(value_type = String, format = "date-time")]
    pub created_at: DateTime<Utc>,
    #[schema(value_type = String, format = "date-time")]
    pub updated_at: DateTime<Utc>,
}
