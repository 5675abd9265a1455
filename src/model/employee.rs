use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow, ToSchema)]
#[schema(
    example = json!({
        "id": 1,
        "dni": "45871236",
        "paternal_surname": "Quispe",
        "maternal_surname": "Huamán",
        "names": "María Elena",
        "position_id": 2,
        "email": "maria.quispe@gmail.com",
        "date_of_birth": "1990-05-14",
        "phone": "987654321",
        "created_at": "2025-04-17T22:57:28Z",
        "updated_at": "2025-04-17T22:57:28Z"
    })
)]
pub struct Employee {
    #[schema(example = 1)]
    pub id: u64,

    /// National id, exactly 8 digits
    #[schema(example = "45871236")]
    pub dni: String,

    #[schema(example = "Quispe")]
    pub paternal_surname: String,

    #[schema(example = "Huamán")]
    pub maternal_surname: String,

    #[schema(example = "María Elena")]
    pub names: String,

    #[schema(example = 2)]
    pub position_id: u64,

    #[schema(example = "maria.quispe@gmail.com", nullable = true)]
    pub email: Option<String>,

    #[schema(example = "1990-05-14", value_type = String, format = "date")]
    pub date_of_birth: NaiveDate,

    #[schema(example = "987654321")]
    pub phone: String,

    #[schema(value_type = String, format = "date-time")]
    pub created_at: DateTime<Utc>,

    #[schema(value_type = String, format = "date-time")]
    pub updated_at: DateTime<Utc>,
}
