use sqlx::FromRow;

/// Panel account.
#[derive(Debug, FromRow)]
pub struct User {
    pub id: u64, // BIGINT UNSIGNED
    pub username: String,
    pub password: String,
}
