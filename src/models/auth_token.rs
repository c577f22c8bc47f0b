use chrono::{DateTime, Utc};
use sqlx::FromRow;

#[derive(Debug, FromRow)]
pub struct AuthToken {
    pub token: String,
    pub customer_id: i32,
    pub created_at: DateTime<Utc>,
}
