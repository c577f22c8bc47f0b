use serde::Serialize;
use sqlx::FromRow;

use super::money::Money;

#[derive(Debug, Clone, FromRow)]
pub struct Customer {
    pub customer_id: i32,
    pub first_name: String,
    pub last_name: String,
    pub age: i32,
    pub phone_number: String,
    pub monthly_salary: Money,
    pub approved_limit: Money,
    pub current_debt: Money,
    pub password_hash: Option<String>,
}

// Nested inside loan details
#[derive(Debug, Serialize, FromRow)]
pub struct CustomerSummary {
    pub customer_id: i32,
    pub first_name: String,
    pub last_name: String,
    pub phone_number: String,
    pub age: i32,
}
