use serde::{Deserialize, Serialize};

use crate::error::ApiError;
use crate::models::money::Money;

// Registration request and response
#[derive(Deserialize)]
pub struct RegisterRequest {
    pub first_name: String,
    pub last_name: String,
    pub age: i32,
    pub phone_number: String,
    pub monthly_salary: Money,
    pub password: String,
}

impl RegisterRequest {
    pub fn validate(&self) -> Result<(), ApiError> {
        if self.first_name.trim().is_empty() || self.last_name.trim().is_empty() {
            return Err(ApiError::Validation("first_name and last_name are required".into()));
        }
        if self.first_name.chars().count() > 100 || self.last_name.chars().count() > 100 {
            return Err(ApiError::Validation("names must be at most 100 characters".into()));
        }
        if self.age <= 0 {
            return Err(ApiError::Validation("age must be positive".into()));
        }
        let phone = self.phone_number.trim();
        if phone.is_empty() || phone.chars().count() > 15 {
            return Err(ApiError::Validation("phone_number must be 1-15 characters".into()));
        }
        if !self.monthly_salary.is_positive() || self.monthly_salary > Money::MAX_AMOUNT {
            return Err(ApiError::Validation(format!(
                "monthly_salary must be greater than zero and at most {}",
                Money::MAX_AMOUNT
            )));
        }
        if self.password.is_empty() {
            return Err(ApiError::Validation("password is required".into()));
        }
        Ok(())
    }
}

#[derive(Serialize)]
pub struct RegisterResponse {
    pub customer_id: i32,
    pub message: String,
}

// Login request and response; username is the phone number
#[derive(Deserialize)]
pub struct LoginRequest {
    pub username: String,
    pub password: String,
}

#[derive(Serialize)]
pub struct LoginResponse {
    pub customer_id: i32,
    pub token: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn valid() -> RegisterRequest {
        RegisterRequest {
            first_name: "Asha".into(),
            last_name: "Rao".into(),
            age: 31,
            phone_number: "9876543210".into(),
            monthly_salary: Money::from_cents(50_000_00),
            password: "s3cret".into(),
        }
    }

    #[test]
    fn accepts_complete_registration() {
        assert!(valid().validate().is_ok());
    }

    #[test]
    fn rejects_incomplete_registration() {
        let mut req = valid();
        req.first_name = "  ".into();
        assert!(req.validate().is_err());

        let mut req = valid();
        req.phone_number = "1234567890123456".into();
        assert!(req.validate().is_err());

        let mut req = valid();
        req.monthly_salary = Money::ZERO;
        assert!(req.validate().is_err());

        let mut req = valid();
        req.password.clear();
        assert!(req.validate().is_err());
    }

    #[test]
    fn salary_is_capped() {
        let mut req = valid();
        req.monthly_salary = Money::MAX_AMOUNT;
        assert!(req.validate().is_ok());

        req.monthly_salary = Money::from_cents(Money::MAX_AMOUNT.cents() + 1);
        assert!(matches!(req.validate(), Err(ApiError::Validation(_))));
    }

    #[test]
    fn oversized_salary_does_not_parse_as_small() {
        let body = r#"{"first_name":"A","last_name":"B","age":30,"phone_number":"1",
            "monthly_salary":184467440737095517,"password":"x"}"#;
        match serde_json::from_str::<RegisterRequest>(body) {
            Ok(req) => assert!(req.validate().is_err()),
            Err(e) => assert!(e.to_string().contains("out of range")),
        }
    }
}
