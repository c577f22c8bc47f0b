use actix_web::{cookie::Cookie, web, HttpResponse, Responder};
use bcrypt::{hash, verify, DEFAULT_COST};
use log::{error, info};
use sqlx::PgPool;

use super::customer_models::{LoginRequest, LoginResponse, RegisterRequest, RegisterResponse};
use crate::auth::{self, SESSION_COOKIE};
use crate::error::ApiError;
use crate::underwriting::APPROVED_LIMIT_MONTHS;

pub async fn index() -> impl Responder {
    HttpResponse::Ok().body("Hello, this is the credit approval service.")
}

// register a customer and their login
pub async fn register(
    pool: web::Data<PgPool>,
    req: web::Json<RegisterRequest>,
) -> Result<HttpResponse, ApiError> {
    let req = req.into_inner();
    info!("Received request to register customer with phone {}", req.phone_number);
    req.validate()?;

    // Encrypt password with bcrypt
    let password_hash = hash(&req.password, DEFAULT_COST)?;
    let approved_limit = req.monthly_salary.times(APPROVED_LIMIT_MONTHS);

    let result = sqlx::query_scalar::<_, i32>(
        "INSERT INTO customers
            (first_name, last_name, age, phone_number, monthly_salary, approved_limit, current_debt, password_hash)
         VALUES ($1, $2, $3, $4, $5, $6, 0, $7)
         RETURNING customer_id",
    )
    .bind(req.first_name.trim())
    .bind(req.last_name.trim())
    .bind(req.age)
    .bind(req.phone_number.trim())
    .bind(req.monthly_salary)
    .bind(approved_limit)
    .bind(&password_hash)
    .fetch_one(pool.get_ref())
    .await;

    match result {
        Ok(customer_id) => {
            info!("Customer {} registered successfully", customer_id);
            Ok(HttpResponse::Created().json(RegisterResponse {
                customer_id,
                message: "Customer registered successfully".into(),
            }))
        }
        Err(sqlx::Error::Database(e)) if e.is_unique_violation() => {
            info!("Phone number {} is already registered", req.phone_number);
            Err(ApiError::Validation(
                "A customer with this phone number already exists".into(),
            ))
        }
        Err(e) => {
            error!("Failed to register customer: {}", e);
            Err(e.into())
        }
    }
}

// login logic
pub async fn login(
    pool: web::Data<PgPool>,
    req: web::Json<LoginRequest>,
) -> Result<HttpResponse, ApiError> {
    let username = req.username.trim();
    info!("Received login request for user: {}", username);

    let found = sqlx::query_as::<_, (i32, Option<String>)>(
        "SELECT customer_id, password_hash FROM customers WHERE phone_number = $1",
    )
    .bind(username)
    .fetch_optional(pool.get_ref())
    .await?;

    // ingested customers have no password and cannot log in
    let (customer_id, password_hash) = match found {
        Some((id, Some(hash))) => (id, hash),
        _ => {
            info!("Invalid username: {}", username);
            return Err(ApiError::InvalidCredentials);
        }
    };

    let valid = match verify(&req.password, &password_hash) {
        Ok(valid) => valid,
        Err(e) => {
            error!("Error when checking password for user {}: {}", username, e);
            false
        }
    };
    if !valid {
        info!("Invalid password for user: {}", username);
        return Err(ApiError::InvalidCredentials);
    }

    let token = auth::issue_token(pool.get_ref(), customer_id).await?;

    info!("User {} logged in successfully", username);
    Ok(HttpResponse::Ok()
        .cookie(
            Cookie::build(SESSION_COOKIE, token.token.clone())
                .http_only(true)
                .path("/")
                .finish(),
        )
        .json(LoginResponse {
            customer_id: token.customer_id,
            token: token.token,
        }))
}
