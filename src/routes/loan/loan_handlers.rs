use actix_web::{web, HttpRequest, HttpResponse};
use chrono::{NaiveDate, Utc};
use log::{error, info};
use sqlx::{PgConnection, PgPool};

use super::loan_models::{
    CreateLoanResponse, CustomerLoanItem, EligibilityResponse, LoanDetailResponse,
};
use crate::auth::{authenticate, ensure_owner};
use crate::error::ApiError;
use crate::models::customer::{Customer, CustomerSummary};
use crate::models::loan::{current_loans, Loan};
use crate::underwriting::{self, CreditSnapshot, LoanRequest, Outcome};

const CUSTOMER_COLUMNS: &str = "customer_id, first_name, last_name, age, phone_number, \
     monthly_salary, approved_limit, current_debt, password_hash";

const LOAN_COLUMNS: &str = "loan_id, customer_id, loan_amount, tenure, interest_rate, \
     monthly_installment, emis_paid_on_time, date_of_approval, end_date, loan_approved, message";

fn today() -> NaiveDate {
    Utc::now().date_naive()
}

async fn fetch_customer(
    conn: &mut PgConnection,
    customer_id: i32,
    for_update: bool,
) -> Result<Customer, ApiError> {
    let sql = format!(
        "SELECT {} FROM customers WHERE customer_id = $1{}",
        CUSTOMER_COLUMNS,
        if for_update { " FOR UPDATE" } else { "" }
    );
    sqlx::query_as::<_, Customer>(&sql)
        .bind(customer_id)
        .fetch_optional(&mut *conn)
        .await?
        .ok_or(ApiError::NotFound("Customer not found"))
}

async fn fetch_loans(conn: &mut PgConnection, customer_id: i32) -> Result<Vec<Loan>, ApiError> {
    let loans = sqlx::query_as::<_, Loan>(&format!(
        "SELECT {} FROM loans WHERE customer_id = $1",
        LOAN_COLUMNS
    ))
    .bind(customer_id)
    .fetch_all(&mut *conn)
    .await?;
    Ok(loans)
}

async fn load_snapshot(
    conn: &mut PgConnection,
    customer: &Customer,
    today: NaiveDate,
) -> Result<CreditSnapshot, ApiError> {
    let loans = fetch_loans(conn, customer.customer_id).await?;
    Ok(CreditSnapshot::new(customer, &loans, today))
}

pub async fn check_eligibility(
    pool: web::Data<PgPool>,
    http: HttpRequest,
    req: web::Json<LoanRequest>,
) -> Result<HttpResponse, ApiError> {
    let caller = authenticate(pool.get_ref(), &http).await?;
    let req = req.into_inner();
    info!("Eligibility check for customer {} by {}", req.customer_id, caller);
    req.validate()?;

    let mut conn = pool.acquire().await?;
    let customer = fetch_customer(&mut conn, req.customer_id, false).await?;
    ensure_owner(caller, customer.customer_id, "Unauthorized access to customer data")?;

    let snapshot = load_snapshot(&mut conn, &customer, today()).await?;
    let assessment = underwriting::assess(&snapshot, &req);
    info!(
        "Customer {} eligibility: approved={}",
        customer.customer_id,
        assessment.is_approved()
    );

    Ok(HttpResponse::Ok().json(EligibilityResponse::new(
        customer.customer_id,
        customer.approved_limit,
        req.tenure,
        &assessment,
    )))
}

pub async fn create_loan(
    pool: web::Data<PgPool>,
    http: HttpRequest,
    req: web::Json<LoanRequest>,
) -> Result<HttpResponse, ApiError> {
    let caller = authenticate(pool.get_ref(), &http).await?;
    let req = req.into_inner();
    info!("Loan application for customer {} by {}", req.customer_id, caller);
    req.validate()?;

    // The customer row stays locked until the loan and the new debt commit.
    let mut tx = pool.begin().await?;
    let customer = fetch_customer(&mut tx, req.customer_id, true).await?;
    ensure_owner(caller, customer.customer_id, "Unauthorized access")?;

    let today = today();
    let snapshot = load_snapshot(&mut tx, &customer, today).await?;
    let assessment = underwriting::assess(&snapshot, &req);

    let (interest_rate, monthly_installment) = match assessment.outcome {
        Outcome::Approved {
            interest_rate,
            monthly_installment,
        } => (interest_rate, monthly_installment),
        Outcome::Rejected(reason) => {
            info!("Loan for customer {} rejected: {:?}", customer.customer_id, reason);
            tx.rollback().await?;
            return Ok(HttpResponse::Ok().json(CreateLoanResponse {
                loan_id: None,
                customer_id: customer.customer_id,
                loan_approved: false,
                message: reason.message().to_string(),
                monthly_installment: None,
            }));
        }
    };

    let end_date = underwriting::loan_end_date(today, req.tenure)
        .ok_or_else(|| ApiError::Validation("tenure runs past the last representable date".into()))?;
    let loan_id = sqlx::query_scalar::<_, i32>(
        "INSERT INTO loans
            (customer_id, loan_amount, tenure, interest_rate, monthly_installment,
             emis_paid_on_time, date_of_approval, end_date, loan_approved, message)
         VALUES ($1, $2, $3, $4, $5, 0, $6, $7, TRUE, 'Loan approved and created')
         RETURNING loan_id",
    )
    .bind(customer.customer_id)
    .bind(req.loan_amount)
    .bind(req.tenure)
    .bind(interest_rate)
    .bind(monthly_installment)
    .bind(today)
    .bind(end_date)
    .fetch_one(&mut *tx)
    .await?;

    sqlx::query("UPDATE customers SET current_debt = $1 WHERE customer_id = $2")
        .bind(snapshot.debt_after(&req))
        .bind(customer.customer_id)
        .execute(&mut *tx)
        .await?;

    if let Err(e) = tx.commit().await {
        error!("Failed to commit loan for customer {}: {}", customer.customer_id, e);
        return Err(e.into());
    }

    info!("Loan {} created for customer {}", loan_id, customer.customer_id);
    Ok(HttpResponse::Created().json(CreateLoanResponse {
        loan_id: Some(loan_id),
        customer_id: customer.customer_id,
        loan_approved: true,
        message: "Loan approved and created successfully.".into(),
        monthly_installment: Some(monthly_installment),
    }))
}

pub async fn view_loan(
    pool: web::Data<PgPool>,
    http: HttpRequest,
    path: web::Path<i32>,
) -> Result<HttpResponse, ApiError> {
    let caller = authenticate(pool.get_ref(), &http).await?;
    let loan_id = path.into_inner();
    info!("Loan {} requested by customer {}", loan_id, caller);

    let loan = sqlx::query_as::<_, Loan>(&format!(
        "SELECT {} FROM loans WHERE loan_id = $1",
        LOAN_COLUMNS
    ))
    .bind(loan_id)
    .fetch_optional(pool.get_ref())
    .await?
    .ok_or(ApiError::NotFound("Loan not found"))?;

    ensure_owner(caller, loan.customer_id, "Unauthorized access to loan details")?;

    let customer = sqlx::query_as::<_, CustomerSummary>(
        "SELECT customer_id, first_name, last_name, phone_number, age
         FROM customers WHERE customer_id = $1",
    )
    .bind(loan.customer_id)
    .fetch_one(pool.get_ref())
    .await?;

    Ok(HttpResponse::Ok().json(LoanDetailResponse::new(loan, customer)))
}

pub async fn view_customer_loans(
    pool: web::Data<PgPool>,
    http: HttpRequest,
    path: web::Path<i32>,
) -> Result<HttpResponse, ApiError> {
    let caller = authenticate(pool.get_ref(), &http).await?;
    let customer_id = path.into_inner();
    info!("Loans of customer {} requested by {}", customer_id, caller);

    let exists = sqlx::query_scalar::<_, bool>(
        "SELECT EXISTS (SELECT 1 FROM customers WHERE customer_id = $1)",
    )
    .bind(customer_id)
    .fetch_one(pool.get_ref())
    .await?;
    if !exists {
        return Err(ApiError::NotFound("Customer not found"));
    }
    ensure_owner(caller, customer_id, "Unauthorized access to customer loans")?;

    let mut conn = pool.acquire().await?;
    let loans = current_loans(fetch_loans(&mut conn, customer_id).await?);

    let items: Vec<CustomerLoanItem> = loans.into_iter().map(CustomerLoanItem::from).collect();
    Ok(HttpResponse::Ok().json(items))
}
