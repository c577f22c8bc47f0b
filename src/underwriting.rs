//! Loan underwriting: EMI calculation, repayment-history scoring and the
//! eligibility checks shared by `check_eligibility` and `create_loan`.

use chrono::{Duration, NaiveDate};
use serde::Deserialize;

use crate::error::ApiError;
use crate::models::customer::Customer;
use crate::models::loan::Loan;
use crate::models::money::Money;

/// Customers may borrow up to this many months of salary.
pub const APPROVED_LIMIT_MONTHS: i64 = 36;

/// Highest rate accepted on a request, in percent.
pub const MAX_INTEREST_RATE: f64 = 999.99;

/// Longest tenure accepted on a request (100 years).
pub const MAX_TENURE_MONTHS: i32 = 1200;

/// Loans are booked in 30-day months.
pub const DAYS_PER_MONTH: i64 = 30;

#[derive(Debug, Clone, Deserialize)]
pub struct LoanRequest {
    pub customer_id: i32,
    pub loan_amount: Money,
    pub tenure: i32,
    pub interest_rate: f64,
}

impl LoanRequest {
    pub fn validate(&self) -> Result<(), ApiError> {
        if !self.loan_amount.is_positive() || self.loan_amount > Money::MAX_AMOUNT {
            return Err(ApiError::Validation(format!(
                "loan_amount must be greater than zero and at most {}",
                Money::MAX_AMOUNT
            )));
        }
        if self.tenure <= 0 || self.tenure > MAX_TENURE_MONTHS {
            return Err(ApiError::Validation(format!(
                "tenure must be between 1 and {} months",
                MAX_TENURE_MONTHS
            )));
        }
        if !self.interest_rate.is_finite()
            || self.interest_rate < 0.0
            || self.interest_rate > MAX_INTEREST_RATE
        {
            return Err(ApiError::Validation(format!(
                "interest_rate must be between 0 and {}",
                MAX_INTEREST_RATE
            )));
        }
        Ok(())
    }
}

/// Monthly installment for a compound-interest loan, rounded to the cent.
///
/// `EMI = P * r * (1 + r)^n / ((1 + r)^n - 1)` with `r` the monthly rate,
/// evaluated as `P * r / (1 - (1 + r)^-n)` so that a growth factor too large
/// for `f64` leaves `P * r`. A zero rate degrades to `P / n`.
pub fn monthly_installment(principal: Money, annual_rate: f64, tenure_months: i32) -> Money {
    if tenure_months <= 0 {
        return Money::ZERO;
    }
    let p = principal.cents() as f64;
    let n = tenure_months;
    let even_split = p / n as f64;
    let r = annual_rate / 12.0 / 100.0;
    if r == 0.0 {
        return round_cents(even_split);
    }
    let denominator = 1.0 - (1.0 + r).powi(n).recip();
    if denominator == 0.0 {
        return round_cents(even_split);
    }
    let emi = p * r / denominator;
    round_cents(if emi.is_finite() { emi } else { p * r })
}

// `as` saturates, and NaN maps to the ceiling: an installment that cannot be
// represented must never come out as zero.
fn round_cents(cents: f64) -> Money {
    if cents.is_nan() {
        return Money::from_cents(i64::MAX);
    }
    Money::from_cents(cents.round() as i64)
}

/// `today + 30 * tenure` days; `None` when the date is out of range.
pub fn loan_end_date(today: NaiveDate, tenure_months: i32) -> Option<NaiveDate> {
    let days = DAYS_PER_MONTH.checked_mul(i64::from(tenure_months))?;
    today.checked_add_signed(Duration::try_days(days)?)
}

/// Aggregates over every loan a customer has taken.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RepaymentHistory {
    pub loan_count: i64,
    pub emis_paid_on_time: i64,
    pub total_tenure: i64,
}

impl RepaymentHistory {
    /// Percentage of EMIs paid on time, or `None` for a customer with no loans.
    pub fn credit_score(&self) -> Option<f64> {
        if self.loan_count == 0 {
            return None;
        }
        let tenure = if self.total_tenure == 0 { 1 } else { self.total_tenure };
        Some(self.emis_paid_on_time as f64 * 100.0 / tenure as f64)
    }

    pub fn from_loans(loans: &[Loan]) -> Self {
        loans.iter().fold(RepaymentHistory::default(), |acc, loan| RepaymentHistory {
            loan_count: acc.loan_count + 1,
            emis_paid_on_time: acc.emis_paid_on_time + i64::from(loan.emis_paid_on_time),
            total_tenure: acc.total_tenure + i64::from(loan.tenure),
        })
    }
}

/// Sum of installments on loans that are still running on `today`.
pub fn active_installments(loans: &[Loan], today: NaiveDate) -> Money {
    loans
        .iter()
        .filter(|loan| loan.is_active_on(today))
        .fold(Money::ZERO, |acc, loan| acc + loan.monthly_installment)
}

/// What the checks need to know about a customer at decision time.
#[derive(Debug, Clone, Copy)]
pub struct CreditSnapshot {
    pub monthly_salary: Money,
    pub approved_limit: Money,
    pub current_debt: Money,
    /// Sum of installments on approved loans that have not ended yet.
    pub active_installments: Money,
    pub history: RepaymentHistory,
}

impl CreditSnapshot {
    /// `loans` is every loan the customer has, approved or not.
    pub fn new(customer: &Customer, loans: &[Loan], today: NaiveDate) -> Self {
        CreditSnapshot {
            monthly_salary: customer.monthly_salary,
            approved_limit: customer.approved_limit,
            current_debt: customer.current_debt,
            active_installments: active_installments(loans, today),
            history: RepaymentHistory::from_loans(loans),
        }
    }
}

impl CreditSnapshot {
    /// Customer debt once `request` is booked.
    pub fn debt_after(&self, request: &LoanRequest) -> Money {
        self.current_debt + request.loan_amount
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Rejection {
    EmiBurden,
    PoorRepaymentHistory,
    ExceedsApprovedLimit,
}

impl Rejection {
    pub fn message(self) -> &'static str {
        match self {
            Rejection::EmiBurden => {
                "Loan rejected: Total EMIs (including proposed) exceed 50% of monthly salary"
            }
            Rejection::PoorRepaymentHistory => {
                "Loan rejected: Poor past loan repayment history (less than 40% EMIs on time)"
            }
            Rejection::ExceedsApprovedLimit => {
                "Loan rejected: Proposed loan amount plus current debt exceeds approved limit"
            }
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Outcome {
    Approved {
        interest_rate: f64,
        monthly_installment: Money,
    },
    Rejected(Rejection),
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Assessment {
    pub requested_rate: f64,
    /// Installment at the requested rate.
    pub proposed_installment: Money,
    pub outcome: Outcome,
}

impl Assessment {
    pub fn is_approved(&self) -> bool {
        matches!(self.outcome, Outcome::Approved { .. })
    }
}

/// Runs the checks in order: EMI burden, repayment history, approved limit.
pub fn assess(snapshot: &CreditSnapshot, request: &LoanRequest) -> Assessment {
    let requested_rate = request.interest_rate;
    let proposed_installment =
        monthly_installment(request.loan_amount, requested_rate, request.tenure);
    let rejected = |reason| Assessment {
        requested_rate,
        proposed_installment,
        outcome: Outcome::Rejected(reason),
    };

    // more than half the salary would go to installments
    let burden = snapshot.active_installments + proposed_installment;
    if burden.times(2) > snapshot.monthly_salary {
        return rejected(Rejection::EmiBurden);
    }

    let interest_rate = match snapshot.history.credit_score() {
        None => requested_rate,
        Some(score) if score > 85.0 => requested_rate,
        Some(score) if score > 60.0 => requested_rate.max(12.0),
        Some(score) if score > 40.0 => requested_rate.max(16.0),
        Some(_) => return rejected(Rejection::PoorRepaymentHistory),
    };

    if snapshot.debt_after(request) > snapshot.approved_limit {
        return rejected(Rejection::ExceedsApprovedLimit);
    }

    Assessment {
        requested_rate,
        proposed_installment,
        outcome: Outcome::Approved {
            interest_rate,
            monthly_installment: monthly_installment(request.loan_amount, interest_rate, request.tenure),
        },
    }
}
