use chrono::NaiveDate;
use serde::Serialize;

use crate::models::customer::CustomerSummary;
use crate::models::loan::Loan;
use crate::models::money::Money;
use crate::underwriting::{Assessment, Outcome};

#[derive(Debug, Serialize)]
pub struct EligibilityResponse {
    pub customer_id: i32,
    pub loan_approved: bool,
    pub approved_limit: Money,
    pub interest_rate: f64,
    pub monthly_installment: Money,
    pub tenure: i32,
    pub message: String,
}

impl EligibilityResponse {
    /// Rejections report the requested rate and the installment at that rate.
    pub fn new(customer_id: i32, approved_limit: Money, tenure: i32, assessment: &Assessment) -> Self {
        let (loan_approved, interest_rate, monthly_installment, message) = match assessment.outcome {
            Outcome::Approved {
                interest_rate,
                monthly_installment,
            } => (true, interest_rate, monthly_installment, "Loan is eligible for approval"),
            Outcome::Rejected(reason) => (
                false,
                assessment.requested_rate,
                assessment.proposed_installment,
                reason.message(),
            ),
        };
        EligibilityResponse {
            customer_id,
            loan_approved,
            approved_limit,
            interest_rate,
            monthly_installment,
            tenure,
            message: message.to_string(),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct CreateLoanResponse {
    pub loan_id: Option<i32>,
    pub customer_id: i32,
    pub loan_approved: bool,
    pub message: String,
    pub monthly_installment: Option<Money>,
}

#[derive(Debug, Serialize)]
pub struct LoanDetailResponse {
    pub loan_id: i32,
    pub customer: CustomerSummary,
    pub loan_amount: Money,
    pub tenure: i32,
    pub interest_rate: f64,
    pub monthly_installment: Money,
    pub emis_paid_on_time: i32,
    pub date_of_approval: Option<NaiveDate>,
    pub end_date: Option<NaiveDate>,
    pub loan_approved: bool,
    pub message: Option<String>,
    pub repayments_left: i32,
}

impl LoanDetailResponse {
    pub fn new(loan: Loan, customer: CustomerSummary) -> Self {
        LoanDetailResponse {
            loan_id: loan.loan_id,
            repayments_left: loan.repayments_left(),
            customer,
            loan_amount: loan.loan_amount,
            tenure: loan.tenure,
            interest_rate: loan.interest_rate,
            monthly_installment: loan.monthly_installment,
            emis_paid_on_time: loan.emis_paid_on_time,
            date_of_approval: loan.date_of_approval,
            end_date: loan.end_date,
            loan_approved: loan.loan_approved,
            message: loan.message,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct CustomerLoanItem {
    pub loan_id: i32,
    pub loan_amount: Money,
    pub interest_rate: f64,
    pub monthly_installment: Money,
    pub repayments_left: i32,
}

impl From<Loan> for CustomerLoanItem {
    fn from(loan: Loan) -> Self {
        CustomerLoanItem {
            loan_id: loan.loan_id,
            repayments_left: loan.repayments_left(),
            loan_amount: loan.loan_amount,
            interest_rate: loan.interest_rate,
            monthly_installment: loan.monthly_installment,
        }
    }
}
