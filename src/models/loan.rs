use chrono::NaiveDate;
use sqlx::FromRow;

use super::money::Money;

#[derive(Debug, Clone, FromRow)]
pub struct Loan {
    pub loan_id: i32,
    pub customer_id: i32,
    pub loan_amount: Money,
    pub tenure: i32,
    pub interest_rate: f64,
    pub monthly_installment: Money,
    pub emis_paid_on_time: i32,
    pub date_of_approval: Option<NaiveDate>,
    pub end_date: Option<NaiveDate>,
    pub loan_approved: bool,
    pub message: Option<String>,
}

impl Loan {
    pub fn repayments_left(&self) -> i32 {
        self.tenure - self.emis_paid_on_time
    }

    /// Approved and not ended before `today`; its installment still counts
    /// against the customer's salary.
    pub fn is_active_on(&self, today: NaiveDate) -> bool {
        self.loan_approved && self.end_date.is_some_and(|end| end >= today)
    }

    /// Approved and not yet fully repaid.
    pub fn is_current(&self) -> bool {
        self.loan_approved && self.repayments_left() > 0
    }
}

/// The customer's current loans, newest approval first. Loans without an
/// approval date come last; ties go to the higher id.
pub fn current_loans(loans: Vec<Loan>) -> Vec<Loan> {
    let mut current: Vec<Loan> = loans.into_iter().filter(Loan::is_current).collect();
    current.sort_by(|a, b| {
        b.date_of_approval
            .cmp(&a.date_of_approval)
            .then(b.loan_id.cmp(&a.loan_id))
    });
    current
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    pub(crate) fn loan(
        loan_id: i32,
        approved_on: Option<(i32, u32, u32)>,
        tenure: i32,
        paid: i32,
    ) -> Loan {
        let date_of_approval = approved_on.and_then(|(y, m, d)| NaiveDate::from_ymd_opt(y, m, d));
        Loan {
            loan_id,
            customer_id: 1,
            loan_amount: Money::from_cents(100_000_00),
            tenure,
            interest_rate: 10.0,
            monthly_installment: Money::from_cents(5_000_00),
            emis_paid_on_time: paid,
            end_date: date_of_approval.map(|d| d + chrono::Duration::days(30 * i64::from(tenure))),
            date_of_approval,
            loan_approved: true,
            message: None,
        }
    }

    #[test]
    fn active_until_end_date_inclusive() {
        let l = loan(1, Some((2024, 1, 1)), 12, 0);
        let end = l.end_date.unwrap();
        assert!(l.is_active_on(end));
        assert!(!l.is_active_on(end.succ_opt().unwrap()));

        let mut pending = l.clone();
        pending.loan_approved = false;
        assert!(!pending.is_active_on(end));

        let mut open_ended = l;
        open_ended.end_date = None;
        assert!(!open_ended.is_active_on(end));
    }

    #[test]
    fn current_loans_skip_repaid_and_unapproved() {
        let mut unapproved = loan(4, Some((2024, 5, 1)), 12, 0);
        unapproved.loan_approved = false;
        let loans = vec![
            loan(1, Some((2023, 1, 1)), 12, 3),
            loan(2, Some((2024, 3, 1)), 12, 12),
            loan(3, None, 24, 1),
            unapproved,
            loan(5, Some((2024, 3, 1)), 6, 0),
        ];
        let ids: Vec<i32> = current_loans(loans).iter().map(|l| l.loan_id).collect();
        assert_eq!(ids, vec![5, 1, 3]);
    }
}
