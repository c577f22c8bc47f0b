//! Bulk load of historical customers and loans from CSV exports of the
//! `customer_data` and `loan_data` spreadsheets.

use std::collections::{HashMap, HashSet};
use std::path::Path;

use chrono::{NaiveDate, NaiveDateTime};
use csv::StringRecord;
use log::{error, info, warn};
use sqlx::PgPool;

use crate::error::StartupError;
use crate::models::money::Money;
use crate::underwriting::APPROVED_LIMIT_MONTHS;

#[derive(Debug, Clone, PartialEq)]
pub struct CustomerRecord {
    pub customer_id: i32,
    pub first_name: String,
    pub last_name: String,
    pub age: i32,
    pub phone_number: String,
    pub monthly_salary: Money,
    pub approved_limit: Money,
    pub current_debt: Money,
}

#[derive(Debug, Clone, PartialEq)]
pub struct LoanRecord {
    pub customer_id: i32,
    pub loan_id: i32,
    pub loan_amount: Money,
    pub tenure: i32,
    pub interest_rate: f64,
    pub monthly_installment: Money,
    pub emis_paid_on_time: i32,
    pub date_of_approval: Option<NaiveDate>,
    pub end_date: Option<NaiveDate>,
}

#[derive(Debug, Default, PartialEq, Eq)]
pub struct IngestReport {
    pub customers: u64,
    pub loans: u64,
    pub skipped_loans: usize,
}

/// `"Monthly payment"` -> `"monthly_installment"`, `"Customer ID"` -> `"customer_id"`.
pub fn normalise_header(header: &str) -> String {
    let name = header.trim().to_lowercase().replace(' ', "_");
    match name.as_str() {
        "monthly_payment" => "monthly_installment".to_string(),
        _ => name,
    }
}

struct Row<'a> {
    columns: &'a HashMap<String, usize>,
    record: &'a StringRecord,
}

impl<'a> Row<'a> {
    fn get(&self, name: &str) -> Option<&'a str> {
        let index = *self.columns.get(name)?;
        self.record
            .get(index)
            .map(str::trim)
            .filter(|value| !value.is_empty())
    }

    fn text(&self, name: &str) -> Result<String, String> {
        self.get(name)
            .map(str::to_string)
            .ok_or_else(|| format!("missing {}", name))
    }

    fn int(&self, name: &str) -> Result<i32, String> {
        let raw = self.get(name).ok_or_else(|| format!("missing {}", name))?;
        parse_int(raw).ok_or_else(|| format!("{} is not a whole number: {:?}", name, raw))
    }

    fn money(&self, name: &str) -> Result<Option<Money>, String> {
        self.get(name)
            .map(|raw| raw.parse::<Money>().map_err(|e| format!("{}: {}", name, e)))
            .transpose()
    }

    fn float(&self, name: &str) -> Result<f64, String> {
        let raw = self.get(name).ok_or_else(|| format!("missing {}", name))?;
        raw.parse::<f64>()
            .ok()
            .filter(|v| v.is_finite())
            .ok_or_else(|| format!("{} is not a number: {:?}", name, raw))
    }

    fn date(&self, name: &str) -> Result<Option<NaiveDate>, String> {
        self.get(name)
            .map(|raw| parse_date(raw).ok_or_else(|| format!("{} is not a date: {:?}", name, raw)))
            .transpose()
    }
}

// spreadsheet exports write whole numbers as "12.0"
fn parse_int(raw: &str) -> Option<i32> {
    raw.parse::<i32>().ok().or_else(|| {
        let value = raw.parse::<f64>().ok()?;
        (value.fract() == 0.0 && value.abs() <= i32::MAX as f64).then_some(value as i32)
    })
}

pub fn parse_date(raw: &str) -> Option<NaiveDate> {
    const DATE_FORMATS: [&str; 4] = ["%Y-%m-%d", "%m/%d/%Y", "%d-%m-%Y", "%Y/%m/%d"];
    const DATETIME_FORMATS: [&str; 2] = ["%Y-%m-%d %H:%M:%S", "%Y-%m-%dT%H:%M:%S"];

    DATE_FORMATS
        .iter()
        .find_map(|format| NaiveDate::parse_from_str(raw, format).ok())
        .or_else(|| {
            DATETIME_FORMATS
                .iter()
                .find_map(|format| NaiveDateTime::parse_from_str(raw, format).ok())
                .map(|dt| dt.date())
        })
}

fn open(path: &Path) -> Result<(csv::Reader<std::fs::File>, HashMap<String, usize>), StartupError> {
    let mut reader = csv::ReaderBuilder::new().trim(csv::Trim::All).from_path(path)?;
    let columns = reader
        .headers()?
        .iter()
        .enumerate()
        .map(|(index, header)| (normalise_header(header), index))
        .collect();
    Ok((reader, columns))
}

fn customer_from_row(row: &Row) -> Result<CustomerRecord, String> {
    let monthly_salary = row.money("monthly_salary")?.ok_or("missing monthly_salary")?;
    Ok(CustomerRecord {
        customer_id: row.int("customer_id")?,
        first_name: row.text("first_name")?,
        last_name: row.text("last_name")?,
        age: if row.get("age").is_some() { row.int("age")? } else { 0 },
        phone_number: row.text("phone_number")?,
        monthly_salary,
        approved_limit: row
            .money("approved_limit")?
            .unwrap_or_else(|| monthly_salary.times(APPROVED_LIMIT_MONTHS)),
        current_debt: row.money("current_debt")?.unwrap_or(Money::ZERO),
    })
}

fn loan_from_row(row: &Row) -> Result<LoanRecord, String> {
    Ok(LoanRecord {
        customer_id: row.int("customer_id")?,
        loan_id: row.int("loan_id")?,
        loan_amount: row.money("loan_amount")?.ok_or("missing loan_amount")?,
        tenure: row.int("tenure")?,
        interest_rate: row.float("interest_rate")?,
        monthly_installment: row
            .money("monthly_installment")?
            .ok_or("missing monthly_installment")?,
        emis_paid_on_time: if row.get("emis_paid_on_time").is_some() {
            row.int("emis_paid_on_time")?
        } else {
            0
        },
        date_of_approval: row.date("date_of_approval")?,
        end_date: row.date("end_date")?,
    })
}

/// Any bad customer row aborts the load.
pub fn read_customers(path: &Path) -> Result<Vec<CustomerRecord>, StartupError> {
    let (mut reader, columns) = open(path)?;
    let mut customers = Vec::new();
    for (line, record) in reader.records().enumerate() {
        let record = record?;
        let row = Row {
            columns: &columns,
            record: &record,
        };
        let customer = customer_from_row(&row)
            .map_err(|e| StartupError::Ingest(format!("customer row {}: {}", line + 2, e)))?;
        customers.push(customer);
    }
    info!("Loaded {} rows from {}", customers.len(), path.display());
    Ok(customers)
}

/// Bad loan rows are logged and skipped; the count of skipped rows is returned.
pub fn read_loans(path: &Path) -> Result<(Vec<LoanRecord>, usize), StartupError> {
    let (mut reader, columns) = open(path)?;
    let mut loans = Vec::new();
    let mut skipped = 0;
    for (line, record) in reader.records().enumerate() {
        let record = record?;
        let row = Row {
            columns: &columns,
            record: &record,
        };
        match loan_from_row(&row) {
            Ok(loan) => loans.push(loan),
            Err(e) => {
                error!("Error processing loan row {}: {}", line + 2, e);
                skipped += 1;
            }
        }
    }
    info!("Loaded {} rows from {}", loans.len(), path.display());
    Ok((loans, skipped))
}

async fn reset_sequence(pool: &PgPool, table: &str, column: &str) -> Result<(), StartupError> {
    let sql = format!(
        "SELECT setval(pg_get_serial_sequence('{table}', '{column}'), \
         COALESCE((SELECT MAX({column}) FROM {table}), 0) + 1, false)"
    );
    sqlx::query(&sql).execute(pool).await?;
    Ok(())
}

async fn store_customers(pool: &PgPool, customers: &[CustomerRecord]) -> Result<u64, StartupError> {
    let mut tx = pool.begin().await?;
    // cascades to loans and tokens
    sqlx::query("DELETE FROM customers").execute(&mut *tx).await?;
    warn!("Existing customer data cleared");

    let mut inserted = 0;
    for c in customers {
        let result = sqlx::query(
            "INSERT INTO customers
                (customer_id, first_name, last_name, age, phone_number,
                 monthly_salary, approved_limit, current_debt)
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
             ON CONFLICT DO NOTHING",
        )
        .bind(c.customer_id)
        .bind(&c.first_name)
        .bind(&c.last_name)
        .bind(c.age)
        .bind(&c.phone_number)
        .bind(c.monthly_salary)
        .bind(c.approved_limit)
        .bind(c.current_debt)
        .execute(&mut *tx)
        .await?;
        inserted += result.rows_affected();
    }
    tx.commit().await?;
    Ok(inserted)
}

async fn store_loans(pool: &PgPool, loans: &[LoanRecord]) -> Result<(u64, usize), StartupError> {
    let mut tx = pool.begin().await?;
    sqlx::query("DELETE FROM loans").execute(&mut *tx).await?;
    warn!("Existing loan data cleared");

    let known: HashSet<i32> = sqlx::query_scalar::<_, i32>("SELECT customer_id FROM customers")
        .fetch_all(&mut *tx)
        .await?
        .into_iter()
        .collect();

    let mut inserted = 0;
    let mut orphans = 0;
    for l in loans {
        if !known.contains(&l.customer_id) {
            warn!(
                "Skipping loan {}: customer {} not found",
                l.loan_id, l.customer_id
            );
            orphans += 1;
            continue;
        }
        let result = sqlx::query(
            "INSERT INTO loans
                (loan_id, customer_id, loan_amount, tenure, interest_rate, monthly_installment,
                 emis_paid_on_time, date_of_approval, end_date, loan_approved)
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, TRUE)
             ON CONFLICT DO NOTHING",
        )
        .bind(l.loan_id)
        .bind(l.customer_id)
        .bind(l.loan_amount)
        .bind(l.tenure)
        .bind(l.interest_rate)
        .bind(l.monthly_installment)
        .bind(l.emis_paid_on_time)
        .bind(l.date_of_approval)
        .bind(l.end_date)
        .execute(&mut *tx)
        .await?;
        inserted += result.rows_affected();
    }
    tx.commit().await?;
    Ok((inserted, orphans))
}

/// Replaces all customers and loans with the contents of the two files.
pub async fn ingest(
    pool: &PgPool,
    customers_path: &Path,
    loans_path: &Path,
) -> Result<IngestReport, StartupError> {
    info!("Starting data ingestion");
    info!("Customer data path: {}", customers_path.display());
    info!("Loan data path: {}", loans_path.display());

    let customers = read_customers(customers_path)?;
    let customer_count = store_customers(pool, &customers).await?;
    info!("Successfully ingested {} customer records", customer_count);

    let (loans, unparsable) = read_loans(loans_path)?;
    let (loan_count, orphans) = store_loans(pool, &loans).await?;
    info!("Successfully ingested {} loan records", loan_count);

    reset_sequence(pool, "customers", "customer_id").await?;
    reset_sequence(pool, "loans", "loan_id").await?;

    info!("Data ingestion complete");
    Ok(IngestReport {
        customers: customer_count,
        loans: loan_count,
        skipped_loans: unparsable + orphans,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn csv_file(contents: &str) -> NamedTempFile {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(contents.as_bytes()).unwrap();
        file
    }

    #[test]
    fn headers_are_normalised() {
        assert_eq!(normalise_header(" Customer ID "), "customer_id");
        assert_eq!(normalise_header("Monthly payment"), "monthly_installment");
        assert_eq!(normalise_header("EMIs paid on Time"), "emis_paid_on_time");
    }

    #[test]
    fn dates_accept_spreadsheet_formats() {
        let expected = NaiveDate::from_ymd_opt(2019, 7, 23);
        assert_eq!(parse_date("2019-07-23"), expected);
        assert_eq!(parse_date("7/23/2019"), expected);
        assert_eq!(parse_date("2019-07-23 00:00:00"), expected);
        assert_eq!(parse_date("yesterday"), None);
    }

    #[test]
    fn reads_customers_with_defaults() {
        let file = csv_file(
            "Customer ID,First Name,Last Name,Age,Phone Number,Monthly Salary,Approved Limit\n\
             1,Aaron,Garcia,63,9629317944,\"50,000\",1800000\n\
             2,Ann,Lee,,9800000000,20000,\n",
        );
        let customers = read_customers(file.path()).unwrap();
        assert_eq!(customers.len(), 2);
        assert_eq!(customers[0].monthly_salary, Money::from_cents(50_000_00));
        assert_eq!(customers[0].approved_limit, Money::from_cents(1_800_000_00));
        assert_eq!(customers[0].current_debt, Money::ZERO);
        assert_eq!(customers[1].age, 0);
        assert_eq!(customers[1].approved_limit, Money::from_cents(720_000_00));
    }

    #[test]
    fn bad_customer_row_aborts() {
        let file = csv_file("customer_id,first_name,last_name,phone_number,monthly_salary\nx,A,B,1,100\n");
        assert!(matches!(read_customers(file.path()), Err(StartupError::Ingest(_))));
    }

    #[test]
    fn reads_loans_and_skips_bad_rows() {
        let file = csv_file(
            "Customer ID,Loan ID,Loan Amount,Tenure,Interest Rate,Monthly payment,EMIs paid on Time,Date of Approval,End Date\n\
             1,7798,900000,138.0,16.93,69603,86,2019-07-23,2030-12-23\n\
             1,7799,oops,12,10,1000,1,,\n\
             2,5000,100000,12,8.5,8722,12,,\n",
        );
        let (loans, skipped) = read_loans(file.path()).unwrap();
        assert_eq!(skipped, 1);
        assert_eq!(loans.len(), 2);
        assert_eq!(loans[0].tenure, 138);
        assert_eq!(loans[0].monthly_installment, Money::from_cents(69_603_00));
        assert_eq!(loans[0].end_date, NaiveDate::from_ymd_opt(2030, 12, 23));
        assert_eq!(loans[1].date_of_approval, None);
    }

    #[test]
    fn missing_file_is_an_error() {
        assert!(read_customers(Path::new("/nonexistent/customer_data.csv")).is_err());
    }
}
