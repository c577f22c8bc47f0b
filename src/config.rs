use std::path::PathBuf;
use std::time::Duration;

use clap::{Args, Parser, Subcommand};
use sqlx::postgres::PgConnectOptions;

use crate::db::WaitPolicy;
use crate::error::StartupError;

#[derive(Debug, Parser)]
#[command(name = "credit_approval", version, about = "Credit approval service")]
pub struct Cli {
    #[command(flatten)]
    pub settings: Settings,

    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Debug, Clone, Subcommand)]
pub enum Command {
    /// Wait for the database, apply migrations, then serve (container entrypoint)
    Start,
    /// Poll the database until it accepts connections
    WaitDb,
    /// Apply pending schema migrations
    Migrate,
    /// Run the HTTP server
    Serve,
    /// Replace customers and loans with the contents of CSV exports
    Ingest {
        #[arg(long, default_value = "customer_data.csv")]
        customers: PathBuf,
        #[arg(long, default_value = "loan_data.csv")]
        loans: PathBuf,
    },
}

#[derive(Debug, Clone, Args)]
pub struct Settings {
    #[arg(long, env = "DB_NAME", default_value = "credit_db")]
    pub db_name: String,

    #[arg(long, env = "DB_USER", default_value = "user")]
    pub db_user: String,

    #[arg(long, env = "DB_PASSWORD", default_value = "password", hide_env_values = true)]
    pub db_password: String,

    #[arg(long, env = "DB_HOST", default_value = "db")]
    pub db_host: String,

    #[arg(long, env = "DB_PORT", default_value_t = 5432)]
    pub db_port: u16,

    /// Takes precedence over the DB_* settings
    #[arg(long, env = "DATABASE_URL", hide_env_values = true)]
    pub database_url: Option<String>,

    #[arg(long, env = "BIND_ADDRESS", default_value = "0.0.0.0:8000")]
    pub bind_address: String,

    #[arg(long, env = "DB_MAX_CONNECTIONS", default_value_t = 5)]
    pub db_max_connections: u32,

    #[arg(long, env = "DB_WAIT_INTERVAL_SECS", default_value_t = 2)]
    pub db_wait_interval_secs: u64,

    /// Unset means wait forever
    #[arg(long, env = "DB_WAIT_MAX_ATTEMPTS")]
    pub db_wait_max_attempts: Option<u32>,
}

impl Settings {
    pub fn connect_options(&self) -> Result<PgConnectOptions, StartupError> {
        match &self.database_url {
            Some(url) => url
                .parse()
                .map_err(|e| StartupError::Config(format!("DATABASE_URL: {}", e))),
            None => Ok(PgConnectOptions::new()
                .host(&self.db_host)
                .port(self.db_port)
                .username(&self.db_user)
                .password(&self.db_password)
                .database(&self.db_name)),
        }
    }

    pub fn wait_policy(&self) -> WaitPolicy {
        WaitPolicy {
            interval: Duration::from_secs(self.db_wait_interval_secs),
            max_attempts: self.db_wait_max_attempts,
        }
    }

    /// `user@host:port`, for log lines.
    pub fn db_target(&self) -> String {
        format!("{}@{}:{}", self.db_user, self.db_host, self.db_port)
    }
}
