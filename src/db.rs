use std::time::Duration;

use async_trait::async_trait;
use log::{info, warn};
use sqlx::migrate::Migrator;
use sqlx::postgres::{PgConnectOptions, PgPoolOptions};
use sqlx::{Connection, PgConnection, PgPool};

use crate::error::StartupError;

static MIGRATOR: Migrator = sqlx::migrate!("./migrations");

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WaitPolicy {
    pub interval: Duration,
    /// `None` polls forever.
    pub max_attempts: Option<u32>,
}

/// A cheap check of whether the database accepts connections.
#[async_trait]
pub trait LivenessProbe {
    async fn probe(&self) -> Result<(), String>;

    fn target(&self) -> String;
}

/// Opens one connection with the service credentials and pings it.
pub struct PgProbe {
    options: PgConnectOptions,
    target: String,
}

impl PgProbe {
    pub fn new(options: PgConnectOptions, target: String) -> Self {
        PgProbe { options, target }
    }
}

// cannot_connect_now: the server is starting up or shutting down
const CANNOT_CONNECT_NOW: &str = "57P03";

/// Whether a failed connection attempt still shows a server accepting
/// connections. Errors the server sent back (bad password, unknown database)
/// count; transport errors and `57P03` do not.
pub fn server_answered(err: &sqlx::Error) -> bool {
    match err {
        sqlx::Error::Database(db_err) => sqlstate_means_up(db_err.code().as_deref()),
        _ => false,
    }
}

fn sqlstate_means_up(code: Option<&str>) -> bool {
    code != Some(CANNOT_CONNECT_NOW)
}

#[async_trait]
impl LivenessProbe for PgProbe {
    async fn probe(&self) -> Result<(), String> {
        let mut conn = match PgConnection::connect_with(&self.options).await {
            Ok(conn) => conn,
            Err(e) if server_answered(&e) => {
                // migrations will fail with the real error
                warn!("Database at {} is up but refused the login: {}", self.target, e);
                return Ok(());
            }
            Err(e) => return Err(e.to_string()),
        };
        conn.ping().await.map_err(|e| e.to_string())?;
        conn.close().await.map_err(|e| e.to_string())
    }

    fn target(&self) -> String {
        self.target.clone()
    }
}

/// Polls `probe` until it succeeds, sleeping `policy.interval` after every
/// failure. Returns the number of attempts made.
pub async fn wait_for_database<P>(probe: &P, policy: &WaitPolicy) -> Result<u32, StartupError>
where
    P: LivenessProbe + Sync,
{
    let mut attempts = 0;
    loop {
        attempts += 1;
        match probe.probe().await {
            Ok(()) => {
                info!("Database at {} is ready (attempt {})", probe.target(), attempts);
                return Ok(attempts);
            }
            Err(e) => {
                warn!("Waiting for database at {}... ({})", probe.target(), e);
                if policy.max_attempts.is_some_and(|max| attempts >= max) {
                    return Err(StartupError::DbUnavailable { attempts });
                }
                tokio::time::sleep(policy.interval).await;
            }
        }
    }
}

/// The pool connects on first use, so it can be built before the database is up.
pub fn lazy_pool(options: PgConnectOptions, max_connections: u32) -> PgPool {
    PgPoolOptions::new()
        .max_connections(max_connections)
        .connect_lazy_with(options)
}

pub async fn run_migrations(pool: &PgPool) -> Result<(), StartupError> {
    info!("Applying migrations");
    MIGRATOR.run(pool).await?;
    info!("Migrations applied");
    Ok(())
}
