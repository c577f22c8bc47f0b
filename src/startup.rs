use actix_web::{middleware::Logger, web, App, HttpServer};
use async_trait::async_trait;
use log::info;
use sqlx::PgPool;

use crate::db::{self, LivenessProbe, WaitPolicy};
use crate::error::StartupError;
use crate::routes;

/// The steps that follow a successful readiness check.
#[async_trait(?Send)]
pub trait Workload {
    async fn migrate(&self) -> Result<(), StartupError>;

    async fn serve(&self) -> Result<(), StartupError>;
}

/// Container entrypoint: wait for the database, migrate once, then serve.
/// The server only starts if migrations succeeded.
pub async fn start<P, W>(probe: &P, policy: &WaitPolicy, workload: &W) -> Result<(), StartupError>
where
    P: LivenessProbe + Sync,
    W: Workload,
{
    db::wait_for_database(probe, policy).await?;
    workload.migrate().await?;
    workload.serve().await
}

pub struct Service {
    pub pool: PgPool,
    pub bind_address: String,
}

#[async_trait(?Send)]
impl Workload for Service {
    async fn migrate(&self) -> Result<(), StartupError> {
        db::run_migrations(&self.pool).await
    }

    async fn serve(&self) -> Result<(), StartupError> {
        run_server(self.pool.clone(), &self.bind_address).await
    }
}

pub async fn run_server(pool: PgPool, bind_address: &str) -> Result<(), StartupError> {
    info!("Server running at http://{}", bind_address);

    HttpServer::new(move || {
        App::new()
            .app_data(web::Data::new(pool.clone()))
            .wrap(Logger::default())
            .configure(routes::routes::app_configure)
    })
    .bind(bind_address)?
    .run()
    .await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};
    use std::time::Duration;

    struct ScriptedProbe {
        failures_left: Mutex<u32>,
        log: CallLog,
    }

    #[async_trait]
    impl LivenessProbe for ScriptedProbe {
        async fn probe(&self) -> Result<(), String> {
            let mut left = self.failures_left.lock().unwrap();
            if *left == 0 {
                self.log.lock().unwrap().push("ready");
                Ok(())
            } else {
                *left -= 1;
                self.log.lock().unwrap().push("probe failed");
                Err("not accepting connections".into())
            }
        }

        fn target(&self) -> String {
            "user@db:5432".into()
        }
    }

    struct RecordingWorkload {
        log: CallLog,
        migration_fails: bool,
    }

    #[async_trait(?Send)]
    impl Workload for RecordingWorkload {
        async fn migrate(&self) -> Result<(), StartupError> {
            self.log.lock().unwrap().push("migrate");
            if self.migration_fails {
                Err(StartupError::Config("broken migration".into()))
            } else {
                Ok(())
            }
        }

        async fn serve(&self) -> Result<(), StartupError> {
            self.log.lock().unwrap().push("serve");
            Ok(())
        }
    }

    type CallLog = Arc<Mutex<Vec<&'static str>>>;

    fn fixture(failures: u32, migration_fails: bool) -> (ScriptedProbe, RecordingWorkload, CallLog) {
        let log = Arc::new(Mutex::new(Vec::new()));
        let probe = ScriptedProbe {
            failures_left: Mutex::new(failures),
            log: log.clone(),
        };
        let workload = RecordingWorkload {
            log: log.clone(),
            migration_fails,
        };
        (probe, workload, log)
    }

    const POLICY: WaitPolicy = WaitPolicy {
        interval: Duration::from_secs(2),
        max_attempts: None,
    };

    #[tokio::test(start_paused = true)]
    async fn migrates_once_after_ready_then_serves() {
        let (probe, workload, log) = fixture(2, false);
        start(&probe, &POLICY, &workload).await.unwrap();
        assert_eq!(
            *log.lock().unwrap(),
            vec!["probe failed", "probe failed", "ready", "migrate", "serve"]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn failed_migration_skips_server() {
        let (probe, workload, log) = fixture(0, true);
        assert!(start(&probe, &POLICY, &workload).await.is_err());
        assert_eq!(*log.lock().unwrap(), vec!["ready", "migrate"]);
    }

    #[tokio::test(start_paused = true)]
    async fn unreachable_database_never_migrates() {
        let (probe, workload, log) = fixture(u32::MAX, false);
        let policy = WaitPolicy {
            max_attempts: Some(5),
            ..POLICY
        };
        assert!(matches!(
            start(&probe, &policy, &workload).await,
            Err(StartupError::DbUnavailable { attempts: 5 })
        ));
        assert!(!log.lock().unwrap().contains(&"migrate"));
    }
}
