use clap::Parser;
use dotenv::dotenv;
use log::info;

mod auth;
mod config;
mod db;
mod error;
mod ingest;
mod models;
mod routes;
mod startup;
mod underwriting;

use config::{Cli, Command};
use db::PgProbe;
use error::StartupError;
use startup::Service;

#[actix_web::main]
async fn main() -> Result<(), StartupError> {
    dotenv().ok();
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cli = Cli::parse();
    let settings = cli.settings;
    let options = settings.connect_options()?;
    let probe = PgProbe::new(options.clone(), settings.db_target());
    let service = Service {
        pool: db::lazy_pool(options, settings.db_max_connections),
        bind_address: settings.bind_address.clone(),
    };

    match cli.command.unwrap_or(Command::Start) {
        Command::Start => startup::start(&probe, &settings.wait_policy(), &service).await,
        Command::WaitDb => db::wait_for_database(&probe, &settings.wait_policy())
            .await
            .map(|_| ()),
        Command::Migrate => db::run_migrations(&service.pool).await,
        Command::Serve => startup::run_server(service.pool.clone(), &service.bind_address).await,
        Command::Ingest { customers, loans } => {
            let report = ingest::ingest(&service.pool, &customers, &loans).await?;
            info!(
                "Ingested {} customers and {} loans ({} loans skipped)",
                report.customers, report.loans, report.skipped_loans
            );
            Ok(())
        }
    }
}
