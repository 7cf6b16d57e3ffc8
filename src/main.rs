//! This file defines the ear-service binary entry point.

use ear_service::app;
use ear_service::cli;
use ear_service::metrics;
use ear_service::server;
use ear_service::tracing;

use std::error::Error;
use std::process::ExitCode;

/// Application entry point
#[tokio::main]
async fn main() -> ExitCode {
    // A missing .env file is not an error.
    dotenv::dotenv().ok();
    let args = cli::parse();
    tracing::init_tracing();
    metrics::register_metrics();
    let service = match app::service(&args) {
        Ok(service) => service,
        Err(err) => {
            ::tracing::error!("failed to build the outbound HTTP client: {}", err);
            return ExitCode::FAILURE;
        }
    };
    if let Err(err) = server::serve(&args, service).await {
        ::tracing::error!("{}", err);
        let mut current = err.source();
        while let Some(source) = current {
            ::tracing::error!("Caused by: {}", source);
            current = source.source();
        }
        return ExitCode::FAILURE;
    }
    ExitCode::SUCCESS
}
