use clap::Parser;
use dotenvy::dotenv;

use defect_alert_monitor::cli::Cli;
use defect_alert_monitor::config::Config;
use defect_alert_monitor::error::AppError;
use defect_alert_monitor::logging::init_logging;
use defect_alert_monitor::supervisor;

#[tokio::main]
async fn main() {
    dotenv().ok();
    let cli = Cli::parse();
    init_logging();

    let config = Config::from_env()
        .and_then(|config| config.with_overrides(&cli))
        .map_err(AppError::Config)
        .unwrap_or_else(|err| {
            tracing::error!("{}", err);
            std::process::exit(1);
        });

    tracing::info!("Service started with config: {:?}", config);

    if let Err(err) = supervisor::run(config).await {
        tracing::error!("{}", err);
        std::process::exit(1);
    }
}
