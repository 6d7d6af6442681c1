use std::net::SocketAddr;

use clap::Parser;

/// Defect Alert Monitor CLI arguments. Each flag overrides the matching
/// environment variable.
#[derive(Debug, Default, Parser)]
#[command(
    name = "defect-alert-monitor",
    version,
    about = "Ingests defect-detection alerts from MQTT and serves live statistics"
)]
pub struct Cli {
    /// MQTT broker host
    #[arg(long)]
    pub broker: Option<String>,

    /// MQTT broker port
    #[arg(long)]
    pub broker_port: Option<u16>,

    /// Topic carrying alert payloads
    #[arg(long)]
    pub topic: Option<String>,

    /// Number of alerts kept in the recent-alerts cache
    #[arg(long)]
    pub cache_size: Option<usize>,

    /// SQLite database URL, e.g. sqlite://defects.db
    #[arg(long)]
    pub database_url: Option<String>,

    /// Address the HTTP API listens on
    #[arg(long)]
    pub bind: Option<SocketAddr>,
}
