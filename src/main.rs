mod exposition;
mod gateway;
mod model;
mod monitor;

use std::time::Duration;

use structopt::StructOpt;

use gateway::client::HttpGateway;
use model::GatewayEndpoint;
use monitor::{AgingMonitor, MonitorConfig, DELETE_TIMEOUT, FETCH_TIMEOUT};

/// Deletes pushgateway groups whose last push is older than the aging time.
#[derive(StructOpt, Debug)]
#[structopt(name = "reaper")]
pub struct Command {
    /// How long a group may go without a push before it is deleted.
    #[structopt(long = "aging-time", default_value = "10m", parse(try_from_str = humantime::parse_duration))]
    pub aging_time: Duration,

    /// Address the gateway listens on; an empty or wildcard host means localhost.
    #[structopt(long = "web.listen-address", default_value = ":9091")]
    pub listen_address: String,

    /// Prefix for the gateway's internal routes.
    #[structopt(long = "web.route-prefix")]
    pub route_prefix: Option<String>,

    /// Path under which the gateway exposes its metrics.
    #[structopt(long = "web.telemetry-path", default_value = "/metrics")]
    pub metrics_path: String,

    #[structopt(long = "log-level", default_value = "info")]
    pub log_level: tracing::Level,
}

#[tokio::main]
async fn main() -> Result<(), anyhow::Error> {
    // parse the command line args
    let opt: Command = Command::from_args();

    let subscriber = tracing_subscriber::FmtSubscriber::builder()
        .with_max_level(opt.log_level)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    let endpoint = GatewayEndpoint::new(
        &opt.listen_address,
        opt.route_prefix.as_deref().unwrap_or(""),
        &opt.metrics_path,
    )?;
    let gateway = HttpGateway::new(&endpoint, FETCH_TIMEOUT, DELETE_TIMEOUT)?;
    tracing::info!("watching {}", gateway.scrape_url());

    let monitor = AgingMonitor::new(gateway, MonitorConfig::new(opt.aging_time));

    tokio::signal::ctrl_c().await?;
    tracing::info!("shutting down");
    drop(monitor);

    Ok(())
}
