use std::env;

use anyhow::{Context, Result};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use tractive_gateway::{GatewayConfig, HardwareReport, LocationReport, TrackerId, TrackerService};

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "tractive_gateway=warn".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let args: Vec<String> = env::args().collect();
    if args.len() < 2 {
        eprintln!("Usage: {} <tracker_ids> [location|hardware|battery]", args[0]);
        eprintln!("  tracker_ids: comma-separated 8-character ids (e.g., ABCD1234,EFGH5678)");
        eprintln!("  view: what to fetch (default: location)");
        eprintln!("  credentials come from TRACTIVE_EMAIL and TRACTIVE_PASSWORD");
        std::process::exit(1);
    }

    let tracker_ids = TrackerId::parse_list(&args[1]).context("Invalid tracker ids")?;
    let view = args.get(2).map(|s| s.to_lowercase()).unwrap_or_else(|| "location".into());

    let config = GatewayConfig::from_env().context("Invalid configuration")?;
    let service = TrackerService::from_config(&config)?;

    service
        .auth
        .authenticate()
        .await
        .context("Authentication failed")?;

    let reports = &service.reports;
    let output = match view.as_str() {
        "location" => {
            let lookups = reports.lookup_many::<LocationReport>(&tracker_ids).await?;
            serde_json::to_string_pretty(&lookups)?
        }
        "hardware" => {
            let lookups = reports.lookup_many::<HardwareReport>(&tracker_ids).await?;
            serde_json::to_string_pretty(&lookups)?
        }
        "battery" => {
            let levels = reports.lookup_battery_levels(&tracker_ids).await?;
            serde_json::to_string_pretty(&levels)?
        }
        other => {
            eprintln!("Unknown view: {}. Use location, hardware or battery.", other);
            std::process::exit(1);
        }
    };

    println!("{}", output);
    Ok(())
}
