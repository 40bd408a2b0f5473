//! Status command implementation.

use anyhow::Result;

use super::build_allowlister;
use crate::cli::StatusFormat;
use crate::config::Config;

/// Run the status command
pub async fn run(config: &Config, format: StatusFormat) -> Result<()> {
    let allowlister = build_allowlister(config)?;
    let status = allowlister.status().await;

    match format {
        StatusFormat::Json => println!("{}", serde_json::to_string_pretty(&status)?),
        StatusFormat::Yaml => print!("{}", serde_yaml::to_string(&status)?),
    }

    // Exit with non-zero code if unhealthy
    if !status.is_healthy() {
        std::process::exit(1);
    }

    Ok(())
}
