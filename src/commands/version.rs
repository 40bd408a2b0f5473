//! Version command implementation.

use anyhow::Result;
use serde_json::json;

use crate::cli::VersionFormat;

pub const NAME: &str = env!("CARGO_PKG_NAME");
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Version string for the given output format
pub fn render(output: VersionFormat) -> Result<String> {
    match output {
        VersionFormat::Text => Ok(format!("{} {}", NAME, VERSION)),
        VersionFormat::Json => Ok(serde_json::to_string_pretty(&json!({
            "name": NAME,
            "version": VERSION,
        }))?),
    }
}

/// Run the version command
pub fn run(output: VersionFormat) -> Result<()> {
    println!("{}", render(output)?);
    Ok(())
}
