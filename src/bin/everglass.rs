use anyhow::Result;
use everglass::cli::{self, telemetry};

// Main function
#[tokio::main]
async fn main() -> Result<()> {
    let action = cli::start()?;

    let result = action.execute().await;

    // Flush pending spans before exiting
    telemetry::shutdown_tracer();

    result
}
