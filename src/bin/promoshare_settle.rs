//! promoshare-settle: one-shot draw runner
//!
//! Draws every cycle whose window has closed, then exits. Meant to be run
//! from cron or a Kubernetes CronJob.
//!
//! ## Configuration
//! - First argument: path to a YAML config file (optional)
//! - PROMOSHARE_CONFIG: path to a YAML config file (optional)
//! - PROMOSHARE__*: overrides, e.g. PROMOSHARE__STORAGE__SQLITE__PATH
//! - PROMOSHARE_LOG: tracing filter (default: info)

use chrono::Utc;
use tracing::info;

use promoshare::config::Config;
use promoshare::facade::Economy;
use promoshare::utils::bootstrap::init_tracing;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    init_tracing();

    let config_path = std::env::args().nth(1);
    let config = Config::load(config_path.as_deref())?;

    let economy = Economy::builder(config).build().await?;
    let now = Utc::now();

    info!(%now, "promoshare-settle started");
    let outcomes = economy.draws().run_due(now).await?;

    for outcome in &outcomes {
        info!(
            cycle_id = %outcome.cycle_id,
            winning_number = outcome.winning_number,
            winners = outcome.winners.len(),
            paid_out = outcome.paid_out,
            carried_forward = outcome.carried_forward,
            "Cycle settled"
        );
    }
    info!(settled = outcomes.len(), "promoshare-settle finished");

    Ok(())
}
