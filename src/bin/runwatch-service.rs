use clap::Parser;
use tracing::info;

use runwatch::cli::Cli;
use runwatch::{telemetry, wiring};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv::dotenv().ok();
    let cli = Cli::parse();
    telemetry::init_tracing(cli.json_logs);

    let config = wiring::load_config(&cli)?;
    info!(
        db = %config.store.sqlite_path.display(),
        poll_interval_ms = config.watch.poll_interval_ms,
        "starting runwatch"
    );
    let mut supervisor = wiring::supervisor(&config)?;

    if cli.once {
        let mut summaries = supervisor.tick().await?;
        summaries.extend(supervisor.finish_all().await);
        for summary in summaries {
            println!("{}", serde_json::to_string_pretty(&summary)?);
        }
        return Ok(());
    }

    let shutdown = async {
        if let Err(err) = tokio::signal::ctrl_c().await {
            tracing::error!("failed to listen for ctrl-c: {err}");
            std::future::pending::<()>().await;
        }
    };
    let summaries = supervisor.run_until(shutdown).await;
    info!(finished = summaries.len(), "runwatch stopped");
    Ok(())
}
