use clap::Parser;
use crud_load::{cli::Cli, user_crud, Api};
use metrics_exporter_prometheus::PrometheusBuilder;
use stampede::prelude::*;
use tracing::info;
use tracing_subscriber::{EnvFilter, FmtSubscriber};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    FmtSubscriber::builder()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("stampede=info,crud_load=info")),
        )
        .init();

    let cli = Cli::parse();
    let config = cli.scenario_config()?;

    if let Some(addr) = cli.metrics_addr {
        PrometheusBuilder::new()
            .with_http_listener(addr)
            .install()?;
        info!("Serving metrics on {addr}");
    }

    Api::install(&cli.base_url);
    info!("Load testing {}", cli.base_url);

    let stats = user_crud().config(config).await;
    println!("{stats}");

    if !stats.checks_passed() {
        anyhow::bail!(
            "only {:.2}% of checks passed",
            stats.check_pass_rate() * 100.
        );
    }

    Ok(())
}
