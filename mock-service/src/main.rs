use clap::Parser;
use metrics_exporter_prometheus::PrometheusBuilder;
use mock_service::prelude::*;
use std::net::SocketAddr;
use std::time::Duration;
use tracing_subscriber::{EnvFilter, FmtSubscriber};

/// In-memory implementation of the `/users` CRUD API.
#[derive(Parser, Debug)]
#[command(version)]
struct Cli {
    #[arg(short, long, default_value_t = 8080)]
    port: u16,

    /// Mean simulated processing time per request.
    #[arg(long, default_value_t = 0)]
    delay_ms: u64,

    /// Standard deviation of the simulated processing time.
    #[arg(long, default_value_t = 0)]
    jitter_ms: u64,

    /// Expose Prometheus metrics on this address.
    #[arg(long)]
    metrics_addr: Option<SocketAddr>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    FmtSubscriber::builder()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("mock_service=info,tower_http=warn")),
        )
        .init();

    let cli = Cli::parse();

    if let Some(addr) = cli.metrics_addr {
        PrometheusBuilder::new()
            .with_http_listener(addr)
            .install()?;
    }

    let state = if cli.delay_ms > 0 || cli.jitter_ms > 0 {
        ServiceState::with_latency(Latency {
            mean: Duration::from_millis(cli.delay_ms),
            jitter: Duration::from_millis(cli.jitter_ms),
        })
    } else {
        ServiceState::new()
    };

    tokio::spawn(mock_service::rps_measure_task(state.clone()));

    let addr = SocketAddr::from(([0, 0, 0, 0], cli.port));
    mock_service::run(addr, state).await
}
