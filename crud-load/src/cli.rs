//! Command line surface of the `crud-load` binary.
use crate::{default_config, DEFAULT_BASE_URL};
use anyhow::Context;
use clap::Parser;
use stampede::core::{RampStage, ScenarioConfig, SummaryStat};
use std::net::SocketAddr;
use std::num::NonZeroU32;
use std::path::PathBuf;

/// Ramping create/list/fetch/update/delete load test against a `/users` API.
///
/// Without a config file or `--stage` flags the run ramps to 100 virtual users over 1m, holds for
/// 8m and ramps down over 1m.
#[derive(Parser, Debug)]
#[command(version)]
pub struct Cli {
    /// Base URL of the service under test.
    #[arg(long, default_value = DEFAULT_BASE_URL)]
    pub base_url: String,

    /// JSON scenario config. Flags below override its fields.
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Ramp stage as `<duration>:<target>`, e.g. `30s:20`. Repeat for more stages.
    #[arg(short, long = "stage")]
    pub stages: Vec<RampStage>,

    /// Virtual users the first stage ramps from.
    #[arg(long)]
    pub start_concurrency: Option<usize>,

    /// Comma separated trend statistics, e.g. `avg,min,med,p(95),max`.
    #[arg(long)]
    pub summary_trend_stats: Option<String>,

    /// Cap on transactions started per second.
    #[arg(long)]
    pub max_rps: Option<NonZeroU32>,

    /// Time ramped-down virtual users get to finish their iteration.
    #[arg(long)]
    pub graceful_stop: Option<humantime::Duration>,

    /// Run this many iterations on a single virtual user instead of ramping.
    #[arg(short, long)]
    pub iterations: Option<u64>,

    /// Expose Prometheus metrics on this address while the test runs.
    #[arg(long)]
    pub metrics_addr: Option<SocketAddr>,
}

impl Cli {
    /// Merge the config file (or the default profile) with the flag overrides.
    pub fn scenario_config(&self) -> anyhow::Result<ScenarioConfig> {
        let mut config = match &self.config {
            Some(path) => {
                let raw = std::fs::read_to_string(path)
                    .with_context(|| format!("reading {}", path.display()))?;
                serde_json::from_str::<ScenarioConfig>(&raw)
                    .with_context(|| format!("parsing {}", path.display()))?
            }
            None => default_config(),
        };

        if config.name.is_empty() {
            config.name = "user_crud".to_string();
        }
        if !self.stages.is_empty() {
            config.stages = self.stages.clone();
        }
        if let Some(start) = self.start_concurrency {
            config.start_concurrency = start;
        }
        if let Some(stats) = &self.summary_trend_stats {
            config.summary_trend_stats = SummaryStat::parse_list(stats)?;
        }
        if let Some(max_rps) = self.max_rps {
            config.max_rps = Some(max_rps);
        }
        if let Some(graceful_stop) = self.graceful_stop {
            config.graceful_stop = graceful_stop.into();
        }
        if let Some(iterations) = self.iterations {
            config.iterations = Some(iterations);
        }

        if config.iterations.is_none() {
            config.ramp_profile().validate()?;
        }

        Ok(config)
    }
}
