//! Scenario logic and the ramp controller
use crate::collector::Collector;
use crate::pool::VuPool;
use crate::timer::Timer;
use crate::transaction::{TransactionData, TRANSACTION_HOOK};
use stampede_core::{RampStage, RunStatistics, ScenarioConfig, SummaryStat, RAMP_INTERVAL};
use std::{
    fmt,
    future::Future,
    num::NonZeroU32,
    pin::Pin,
    sync::Arc,
    task::{Context, Poll},
    time::Duration,
};
use tokio::time::Instant;
#[allow(unused_imports)]
use tracing::{debug, error, info, instrument, trace, warn, Instrument};

/// Load test scenario structure
///
/// Handler for running scenarios. Not intended for manual creation, use the
/// [`#[scenario]`](stampede_macros::scenario) macro which will add these methods to functions.
#[pin_project::pin_project]
pub struct Scenario<T> {
    func: T,
    runner_fut: Option<Pin<Box<dyn Future<Output = RunStatistics> + Send>>>,
    config: ScenarioConfig,
}

impl<T> Scenario<T> {
    #[doc(hidden)]
    pub fn new(name: &str, func: T) -> Self {
        Self {
            func,
            runner_fut: None,
            config: ScenarioConfig::new(name),
        }
    }
}

impl<T, F, O> Future for Scenario<T>
where
    T: Fn() -> F + Send + Sync + 'static + Clone,
    F: Future<Output = O> + Send + 'static,
    O: IterationOutcome + 'static,
{
    type Output = RunStatistics;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let this = self.project();
        let runner = this.runner_fut.get_or_insert_with(|| {
            let func = this.func.clone();
            let config = this.config.clone();
            Box::pin(async move { run_scenario(func, config).await })
        });

        runner.as_mut().poll(cx)
    }
}

/// What a scenario iteration returned.
///
/// Scenario functions may return `()` or `Result<(), E>`. An `Err` counts as an iteration error
/// and is logged; it never stops the virtual user.
pub trait IterationOutcome: Send {
    fn into_error(self) -> Option<String>;
}

impl IterationOutcome for () {
    fn into_error(self) -> Option<String> {
        None
    }
}

impl<E: fmt::Display + Send> IterationOutcome for Result<(), E> {
    fn into_error(self) -> Option<String> {
        self.err().map(|e| e.to_string())
    }
}

pub trait ConfigurableScenario<T: Send>: Future<Output = T> + Sized + Send {
    fn stages(self, stages: &[RampStage]) -> Self;
    fn start_concurrency(self, concurrency: usize) -> Self;
    fn summary_trend_stats(self, stats: &[SummaryStat]) -> Self;
    fn graceful_stop(self, graceful_stop: Duration) -> Self;
    fn max_rps(self, max_rps: NonZeroU32) -> Self;
    fn iterations(self, iterations: u64) -> Self;
    fn config(self, config: ScenarioConfig) -> Self;
}

impl<T, F, O> ConfigurableScenario<RunStatistics> for Scenario<T>
where
    T: Fn() -> F + Send + Sync + 'static + Clone,
    F: Future<Output = O> + Send + 'static,
    O: IterationOutcome + 'static,
{
    /// Ramp the number of virtual users through the given stages.
    ///
    /// Each stage moves linearly from the previous target (or the start concurrency) to its own
    /// target over its duration. The scenario finishes once the last stage completes.
    ///
    /// # Example
    /// ```no_run
    /// use stampede::prelude::*;
    /// use std::time::Duration;
    ///
    /// #[tokio::main]
    /// async fn main() {
    ///     my_scenario()
    ///         .stages(&[
    ///             RampStage::new(Duration::from_secs(60), 100),
    ///             RampStage::new(Duration::from_secs(480), 100),
    ///             RampStage::new(Duration::from_secs(60), 0),
    ///         ])
    ///         .await;
    /// }
    ///
    /// #[scenario]
    /// async fn my_scenario() {
    /// }
    /// ```
    fn stages(mut self, stages: &[RampStage]) -> Self {
        self.config.stages = stages.to_vec();
        self
    }

    /// Number of virtual users the first stage ramps from. Defaults to 1.
    fn start_concurrency(mut self, concurrency: usize) -> Self {
        self.config.start_concurrency = concurrency;
        self
    }

    /// Statistics reported for latency and iteration duration trends.
    fn summary_trend_stats(mut self, stats: &[SummaryStat]) -> Self {
        self.config.summary_trend_stats = stats.to_vec();
        self
    }

    /// How long virtual users removed by a ramp-down (or at the end of the run) may spend
    /// finishing their current iteration before being aborted. Defaults to 30s.
    fn graceful_stop(mut self, graceful_stop: Duration) -> Self {
        self.config.graceful_stop = graceful_stop;
        self
    }

    /// Cap the number of transactions started per second across all virtual users.
    fn max_rps(mut self, max_rps: NonZeroU32) -> Self {
        self.config.max_rps = Some(max_rps);
        self
    }

    /// Ignore the ramp profile and run exactly `iterations` iterations on a single virtual user.
    ///
    /// # Example
    /// ```no_run
    /// use stampede::prelude::*;
    ///
    /// #[tokio::main]
    /// async fn main() {
    ///     let stats = my_scenario().iterations(1).await;
    ///     assert!(stats.checks_passed());
    /// }
    ///
    /// #[scenario]
    /// async fn my_scenario() {
    /// }
    /// ```
    fn iterations(mut self, iterations: u64) -> Self {
        self.config.iterations = Some(iterations);
        self
    }

    /// Replace the whole configuration, keeping the scenario name when the new one is empty.
    fn config(mut self, mut config: ScenarioConfig) -> Self {
        if config.name.is_empty() {
            config.name = std::mem::take(&mut self.config.name);
        }
        self.config = config;
        self
    }
}

#[instrument(name="scenario", skip_all, fields(name=config.name))]
pub(crate) async fn run_scenario<T, F, O>(scenario: T, config: ScenarioConfig) -> RunStatistics
where
    T: Fn() -> F + Send + Sync + 'static + Clone,
    F: Future<Output = O> + Send + 'static,
    O: IterationOutcome + 'static,
{
    info!("Running {} with config {:?}", config.name, &config);

    let collector = Arc::new(Collector::new(config.summary_trend_stats.clone()));
    let data = TransactionData::new(collector.clone(), config.max_rps);
    let start = Instant::now();

    let max_concurrency = if let Some(iterations) = config.iterations {
        run_iterations(scenario, data, iterations).await;
        1
    } else {
        run_ramp(scenario, data, &config).await
    };

    info!("Scenario complete");

    collector.finish(&config.name, start.elapsed(), max_concurrency)
}

async fn run_iterations<T, F, O>(scenario: T, data: TransactionData, iterations: u64)
where
    T: Fn() -> F,
    F: Future<Output = O>,
    O: IterationOutcome,
{
    let collector = data.collector.clone();
    TRANSACTION_HOOK
        .scope(data, async move {
            for _ in 0..iterations {
                let start = Instant::now();
                let outcome = scenario().await;
                collector.record_iteration(start.elapsed(), outcome.into_error());
            }
        })
        .await;
}

/// Drive the virtual-user count along the ramp profile. Returns the peak concurrency.
async fn run_ramp<T, F, O>(scenario: T, data: TransactionData, config: &ScenarioConfig) -> usize
where
    T: Fn() -> F + Send + Sync + 'static + Clone,
    F: Future<Output = O> + Send + 'static,
    O: IterationOutcome + 'static,
{
    let profile = config.ramp_profile();
    if let Err(err) = profile.validate() {
        error!("Invalid ramp profile: {err}");
        return 0;
    }

    info!(
        "Ramping up to {} virtual users over {}",
        profile.max_target(),
        humantime::format_duration(profile.total_duration())
    );

    let collector = data.collector.clone();
    let mut pool = VuPool::new(scenario, data);
    let mut timer = Timer::new(RAMP_INTERVAL).await;
    debug!("Ramp controller interval {timer}");

    let start = Instant::now();
    while let Some(target) = profile.target_at(start.elapsed()) {
        if target != pool.concurrency() {
            debug!("Virtual users: {} -> {target}", pool.concurrency());
        }
        pool.set_concurrency(target);

        timer.tick().await;
        collector.flush();
    }

    let max_concurrency = pool.max_concurrency();
    pool.shutdown(config.graceful_stop).await;
    debug!(
        "{} iterations across at most {max_concurrency} virtual users",
        collector.iterations()
    );

    max_concurrency
}
