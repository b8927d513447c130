use crate::trend::Trend;
use metrics_util::AtomicBucket;
use stampede_core::{CheckSummary, RunStatistics, SummaryStat, TransactionSummary};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError, RwLock};
use std::time::Duration;
#[allow(unused)]
use tracing::{debug, error, info, trace, warn};

/// Results shared by every virtual user of a single scenario run.
///
/// Hot paths only touch atomics and lock-free buckets; the controller periodically drains the
/// buckets into [`Trend`]s via [`Collector::flush`].
pub(crate) struct Collector {
    stats: Vec<SummaryStat>,
    iterations: AtomicU64,
    iteration_errors: AtomicU64,
    iteration_duration: AtomicBucket<Duration>,
    checks: RwLock<HashMap<&'static str, Arc<CheckTally>>>,
    transactions: RwLock<HashMap<&'static str, Arc<TransactionTally>>>,
    trends: Mutex<Trends>,
}

struct CheckTally {
    seq: usize,
    passes: AtomicU64,
    fails: AtomicU64,
}

struct TransactionTally {
    seq: usize,
    success: AtomicU64,
    error: AtomicU64,
    latency: AtomicBucket<Duration>,
}

struct Trends {
    http_req_duration: Trend,
    iteration_duration: Trend,
    transactions: HashMap<&'static str, Trend>,
}

impl Collector {
    pub fn new(stats: Vec<SummaryStat>) -> Self {
        Self {
            stats,
            iterations: AtomicU64::new(0),
            iteration_errors: AtomicU64::new(0),
            iteration_duration: AtomicBucket::new(),
            checks: RwLock::new(HashMap::new()),
            transactions: RwLock::new(HashMap::new()),
            trends: Mutex::new(Trends {
                http_req_duration: Trend::new(),
                iteration_duration: Trend::new(),
                transactions: HashMap::new(),
            }),
        }
    }

    pub fn record_check(&self, name: &'static str, passed: bool) {
        let tally = self.check_tally(name);
        if passed {
            tally.passes.fetch_add(1, Ordering::Relaxed);
        } else {
            tally.fails.fetch_add(1, Ordering::Relaxed);
        }
    }

    pub fn record_transaction(&self, name: &'static str, elapsed: Duration, success: bool) {
        let tally = self.transaction_tally(name);
        tally.latency.push(elapsed);
        if success {
            tally.success.fetch_add(1, Ordering::Relaxed);
        } else {
            tally.error.fetch_add(1, Ordering::Relaxed);
        }
    }

    pub fn record_iteration(&self, elapsed: Duration, error: Option<String>) {
        self.iterations.fetch_add(1, Ordering::Relaxed);
        self.iteration_duration.push(elapsed);

        #[cfg(feature = "metrics")]
        metrics::counter!("iterations").increment(1);

        if let Some(error) = error {
            self.iteration_errors.fetch_add(1, Ordering::Relaxed);
            warn!("Iteration failed: {error}");
        }
    }

    pub fn iterations(&self) -> u64 {
        self.iterations.load(Ordering::Relaxed)
    }

    /// Move buffered latencies into the long-lived trends.
    pub fn flush(&self) {
        let mut trends = self.trends.lock().unwrap_or_else(PoisonError::into_inner);
        let Trends {
            http_req_duration,
            iteration_duration,
            transactions,
        } = &mut *trends;

        self.iteration_duration
            .clear_with(|durations| iteration_duration.extend(durations));

        let tallies = self.transactions.read().unwrap_or_else(PoisonError::into_inner);
        for (name, tally) in tallies.iter() {
            let trend = transactions.entry(*name).or_insert_with(Trend::new);
            tally.latency.clear_with(|durations| {
                trend.extend(durations);
                http_req_duration.extend(durations);
            });
        }
    }

    pub fn finish(
        &self,
        name: &str,
        elapsed: Duration,
        max_concurrency: usize,
    ) -> RunStatistics {
        self.flush();

        let trends = self.trends.lock().unwrap_or_else(PoisonError::into_inner);

        let mut checks: Vec<_> = self
            .checks
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .map(|(name, tally)| {
                (
                    tally.seq,
                    CheckSummary {
                        name: name.to_string(),
                        passes: tally.passes.load(Ordering::Relaxed),
                        fails: tally.fails.load(Ordering::Relaxed),
                    },
                )
            })
            .collect();
        checks.sort_by_key(|(seq, _)| *seq);

        let mut transactions: Vec<_> = self
            .transactions
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .map(|(name, tally)| {
                let latency = trends
                    .transactions
                    .get(name)
                    .map(|t| t.summary(&self.stats))
                    .unwrap_or_else(|| Trend::new().summary(&self.stats));
                (
                    tally.seq,
                    TransactionSummary {
                        name: name.to_string(),
                        success: tally.success.load(Ordering::Relaxed),
                        error: tally.error.load(Ordering::Relaxed),
                        latency,
                    },
                )
            })
            .collect();
        transactions.sort_by_key(|(seq, _)| *seq);

        RunStatistics {
            name: name.to_string(),
            elapsed,
            iterations: self.iterations.load(Ordering::Relaxed),
            iteration_errors: self.iteration_errors.load(Ordering::Relaxed),
            max_concurrency,
            checks: checks.into_iter().map(|(_, c)| c).collect(),
            transactions: transactions.into_iter().map(|(_, t)| t).collect(),
            http_req_duration: trends.http_req_duration.summary(&self.stats),
            iteration_duration: trends.iteration_duration.summary(&self.stats),
        }
    }

    fn check_tally(&self, name: &'static str) -> Arc<CheckTally> {
        let read = self
            .checks
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(name)
            .cloned();
        if let Some(tally) = read {
            return tally;
        }

        let mut checks = self.checks.write().unwrap_or_else(PoisonError::into_inner);
        let seq = checks.len();
        checks
            .entry(name)
            .or_insert_with(|| {
                Arc::new(CheckTally {
                    seq,
                    passes: AtomicU64::new(0),
                    fails: AtomicU64::new(0),
                })
            })
            .clone()
    }

    fn transaction_tally(&self, name: &'static str) -> Arc<TransactionTally> {
        let read = self
            .transactions
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(name)
            .cloned();
        if let Some(tally) = read {
            return tally;
        }

        let mut transactions = self
            .transactions
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        let seq = transactions.len();
        transactions
            .entry(name)
            .or_insert_with(|| {
                Arc::new(TransactionTally {
                    seq,
                    success: AtomicU64::new(0),
                    error: AtomicU64::new(0),
                    latency: AtomicBucket::new(),
                })
            })
            .clone()
    }
}
