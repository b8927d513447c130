use pdatastructs::tdigest::{TDigest, K1};
use stampede_core::{SummaryStat, TrendSummary};
use std::time::Duration;
use tracing::error;

const TDIGEST_BACKLOG_SIZE: usize = 100;

/// Running aggregate of a duration metric.
///
/// Count, sum, min and max are exact. Median and percentiles come from a TDigest so memory stays
/// bounded over long runs.
#[derive(Debug, Clone)]
pub(crate) struct Trend {
    count: u64,
    sum_ms: f64,
    min_ms: f64,
    max_ms: f64,
    digest: TDigest<K1>,
}

impl Trend {
    pub fn new() -> Self {
        Self {
            count: 0,
            sum_ms: 0.,
            min_ms: f64::INFINITY,
            max_ms: f64::NEG_INFINITY,
            digest: default_tdigest(),
        }
    }

    pub fn insert(&mut self, value: Duration) {
        let ms = value.as_secs_f64() * 1_000.;
        self.count += 1;
        self.sum_ms += ms;
        self.min_ms = self.min_ms.min(ms);
        self.max_ms = self.max_ms.max(ms);
        self.digest.insert(ms);
    }

    pub fn extend(&mut self, values: &[Duration]) {
        for value in values {
            self.insert(*value);
        }
    }

    pub fn stat(&self, stat: SummaryStat) -> f64 {
        if self.count == 0 {
            return 0.;
        }

        match stat {
            SummaryStat::Avg => self.sum_ms / self.count as f64,
            SummaryStat::Min => self.min_ms,
            SummaryStat::Max => self.max_ms,
            SummaryStat::Count => self.count as f64,
            SummaryStat::Med => self.quantile(0.5),
            SummaryStat::Percentile(p) => self.quantile(p / 100.),
        }
    }

    pub fn summary(&self, stats: &[SummaryStat]) -> TrendSummary {
        TrendSummary {
            values: stats.iter().map(|s| (*s, self.stat(*s))).collect(),
        }
    }

    fn quantile(&self, q: f64) -> f64 {
        let ms = self.digest.quantile(q);

        // TDigest can return NaN for sparse inputs.
        if ms.is_finite() {
            ms.clamp(self.min_ms, self.max_ms)
        } else {
            error!("NaN quantile calculation, reporting the median of min and max instead.");
            (self.min_ms + self.max_ms) / 2.
        }
    }
}

fn default_tdigest() -> TDigest<K1> {
    TDigest::new(K1::new(10.), TDIGEST_BACKLOG_SIZE)
}
