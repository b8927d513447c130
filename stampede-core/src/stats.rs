use crate::SummaryStat;
use std::fmt;
use std::time::Duration;

/// End-of-run statistics for a Scenario.
#[derive(Clone, Debug, Default)]
pub struct RunStatistics {
    pub name: String,
    pub elapsed: Duration,
    pub iterations: u64,
    pub iteration_errors: u64,
    pub max_concurrency: usize,
    pub checks: Vec<CheckSummary>,
    pub transactions: Vec<TransactionSummary>,
    pub http_req_duration: TrendSummary,
    pub iteration_duration: TrendSummary,
}

impl RunStatistics {
    /// True when no recorded check failed.
    pub fn checks_passed(&self) -> bool {
        self.checks.iter().all(|c| c.fails == 0)
    }

    pub fn check(&self, name: &str) -> Option<&CheckSummary> {
        self.checks.iter().find(|c| c.name == name)
    }

    pub fn transaction(&self, name: &str) -> Option<&TransactionSummary> {
        self.transactions.iter().find(|t| t.name == name)
    }

    pub fn check_pass_rate(&self) -> f64 {
        let (passes, total) = self
            .checks
            .iter()
            .fold((0, 0), |(p, t), c| (p + c.passes, t + c.passes + c.fails));
        if total == 0 {
            1.
        } else {
            passes as f64 / total as f64
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CheckSummary {
    pub name: String,
    pub passes: u64,
    pub fails: u64,
}

impl CheckSummary {
    pub fn pass_rate(&self) -> f64 {
        let total = self.passes + self.fails;
        if total == 0 {
            1.
        } else {
            self.passes as f64 / total as f64
        }
    }
}

#[derive(Clone, Debug, Default)]
pub struct TransactionSummary {
    pub name: String,
    pub success: u64,
    pub error: u64,
    pub latency: TrendSummary,
}

/// Configured summary stats of a trend, in configuration order.
///
/// Values are milliseconds, except for [`SummaryStat::Count`].
#[derive(Clone, Debug, Default)]
pub struct TrendSummary {
    pub values: Vec<(SummaryStat, f64)>,
}

impl TrendSummary {
    pub fn get(&self, stat: SummaryStat) -> Option<f64> {
        self.values
            .iter()
            .find(|(s, _)| *s == stat)
            .map(|(_, value)| *value)
    }

    pub fn duration(&self, stat: SummaryStat) -> Option<Duration> {
        match stat {
            SummaryStat::Count => None,
            stat => self.get(stat).map(|ms| Duration::from_secs_f64(ms / 1_000.)),
        }
    }
}

impl fmt::Display for TrendSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut first = true;
        for (stat, value) in &self.values {
            if !first {
                write!(f, " ")?;
            }
            first = false;

            match stat {
                SummaryStat::Count => write!(f, "{stat}={value}")?,
                _ => write!(f, "{stat}={value:.2}ms")?,
            }
        }
        Ok(())
    }
}

const LABEL_WIDTH: usize = 32;

fn label(f: &mut fmt::Formatter<'_>, name: &str) -> fmt::Result {
    write!(f, "     {name:.<width$}: ", width = LABEL_WIDTH)
}

impl fmt::Display for RunStatistics {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "  scenario: {}", self.name)?;
        writeln!(f)?;

        for check in &self.checks {
            let mark = if check.fails == 0 { '✓' } else { '✗' };
            writeln!(f, "     {mark} {}", check.name)?;
            if check.fails > 0 {
                writeln!(
                    f,
                    "      ↳  {:.0}% — ✓ {} / ✗ {}",
                    check.pass_rate() * 100.,
                    check.passes,
                    check.fails
                )?;
            }
        }
        writeln!(f)?;

        let (passes, fails) = self
            .checks
            .iter()
            .fold((0, 0), |(p, e), c| (p + c.passes, e + c.fails));
        label(f, "checks")?;
        writeln!(
            f,
            "{:.2}% ✓ {passes} ✗ {fails}",
            self.check_pass_rate() * 100.
        )?;

        label(f, "http_req_duration")?;
        writeln!(f, "{}", self.http_req_duration)?;
        for transaction in &self.transactions {
            label(f, &format!("  {{ transaction:{} }}", transaction.name))?;
            writeln!(f, "{}", transaction.latency)?;
        }

        let (success, error) = self
            .transactions
            .iter()
            .fold((0, 0), |(s, e), t| (s + t.success, e + t.error));
        label(f, "http_reqs")?;
        writeln!(f, "{}", success + error)?;
        label(f, "http_req_failed")?;
        writeln!(f, "{error}")?;

        label(f, "iteration_duration")?;
        writeln!(f, "{}", self.iteration_duration)?;
        label(f, "iterations")?;
        writeln!(
            f,
            "{} ({:.2}/s)",
            self.iterations,
            self.iterations as f64 / self.elapsed.as_secs_f64().max(f64::EPSILON)
        )?;
        label(f, "iteration_errors")?;
        writeln!(f, "{}", self.iteration_errors)?;
        label(f, "vus_max")?;
        writeln!(f, "{}", self.max_concurrency)?;
        label(f, "elapsed")?;
        writeln!(
            f,
            "{}",
            humantime::format_duration(Duration::from_millis(self.elapsed.as_millis() as u64))
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ntest::assert_about_eq;

    fn check(name: &str, passes: u64, fails: u64) -> CheckSummary {
        CheckSummary {
            name: name.to_string(),
            passes,
            fails,
        }
    }

    #[test]
    fn pass_rates() {
        let stats = RunStatistics {
            checks: vec![check("is status 200", 9, 1), check("is user with id", 10, 0)],
            ..Default::default()
        };

        assert!(!stats.checks_passed());
        assert_about_eq!(stats.check_pass_rate(), 0.95);
        assert_about_eq!(stats.check("is status 200").unwrap().pass_rate(), 0.9);
        assert!(stats.check("missing").is_none());
    }

    #[test]
    fn empty_checks_pass() {
        let stats = RunStatistics::default();
        assert!(stats.checks_passed());
        assert_about_eq!(stats.check_pass_rate(), 1.);
    }

    #[test]
    fn trend_lookup() {
        let trend = TrendSummary {
            values: vec![
                (SummaryStat::Avg, 12.5),
                (SummaryStat::Percentile(95.), 20.),
                (SummaryStat::Count, 42.),
            ],
        };

        assert_eq!(trend.get(SummaryStat::Count), Some(42.));
        assert_eq!(
            trend.duration(SummaryStat::Percentile(95.)),
            Some(Duration::from_secs_f64(0.02))
        );
        assert_eq!(trend.duration(SummaryStat::Count), None);
        assert_eq!(trend.get(SummaryStat::Max), None);
        assert_eq!(trend.to_string(), "avg=12.50ms p(95)=20.00ms count=42");
    }

    #[test]
    fn report_lists_failed_checks() {
        let stats = RunStatistics {
            name: "user_crud".to_string(),
            checks: vec![check("user was deleted correctly", 3, 2)],
            ..Default::default()
        };

        let report = stats.to_string();
        assert!(report.contains("✗ user was deleted correctly"));
        assert!(report.contains("✓ 3 / ✗ 2"));
    }
}
