use crate::{ConfigError, DEFAULT_GRACEFUL_STOP, DEFAULT_START_CONCURRENCY};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_with::{serde_as, DeserializeAs, DisplayFromStr, SerializeAs};
use std::fmt;
use std::num::NonZeroU32;
use std::str::FromStr;
use std::time::Duration;

/// A single `{duration, target}` step of a ramp profile.
#[serde_as]
#[derive(Copy, Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RampStage {
    #[serde_as(as = "HumanDuration")]
    pub duration: Duration,
    pub target: usize,
}

impl RampStage {
    pub fn new(duration: Duration, target: usize) -> Self {
        Self { duration, target }
    }
}

impl FromStr for RampStage {
    type Err = ConfigError;

    /// Parses `<duration>:<target>`, e.g. `1m:100` or `30s:0`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || ConfigError::InvalidStage(s.to_string());

        let (duration, target) = s.trim().split_once(':').ok_or_else(invalid)?;
        let duration = humantime::parse_duration(duration.trim()).map_err(|_| invalid())?;
        let target = target.trim().parse().map_err(|_| invalid())?;

        Ok(Self { duration, target })
    }
}

impl fmt::Display for RampStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}:{}",
            humantime::format_duration(self.duration),
            self.target
        )
    }
}

/// Ordered ramp stages plus the concurrency the first stage ramps from.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RampProfile {
    pub start: usize,
    pub stages: Vec<RampStage>,
}

impl RampProfile {
    pub fn new(start: usize, stages: Vec<RampStage>) -> Self {
        Self { start, stages }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.stages.is_empty() {
            return Err(ConfigError::NoStages);
        }
        Ok(())
    }

    pub fn total_duration(&self) -> Duration {
        self.stages.iter().map(|s| s.duration).sum()
    }

    pub fn max_target(&self) -> usize {
        self.stages
            .iter()
            .map(|s| s.target)
            .max()
            .unwrap_or(0)
            .max(self.start)
    }

    /// Desired virtual-user count `elapsed` into the run, or `None` once every stage has
    /// completed.
    ///
    /// Within a stage the count moves linearly from the previous stage's target (or `start`)
    /// to the stage's own target. Zero-length stages jump straight to their target.
    pub fn target_at(&self, elapsed: Duration) -> Option<usize> {
        let mut from = self.start;
        let mut stage_start = Duration::ZERO;

        for stage in &self.stages {
            let stage_end = stage_start + stage.duration;
            if elapsed < stage_end {
                let progress =
                    (elapsed - stage_start).as_secs_f64() / stage.duration.as_secs_f64();
                let delta = stage.target as f64 - from as f64;
                let target = from as f64 + delta * progress;
                return Some(target.round().max(0.) as usize);
            }

            from = stage.target;
            stage_start = stage_end;
        }

        None
    }
}

/// Aggregations reported for every trend (latencies, iteration durations).
#[derive(Copy, Clone, Debug, PartialEq)]
pub enum SummaryStat {
    Avg,
    Min,
    Med,
    Max,
    Count,
    Percentile(f64),
}

impl SummaryStat {
    pub fn defaults() -> Vec<SummaryStat> {
        use SummaryStat::*;
        vec![
            Avg,
            Min,
            Med,
            Percentile(90.),
            Percentile(95.),
            Percentile(99.),
            Percentile(99.99),
            Max,
            Count,
        ]
    }

    /// Parses a comma separated list such as `avg,p(95),max`.
    pub fn parse_list(s: &str) -> Result<Vec<SummaryStat>, ConfigError> {
        s.split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::parse)
            .collect()
    }
}

impl FromStr for SummaryStat {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let stat = match s.trim() {
            "avg" => SummaryStat::Avg,
            "min" => SummaryStat::Min,
            "med" => SummaryStat::Med,
            "max" => SummaryStat::Max,
            "count" => SummaryStat::Count,
            other => {
                let inner = other
                    .strip_prefix("p(")
                    .and_then(|rest| rest.strip_suffix(')'))
                    .ok_or_else(|| ConfigError::UnknownStat(other.to_string()))?;
                let percentile: f64 = inner
                    .parse()
                    .map_err(|_| ConfigError::UnknownStat(other.to_string()))?;
                if !(0. ..=100.).contains(&percentile) {
                    return Err(ConfigError::InvalidPercentile(percentile));
                }
                SummaryStat::Percentile(percentile)
            }
        };
        Ok(stat)
    }
}

impl fmt::Display for SummaryStat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SummaryStat::Avg => write!(f, "avg"),
            SummaryStat::Min => write!(f, "min"),
            SummaryStat::Med => write!(f, "med"),
            SummaryStat::Max => write!(f, "max"),
            SummaryStat::Count => write!(f, "count"),
            SummaryStat::Percentile(p) => write!(f, "p({p})"),
        }
    }
}

/// Static configuration of a scenario run, loadable from JSON.
#[serde_as]
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScenarioConfig {
    pub name: String,
    pub stages: Vec<RampStage>,
    pub start_concurrency: usize,
    #[serde_as(as = "Vec<DisplayFromStr>")]
    pub summary_trend_stats: Vec<SummaryStat>,
    #[serde_as(as = "HumanDuration")]
    pub graceful_stop: Duration,
    pub max_rps: Option<NonZeroU32>,
    /// Run exactly this many iterations on one virtual user instead of following the stages.
    pub iterations: Option<u64>,
}

impl Default for ScenarioConfig {
    fn default() -> Self {
        Self::new("")
    }
}

impl ScenarioConfig {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            stages: vec![],
            start_concurrency: DEFAULT_START_CONCURRENCY,
            summary_trend_stats: SummaryStat::defaults(),
            graceful_stop: DEFAULT_GRACEFUL_STOP,
            max_rps: None,
            iterations: None,
        }
    }

    pub fn ramp_profile(&self) -> RampProfile {
        RampProfile::new(self.start_concurrency, self.stages.clone())
    }
}

/// `serde_as` adapter reading and writing durations as humantime strings (`"1m"`, `"30s"`).
pub struct HumanDuration;

impl SerializeAs<Duration> for HumanDuration {
    fn serialize_as<S: Serializer>(source: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(&humantime::format_duration(*source))
    }
}

impl<'de> DeserializeAs<'de, Duration> for HumanDuration {
    fn deserialize_as<D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        let s = String::deserialize(deserializer)?;
        humantime::parse_duration(&s).map_err(serde::de::Error::custom)
    }
}
