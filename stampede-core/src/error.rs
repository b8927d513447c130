use thiserror::Error;

#[derive(Debug, Error, PartialEq)]
pub enum ConfigError {
    #[error("Ramp profile has no stages")]
    NoStages,

    #[error("Invalid ramp stage `{0}`, expected `<duration>:<target>` (e.g. `1m:100`)")]
    InvalidStage(String),

    #[error("Unknown summary stat `{0}`")]
    UnknownStat(String),

    #[error("Percentile must be within 0..=100, found {0}")]
    InvalidPercentile(f64),
}
