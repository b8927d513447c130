use std::time::Duration;

/// How often the ramp controller re-evaluates the active virtual-user count.
pub const RAMP_INTERVAL: Duration = Duration::from_millis(100);

/// How long retired virtual users may spend finishing their current iteration.
pub const DEFAULT_GRACEFUL_STOP: Duration = Duration::from_secs(30);

/// Virtual users active at the start of the first stage.
pub const DEFAULT_START_CONCURRENCY: usize = 1;
