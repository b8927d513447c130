#![cfg_attr(docsrs, feature(doc_cfg))]
#![doc = include_str!("../README.md")]

// Lets the proc macros' `::stampede::...` paths resolve inside this crate's own tests.
extern crate self as stampede;

pub mod check;
pub mod scenario;
#[doc(hidden)]
pub mod transaction;

mod collector;
mod pool;
mod timer;
mod trend;

pub use check::check;
pub use scenario::{IterationOutcome, Scenario};
pub use stampede_core as core;
pub use stampede_macros::{scenario, transaction};

pub mod prelude {
    pub use crate::check::check;
    pub use crate::scenario::ConfigurableScenario;
    pub use stampede_core::{RampStage, RunStatistics, ScenarioConfig, SummaryStat};
    pub use stampede_macros::{scenario, transaction};
}
