//! Ramping CRUD load test for a `/users` HTTP API.
//!
//! Every virtual user repeatedly creates a user, lists users, fetches the user, renames it,
//! deletes it and checks it is gone.
pub mod api;
pub mod cli;
pub mod iteration;

pub use api::{Api, DEFAULT_BASE_URL};
pub use iteration::{user_crud, user_crud_with, VirtualUserIteration, UPDATED_USERNAME};

use stampede::core::{RampStage, ScenarioConfig};
use std::time::Duration;

/// Ramp up to 100 virtual users over a minute, hold for eight minutes, ramp down over a minute.
pub fn default_stages() -> Vec<RampStage> {
    vec![
        RampStage::new(Duration::from_secs(60), 100),
        RampStage::new(Duration::from_secs(8 * 60), 100),
        RampStage::new(Duration::from_secs(60), 0),
    ]
}

pub fn default_config() -> ScenarioConfig {
    ScenarioConfig {
        stages: default_stages(),
        ..ScenarioConfig::new("user_crud")
    }
}
