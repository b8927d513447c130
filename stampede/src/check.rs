//! Named pass/fail assertions recorded against the running scenario.
//!
//! A failed check never interrupts the iteration. Whether to keep going is up to the caller, who
//! can branch on [`Check::passed`].
//!
//! # Example
//! ```ignore
//! use stampede::prelude::*;
//!
//! let ok = check(&reply)
//!     .that("is status 200", |r| r.status == 200)
//!     .that("is user with id", |r| r.json::<User>().is_some_and(|u| u.id == id))
//!     .passed();
//!
//! if !ok {
//!     return Ok(());
//! }
//! ```
use crate::transaction::TRANSACTION_HOOK;
#[allow(unused)]
use tracing::{debug, error, info, trace, warn};

/// Start a group of checks against `target`.
pub fn check<R: ?Sized>(target: &R) -> Check<'_, R> {
    Check {
        target,
        passed: true,
    }
}

pub struct Check<'a, R: ?Sized> {
    target: &'a R,
    passed: bool,
}

impl<'a, R: ?Sized> Check<'a, R> {
    /// Evaluate `predicate` now and record the outcome under `name`.
    pub fn that(mut self, name: &'static str, predicate: impl FnOnce(&R) -> bool) -> Self {
        let passed = predicate(self.target);
        record(name, passed);
        self.passed &= passed;
        self
    }

    /// True if every predicate evaluated so far passed.
    pub fn passed(&self) -> bool {
        self.passed
    }
}

fn record(name: &'static str, passed: bool) {
    if !passed {
        debug!("Check failed: {name}");
    }

    #[cfg(feature = "metrics")]
    metrics::counter!("checks", "check" => name, "result" => if passed { "pass" } else { "fail" })
        .increment(1);

    if TRANSACTION_HOOK
        .try_with(|hook| hook.collector.record_check(name, passed))
        .is_err()
    {
        trace!("No hook available for check {name}.");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collector::Collector;
    use crate::transaction::TransactionData;
    use stampede_core::SummaryStat;
    use std::sync::Arc;
    use std::time::Duration;

    #[tokio::test]
    async fn every_predicate_is_evaluated() {
        let collector = Arc::new(Collector::new(SummaryStat::defaults()));
        let data = TransactionData::new(collector.clone(), None);

        let passed = TRANSACTION_HOOK
            .scope(data, async {
                check(&404u16)
                    .that("is status 200", |s| *s == 200)
                    .that("is not a server error", |s| *s < 500)
                    .passed()
            })
            .await;

        assert!(!passed);

        let stats = collector.finish("test", Duration::from_secs(1), 1);
        assert_eq!(stats.check("is status 200").unwrap().fails, 1);
        assert_eq!(stats.check("is not a server error").unwrap().passes, 1);
    }

    #[test]
    fn checks_outside_a_scenario_still_evaluate() {
        assert!(check("body").that("is non-empty", |b| !b.is_empty()).passed());
        assert!(check(&()).passed());
    }
}
