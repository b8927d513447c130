use crate::scenario::IterationOutcome;
use crate::transaction::{TransactionData, TRANSACTION_HOOK};
use std::future::Future;
use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::Instant;
#[allow(unused)]
use tracing::{debug, error, info, trace, warn};

/// The set of virtual users executing a scenario.
///
/// Each virtual user is an independent task repeatedly running the scenario function. Scaling
/// down flags the newest virtual users to stop after their current iteration rather than aborting
/// them mid-request.
pub(crate) struct VuPool<T> {
    scenario: T,
    data: TransactionData,
    active: Vec<VirtualUser>,
    retiring: Vec<VirtualUser>,
    max_concurrency: usize,
}

struct VirtualUser {
    handle: JoinHandle<()>,
    stop: Arc<AtomicBool>,
}

impl<T, F, O> VuPool<T>
where
    T: Fn() -> F + Send + Sync + 'static + Clone,
    F: Future<Output = O> + Send + 'static,
    O: IterationOutcome + 'static,
{
    pub fn new(scenario: T, data: TransactionData) -> Self {
        Self {
            scenario,
            data,
            active: vec![],
            retiring: vec![],
            max_concurrency: 0,
        }
    }

    pub fn set_concurrency(&mut self, concurrency: usize) {
        self.retiring.retain(|vu| !vu.handle.is_finished());

        if self.active.len() == concurrency {
            return;
        } else if self.active.len() > concurrency {
            for vu in self.active.drain(concurrency..) {
                vu.stop.store(true, Ordering::Relaxed);
                self.retiring.push(vu);
            }
        } else {
            while self.active.len() < concurrency {
                let vu = self.spawn();
                self.active.push(vu);
            }
        }

        self.max_concurrency = self.max_concurrency.max(concurrency);
        trace!("Concurrency set to {concurrency}");

        #[cfg(feature = "metrics")]
        metrics::gauge!("vus").set(concurrency as f64);
    }

    pub fn concurrency(&self) -> usize {
        self.active.len()
    }

    pub fn max_concurrency(&self) -> usize {
        self.max_concurrency
    }

    /// Stop every virtual user, giving in-flight iterations up to `graceful_stop` to finish.
    ///
    /// Returns how many virtual users had to be aborted.
    pub async fn shutdown(mut self, graceful_stop: Duration) -> usize {
        self.set_concurrency(0);

        let deadline = Instant::now() + graceful_stop;
        let mut aborted = 0;
        for mut vu in self.retiring.drain(..) {
            match tokio::time::timeout_at(deadline, &mut vu.handle).await {
                Ok(Ok(())) => {}
                Ok(Err(err)) if err.is_panic() => error!("Virtual user panicked: {err}"),
                Ok(Err(_)) => {}
                Err(_) => {
                    vu.handle.abort();
                    aborted += 1;
                }
            }
        }

        if aborted > 0 {
            warn!("Aborted {aborted} virtual users still running after the graceful stop period.");
        }

        aborted
    }

    fn spawn(&self) -> VirtualUser {
        let scenario = self.scenario.clone();
        let stop = Arc::new(AtomicBool::new(false));
        let collector = self.data.collector.clone();
        let vu_stop = stop.clone();

        let handle = tokio::spawn(TRANSACTION_HOOK.scope(self.data.clone(), async move {
            while !vu_stop.load(Ordering::Relaxed) {
                let start = Instant::now();
                let outcome = scenario().await;
                collector.record_iteration(start.elapsed(), outcome.into_error());

                // Scenarios which never yield would otherwise starve the ramp controller.
                tokio::task::yield_now().await;
            }
        }));

        VirtualUser { handle, stop }
    }
}
