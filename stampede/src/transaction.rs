use crate::collector::Collector;
use governor::{DefaultDirectRateLimiter, Quota, RateLimiter};
use stampede_core::TransactionLabels;
use std::{future::Future, num::NonZeroU32, sync::Arc};
use tokio::time::Instant;

/// Transaction hook used by the `#[transaction]` macro. Not intended to be used manually.
pub async fn transaction_hook<T, R, E>(labels: TransactionLabels, func: T) -> T::Output
where
    T: Future<Output = Result<R, E>>,
{
    if let Ok(hook) = TRANSACTION_HOOK.try_with(|v| v.clone()) {
        if let Some(limiter) = &hook.limiter {
            limiter.until_ready().await;
        }

        let start = Instant::now();
        let res = func.await;
        let elapsed = start.elapsed();

        hook.collector
            .record_transaction(labels.name, elapsed, res.is_ok());

        #[cfg(feature = "metrics")]
        {
            metrics::histogram!(labels.latency).record(elapsed.as_secs_f64());
            if res.is_ok() {
                metrics::counter!(labels.success).increment(1);
            } else {
                metrics::counter!(labels.error).increment(1);
            }
        }

        res
    } else {
        tracing::warn!("No hook available for {}.", labels.name);
        func.await
    }
}

#[derive(Clone)]
pub(crate) struct TransactionData {
    pub limiter: Option<Arc<DefaultDirectRateLimiter>>,
    pub collector: Arc<Collector>,
}

impl TransactionData {
    pub fn new(collector: Arc<Collector>, max_rps: Option<NonZeroU32>) -> Self {
        Self {
            limiter: max_rps.map(|rps| Arc::new(rate_limiter(rps))),
            collector,
        }
    }
}

tokio::task_local! {
    pub(crate) static TRANSACTION_HOOK: TransactionData;
}

fn rate_limiter(max_rps: NonZeroU32) -> DefaultDirectRateLimiter {
    RateLimiter::direct(Quota::per_second(max_rps).allow_burst(NonZeroU32::MIN))
}
