/// Backfill Driver (§4.6): on startup, enumerates the last K heights and
/// drives them through the Per-Block Pipeline in parallel, bounded by a
/// semaphore. Grounded directly on the teacher's
/// `parallel.rs::process_files_parallel`, which does exactly this shape —
/// `Semaphore` sized to a configured concurrency, `join_all` over the
/// resulting futures.
use std::sync::Arc;

use futures::future::join_all;
use tokio::sync::Semaphore;

use crate::pipeline::Pipeline;
use crate::rpc::ChainClient;
use crate::telemetry::ProgressCounter;

/// Runs once and returns; does not block the tailer from starting
/// concurrently (§4.6).
pub async fn run<C: ChainClient + 'static>(
    rpc: Arc<C>,
    pipeline: Arc<Pipeline<C>>,
    confirmation_depth: u64,
    concurrency: usize,
) {
    let head = match rpc.head_height().await {
        Ok(h) => h,
        Err(e) => {
            tracing::error!(error = %e, "backfill: could not fetch head height, skipping backfill");
            return;
        }
    };

    let start = head.saturating_sub(confirmation_depth.saturating_sub(1));
    tracing::info!(start, head, "starting backfill");

    let semaphore = Arc::new(Semaphore::new(concurrency.max(1)));
    let progress = Arc::new(ProgressCounter::new(25));
    let tasks = (start..=head).map(|height| {
        let pipeline = pipeline.clone();
        let semaphore = semaphore.clone();
        let progress = progress.clone();
        async move {
            let _permit = semaphore.acquire_owned().await.expect("semaphore not closed");
            pipeline.run(height, false).await;
            if progress.should_log() {
                tracing::info!(height, done = progress.get(), total = head - start + 1, "backfill progress");
            }
        }
    });

    join_all(tasks).await;
    tracing::info!(start, head, "backfill complete");
}

#[cfg(test)]
mod tests {
    #[test]
    fn start_height_clamps_when_head_below_depth() {
        let head: u64 = 3;
        let k: u64 = 12;
        let start = head.saturating_sub(k.saturating_sub(1));
        assert_eq!(start, 0, "must clamp to 0 rather than underflow");
    }

    #[test]
    fn start_height_is_head_minus_k_plus_one_in_steady_state() {
        let head: u64 = 1000;
        let k: u64 = 12;
        let start = head.saturating_sub(k.saturating_sub(1));
        assert_eq!(start, 989);
        assert_eq!(head - start + 1, 12);
    }
}
