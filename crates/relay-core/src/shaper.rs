//! Serialized FIFO queue enforcing a minimum inter-task delay.
//!
//! Exactly one task executes at a time per shaper instance; bursty
//! parallelism is refused by construction. Before each task the worker
//! waits out `min_delay + Uniform(0, jitter)` measured from the previous
//! task's completion, so outbound calls keep a human-ish cadence no
//! matter how many producers enqueue at once.

use rand::Rng;
use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{mpsc, oneshot};

use relay_types::error::UpstreamError;

use crate::config::ShaperConfig;

type BoxedTask = Box<dyn FnOnce() -> Pin<Box<dyn Future<Output = ()> + Send>> + Send>;

/// Observability counters for the queue.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
pub struct ShaperStatus {
    /// 1 while a task is running, else 0
    pub processing: usize,
    /// Tasks waiting for their turn
    pub queued: usize,
}

/// Handle to the single-worker pacing queue.
///
/// Cloning shares the same worker; dropping every handle stops it after
/// the queue drains.
#[derive(Clone)]
pub struct TrafficShaper {
    tx: mpsc::UnboundedSender<BoxedTask>,
    queued: Arc<AtomicUsize>,
    processing: Arc<AtomicUsize>,
}

impl TrafficShaper {
    /// Spawn the worker and return the producer handle.
    pub fn new(config: ShaperConfig) -> Self {
        let (tx, mut rx) = mpsc::unbounded_channel::<BoxedTask>();
        let queued = Arc::new(AtomicUsize::new(0));
        let processing = Arc::new(AtomicUsize::new(0));

        let worker_queued = Arc::clone(&queued);
        let worker_processing = Arc::clone(&processing);

        tokio::spawn(async move {
            let mut last_finish: Option<Instant> = None;

            while let Some(task) = rx.recv().await {
                worker_queued.fetch_sub(1, Ordering::SeqCst);

                if let Some(finished_at) = last_finish {
                    let jitter = if config.jitter_ms > 0 {
                        rand::thread_rng().gen_range(0..=config.jitter_ms)
                    } else {
                        0
                    };
                    let required = Duration::from_millis(config.min_delay_ms + jitter);
                    let elapsed = finished_at.elapsed();
                    if elapsed < required {
                        tokio::time::sleep(required - elapsed).await;
                    }
                }

                worker_processing.store(1, Ordering::SeqCst);
                task().await;
                worker_processing.store(0, Ordering::SeqCst);
                last_finish = Some(Instant::now());
            }
            tracing::debug!("Traffic shaper worker stopped (all producers dropped)");
        });

        Self { tx, queued, processing }
    }

    /// Queue a task and wait for its result.
    ///
    /// Tasks run strictly in enqueue order. The task's own output —
    /// including any `Result` it returns — propagates unchanged; a
    /// failing task never poisons the queue.
    pub async fn enqueue<T, Fut>(
        &self,
        task: impl FnOnce() -> Fut + Send + 'static,
    ) -> Result<T, UpstreamError>
    where
        T: Send + 'static,
        Fut: Future<Output = T> + Send + 'static,
    {
        let (result_tx, result_rx) = oneshot::channel::<T>();

        let boxed: BoxedTask = Box::new(move || {
            Box::pin(async move {
                let output = task().await;
                // Receiver gone means the caller gave up; nothing to do.
                let _ = result_tx.send(output);
            })
        });

        self.queued.fetch_add(1, Ordering::SeqCst);
        self.tx.send(boxed).map_err(|_| {
            self.queued.fetch_sub(1, Ordering::SeqCst);
            UpstreamError::Internal { message: "traffic shaper worker is gone".to_string() }
        })?;

        result_rx
            .await
            .map_err(|_| UpstreamError::Internal { message: "shaper task dropped".to_string() })
    }

    /// Current queue counters.
    pub fn status(&self) -> ShaperStatus {
        ShaperStatus {
            processing: self.processing.load(Ordering::SeqCst),
            queued: self.queued.load(Ordering::SeqCst),
        }
    }
}
