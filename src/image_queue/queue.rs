use super::error::ImageError;
use super::fetcher::ImageFetcher;
use super::models::{ImageDownloadTask, TaskOutcome};
use super::validate::{validate_image_bytes, validate_image_file, ImageRequirements};
use crate::config::ImageSettings;
use crate::retry_policy::RetryPolicy;
use crate::stats::{Counter, RunStatistics};
use anyhow::{anyhow, Context, Result};
use std::collections::HashMap;
use std::io::Write;
use std::path::Path;
use std::sync::{Arc, Mutex};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

/// Called once every task of a record finished without failures.
pub type CompletionHook = Arc<dyn Fn(&str) + Send + Sync>;

enum QueueMessage {
    Task(ImageDownloadTask),
    /// One per worker, sent after all tasks.
    Shutdown,
}

#[derive(Debug, Default)]
struct RecordBatch {
    remaining: usize,
    failed: usize,
}

struct WorkerContext {
    fetcher: Arc<dyn ImageFetcher>,
    retry_policy: RetryPolicy,
    requirements: ImageRequirements,
    stats: Arc<RunStatistics>,
    batches: Mutex<HashMap<String, RecordBatch>>,
    on_record_complete: Option<CompletionHook>,
}

/// Bounded pool of image download workers fed through a bounded channel.
pub struct ImageDownloadQueue {
    sender: mpsc::Sender<QueueMessage>,
    workers: Vec<JoinHandle<()>>,
    context: Arc<WorkerContext>,
}

impl ImageDownloadQueue {
    /// Spawns `settings.workers` workers on the current runtime.
    pub fn start(
        fetcher: Arc<dyn ImageFetcher>,
        settings: &ImageSettings,
        stats: Arc<RunStatistics>,
        on_record_complete: Option<CompletionHook>,
    ) -> Self {
        let (sender, receiver) = mpsc::channel(settings.queue_capacity.max(1));
        let receiver = Arc::new(tokio::sync::Mutex::new(receiver));
        let context = Arc::new(WorkerContext {
            fetcher,
            retry_policy: RetryPolicy::for_images(settings),
            requirements: ImageRequirements {
                min_width: settings.min_width,
                min_height: settings.min_height,
            },
            stats,
            batches: Mutex::new(HashMap::new()),
            on_record_complete,
        });

        let worker_count = settings.workers.max(1);
        let workers = (0..worker_count)
            .map(|worker_id| {
                let receiver = receiver.clone();
                let context = context.clone();
                tokio::spawn(async move { run_worker(worker_id, receiver, context).await })
            })
            .collect();
        info!("Started {} image download worker(s)", worker_count);

        Self {
            sender,
            workers,
            context,
        }
    }

    /// Queues a single task, waiting for channel capacity.
    pub async fn enqueue(&self, task: ImageDownloadTask) -> Result<()> {
        self.sender
            .send(QueueMessage::Task(task))
            .await
            .map_err(|_| anyhow!("image queue is closed"))?;
        self.context.stats.incr(Counter::ImagesQueued);
        Ok(())
    }

    /// Queues all tasks of a record and tracks them as one batch for the completion hook.
    pub async fn enqueue_record(&self, record_id: &str, tasks: Vec<ImageDownloadTask>) -> Result<()> {
        if tasks.is_empty() {
            return Ok(());
        }
        {
            let mut batches = self
                .context
                .batches
                .lock()
                .map_err(|_| anyhow!("image batch lock poisoned"))?;
            batches.entry(record_id.to_string()).or_default().remaining += tasks.len();
        }
        for task in tasks {
            self.enqueue(task).await?;
        }
        Ok(())
    }

    /// Lets workers drain every queued task, then waits for them to exit.
    pub async fn shutdown(self) -> Result<()> {
        for _ in 0..self.workers.len() {
            if self.sender.send(QueueMessage::Shutdown).await.is_err() {
                break;
            }
        }
        drop(self.sender);

        for worker in self.workers {
            worker.await.context("image worker panicked")?;
        }
        info!("Image download queue drained");
        Ok(())
    }
}

async fn run_worker(
    worker_id: usize,
    receiver: Arc<tokio::sync::Mutex<mpsc::Receiver<QueueMessage>>>,
    context: Arc<WorkerContext>,
) {
    loop {
        let message = { receiver.lock().await.recv().await };
        let task = match message {
            Some(QueueMessage::Task(task)) => task,
            Some(QueueMessage::Shutdown) | None => break,
        };

        let outcome = process_task(&context, &task).await;
        match &outcome {
            TaskOutcome::Downloaded { bytes } => {
                context.stats.incr(Counter::ImagesDownloaded);
                debug!(
                    "Worker {} downloaded {} ({} bytes)",
                    worker_id,
                    task.destination.display(),
                    bytes
                );
            }
            TaskOutcome::Skipped => context.stats.incr(Counter::ImagesSkipped),
            TaskOutcome::Failed { reason } => {
                context.stats.incr(Counter::ImagesFailed);
                error!(
                    "Giving up on {} {} {}: {}",
                    task.record_id, task.page_id, task.resolution, reason
                );
            }
        }
        finish_task(&context, &task.record_id, outcome.is_failure());
    }
    debug!("Image worker {} stopped", worker_id);
}

fn finish_task(context: &WorkerContext, record_id: &str, failed: bool) {
    let completed = {
        let Ok(mut batches) = context.batches.lock() else {
            return;
        };
        let Some(batch) = batches.get_mut(record_id) else {
            return;
        };
        batch.remaining = batch.remaining.saturating_sub(1);
        if failed {
            batch.failed += 1;
        }
        if batch.remaining > 0 {
            return;
        }
        let all_ok = batch.failed == 0;
        batches.remove(record_id);
        all_ok
    };

    if completed {
        if let Some(hook) = &context.on_record_complete {
            hook(record_id);
        }
    } else {
        warn!("Some images of {} failed to download", record_id);
    }
}

/// Skips valid existing files, otherwise downloads with retries.
async fn process_task(context: &WorkerContext, task: &ImageDownloadTask) -> TaskOutcome {
    if tokio::fs::try_exists(&task.destination).await.unwrap_or(false) {
        match validate_image_file(&task.destination, &context.requirements).await {
            Ok(_) => return TaskOutcome::Skipped,
            Err(e) => warn!(
                "Existing file {} is invalid ({}), downloading again",
                task.destination.display(),
                e
            ),
        }
    }

    let mut retry_count = 0;
    loop {
        match download_once(context, task).await {
            Ok(bytes) => return TaskOutcome::Downloaded { bytes },
            Err(e) if context.retry_policy.should_retry(&e, retry_count) => {
                let backoff = context.retry_policy.backoff(retry_count);
                retry_count += 1;
                warn!(
                    "Image {} failed ({}), retry {} in {:?}",
                    task.url, e, retry_count, backoff
                );
                tokio::time::sleep(backoff).await;
            }
            Err(e) => {
                return TaskOutcome::Failed {
                    reason: e.to_string(),
                }
            }
        }
    }
}

async fn download_once(context: &WorkerContext, task: &ImageDownloadTask) -> Result<u64, ImageError> {
    let bytes = context.fetcher.fetch(&task.url).await?;
    let requirements = context.requirements;
    let destination = task.destination.clone();
    tokio::task::spawn_blocking(move || write_validated(&destination, &bytes, &requirements))
        .await
        .map_err(|e| ImageError::Storage(e.to_string()))?
}

/// Writes to a temp file next to `destination`, validates, then renames into place.
/// A failed validation leaves nothing behind.
fn write_validated(
    destination: &Path,
    bytes: &[u8],
    requirements: &ImageRequirements,
) -> Result<u64, ImageError> {
    let parent = destination
        .parent()
        .ok_or_else(|| ImageError::Storage(format!("no parent for {:?}", destination)))?;
    std::fs::create_dir_all(parent)?;

    let mut temp = tempfile::NamedTempFile::new_in(parent)?;
    temp.write_all(bytes)?;
    temp.as_file().sync_all()?;

    validate_image_bytes(bytes, requirements)?;

    temp.persist(destination)
        .map_err(|e| ImageError::Storage(e.to_string()))?;
    Ok(bytes.len() as u64)
}
