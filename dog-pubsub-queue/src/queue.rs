use std::future::Future;
use std::sync::Arc;

use parking_lot::Mutex;

use crate::{Job, JobData, JobError, JobProcess, JobQueueStrategy, QueueResult};

/// One named queue bound to a strategy.
///
/// Holds at most one consumer callback; `stop` detaches the callback that
/// `start` attached.
pub struct JobQueue<D, S> {
    name: String,
    strategy: Arc<S>,
    process: Mutex<Option<JobProcess<D>>>,
}

impl<D: JobData, S: JobQueueStrategy> JobQueue<D, S> {
    pub fn new(name: impl Into<String>, strategy: Arc<S>) -> Self {
        Self {
            name: name.into(),
            strategy,
            process: Mutex::new(None),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn strategy(&self) -> &Arc<S> {
        &self.strategy
    }

    /// Publish `data` on this queue
    pub async fn add(&self, data: D) -> QueueResult<Job<D>> {
        self.strategy.add(Job::new(self.name.as_str(), data)).await
    }

    /// Attach `f` as this queue's consumer; ignored if one is already attached
    pub async fn start<F, Fut>(&self, f: F) -> QueueResult<()>
    where
        F: Fn(Job<D>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<(), JobError>> + Send + 'static,
    {
        let process = {
            let mut current = self.process.lock();
            if current.is_some() {
                return Ok(());
            }
            let process = JobProcess::new(f);
            *current = Some(process.clone());
            process
        };

        let process_id = process.id();
        let result = self.strategy.start(&self.name, process).await;
        if result.is_err() {
            let mut current = self.process.lock();
            if current.as_ref().map(JobProcess::id) == Some(process_id) {
                *current = None;
            }
        }
        result
    }

    /// Detach the consumer attached by `start`, if any
    pub async fn stop(&self) -> QueueResult<()> {
        let process = self.process.lock().take();
        match process {
            Some(process) => self.strategy.stop(&self.name, &process).await,
            None => Ok(()),
        }
    }

    pub fn is_started(&self) -> bool {
        self.process.lock().is_some()
    }
}
