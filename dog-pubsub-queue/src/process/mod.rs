pub mod registry;

pub use registry::{ListenerHandle, ProcessRegistry};

use futures::future::BoxFuture;
use std::fmt;
use std::future::Future;
use std::sync::Arc;

use crate::{Job, JobError, ProcessId};

/// Future returned by a consumer callback
pub type ProcessFuture = BoxFuture<'static, Result<(), JobError>>;

type Handler<D> = Arc<dyn Fn(Job<D>) -> ProcessFuture + Send + Sync>;

/// Consumer callback with a stable identity.
///
/// Registration is keyed by `(queue, id())`. Clones share the id, so a clone
/// can be used to stop what the original started.
pub struct JobProcess<D> {
    id: ProcessId,
    handler: Handler<D>,
}

impl<D: Send + 'static> JobProcess<D> {
    /// Wrap an async callback
    pub fn new<F, Fut>(f: F) -> Self
    where
        F: Fn(Job<D>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<(), JobError>> + Send + 'static,
    {
        Self {
            id: ProcessId::next(),
            handler: Arc::new(move |job: Job<D>| -> ProcessFuture { Box::pin(f(job)) }),
        }
    }
}

impl<D> JobProcess<D> {
    pub fn id(&self) -> ProcessId {
        self.id
    }

    /// Run the callback for one job
    pub fn call(&self, job: Job<D>) -> ProcessFuture {
        (self.handler)(job)
    }
}

impl<D> Clone for JobProcess<D> {
    fn clone(&self) -> Self {
        Self {
            id: self.id,
            handler: self.handler.clone(),
        }
    }
}

impl<D> fmt::Debug for JobProcess<D> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("JobProcess").field("id", &self.id).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_clone_shares_identity() {
        let process = JobProcess::new(|job: Job<u32>| async move {
            if *job.data() > 10 {
                Err(JobError::failed("too big"))
            } else {
                Ok(())
            }
        });
        let clone = process.clone();
        let other = JobProcess::new(|_: Job<u32>| async { Ok(()) });

        assert_eq!(process.id(), clone.id());
        assert_ne!(process.id(), other.id());

        assert!(clone.call(Job::new("q", 1)).await.is_ok());
        assert!(process.call(Job::new("q", 11)).await.is_err());
    }
}
