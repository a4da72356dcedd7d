use chrono::{DateTime, Utc};
use serde::{de::DeserializeOwned, Deserialize, Serialize};

use super::{JobId, JobState};
use crate::{QueueError, QueueResult};

/// Payload types that can travel through a queue
pub trait JobData: Serialize + DeserializeOwned + Send + Sync + 'static {}

impl<T> JobData for T where T: Serialize + DeserializeOwned + Send + Sync + 'static {}

/// One unit of work plus its lifecycle state.
///
/// A `Job` is a value: lifecycle methods consume it and hand back a new one,
/// so a state can never move backwards. The producer's job and the job a
/// consumer receives are separate instances; the consumer side is rebuilt
/// from the transport message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Job<D = serde_json::Value> {
    id: Option<JobId>,
    queue_name: String,
    data: D,
    state: JobState,
    attempts: u32,
    created_at: DateTime<Utc>,
    started_at: Option<DateTime<Utc>>,
    settled_at: Option<DateTime<Utc>>,
    result: Option<serde_json::Value>,
    error: Option<String>,
}

impl<D> Job<D> {
    /// Producer-side job, not yet published
    pub fn new(queue_name: impl Into<String>, data: D) -> Self {
        Self {
            id: None,
            queue_name: queue_name.into(),
            data,
            state: JobState::Pending,
            attempts: 0,
            created_at: Utc::now(),
            started_at: None,
            settled_at: None,
            result: None,
            error: None,
        }
    }

    /// Job returned from `add` once the transport accepted the publish
    pub fn published(id: JobId, queue_name: impl Into<String>, data: D) -> Self {
        Self {
            id: Some(id),
            ..Self::new(queue_name, data)
        }
    }

    /// Consumer-side job rebuilt from a delivered message
    pub fn received(
        id: JobId,
        queue_name: impl Into<String>,
        data: D,
        attempts: u32,
        published_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id: Some(id),
            queue_name: queue_name.into(),
            data,
            state: JobState::Running,
            attempts,
            created_at: published_at,
            started_at: Some(Utc::now()),
            settled_at: None,
            result: None,
            error: None,
        }
    }

    pub fn id(&self) -> Option<&JobId> {
        self.id.as_ref()
    }

    pub fn queue_name(&self) -> &str {
        &self.queue_name
    }

    pub fn data(&self) -> &D {
        &self.data
    }

    pub fn state(&self) -> JobState {
        self.state
    }

    /// Delivery attempts reported by the transport (0 for producer-side jobs)
    pub fn attempts(&self) -> u32 {
        self.attempts
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn started_at(&self) -> Option<DateTime<Utc>> {
        self.started_at
    }

    pub fn settled_at(&self) -> Option<DateTime<Utc>> {
        self.settled_at
    }

    pub fn result(&self) -> Option<&serde_json::Value> {
        self.result.as_ref()
    }

    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }

    /// True when the transport has delivered this job before
    pub fn is_redelivery(&self) -> bool {
        self.attempts > 1
    }

    /// Split into queue name and payload
    pub fn into_parts(self) -> (String, D) {
        (self.queue_name, self.data)
    }

    pub fn into_data(self) -> D {
        self.data
    }

    /// PENDING -> RUNNING
    pub fn start(self) -> QueueResult<Self> {
        let mut job = self.transition(JobState::Running)?;
        job.started_at = Some(Utc::now());
        Ok(job)
    }

    /// RUNNING -> COMPLETED
    pub fn complete(self, result: Option<serde_json::Value>) -> QueueResult<Self> {
        let mut job = self.transition(JobState::Completed)?;
        job.result = result;
        job.settled_at = Some(Utc::now());
        Ok(job)
    }

    /// RUNNING -> FAILED
    pub fn fail(self, error: impl Into<String>) -> QueueResult<Self> {
        let mut job = self.transition(JobState::Failed)?;
        job.error = Some(error.into());
        job.settled_at = Some(Utc::now());
        Ok(job)
    }

    /// PENDING | RUNNING -> CANCELLED
    pub fn cancel(self) -> QueueResult<Self> {
        let mut job = self.transition(JobState::Cancelled)?;
        job.settled_at = Some(Utc::now());
        Ok(job)
    }

    fn transition(self, next: JobState) -> QueueResult<Self> {
        if !self.state.can_transition_to(next) {
            return Err(QueueError::InvalidTransition {
                from: self.state,
                to: next,
            });
        }
        Ok(Self { state: next, ..self })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_producer_job_defaults() {
        let job = Job::new("q1", json!({"some": "data"}));

        assert_eq!(job.queue_name(), "q1");
        assert_eq!(job.state(), JobState::Pending);
        assert_eq!(job.attempts(), 0);
        assert!(job.id().is_none());
        assert!(job.started_at().is_none());
    }

    #[test]
    fn test_published_job_carries_transport_id() {
        let job = Job::published(JobId::from("m-1"), "q1", 7u32);

        assert_eq!(job.id(), Some(&JobId::from("m-1")));
        assert_eq!(job.state(), JobState::Pending);
        assert_eq!(job.attempts(), 0);
        assert_eq!(*job.data(), 7);
    }

    #[test]
    fn test_received_job_is_running() {
        let published_at = Utc::now() - chrono::Duration::seconds(5);
        let job = Job::received(JobId::from("m-2"), "q1", "payload".to_string(), 3, published_at);

        assert_eq!(job.state(), JobState::Running);
        assert_eq!(job.attempts(), 3);
        assert_eq!(job.created_at(), published_at);
        assert!(job.started_at().is_some());
        assert!(job.is_redelivery());
    }

    #[test]
    fn test_lifecycle_moves_forward() {
        let job = Job::new("q1", ()).start().unwrap();
        assert_eq!(job.state(), JobState::Running);

        let done = job.complete(Some(json!({"rows": 10}))).unwrap();
        assert_eq!(done.state(), JobState::Completed);
        assert_eq!(done.result(), Some(&json!({"rows": 10})));
        assert!(done.settled_at().is_some());

        let err = done.cancel().unwrap_err();
        assert!(matches!(
            err,
            QueueError::InvalidTransition { from: JobState::Completed, to: JobState::Cancelled }
        ));
    }

    #[test]
    fn test_failed_job_keeps_error() {
        let job = Job::new("q1", ()).start().unwrap().fail("boom").unwrap();
        assert_eq!(job.state(), JobState::Failed);
        assert_eq!(job.error(), Some("boom"));
    }

    #[test]
    fn test_pending_job_cannot_complete() {
        let result = Job::new("q1", ()).complete(None);
        assert!(result.is_err());
    }

    #[test]
    fn test_cancel_from_pending() {
        let job = Job::new("q1", ()).cancel().unwrap();
        assert_eq!(job.state(), JobState::Cancelled);
    }
}
