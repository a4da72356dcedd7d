pub mod ids;
pub mod state;
pub mod job;
pub mod message;
pub mod events;

pub use ids::{JobId, ProcessId};
pub use state::JobState;
pub use job::{Job, JobData};
pub use message::{MessageAcker, ReceivedMessage};
pub use events::JobEvent;
