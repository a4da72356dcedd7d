pub mod json;

use bytes::Bytes;
use serde::{de::DeserializeOwned, Serialize};

use crate::QueueResult;

pub use json::JsonCodec;

/// Trait for job payload codecs.
///
/// Only `job.data` crosses the wire; ids, attempts and timestamps come from
/// the transport's own message metadata.
pub trait PayloadCodec: Send + Sync + 'static {
    /// Serialize a payload to message bytes
    fn encode<D: Serialize>(&self, data: &D) -> QueueResult<Bytes>;

    /// Deserialize message bytes back into a payload
    fn decode<D: DeserializeOwned>(&self, bytes: &[u8]) -> QueueResult<D>;

    /// Get codec identifier
    fn codec_id(&self) -> &'static str;
}
