use bytes::Bytes;
use serde::{de::DeserializeOwned, Serialize};

use crate::{codec::PayloadCodec, QueueResult};

/// JSON codec for job payloads. Empty bodies decode as `null`.
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonCodec;

impl PayloadCodec for JsonCodec {
    fn encode<D: Serialize>(&self, data: &D) -> QueueResult<Bytes> {
        Ok(Bytes::from(serde_json::to_vec(data)?))
    }

    fn decode<D: DeserializeOwned>(&self, bytes: &[u8]) -> QueueResult<D> {
        if bytes.iter().all(u8::is_ascii_whitespace) {
            return Ok(serde_json::from_slice(b"null")?);
        }
        Ok(serde_json::from_slice(bytes)?)
    }

    fn codec_id(&self) -> &'static str {
        "json"
    }
}
