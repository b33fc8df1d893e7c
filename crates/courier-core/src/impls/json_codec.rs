//! JsonExecutionCodec - Execution を JSON バイト列として payload に載せる

use crate::domain::{Execution, Payload};
use crate::ports::{CodecError, ExecutionCodec};

#[derive(Debug, Default, Clone, Copy)]
pub struct JsonExecutionCodec;

impl ExecutionCodec for JsonExecutionCodec {
    fn encode(&self, execution: &Execution) -> Result<Payload, CodecError> {
        serde_json::to_vec(execution)
            .map(Payload::new)
            .map_err(|e| CodecError::Encode(e.to_string()))
    }

    fn decode(&self, payload: &Payload) -> Result<Execution, CodecError> {
        serde_json::from_slice(payload.as_bytes()).map_err(|e| CodecError::Decode(e.to_string()))
    }
}
