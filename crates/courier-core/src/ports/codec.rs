//! ExecutionCodec port - Execution と Payload の相互変換
//!
//! queue 本体は payload を解釈しません。terminal router と worker が
//! 実行参照を取り出すときだけこの port を使います。

use crate::domain::{Execution, Payload};

#[derive(Debug, thiserror::Error)]
pub enum CodecError {
    #[error("failed to encode execution: {0}")]
    Encode(String),

    #[error("failed to decode execution: {0}")]
    Decode(String),
}

pub trait ExecutionCodec: Send + Sync {
    fn encode(&self, execution: &Execution) -> Result<Payload, CodecError>;

    fn decode(&self, payload: &Payload) -> Result<Execution, CodecError>;
}
