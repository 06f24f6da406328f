//! Streaming response decoding and tool-call reassembly.

mod assembler;
mod decoder;

pub use assembler::ToolCallAssembler;
pub use decoder::{
    DATA_PREFIX, LineBuffer, LineOutcome, MAX_ERROR_SNIPPET, MAX_LINE_BYTES, StreamDecoder,
    ensure_success, snippet,
};
