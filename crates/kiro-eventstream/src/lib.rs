//! The AWS event-stream binary framing the upstream uses for responses
//! (spec.md §4.6): length-prefixed, CRC-validated frames carrying a JSON
//! payload, decoded here into typed [`UpstreamChunk`]s.

pub mod chunk;
pub mod error;
pub mod frame;
pub mod parser;

pub use chunk::UpstreamChunk;
pub use error::{EventStreamError, Result};
pub use frame::{encode_frame, Frame};
pub use parser::FrameDecoder;
