//! C7: HTTP dispatch to the upstream, status classification, and folding
//! the decoded event-stream chunk sequence into Claude-shaped output — both
//! the streaming SSE state machine and the non-streaming aggregate.

pub mod aggregator;
pub mod converter;
pub mod dispatch;

pub use aggregator::Aggregator;
pub use converter::Converter;
pub use dispatch::{classify, derive_machine_id, UpstreamClient, UpstreamOutcome};
