use std::pin::Pin;

use futures::Stream;

use crate::error::GenError;

/// In-band end-of-stream marker some generation backends send instead of
/// closing the stream.
pub const DONE_SENTINEL: &str = "[DONE]";

/// A lazy, finite sequence of opaque text fragments from one streaming call.
///
/// The stream ends on graceful completion (transport end-of-stream or the
/// `[DONE]` sentinel, which are equivalent); a `GenError::Transport` item is
/// always the last item and marks a degraded, partial answer.
pub type FrameStream = Pin<Box<dyn Stream<Item = Result<String, GenError>> + Send>>;

/// Classification of one raw frame payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Frame {
    Fragment(String),
    Done,
}

pub fn classify_frame(data: &str) -> Frame {
    if data.trim() == DONE_SENTINEL {
        Frame::Done
    } else {
        Frame::Fragment(data.to_string())
    }
}
