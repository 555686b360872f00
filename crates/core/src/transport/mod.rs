//! Socket plumbing underneath [`Connection`](crate::Connection).
//!
//! - [`socket`]: plain TCP or TLS stream, plus the per-direction poll
//!   timeout bookkeeping used by blocking calls.
//! - [`tcp`]: resolve/connect with a deadline, and the read/write loops
//!   that run either blocking (polling every [`POLL_INTERVAL`] for
//!   cancellation and deadline) or non-blocking (for the watch).
//! - [`codec`]: input buffering and base64 transcoding for tunnels.
//! - [`cancel`]: the cancellation token shared with other threads.

use std::time::Duration;

pub mod cancel;
pub(crate) mod codec;
pub mod socket;
pub(crate) mod tcp;

pub use cancel::{CancelToken, Canceller};
pub use socket::Socket;

/// Granularity at which blocking calls notice cancellation and deadlines.
pub const POLL_INTERVAL: Duration = Duration::from_millis(50);
