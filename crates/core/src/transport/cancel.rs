use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use parking_lot::Mutex;

/// One-shot cancellation flag checked by blocking I/O at every
/// would-block point. Once cancelled it stays cancelled.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }

    fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }
}

/// Shared slot holding a connection's current [`CancelToken`].
///
/// Cloning gives another handle on the same slot, so a second thread can
/// interrupt a call blocked inside the connection:
///
/// ```text
/// thread A: conn.receive(None)      ─── blocked ───► Err(Interrupted)
/// thread B: canceller.flush(true)   ─────┘
/// thread B: canceller.flush(false)  (new calls proceed normally)
/// ```
#[derive(Debug, Clone, Default)]
pub struct Canceller {
    slot: Arc<Mutex<CancelToken>>,
}

impl Canceller {
    /// Token for a call that is about to start.
    pub fn token(&self) -> CancelToken {
        self.slot.lock().clone()
    }

    /// `true` cancels the current token; `false` installs a fresh one.
    ///
    /// A cancelled token is never reused, so waits that already saw the
    /// cancellation stay cancelled while new calls start clean.
    pub fn flush(&self, flush: bool) {
        let mut slot = self.slot.lock();
        if flush {
            slot.cancel();
        } else {
            *slot = CancelToken::default();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn flush_cancels_outstanding_token_only() {
        let canceller = Canceller::default();
        let old = canceller.token();
        canceller.flush(true);
        assert!(old.is_cancelled());
        assert!(canceller.token().is_cancelled());

        canceller.flush(false);
        assert!(old.is_cancelled());
        assert!(!canceller.token().is_cancelled());
    }

    #[test]
    fn clones_share_slot() {
        let a = Canceller::default();
        let b = a.clone();
        let token = a.token();
        b.flush(true);
        assert!(token.is_cancelled());
    }
}
