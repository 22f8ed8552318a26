//! The lock arbiter (§4.4): cooperative, opt-in serialization of *groups*
//! of exchanges across multiple `send` calls, independent of (and weaker
//! than) the queue's own strict FIFO ordering.

use std::collections::VecDeque;

use tokio::sync::oneshot;

/// FIFO queue of outstanding lock grants. The first grant completes
/// immediately; each subsequent grant completes only when its predecessor
/// releases.
#[derive(Debug, Default)]
pub(crate) struct LockArbiter {
    /// Pending grant signals, in acquisition order. The front entry, if
    /// any, is the currently-held lock; `unlock()` pops it and fires the
    /// next entry's grant.
    waiters: VecDeque<oneshot::Sender<()>>,
    held: usize,
}

impl LockArbiter {
    pub(crate) fn new() -> Self {
        Self {
            waiters: VecDeque::new(),
            held: 0,
        }
    }

    /// Registers a new lock request and returns the receiver the caller
    /// should await. Grants the lock immediately if none is currently held.
    pub(crate) fn acquire(&mut self) -> oneshot::Receiver<()> {
        let (tx, rx) = oneshot::channel();
        let grant_now = self.held == 0;
        self.held += 1;
        if grant_now {
            // Ignoring the send error: the caller may have already dropped
            // the future, which simply means nobody is waiting to be told.
            let _ = tx.send(());
        } else {
            self.waiters.push_back(tx);
        }
        rx
    }

    /// Releases the oldest outstanding lock, granting the next waiter (if
    /// any). A call with nothing held is a no-op.
    pub(crate) fn release(&mut self) {
        if self.held == 0 {
            return;
        }
        self.held -= 1;
        if let Some(tx) = self.waiters.pop_front() {
            let _ = tx.send(());
        }
    }

    /// Releases every outstanding lock, used by `clear()`/`close()`.
    pub(crate) fn release_all(&mut self) {
        while self.held > 0 {
            self.release();
        }
    }

    pub(crate) fn locked(&self) -> bool {
        self.held > 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn first_grant_is_immediate() {
        let mut arb = LockArbiter::new();
        let rx = arb.acquire();
        assert!(rx.blocking_recv().is_ok());
        assert!(arb.locked());
    }

    #[test]
    fn second_grant_waits_for_release() {
        let mut arb = LockArbiter::new();
        let rx1 = arb.acquire();
        let mut rx2 = arb.acquire();
        assert!(rx1.blocking_recv().is_ok());
        assert!(rx2.try_recv().is_err());
        arb.release();
        assert!(rx2.blocking_recv().is_ok());
    }

    #[test]
    fn locked_reports_false_once_all_released() {
        let mut arb = LockArbiter::new();
        let _rx = arb.acquire();
        assert!(arb.locked());
        arb.release();
        assert!(!arb.locked());
    }

    #[test]
    fn release_all_drains_every_waiter() {
        let mut arb = LockArbiter::new();
        let _rx1 = arb.acquire();
        let rx2 = arb.acquire();
        let rx3 = arb.acquire();
        arb.release_all();
        assert!(!arb.locked());
        // Waiters each eventually get granted as release_all pops them in
        // turn, even though no one holds the lock at the end.
        assert!(rx2.blocking_recv().is_ok());
        assert!(rx3.blocking_recv().is_ok());
    }
}
