//! The FIFO request queue and its named `Exchange` element.
//!
//! The original JavaScript driver stored queue entries as positional tuples
//! `[data, resolve, reject, prevWasEscape, outputBuffer]`, a recurring source
//! of indexing bugs (§9). `Exchange` replaces that with a named record.

use std::collections::VecDeque;

use bytes::Bytes;
use tokio::sync::oneshot;

use crate::error::{Error, Result};
use crate::wire::Reply;

/// One request/response pair: the bytes sent plus the sink the caller's
/// future is waiting on.
#[derive(Debug)]
pub(crate) struct Exchange {
    /// Opaque bytes to write to the transport. Stays set for the lifetime
    /// of the exchange — `advance()` clones it out on each dispatch rather
    /// than consuming it, since a watchdog-failed write never retries the
    /// same exchange but a reconnect always starts a fresh one.
    pub(crate) payload: Bytes,
    /// Completes the caller's future exactly once.
    completion: Option<oneshot::Sender<Result<Reply>>>,
    /// Set when the previous payload byte (while `Reading`) was ESCAPE.
    pub(crate) prev_was_escape: bool,
    /// Bytes accumulated so far for an in-progress output payload.
    pub(crate) output_buf: Vec<u8>,
}

impl Exchange {
    pub(crate) fn new(payload: Bytes, completion: oneshot::Sender<Result<Reply>>) -> Self {
        Self {
            payload,
            completion: Some(completion),
            prev_was_escape: false,
            output_buf: Vec::new(),
        }
    }

    /// Resolves this exchange's future exactly once. Subsequent calls are a
    /// no-op, since the queue only ever holds one live completion sink.
    pub(crate) fn complete(&mut self, result: Result<Reply>) {
        if let Some(tx) = self.completion.take() {
            // The caller may have already dropped the receiving future; a
            // failed send here is expected and not an error condition.
            let _ = tx.send(result);
        }
    }

    pub(crate) fn fail(&mut self, err: Error) {
        self.complete(Err(err));
    }
}

/// FIFO of pending exchanges with O(1) head pop, tail push (default enqueue)
/// and head push (`prepend`).
#[derive(Debug, Default)]
pub(crate) struct RequestQueue {
    entries: VecDeque<Exchange>,
}

impl RequestQueue {
    pub(crate) fn new() -> Self {
        Self {
            entries: VecDeque::new(),
        }
    }

    pub(crate) fn push_tail(&mut self, exchange: Exchange) {
        self.entries.push_back(exchange);
    }

    /// Inserts ahead of all pending (not-yet-dispatched) exchanges, but
    /// never ahead of the current head while it is in-flight — the caller
    /// is responsible for only calling this when a dispatch is in progress,
    /// since the queue itself does not track engine state (§8 invariant 3).
    pub(crate) fn push_after_head(&mut self, exchange: Exchange) {
        if self.entries.is_empty() {
            self.entries.push_back(exchange);
        } else {
            self.entries.insert(1, exchange);
        }
    }

    pub(crate) fn push_head(&mut self, exchange: Exchange) {
        self.entries.push_front(exchange);
    }

    pub(crate) fn peek_head_mut(&mut self) -> Option<&mut Exchange> {
        self.entries.front_mut()
    }

    pub(crate) fn pop_head(&mut self) -> Option<Exchange> {
        self.entries.pop_front()
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub(crate) fn len(&self) -> usize {
        self.entries.len()
    }

    /// Completes every pending exchange with `err` and empties the queue.
    pub(crate) fn fail_all(&mut self, err: Error) {
        while let Some(mut exchange) = self.entries.pop_front() {
            exchange.fail(err.clone());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dummy_exchange() -> (Exchange, oneshot::Receiver<Result<Reply>>) {
        let (tx, rx) = oneshot::channel();
        (Exchange::new(Bytes::from_static(b"x"), tx), rx)
    }

    #[test]
    fn fifo_order_preserved() {
        let mut q = RequestQueue::new();
        let (a, _rx_a) = dummy_exchange();
        let (b, _rx_b) = dummy_exchange();
        q.push_tail(a);
        q.push_tail(b);
        assert_eq!(q.len(), 2);
        let head = q.pop_head().unwrap();
        assert_eq!(head.payload, Bytes::from_static(b"x"));
        assert_eq!(q.len(), 1);
    }

    #[test]
    fn prepend_after_head_does_not_displace_in_flight() {
        // S9: A, B enqueued; while A in-flight (head), C is prepended.
        // Order must be A, C, B.
        let mut q = RequestQueue::new();
        let (a, rx_a) = dummy_exchange();
        let (b, rx_b) = dummy_exchange();
        let (c, rx_c) = dummy_exchange();
        q.push_tail(a);
        q.push_tail(b);
        // A is now "in-flight" (still queue head); C prepends behind it.
        q.push_after_head(c);

        let mut order = Vec::new();
        while let Some(mut ex) = q.pop_head() {
            ex.complete(Ok(Reply::Status(1)));
            order.push(());
        }
        assert_eq!(order.len(), 3);
        assert!(rx_a.blocking_recv().is_ok());
        assert!(rx_c.blocking_recv().is_ok());
        assert!(rx_b.blocking_recv().is_ok());
    }

    #[test]
    fn fail_all_empties_and_resolves_everyone() {
        let mut q = RequestQueue::new();
        let (a, rx_a) = dummy_exchange();
        let (b, rx_b) = dummy_exchange();
        q.push_tail(a);
        q.push_tail(b);
        q.fail_all(Error::Cleared);
        assert!(q.is_empty());
        assert_eq!(rx_a.blocking_recv().unwrap(), Err(Error::Cleared));
        assert_eq!(rx_b.blocking_recv().unwrap(), Err(Error::Cleared));
    }

    #[test]
    fn completing_a_dropped_receiver_does_not_panic() {
        let (tx, rx) = oneshot::channel();
        let mut ex = Exchange::new(Bytes::from_static(b"x"), tx);
        drop(rx);
        ex.complete(Ok(Reply::Status(1)));
    }
}
