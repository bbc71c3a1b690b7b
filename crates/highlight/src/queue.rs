//! Bounded-concurrency dispatcher for tokenization requests.
//!
//! The tokenizer lives in a single shared background process; unbounded
//! fan-out would only pile up in its mailbox and saturate the channel,
//! so at most [`MAX_IN_FLIGHT`] requests are outstanding and the rest
//! wait in FIFO order. There is no timeout and no retry: a request that
//! never completes simply leaves its node unhighlighted.

use std::collections::{HashMap, VecDeque};

use core_types::RequestId;
use dom::NodeId;

pub const MAX_IN_FLIGHT: usize = 20;

pub struct TokenizeQueue {
    limit: usize,
    pending: VecDeque<(NodeId, String)>,
    in_flight: HashMap<RequestId, NodeId>,
    next_request: RequestId,
}

impl TokenizeQueue {
    pub fn new() -> Self {
        Self::with_limit(MAX_IN_FLIGHT)
    }

    pub fn with_limit(limit: usize) -> Self {
        TokenizeQueue {
            limit: limit.max(1),
            pending: VecDeque::new(),
            in_flight: HashMap::new(),
            next_request: 1,
        }
    }

    /// Queue a claimed node's text for tokenization.
    pub fn enqueue(&mut self, node: NodeId, text: String) {
        self.pending.push_back((node, text));
    }

    /// Send as many pending requests as the in-flight bound allows.
    /// Returns the number dispatched.
    pub fn dispatch(&mut self, mut send: impl FnMut(RequestId, String)) -> usize {
        let mut sent = 0;
        while self.in_flight.len() < self.limit {
            let Some((node, text)) = self.pending.pop_front() else {
                break;
            };
            let request = self.next_request;
            self.next_request += 1;
            self.in_flight.insert(request, node);
            send(request, text);
            sent += 1;
        }
        sent
    }

    /// Resolve a completed request to its claimed node. Unknown ids
    /// (stale completions after a [`clear`](Self::clear)) resolve to
    /// `None`.
    pub fn complete(&mut self, request: RequestId) -> Option<NodeId> {
        self.in_flight.remove(&request)
    }

    pub fn in_flight(&self) -> usize {
        self.in_flight.len()
    }

    pub fn pending(&self) -> usize {
        self.pending.len()
    }

    pub fn is_idle(&self) -> bool {
        self.pending.is_empty() && self.in_flight.is_empty()
    }

    /// Page teardown: drop queued work and forget in-flight requests so
    /// late completions fall on the floor.
    pub fn clear(&mut self) {
        self.pending.clear();
        self.in_flight.clear();
    }
}

impl Default for TokenizeQueue {
    fn default() -> Self {
        Self::new()
    }
}
