//! Bounded FIFO of requests deferred behind an in-flight refresh.

use std::collections::VecDeque;

use tokio::sync::oneshot;

use crate::api::{ApiRequest, ApiResponse};
use crate::error::AuthError;

/// A deferred request: its original parameters plus the completion handle the
/// waiting caller holds the other end of.
pub(crate) struct PendingRequest {
    pub request: ApiRequest,
    pub completion: oneshot::Sender<Result<ApiResponse, AuthError>>,
}

/// The pending request queue.
///
/// Owned exclusively by the refresh coordinator: it is created when a refresh
/// starts, filled by callers that arrive while the refresh is in flight, and
/// destroyed when the refresh resolves. The bound keeps a wedged refresh from
/// accumulating waiters without limit; overflow rejects the newest caller
/// rather than evicting older ones, preserving FIFO for everything accepted.
pub(crate) struct PendingQueue {
    entries: VecDeque<PendingRequest>,
    capacity: usize,
}

impl PendingQueue {
    pub fn new(capacity: usize) -> Self {
        Self {
            entries: VecDeque::new(),
            capacity,
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Append a request, handing back the receiver its caller will await.
    pub fn enqueue(
        &mut self,
        request: ApiRequest,
    ) -> Result<oneshot::Receiver<Result<ApiResponse, AuthError>>, AuthError> {
        if self.entries.len() >= self.capacity {
            return Err(AuthError::QueueFull);
        }
        let (tx, rx) = oneshot::channel();
        self.entries.push_back(PendingRequest {
            request,
            completion: tx,
        });
        Ok(rx)
    }

    /// Hand the accumulated entries to the drain loop, in enqueue order.
    pub fn take_entries(&mut self) -> VecDeque<PendingRequest> {
        std::mem::take(&mut self.entries)
    }
}
