// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Broker-agnostic job queue port and the in-memory broker.

use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Notify;

/// Control payload that stops the consumer draining for the current tick.
/// A test affordance; it does not come from the router.
pub const END_PROCESSING_PAYLOAD: &str = "__END__";

#[derive(Debug, thiserror::Error)]
pub enum QueueError {
    #[error("queue broker error: {0}")]
    Broker(String),
}

/// One delivered message. The payload is UTF-8 JSON; the delivery tag ties
/// ack/reject back to the broker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueueMessage {
    pub payload: String,
    delivery_tag: u64,
}

impl QueueMessage {
    pub fn delivery_tag(&self) -> u64 {
        self.delivery_tag
    }
}

/// Port to the reactive job queue.
#[async_trait]
pub trait JobQueue: Send + Sync {
    async fn size(&self) -> Result<usize, QueueError>;

    /// Blocking get with a timeout; `Ok(None)` when nothing arrived.
    async fn get(&self, timeout: Duration) -> Result<Option<QueueMessage>, QueueError>;

    async fn ack(&self, message: &QueueMessage) -> Result<(), QueueError>;

    async fn reject(&self, message: &QueueMessage, requeue: bool) -> Result<(), QueueError>;
}

#[derive(Default)]
struct MemoryQueueState {
    ready: VecDeque<QueueMessage>,
    unacked: HashMap<u64, QueueMessage>,
    next_tag: u64,
}

/// In-process broker used by tests and the dev loop.
///
/// Delivered messages move to an unacked set until they are acked or
/// rejected; reject-with-requeue puts the message back at the front.
#[derive(Clone, Default)]
pub struct MemoryQueue {
    state: Arc<Mutex<MemoryQueueState>>,
    notify: Arc<Notify>,
}

impl MemoryQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Publish a payload.
    pub fn push(&self, payload: impl Into<String>) {
        {
            let mut state = self.state.lock();
            let tag = state.next_tag;
            state.next_tag += 1;
            state.ready.push_back(QueueMessage { payload: payload.into(), delivery_tag: tag });
        }
        self.notify.notify_waiters();
    }

    /// Messages delivered but neither acked nor rejected.
    pub fn unacked_len(&self) -> usize {
        self.state.lock().unacked.len()
    }

    fn try_pop(&self) -> Option<QueueMessage> {
        let mut state = self.state.lock();
        let message = state.ready.pop_front()?;
        state.unacked.insert(message.delivery_tag, message.clone());
        Some(message)
    }
}

#[async_trait]
impl JobQueue for MemoryQueue {
    async fn size(&self) -> Result<usize, QueueError> {
        Ok(self.state.lock().ready.len())
    }

    async fn get(&self, timeout: Duration) -> Result<Option<QueueMessage>, QueueError> {
        let deadline = tokio::time::Instant::now() + timeout;
        loop {
            if let Some(message) = self.try_pop() {
                return Ok(Some(message));
            }
            let notified = self.notify.notified();
            if tokio::time::timeout_at(deadline, notified).await.is_err() {
                return Ok(self.try_pop());
            }
        }
    }

    async fn ack(&self, message: &QueueMessage) -> Result<(), QueueError> {
        self.state.lock().unacked.remove(&message.delivery_tag);
        Ok(())
    }

    async fn reject(&self, message: &QueueMessage, requeue: bool) -> Result<(), QueueError> {
        let mut state = self.state.lock();
        let Some(message) = state.unacked.remove(&message.delivery_tag) else {
            return Ok(());
        };
        if requeue {
            state.ready.push_front(message);
        }
        Ok(())
    }
}

#[cfg(test)]
#[path = "queue_tests.rs"]
mod tests;
