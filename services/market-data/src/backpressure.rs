//! Backpressure and flow control for subscriber delivery
//!
//! Every subscriber owns a bounded [`Mailbox`]. The driver only ever offers
//! into it and never waits; the session task drains it at its own pace. What
//! happens on overflow is decided by the [`DropPolicy`], and how long a
//! subscriber may stay full is tracked per mailbox as a streak of
//! consecutive full ticks.

use std::collections::VecDeque;
use std::str::FromStr;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use serde::{Deserialize, Serialize};
use tokio::sync::Notify;

/// Drop policy when a subscriber's mailbox overflows.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum DropPolicy {
    /// Reject the new message and disconnect the subscriber.
    Disconnect,
    /// Drop the oldest queued message to make room for the new one.
    DropOldest,
}

impl FromStr for DropPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "disconnect" => Ok(DropPolicy::Disconnect),
            "drop-oldest" | "drop_oldest" => Ok(DropPolicy::DropOldest),
            other => Err(format!(
                "unknown drop policy '{other}', expected 'drop-oldest' or 'disconnect'"
            )),
        }
    }
}

/// A serialized message waiting in a mailbox.
///
/// The payload is shared: one serialization per instrument per tick, cloned
/// by reference into every mailbox.
#[derive(Debug, Clone, PartialEq)]
pub struct OutboundMessage {
    pub payload: Arc<str>,
    /// Tick number the message was composed on.
    pub sequence: u64,
    /// Epoch-ms when the message was composed.
    pub queued_at: i64,
}

/// Result of offering one message to a mailbox.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EnqueueOutcome {
    /// Stored without displacing anything.
    Queued,
    /// Stored after evicting the oldest queued message.
    DroppedOldest,
    /// Not stored; the mailbox was full under [`DropPolicy::Disconnect`].
    Rejected,
    /// Not stored; the mailbox has been closed.
    Closed,
}

impl EnqueueOutcome {
    pub fn is_stored(self) -> bool {
        matches!(self, EnqueueOutcome::Queued | EnqueueOutcome::DroppedOldest)
    }
}

#[derive(Debug)]
struct MailboxState {
    messages: VecDeque<OutboundMessage>,
    capacity: usize,
    drop_policy: DropPolicy,
    messages_dropped: u64,
    /// Consecutive offers that found the mailbox full.
    full_streak: u32,
    closed: bool,
}

/// Bounded single-consumer outbound queue.
#[derive(Debug)]
pub struct Mailbox {
    state: Mutex<MailboxState>,
    notify: Notify,
}

impl Mailbox {
    pub fn new(capacity: usize, drop_policy: DropPolicy) -> Self {
        let capacity = capacity.max(1);
        Self {
            state: Mutex::new(MailboxState {
                messages: VecDeque::with_capacity(capacity),
                capacity,
                drop_policy,
                messages_dropped: 0,
                full_streak: 0,
                closed: false,
            }),
            notify: Notify::new(),
        }
    }

    fn lock(&self) -> MutexGuard<'_, MailboxState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Offer a message without waiting.
    ///
    /// Finding the mailbox full extends the full streak; finding room resets
    /// it.
    pub fn offer(&self, message: OutboundMessage) -> EnqueueOutcome {
        let mut state = self.lock();
        if state.closed {
            return EnqueueOutcome::Closed;
        }

        let outcome = if state.messages.len() >= state.capacity {
            state.full_streak = state.full_streak.saturating_add(1);
            match state.drop_policy {
                DropPolicy::Disconnect => return EnqueueOutcome::Rejected,
                DropPolicy::DropOldest => {
                    state.messages.pop_front();
                    state.messages_dropped += 1;
                    EnqueueOutcome::DroppedOldest
                }
            }
        } else {
            state.full_streak = 0;
            EnqueueOutcome::Queued
        };

        state.messages.push_back(message);
        drop(state);
        self.notify.notify_one();
        outcome
    }

    /// Wait for the next message. Returns `None` once the mailbox is closed;
    /// messages still queued at that point are discarded.
    pub async fn recv(&self) -> Option<OutboundMessage> {
        loop {
            let notified = self.notify.notified();
            {
                let mut state = self.lock();
                if state.closed {
                    return None;
                }
                if let Some(message) = state.messages.pop_front() {
                    return Some(message);
                }
            }
            notified.await;
        }
    }

    pub fn try_recv(&self) -> Option<OutboundMessage> {
        self.lock().messages.pop_front()
    }

    /// Close the mailbox and wake the consumer.
    pub fn close(&self) {
        let mut state = self.lock();
        state.closed = true;
        state.messages.clear();
        drop(state);
        self.notify.notify_one();
    }

    pub fn is_closed(&self) -> bool {
        self.lock().closed
    }

    pub fn len(&self) -> usize {
        self.lock().messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().messages.is_empty()
    }

    pub fn full_streak(&self) -> u32 {
        self.lock().full_streak
    }

    pub fn messages_dropped(&self) -> u64 {
        self.lock().messages_dropped
    }

    pub fn drop_policy(&self) -> DropPolicy {
        self.lock().drop_policy
    }
}
