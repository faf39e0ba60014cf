//! Subscriber sessions
//!
//! A [`Subscription`] is the hub-facing half of one connected subscriber:
//! it drains the subscriber's mailbox and applies instrument selections.
//! The transport half (the WebSocket task) lives in the gateway.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::backpressure::{Mailbox, OutboundMessage};
use crate::hub::{BroadcastHub, SubscriberId};
use crate::segment::is_valid_instrument;

/// Inbound control message: `{"instrument": "ETH-USDT"}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InstrumentSelection {
    pub instrument: String,
}

/// Parse a raw control message. Unknown fields are ignored.
pub fn parse_control_message(text: &str) -> Option<InstrumentSelection> {
    serde_json::from_str(text).ok()
}

/// One registered subscriber.
///
/// Deregisters from the hub exactly once, either through [`close`] or on
/// drop.
///
/// [`close`]: Subscription::close
pub struct Subscription {
    id: SubscriberId,
    hub: Arc<BroadcastHub>,
    mailbox: Arc<Mailbox>,
    closed: AtomicBool,
}

impl Subscription {
    pub(crate) fn new(id: SubscriberId, hub: Arc<BroadcastHub>, mailbox: Arc<Mailbox>) -> Self {
        Self {
            id,
            hub,
            mailbox,
            closed: AtomicBool::new(false),
        }
    }

    pub fn id(&self) -> SubscriberId {
        self.id
    }

    /// Wait for the next message. `None` means the hub dropped this
    /// subscriber or the session was closed.
    pub async fn next_message(&self) -> Option<OutboundMessage> {
        self.mailbox.recv().await
    }

    pub fn try_next(&self) -> Option<OutboundMessage> {
        self.mailbox.try_recv()
    }

    /// Apply an inbound text frame. Returns the newly selected instrument,
    /// or `None` if the frame was ignored.
    pub fn handle_control(&self, text: &str) -> Option<String> {
        let Some(selection) = parse_control_message(text) else {
            debug!(subscriber_id = self.id, "Ignoring unparseable control message");
            return None;
        };

        if !is_valid_instrument(&selection.instrument) {
            debug!(
                subscriber_id = self.id,
                instrument = %selection.instrument,
                "Ignoring invalid instrument"
            );
            return None;
        }

        self.hub
            .select_instrument(self.id, &selection.instrument)
            .then_some(selection.instrument)
    }

    /// Current instrument, if still registered.
    pub fn instrument(&self) -> Option<String> {
        self.hub.instrument_of(self.id)
    }

    /// Whether the hub removed this subscriber without the session asking.
    pub fn was_evicted(&self) -> bool {
        !self.closed.load(Ordering::Acquire) && !self.hub.is_registered(self.id)
    }

    /// Deregister from the hub. Later calls are no-ops.
    pub fn close(&self) {
        if !self.closed.swap(true, Ordering::AcqRel) {
            self.hub.unregister(self.id);
        }
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.close();
    }
}
