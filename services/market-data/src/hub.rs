//! Broadcast hub
//!
//! Owns the subscriber set. The driver takes a [`TickRoster`] at the start of
//! every tick and delivers that tick's payloads to exactly the subscribers in
//! it; anyone registering afterwards is picked up by the next roster.
//!
//! Delivery never waits on a subscriber. Lagging subscribers are handled by
//! their mailbox's [`DropPolicy`] and evicted once they stay full for too
//! long.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use tracing::{debug, info, warn};
use types::errors::FeedError;

use crate::backpressure::{DropPolicy, EnqueueOutcome, Mailbox, OutboundMessage};
use crate::metrics::ServiceMetrics;
use crate::session::Subscription;

/// Unique subscriber identifier.
pub type SubscriberId = u64;

/// Hub configuration
#[derive(Debug, Clone)]
pub struct HubConfig {
    /// Fixed wall-clock tick interval.
    pub tick_interval: Duration,
    /// Mailbox capacity per subscriber.
    pub queue_capacity: usize,
    pub drop_policy: DropPolicy,
    /// Consecutive full ticks tolerated before eviction.
    pub max_full_ticks: u32,
    /// Instrument new subscribers start on.
    pub default_instrument: String,
}

impl Default for HubConfig {
    fn default() -> Self {
        Self {
            tick_interval: Duration::from_millis(100),
            queue_capacity: 32,
            drop_policy: DropPolicy::DropOldest,
            max_full_ticks: 50,
            default_instrument: "BTC-USDT".to_string(),
        }
    }
}

#[derive(Debug)]
struct SubscriberEntry {
    instrument: String,
    mailbox: Arc<Mailbox>,
}

/// A subscriber as captured at tick start.
#[derive(Debug, Clone)]
pub struct RosterEntry {
    pub id: SubscriberId,
    pub instrument: String,
    mailbox: Arc<Mailbox>,
}

/// Copy of the subscriber set taken at tick start.
#[derive(Debug, Clone, Default)]
pub struct TickRoster {
    entries: Vec<RosterEntry>,
}

impl TickRoster {
    /// Distinct instruments selected by the captured subscribers.
    pub fn instruments(&self) -> BTreeSet<String> {
        self.entries.iter().map(|e| e.instrument.clone()).collect()
    }

    pub fn entries(&self) -> &[RosterEntry] {
        &self.entries
    }

    pub fn contains(&self, id: SubscriberId) -> bool {
        self.entries.iter().any(|e| e.id == id)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// What happened during one delivery pass.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DeliveryReport {
    /// Messages stored in a mailbox.
    pub delivered: u64,
    /// Messages discarded by backpressure (displaced or rejected).
    pub dropped: u64,
    /// Subscribers removed during this pass.
    pub evicted: Vec<FeedError>,
}

/// Registry of live subscribers and their mailboxes.
///
/// Uses BTreeMap so rosters come out in registration order.
pub struct BroadcastHub {
    subscribers: Mutex<BTreeMap<SubscriberId, SubscriberEntry>>,
    next_id: AtomicU64,
    config: HubConfig,
    metrics: Arc<ServiceMetrics>,
}

impl BroadcastHub {
    pub fn new(config: HubConfig, metrics: Arc<ServiceMetrics>) -> Self {
        Self {
            subscribers: Mutex::new(BTreeMap::new()),
            next_id: AtomicU64::new(1),
            config,
            metrics,
        }
    }

    fn lock(&self) -> MutexGuard<'_, BTreeMap<SubscriberId, SubscriberEntry>> {
        self.subscribers.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Register a new subscriber on the default instrument.
    pub fn register(self: &Arc<Self>) -> Subscription {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let mailbox = Arc::new(Mailbox::new(
            self.config.queue_capacity,
            self.config.drop_policy,
        ));

        let count = {
            let mut subscribers = self.lock();
            subscribers.insert(
                id,
                SubscriberEntry {
                    instrument: self.config.default_instrument.clone(),
                    mailbox: Arc::clone(&mailbox),
                },
            );
            subscribers.len()
        };
        self.metrics.set_connected_subscribers(count as u64);
        info!(subscriber_id = id, subscribers = count, "Subscriber registered");

        Subscription::new(id, Arc::clone(self), mailbox)
    }

    /// Remove a subscriber and close its mailbox. Returns false if it was
    /// already gone.
    pub fn unregister(&self, id: SubscriberId) -> bool {
        let (removed, count) = {
            let mut subscribers = self.lock();
            (subscribers.remove(&id), subscribers.len())
        };

        match removed {
            Some(entry) => {
                entry.mailbox.close();
                self.metrics.set_connected_subscribers(count as u64);
                info!(subscriber_id = id, subscribers = count, "Subscriber deregistered");
                true
            }
            None => false,
        }
    }

    /// Switch the instrument a subscriber receives from the next tick on.
    pub fn select_instrument(&self, id: SubscriberId, instrument: &str) -> bool {
        match self.lock().get_mut(&id) {
            Some(entry) => {
                entry.instrument = instrument.to_string();
                debug!(subscriber_id = id, instrument, "Instrument selected");
                true
            }
            None => false,
        }
    }

    pub fn instrument_of(&self, id: SubscriberId) -> Option<String> {
        self.lock().get(&id).map(|e| e.instrument.clone())
    }

    pub fn is_registered(&self, id: SubscriberId) -> bool {
        self.lock().contains_key(&id)
    }

    /// Copy-on-iterate snapshot of the subscriber set.
    pub fn roster(&self) -> TickRoster {
        let entries = self
            .lock()
            .iter()
            .map(|(id, entry)| RosterEntry {
                id: *id,
                instrument: entry.instrument.clone(),
                mailbox: Arc::clone(&entry.mailbox),
            })
            .collect();
        TickRoster { entries }
    }

    /// Offer each roster member the payload composed for its instrument.
    ///
    /// Members whose instrument has no payload are skipped. Mailboxes are
    /// never waited on.
    pub fn deliver(
        &self,
        roster: &TickRoster,
        payloads: &BTreeMap<String, OutboundMessage>,
    ) -> DeliveryReport {
        let mut report = DeliveryReport::default();

        for member in &roster.entries {
            let Some(payload) = payloads.get(&member.instrument) else {
                continue;
            };

            let outcome = member.mailbox.offer(payload.clone());
            if outcome.is_stored() {
                report.delivered += 1;
            }

            let evict = match outcome {
                EnqueueOutcome::Queued => false,
                EnqueueOutcome::DroppedOldest => {
                    report.dropped += 1;
                    member.mailbox.full_streak() >= self.config.max_full_ticks
                }
                EnqueueOutcome::Rejected => {
                    report.dropped += 1;
                    true
                }
                // Session already went away between roster and delivery.
                EnqueueOutcome::Closed => false,
            };

            if evict {
                let full_ticks = member.mailbox.full_streak();
                if self.unregister(member.id) {
                    warn!(
                        subscriber_id = member.id,
                        full_ticks,
                        policy = ?member.mailbox.drop_policy(),
                        "Evicting unresponsive subscriber"
                    );
                    self.metrics.record_eviction();
                    report.evicted.push(FeedError::SubscriberUnresponsive {
                        subscriber_id: member.id,
                        full_ticks,
                    });
                }
            }
        }

        self.metrics.record_delivery(report.delivered, report.dropped);
        report
    }

    pub fn subscriber_count(&self) -> usize {
        self.lock().len()
    }

    pub fn config(&self) -> &HubConfig {
        &self.config
    }

    pub fn metrics(&self) -> &Arc<ServiceMetrics> {
        &self.metrics
    }
}
