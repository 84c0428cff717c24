//! Topic-scoped Event Broadcaster
//!
//! Every connected observer owns a bounded outbound queue. Publishing walks
//! the target audience and `try_send`s a shared frame into each queue, so a
//! slow observer loses its own events without stalling the publisher or
//! anyone else.
//!
//! Topic membership is kept twice: `topics` maps a topic to its members and
//! `memberships` maps an observer to its topics, so a disconnect clears every
//! membership without scanning all topics. A `topics` edit happens while the
//! observer's `memberships` entry is locked, always in that order, so the two
//! maps agree even when a join races a disconnect.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use relief_core::{Audience, Clock, SystemClock, Topic};
use serde_json::Value as JsonValue;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use uuid::Uuid;

use crate::config::BroadcastConfig;
use crate::events::{
    self, disaster_id_from, InboundFrame, LocationUpdate, ObserverId, OutboundFrame,
    PriorityAlert, WsEvent,
};
use crate::telemetry::metrics;

/// Frame shared between every queue it is delivered to.
pub type SharedFrame = Arc<OutboundFrame>;

/// Per-publish delivery counts.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Delivery {
    pub delivered: usize,
    pub dropped: usize,
}

/// The receiving half handed to a new connection.
#[derive(Debug)]
pub struct ObserverHandle {
    pub id: ObserverId,
    pub events: mpsc::Receiver<SharedFrame>,
}

struct Inner {
    observers: DashMap<ObserverId, mpsc::Sender<SharedFrame>>,
    topics: DashMap<Topic, HashSet<ObserverId>>,
    memberships: DashMap<ObserverId, HashSet<Topic>>,
    buffer: usize,
    clock: Arc<dyn Clock>,
    published: AtomicU64,
    dropped: AtomicU64,
}

/// Cloneable handle to the broadcaster.
#[derive(Clone)]
pub struct Broadcaster {
    inner: Arc<Inner>,
}

impl std::fmt::Debug for Broadcaster {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Broadcaster")
            .field("observers", &self.connected_count())
            .field("topics", &self.inner.topics.len())
            .field("buffer", &self.inner.buffer)
            .finish()
    }
}

impl Broadcaster {
    pub fn new(config: &BroadcastConfig) -> Self {
        Self::with_clock(config, Arc::new(SystemClock))
    }

    pub fn with_clock(config: &BroadcastConfig, clock: Arc<dyn Clock>) -> Self {
        Self {
            inner: Arc::new(Inner {
                observers: DashMap::new(),
                topics: DashMap::new(),
                memberships: DashMap::new(),
                buffer: config.observer_buffer.max(1),
                clock,
                published: AtomicU64::new(0),
                dropped: AtomicU64::new(0),
            }),
        }
    }

    // ========================================================================
    // CONNECTIONS
    // ========================================================================

    /// Register a new observer with no topic memberships.
    pub fn register(&self) -> ObserverHandle {
        let id = Uuid::new_v4();
        let (tx, rx) = mpsc::channel(self.inner.buffer);
        self.inner.observers.insert(id, tx);
        self.inner.memberships.insert(id, HashSet::new());
        if let Some(m) = metrics() {
            m.ws_connected();
        }
        tracing::info!(observer_id = %id, "Observer connected");
        ObserverHandle { id, events: rx }
    }

    /// Drop the observer and every topic membership it held.
    pub fn unregister(&self, id: ObserverId) {
        if self.inner.observers.remove(&id).is_none() {
            return;
        }
        let topics = self
            .inner
            .memberships
            .remove(&id)
            .map(|(_, topics)| topics)
            .unwrap_or_default();
        for topic in &topics {
            self.remove_member(topic, id);
        }
        if let Some(m) = metrics() {
            m.ws_disconnected();
        }
        tracing::info!(observer_id = %id, topics = topics.len(), "Observer disconnected");
    }

    pub fn is_connected(&self, id: ObserverId) -> bool {
        self.inner.observers.contains_key(&id)
    }

    pub fn connected_count(&self) -> usize {
        self.inner.observers.len()
    }

    // ========================================================================
    // TOPICS
    // ========================================================================

    /// Add `id` to `topic`. Joining twice is a no-op. Returns false for an
    /// unknown observer.
    pub fn join(&self, id: ObserverId, topic: Topic) -> bool {
        let Some(mut own) = self.inner.memberships.get_mut(&id) else {
            return false;
        };
        if own.insert(topic.clone()) {
            self.inner.topics.entry(topic.clone()).or_default().insert(id);
            tracing::debug!(observer_id = %id, topic = %topic, "Joined topic");
        }
        true
    }

    /// Remove `id` from `topic`. Returns whether it was a member.
    pub fn leave(&self, id: ObserverId, topic: &Topic) -> bool {
        let Some(mut own) = self.inner.memberships.get_mut(&id) else {
            return false;
        };
        let removed = own.remove(topic);
        if removed {
            self.remove_member(topic, id);
            tracing::debug!(observer_id = %id, topic = %topic, "Left topic");
        }
        removed
    }

    fn remove_member(&self, topic: &Topic, id: ObserverId) {
        if let Some(mut members) = self.inner.topics.get_mut(topic) {
            members.remove(&id);
        }
        self.inner.topics.remove_if(topic, |_, members| members.is_empty());
    }

    /// Topics `id` currently belongs to, sorted.
    pub fn topics_of(&self, id: ObserverId) -> Vec<Topic> {
        let mut topics: Vec<Topic> = self
            .inner
            .memberships
            .get(&id)
            .map(|own| own.iter().cloned().collect())
            .unwrap_or_default();
        topics.sort();
        topics
    }

    pub fn members(&self, topic: &Topic) -> Vec<ObserverId> {
        self.inner
            .topics
            .get(topic)
            .map(|members| members.iter().copied().collect())
            .unwrap_or_default()
    }

    // ========================================================================
    // PUBLISHING
    // ========================================================================

    /// Deliver to the current members of `topic`.
    pub fn publish(&self, topic: &Topic, event: WsEvent) -> Delivery {
        self.dispatch(&Audience::Topic(topic.clone()), event, None)
    }

    /// Deliver to every connected observer.
    pub fn publish_all(&self, event: WsEvent) -> Delivery {
        self.dispatch(&Audience::All, event, None)
    }

    /// Deliver to the members of `topic` other than `sender`.
    pub fn broadcast_to_others(
        &self,
        topic: &Topic,
        event: WsEvent,
        sender: ObserverId,
    ) -> Delivery {
        self.dispatch(&Audience::Topic(topic.clone()), event, Some(sender))
    }

    /// Deliver to one observer only.
    pub fn send_to(&self, id: ObserverId, event: WsEvent) -> bool {
        let frame = Arc::new(OutboundFrame::new(event, self.inner.clock.now()));
        let Some(tx) = self.inner.observers.get(&id).map(|tx| tx.clone()) else {
            return false;
        };
        self.offer(id, &tx, &frame)
    }

    /// Snapshot the audience, then offer the frame to each member.
    pub fn dispatch(
        &self,
        audience: &Audience,
        event: WsEvent,
        exclude: Option<ObserverId>,
    ) -> Delivery {
        let event_type = event.event_type();
        let frame = Arc::new(OutboundFrame::new(event, self.inner.clock.now()));

        let targets: Vec<(ObserverId, mpsc::Sender<SharedFrame>)> = match audience {
            Audience::All => self
                .inner
                .observers
                .iter()
                .filter(|entry| Some(*entry.key()) != exclude)
                .map(|entry| (*entry.key(), entry.value().clone()))
                .collect(),
            Audience::Topic(topic) => {
                let ids = self.members(topic);
                ids.into_iter()
                    .filter(|id| Some(*id) != exclude)
                    .filter_map(|id| self.inner.observers.get(&id).map(|tx| (id, tx.clone())))
                    .collect()
            }
        };

        let mut delivery = Delivery::default();
        for (id, tx) in &targets {
            if self.offer(*id, tx, &frame) {
                delivery.delivered += 1;
            } else {
                delivery.dropped += 1;
            }
        }

        self.inner.published.fetch_add(1, Ordering::Relaxed);
        let audience_label = audience.to_string();
        if let Some(m) = metrics() {
            // Topic names carry disaster ids; keep the label set bounded.
            let label = match audience {
                Audience::All => "ALL",
                Audience::Topic(_) => "topic",
            };
            m.record_event(event_type, label);
        }
        tracing::debug!(
            event = event_type,
            audience = %audience_label,
            delivered = delivery.delivered,
            dropped = delivery.dropped,
            "Published event"
        );
        delivery
    }

    fn offer(&self, id: ObserverId, tx: &mpsc::Sender<SharedFrame>, frame: &SharedFrame) -> bool {
        match tx.try_send(Arc::clone(frame)) {
            Ok(()) => true,
            Err(mpsc::error::TrySendError::Full(_)) => {
                self.inner.dropped.fetch_add(1, Ordering::Relaxed);
                if let Some(m) = metrics() {
                    m.record_dropped("full", 1);
                }
                tracing::warn!(
                    observer_id = %id,
                    event = frame.event.event_type(),
                    "Observer queue full, event dropped"
                );
                false
            }
            Err(mpsc::error::TrySendError::Closed(_)) => {
                self.inner.dropped.fetch_add(1, Ordering::Relaxed);
                if let Some(m) = metrics() {
                    m.record_dropped("closed", 1);
                }
                tracing::debug!(observer_id = %id, "Observer queue closed");
                false
            }
        }
    }

    /// Events published since start.
    pub fn published_count(&self) -> u64 {
        self.inner.published.load(Ordering::Relaxed)
    }

    /// Per-observer deliveries dropped since start.
    pub fn dropped_count(&self) -> u64 {
        self.inner.dropped.load(Ordering::Relaxed)
    }

    // ========================================================================
    // HEARTBEAT
    // ========================================================================

    /// Publish one `system_status` event to everyone.
    pub fn heartbeat(&self) -> Delivery {
        self.publish_all(WsEvent::SystemStatus {
            timestamp: self.inner.clock.now(),
            connected_clients: self.connected_count(),
            status: events::STATUS_OPERATIONAL.to_string(),
        })
    }

    /// Emit a heartbeat every `interval` until the handle is aborted. The
    /// first one goes out one full interval after start.
    pub fn spawn_heartbeat(&self, interval: Duration) -> JoinHandle<()> {
        let broadcaster = self.clone();
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            ticker.tick().await;
            loop {
                ticker.tick().await;
                broadcaster.heartbeat();
            }
        })
    }
}

// ============================================================================
// INBOUND ROUTING
// ============================================================================

/// Why an inbound frame was not acted on.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum InboundError {
    #[error("Unknown event type: {0}")]
    UnknownEvent(String),

    #[error("Invalid payload for {event}: {reason}")]
    InvalidPayload { event: String, reason: String },
}

impl InboundError {
    fn invalid(event: &str, reason: impl Into<String>) -> Self {
        Self::InvalidPayload {
            event: event.to_string(),
            reason: reason.into(),
        }
    }
}

/// Handler invoked for one inbound event type.
pub type InboundHandler =
    Arc<dyn Fn(&Broadcaster, ObserverId, &JsonValue) -> Result<(), InboundError> + Send + Sync>;

/// Maps inbound event types to handlers.
#[derive(Clone, Default)]
pub struct InboundRouter {
    handlers: HashMap<String, InboundHandler>,
}

impl std::fmt::Debug for InboundRouter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut events: Vec<&String> = self.handlers.keys().collect();
        events.sort();
        f.debug_struct("InboundRouter").field("events", &events).finish()
    }
}

impl InboundRouter {
    /// A router with no handlers.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `handler` for `event`, replacing any existing one.
    pub fn on_event<F>(mut self, event: impl Into<String>, handler: F) -> Self
    where
        F: Fn(&Broadcaster, ObserverId, &JsonValue) -> Result<(), InboundError>
            + Send
            + Sync
            + 'static,
    {
        self.handlers.insert(event.into(), Arc::new(handler));
        self
    }

    pub fn handles(&self, event: &str) -> bool {
        self.handlers.contains_key(event)
    }

    /// Run the handler for `frame`. The caller logs and ignores errors.
    pub fn dispatch(
        &self,
        broadcaster: &Broadcaster,
        observer: ObserverId,
        frame: &InboundFrame,
    ) -> Result<(), InboundError> {
        let handler = self
            .handlers
            .get(&frame.event)
            .ok_or_else(|| InboundError::UnknownEvent(frame.event.clone()))?;
        handler(broadcaster, observer, &frame.data)
    }

    /// Room membership, the general feed, responder locations and priority
    /// alerts.
    pub fn standard() -> Self {
        Self::new()
            .on_event(events::JOIN_DISASTER, |b, id, data| {
                let disaster_id = disaster_id_from(data).ok_or_else(|| {
                    InboundError::invalid(events::JOIN_DISASTER, "missing disaster id")
                })?;
                b.join(id, Topic::disaster(&disaster_id));
                tracing::info!(
                    observer_id = %id,
                    disaster_id = %disaster_id,
                    "Client joined disaster room"
                );
                Ok(())
            })
            .on_event(events::LEAVE_DISASTER, |b, id, data| {
                let disaster_id = disaster_id_from(data).ok_or_else(|| {
                    InboundError::invalid(events::LEAVE_DISASTER, "missing disaster id")
                })?;
                b.leave(id, &Topic::disaster(&disaster_id));
                tracing::info!(
                    observer_id = %id,
                    disaster_id = %disaster_id,
                    "Client left disaster room"
                );
                Ok(())
            })
            .on_event(events::SUBSCRIBE_UPDATES, |b, id, _| {
                b.join(id, Topic::general_updates());
                Ok(())
            })
            .on_event(events::UNSUBSCRIBE_UPDATES, |b, id, _| {
                b.leave(id, &Topic::general_updates());
                Ok(())
            })
            .on_event(events::UPDATE_LOCATION, |b, id, data| {
                let update: LocationUpdate = serde_json::from_value(data.clone())
                    .map_err(|e| InboundError::invalid(events::UPDATE_LOCATION, e.to_string()))?;
                let timestamp = b.inner.clock.now();
                b.broadcast_to_others(
                    &Topic::disaster(&update.disaster_id),
                    WsEvent::ResponderLocationUpdated {
                        user_id: update.user_id,
                        lat: update.lat,
                        lng: update.lng,
                        timestamp,
                    },
                    id,
                );
                Ok(())
            })
            .on_event(events::PRIORITY_ALERT, |b, id, data| {
                let alert: PriorityAlert = serde_json::from_value(data.clone())
                    .map_err(|e| InboundError::invalid(events::PRIORITY_ALERT, e.to_string()))?;
                tracing::warn!(
                    observer_id = %id,
                    disaster_id = %alert.disaster_id,
                    urgency = ?alert.urgency,
                    "Priority alert raised"
                );
                let timestamp = b.inner.clock.now();
                b.publish_all(WsEvent::PriorityAlertReceived {
                    disaster_id: alert.disaster_id,
                    message: alert.message,
                    urgency: alert.urgency,
                    location: alert.location,
                    timestamp,
                });
                Ok(())
            })
    }
}
