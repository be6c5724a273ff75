use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::{broadcast, mpsc, RwLock};
use tracing::debug;

use crate::aura::types::{
    CognitiveSample, CognitiveState, ContextSnapshot, MetricsUpdate, StateAdvisory, StateTransition,
};

/// Capacity of the global observer stream. Filtered subscriptions are
/// unbounded and never drop events.
pub const CHANNEL_CAPACITY: usize = 1024;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Topic {
    #[serde(rename = "cognitive.sample.raw")]
    SampleRaw,
    #[serde(rename = "context.updated")]
    ContextUpdated,
    #[serde(rename = "metrics.updated")]
    MetricsUpdated,
    #[serde(rename = "state.changed")]
    StateChanged,
    #[serde(rename = "state.transition")]
    StateTransition,
    #[serde(rename = "signal.advisory")]
    SignalAdvisory,
}

impl Topic {
    pub fn as_str(&self) -> &'static str {
        match self {
            Topic::SampleRaw => "cognitive.sample.raw",
            Topic::ContextUpdated => "context.updated",
            Topic::MetricsUpdated => "metrics.updated",
            Topic::StateChanged => "state.changed",
            Topic::StateTransition => "state.transition",
            Topic::SignalAdvisory => "signal.advisory",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "topic", content = "payload")]
pub enum AuraEvent {
    #[serde(rename = "cognitive.sample.raw")]
    SampleRaw(CognitiveSample),

    #[serde(rename = "context.updated")]
    ContextUpdated(ContextSnapshot),

    #[serde(rename = "metrics.updated")]
    MetricsUpdated(MetricsUpdate),

    #[serde(rename = "state.changed")]
    StateChanged(CognitiveState),

    #[serde(rename = "state.transition")]
    StateTransition(StateTransition),

    #[serde(rename = "signal.advisory")]
    SignalAdvisory(StateAdvisory),
}

impl AuraEvent {
    pub fn topic(&self) -> Topic {
        match self {
            AuraEvent::SampleRaw(_) => Topic::SampleRaw,
            AuraEvent::ContextUpdated(_) => Topic::ContextUpdated,
            AuraEvent::MetricsUpdated(_) => Topic::MetricsUpdated,
            AuraEvent::StateChanged(_) => Topic::StateChanged,
            AuraEvent::StateTransition(_) => Topic::StateTransition,
            AuraEvent::SignalAdvisory(_) => Topic::SignalAdvisory,
        }
    }
}

#[derive(Debug, Clone)]
pub struct EventEnvelope {
    pub id: String,
    /// Bus-wide publish order, starting at 1.
    pub sequence: u64,
    pub session_id: String,
    pub event: AuraEvent,
    pub created_at: DateTime<Utc>,
}

pub type SubscriberId = String;

/// Handle returned by [`EventBus::subscribe`]; pass `id` to
/// [`EventBus::unsubscribe`] to cancel. Every matching event is queued
/// until received; the receiver yields `None` once cancelled and drained.
#[derive(Debug)]
pub struct Subscription {
    pub id: SubscriberId,
    pub receiver: mpsc::UnboundedReceiver<EventEnvelope>,
}

struct Subscriber {
    session_id: Option<String>,
    topics: Option<Vec<Topic>>,
    sender: mpsc::UnboundedSender<EventEnvelope>,
}

impl Subscriber {
    fn matches(&self, envelope: &EventEnvelope) -> bool {
        if let Some(ref session_id) = self.session_id {
            if envelope.session_id != *session_id {
                return false;
            }
        }

        if let Some(ref topics) = self.topics {
            if !topics.contains(&envelope.event.topic()) {
                return false;
            }
        }

        true
    }
}

pub struct EventBus {
    global_sender: broadcast::Sender<EventEnvelope>,
    subscribers: RwLock<HashMap<SubscriberId, Subscriber>>,
    event_count: RwLock<u64>,
    session_id: RwLock<String>,
}

impl EventBus {
    pub fn new(session_id: impl Into<String>) -> Self {
        let (global_sender, _) = broadcast::channel(CHANNEL_CAPACITY);
        Self {
            global_sender,
            subscribers: RwLock::new(HashMap::new()),
            event_count: RwLock::new(0),
            session_id: RwLock::new(session_id.into()),
        }
    }

    /// Publishes to every matching subscriber and returns the envelope's
    /// sequence number. Concurrent publishers are serialized so sequence
    /// order equals delivery order.
    pub async fn publish(&self, event: AuraEvent) -> u64 {
        let mut count = self.event_count.write().await;
        *count += 1;
        let envelope = EventEnvelope {
            id: uuid::Uuid::new_v4().to_string(),
            sequence: *count,
            session_id: self.session_id.read().await.clone(),
            event,
            created_at: Utc::now(),
        };
        let topic = envelope.event.topic();

        let subscribers = self.subscribers.read().await;
        let mut sent_count = 0usize;

        for subscriber in subscribers.values() {
            if subscriber.matches(&envelope) && subscriber.sender.send(envelope.clone()).is_ok() {
                sent_count += 1;
            }
        }

        if self.global_sender.send(envelope.clone()).is_err() {
            debug!("No global subscribers for event");
        }

        debug!(
            topic = topic.as_str(),
            sequence = envelope.sequence,
            sent_to = sent_count,
            "Event published"
        );
        envelope.sequence
    }

    /// Lossy observer stream: a receiver that falls more than
    /// [`CHANNEL_CAPACITY`] events behind skips the oldest.
    pub fn subscribe_global(&self) -> broadcast::Receiver<EventEnvelope> {
        self.global_sender.subscribe()
    }

    pub async fn subscribe(&self, topics: Option<Vec<Topic>>) -> Subscription {
        self.subscribe_filtered(None, topics).await
    }

    pub async fn subscribe_filtered(&self, session_id: Option<String>, topics: Option<Vec<Topic>>) -> Subscription {
        let (sender, receiver) = mpsc::unbounded_channel();
        let subscriber_id = uuid::Uuid::new_v4().to_string();

        let subscriber = Subscriber {
            session_id,
            topics,
            sender,
        };

        {
            let mut subscribers = self.subscribers.write().await;
            subscribers.insert(subscriber_id.clone(), subscriber);
        }

        debug!(subscriber_id = %subscriber_id, "New filtered subscription created");

        Subscription {
            id: subscriber_id,
            receiver,
        }
    }

    /// Returns false if the id was unknown or already cancelled.
    pub async fn unsubscribe(&self, subscriber_id: &str) -> bool {
        let mut subscribers = self.subscribers.write().await;
        let removed = subscribers.remove(subscriber_id).is_some();
        if removed {
            debug!(subscriber_id = %subscriber_id, "Subscription removed");
        }
        removed
    }

    pub async fn session_id(&self) -> String {
        self.session_id.read().await.clone()
    }

    pub async fn set_session_id(&self, session_id: impl Into<String>) {
        *self.session_id.write().await = session_id.into();
    }

    pub async fn subscriber_count(&self) -> usize {
        let subscribers = self.subscribers.read().await;
        subscribers.len() + self.global_sender.receiver_count()
    }

    pub async fn event_count(&self) -> u64 {
        *self.event_count.read().await
    }

    pub async fn stats(&self) -> EventBusStats {
        EventBusStats {
            total_events: self.event_count().await,
            subscriber_count: self.subscriber_count().await,
            global_subscribers: self.global_sender.receiver_count(),
            filtered_subscribers: self.subscribers.read().await.len(),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct EventBusStats {
    pub total_events: u64,
    pub subscriber_count: usize,
    pub global_subscribers: usize,
    pub filtered_subscribers: usize,
}
