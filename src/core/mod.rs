mod event_bus;

pub use event_bus::{
    AuraEvent, EventBus, EventBusStats, EventEnvelope, Subscription, SubscriberId, Topic, CHANNEL_CAPACITY,
};
