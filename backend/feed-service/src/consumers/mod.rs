pub mod lifecycle_events;

pub use lifecycle_events::{LifecycleEventConsumer, LifecycleEventConsumerConfig};
