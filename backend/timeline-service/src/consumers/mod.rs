pub mod router;
pub mod timeline_events;

pub use router::{Disposition, MessageRouter, TopicNames};
pub use timeline_events::{TimelineEventsConsumer, TimelineEventsConsumerConfig};
