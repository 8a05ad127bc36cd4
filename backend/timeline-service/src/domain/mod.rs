//! Timeline domain types: posts, day keys, buckets and broker events.

mod day;
mod day_bucket;
pub mod events;
mod post;
mod timeline;

pub use day::{DayKey, DayRange};
pub use day_bucket::{partition_by_day, BucketChange, DayBucket};
pub use events::{AddPostToTimelineEvent, OutboundEvent, PostCreatedEvent, RemovePostFromTimelineEvent};
pub use post::{ContentBlock, Post};
pub use timeline::{sort_newest_first, DayTimelineQuery, TimelineFilled, TimelineReference, UserTimeline};
