use serde::{Deserialize, Serialize};

/// Published by the post service when a post is created.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PostCreatedEvent {
    pub id: String,
    pub author_id: String,
}

/// Command to add a post to one follower's timeline.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AddPostToTimelineEvent {
    #[serde(alias = "id")]
    pub post_id: String,
    pub user_id: String,
}

/// Command to remove a post from one user's timeline.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemovePostFromTimelineEvent {
    #[serde(alias = "id")]
    pub post_id: String,
    pub user_id: String,
}

/// Serialized event ready for the broker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutboundEvent {
    pub topic: String,
    pub key: String,
    pub payload: Vec<u8>,
}

impl OutboundEvent {
    pub fn json<T: Serialize>(
        topic: impl Into<String>,
        key: impl Into<String>,
        event: &T,
    ) -> Result<Self, serde_json::Error> {
        Ok(Self {
            topic: topic.into(),
            key: key.into(),
            payload: serde_json::to_vec(event)?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_add_post_accepts_legacy_id_field() {
        let event: AddPostToTimelineEvent =
            serde_json::from_str(r#"{"id":"p1","user_id":"u1"}"#).unwrap();
        assert_eq!(event.post_id, "p1");

        let event: AddPostToTimelineEvent =
            serde_json::from_str(r#"{"post_id":"p2","user_id":"u1"}"#).unwrap();
        assert_eq!(event.post_id, "p2");
    }

    #[test]
    fn test_outbound_event_is_json() {
        let event = AddPostToTimelineEvent {
            post_id: "p1".into(),
            user_id: "u1".into(),
        };
        let outbound = OutboundEvent::json("user_timeline.add_post", "u1", &event).unwrap();
        let decoded: serde_json::Value = serde_json::from_slice(&outbound.payload).unwrap();
        assert_eq!(decoded["post_id"], "p1");
        assert_eq!(outbound.key, "u1");
    }
}
