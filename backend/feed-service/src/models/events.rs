//! Content-lifecycle events consumed from Kafka.
//!
//! Each event kind travels on its own topic `{prefix}.{subject}` with a
//! camelCase JSON body. The subject is taken from the topic name, so the
//! payloads themselves carry no type discriminator.

use chrono::{DateTime, Utc};
use serde::Deserialize;
use uuid::Uuid;

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContentCreated {
    pub id: Uuid,
    pub author_id: Uuid,
    #[serde(default)]
    pub hashtags: Vec<String>,
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RetweetCreated {
    pub author_id: Uuid,
    pub parent_content_id: Uuid,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LikeChanged {
    pub user_id: Uuid,
    pub content_id: Uuid,
    #[serde(default)]
    pub at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FollowChanged {
    pub follower_id: Uuid,
    pub followee_id: Uuid,
    #[serde(default)]
    pub at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserBlocked {
    pub blocker_id: Uuid,
    pub blocked_id: Uuid,
    #[serde(default)]
    pub at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContentDeleted {
    pub id: Uuid,
    pub author_id: Uuid,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HashtagUsed {
    pub tag: String,
    #[serde(default)]
    pub content_id: Option<Uuid>,
    #[serde(default)]
    pub at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum FeedEvent {
    ContentCreated(ContentCreated),
    RetweetCreated(RetweetCreated),
    LikeSet(LikeChanged),
    LikeCanceled(LikeChanged),
    UserFollowed(FollowChanged),
    UserUnfollowed(FollowChanged),
    UserBlocked(UserBlocked),
    ContentDeleted(ContentDeleted),
    HashtagUsed(HashtagUsed),
}

impl FeedEvent {
    /// Every subject the consumer subscribes to.
    pub const SUBJECTS: [&'static str; 9] = [
        "content-created",
        "retweet-created",
        "like-set",
        "like-canceled",
        "user-followed",
        "user-unfollowed",
        "user-blocked",
        "content-deleted",
        "hashtag-used",
    ];

    /// Decode a payload for `subject`. Unknown subjects yield `Ok(None)`.
    pub fn decode(subject: &str, payload: &[u8]) -> Result<Option<Self>, serde_json::Error> {
        let event = match subject {
            "content-created" => Self::ContentCreated(serde_json::from_slice(payload)?),
            "retweet-created" => Self::RetweetCreated(serde_json::from_slice(payload)?),
            "like-set" => Self::LikeSet(serde_json::from_slice(payload)?),
            "like-canceled" => Self::LikeCanceled(serde_json::from_slice(payload)?),
            "user-followed" => Self::UserFollowed(serde_json::from_slice(payload)?),
            "user-unfollowed" => Self::UserUnfollowed(serde_json::from_slice(payload)?),
            "user-blocked" => Self::UserBlocked(serde_json::from_slice(payload)?),
            "content-deleted" => Self::ContentDeleted(serde_json::from_slice(payload)?),
            "hashtag-used" => Self::HashtagUsed(serde_json::from_slice(payload)?),
            _ => return Ok(None),
        };
        Ok(Some(event))
    }

    pub fn subject(&self) -> &'static str {
        match self {
            Self::ContentCreated(_) => "content-created",
            Self::RetweetCreated(_) => "retweet-created",
            Self::LikeSet(_) => "like-set",
            Self::LikeCanceled(_) => "like-canceled",
            Self::UserFollowed(_) => "user-followed",
            Self::UserUnfollowed(_) => "user-unfollowed",
            Self::UserBlocked(_) => "user-blocked",
            Self::ContentDeleted(_) => "content-deleted",
            Self::HashtagUsed(_) => "hashtag-used",
        }
    }
}

/// Strip the configured prefix from a topic name, e.g. `nova.like-set` -> `like-set`.
pub fn subject_from_topic<'a>(prefix: &str, topic: &'a str) -> Option<&'a str> {
    topic
        .strip_prefix(prefix)
        .and_then(|rest| rest.strip_prefix('.'))
}

pub fn topic_for(prefix: &str, subject: &str) -> String {
    format!("{}.{}", prefix, subject)
}
