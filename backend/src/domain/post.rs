//! Wall posts stored by the comment collector.

use chrono::{DateTime, Utc};
use uuid::Uuid;

use super::Page;

/// Stored wall post.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Post {
    /// Primary key.
    pub id: Uuid,
    /// Wall owner (negative for communities).
    pub owner_id: i64,
    /// Post id within the wall.
    pub vk_post_id: i64,
    /// Monitored group the wall belongs to, when known.
    pub group_id: Option<Uuid>,
    /// Post body.
    pub text: String,
    /// Comment count reported by VK at collection time.
    pub comments_count: i32,
    /// Publication time.
    pub published_at: Option<DateTime<Utc>>,
    /// Row creation time.
    pub created_at: DateTime<Utc>,
}

/// Post snapshot to upsert on `(owner_id, vk_post_id)`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PostUpsert {
    /// Wall owner.
    pub owner_id: i64,
    /// Post id within the wall.
    pub vk_post_id: i64,
    /// Monitored group, when known.
    pub group_id: Option<Uuid>,
    /// Post body.
    pub text: String,
    /// Comment count reported by VK.
    pub comments_count: i32,
    /// Publication time.
    pub published_at: Option<DateTime<Utc>>,
}

/// Filters accepted by post listings.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PostFilter {
    /// Only posts of this monitored group.
    pub group_id: Option<Uuid>,
    /// Only posts on this VK wall.
    pub owner_id: Option<i64>,
    /// Page bounds.
    pub page: Page,
}
