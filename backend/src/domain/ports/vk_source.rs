//! Port for reading communities, posts and comments from the VK API.
//!
//! Adapters own transport details (throttling, retries within one call,
//! JSON envelopes); the domain sees typed records and a classified error.

use async_trait::async_trait;

use super::define_port_error;

/// VK error codes worth retrying: rate limits and internal server errors.
pub const RETRYABLE_VK_ERROR_CODES: [i64; 4] = [6, 9, 10, 29];

define_port_error! {
    /// Failures raised by VK source adapters.
    pub enum VkSourceError {
        /// VK answered with an `error` object.
        Api { code: i64, message: String } => "VK API error {code}: {message}",
        /// The request could not be sent or the connection dropped.
        Transport { message: String } => "VK transport error: {message}",
        /// The request timed out.
        Timeout { message: String } => "VK request timed out: {message}",
        /// The response body did not match the expected shape.
        Decode { message: String } => "VK response could not be decoded: {message}",
    }
}

impl VkSourceError {
    /// Whether the same call may succeed later.
    ///
    /// # Examples
    /// ```
    /// use vk_monitor::domain::ports::VkSourceError;
    ///
    /// assert!(VkSourceError::api(6_i64, "Too many requests per second").is_retryable());
    /// assert!(!VkSourceError::api(15_i64, "Access denied").is_retryable());
    /// ```
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Api { code, .. } => RETRYABLE_VK_ERROR_CODES.contains(code),
            Self::Transport { .. } | Self::Timeout { .. } => true,
            Self::Decode { .. } => false,
        }
    }
}

/// Community as returned by `groups.getById`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VkGroup {
    /// Positive community id.
    pub id: i64,
    /// Short address.
    pub screen_name: String,
    /// Display name.
    pub name: String,
    /// `deleted` or `banned` when the community is gone.
    pub deactivated: Option<String>,
}

/// Wall post as returned by `wall.get`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VkPost {
    pub id: i64,
    pub owner_id: i64,
    pub text: String,
    pub comments_count: i64,
    /// Unix seconds.
    pub date: i64,
}

/// Wall comment as returned by `wall.getComments`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VkComment {
    pub id: i64,
    pub from_id: i64,
    pub text: String,
    /// Unix seconds.
    pub date: i64,
    /// Removed by the author or a moderator.
    pub deleted: bool,
}

/// One page of a paginated VK listing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VkPage<T> {
    /// Total items available across all pages.
    pub count: i64,
    /// Items on this page.
    pub items: Vec<T>,
}

impl<T> Default for VkPage<T> {
    fn default() -> Self {
        Self {
            count: 0,
            items: Vec::new(),
        }
    }
}

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait VkSource: Send + Sync {
    /// Resolve ids or screen names. Unknown references are omitted.
    async fn groups_by_ids(&self, keys: &[String]) -> Result<Vec<VkGroup>, VkSourceError>;

    /// Page through a wall, newest first.
    async fn wall_posts(
        &self,
        owner_id: i64,
        offset: u32,
        count: u32,
    ) -> Result<VkPage<VkPost>, VkSourceError>;

    /// Fetch one post, or `None` when it does not exist.
    async fn wall_post(&self, owner_id: i64, post_id: i64)
    -> Result<Option<VkPost>, VkSourceError>;

    /// Page through the top-level comments of a post, oldest first.
    async fn wall_comments(
        &self,
        owner_id: i64,
        post_id: i64,
        offset: u32,
        count: u32,
    ) -> Result<VkPage<VkComment>, VkSourceError>;
}
