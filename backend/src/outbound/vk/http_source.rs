//! Reqwest-backed VK API adapter.
//!
//! This adapter owns transport details only: the shared call throttle,
//! query parameters, timeout and HTTP error mapping, and decoding of the
//! `response`/`error` envelope into domain records.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, StatusCode, Url};
use serde::de::DeserializeOwned;
use tokio::sync::Mutex;
use tokio::time::Instant;
use tracing::debug;
use zeroize::Zeroizing;

use super::dto::{
    CommentDto, EnvelopeDto, GroupsResponseDto, ListDto, PostDto, PostsByIdDto,
};
use crate::domain::ports::{VkComment, VkGroup, VkPage, VkPost, VkSource, VkSourceError};

/// Default pause between two VK calls, about three requests per second.
pub const DEFAULT_MIN_INTERVAL: Duration = Duration::from_millis(350);
/// API version sent with every call.
pub const DEFAULT_API_VERSION: &str = "5.199";
/// Largest `group_ids` batch `groups.getById` accepts.
const GROUPS_BATCH: usize = 500;
/// VK rejects the whole `groups.getById` call when no reference resolves.
const INVALID_PARAMETER: i64 = 100;

/// Connection settings for [`VkHttpSource`].
pub struct VkHttpConfig {
    /// Base URL, e.g. `https://api.vk.com/method`.
    pub api_url: Url,
    /// Service or user access token.
    pub access_token: Zeroizing<String>,
    /// API version.
    pub version: String,
    /// Minimum spacing between calls from this process.
    pub min_interval: Duration,
    /// Per-request timeout.
    pub timeout: Duration,
}

/// Serialises calls so consecutive requests start at least `interval` apart.
#[derive(Debug)]
pub struct Throttle {
    interval: Duration,
    last_call: Mutex<Option<Instant>>,
}

impl Throttle {
    /// Create a throttle with the given spacing.
    pub fn new(interval: Duration) -> Self {
        Self {
            interval,
            last_call: Mutex::new(None),
        }
    }

    /// Wait for this caller's slot.
    pub async fn wait(&self) {
        let mut last_call = self.last_call.lock().await;
        if let Some(previous) = *last_call {
            let ready_at = previous + self.interval;
            if ready_at > Instant::now() {
                tokio::time::sleep_until(ready_at).await;
            }
        }
        *last_call = Some(Instant::now());
    }
}

/// VK source that performs throttled HTTP GET requests.
pub struct VkHttpSource {
    client: Client,
    api_url: Url,
    access_token: Zeroizing<String>,
    version: String,
    throttle: Throttle,
}

impl VkHttpSource {
    /// Build an adapter using a reqwest client with an explicit timeout.
    ///
    /// # Errors
    ///
    /// Returns an error when the reqwest client cannot be constructed.
    pub fn new(config: VkHttpConfig) -> Result<Self, reqwest::Error> {
        let client = Client::builder().timeout(config.timeout).build()?;
        Ok(Self {
            client,
            api_url: config.api_url,
            access_token: config.access_token,
            version: config.version,
            throttle: Throttle::new(config.min_interval),
        })
    }

    fn method_url(&self, method: &str) -> Url {
        let mut url = self.api_url.clone();
        let base = url.path().trim_end_matches('/').to_owned();
        url.set_path(&format!("{base}/{method}"));
        url
    }

    async fn call<T: DeserializeOwned>(
        &self,
        method: &str,
        params: &[(&str, String)],
    ) -> Result<T, VkSourceError> {
        self.throttle.wait().await;
        debug!(method, "calling VK API");

        let response = self
            .client
            .get(self.method_url(method))
            .query(&[
                ("access_token", self.access_token.as_str()),
                ("v", self.version.as_str()),
            ])
            .query(params)
            .send()
            .await
            .map_err(map_transport_error)?;

        let status = response.status();
        let body = response.bytes().await.map_err(map_transport_error)?;
        if !status.is_success() {
            return Err(map_status_error(status, body.as_ref()));
        }
        decode_envelope(method, body.as_ref())
    }
}

fn decode_envelope<T: DeserializeOwned>(method: &str, body: &[u8]) -> Result<T, VkSourceError> {
    let envelope: EnvelopeDto<T> = serde_json::from_slice(body).map_err(|error| {
        VkSourceError::decode(format!("invalid {method} payload: {error}"))
    })?;
    match (envelope.response, envelope.error) {
        (_, Some(error)) => Err(VkSourceError::api(error.error_code, error.error_msg)),
        (Some(response), None) => Ok(response),
        (None, None) => Err(VkSourceError::decode(format!(
            "{method} returned neither response nor error"
        ))),
    }
}

#[async_trait]
impl VkSource for VkHttpSource {
    async fn groups_by_ids(&self, keys: &[String]) -> Result<Vec<VkGroup>, VkSourceError> {
        let mut groups = Vec::with_capacity(keys.len());
        for batch in keys.chunks(GROUPS_BATCH) {
            let params = [("group_ids", batch.join(","))];
            match self.call::<GroupsResponseDto>("groups.getById", &params).await {
                Ok(response) => groups.extend(response.into_domain()),
                Err(VkSourceError::Api { code, .. }) if code == INVALID_PARAMETER => {}
                Err(error) => return Err(error),
            }
        }
        Ok(groups)
    }

    async fn wall_posts(
        &self,
        owner_id: i64,
        offset: u32,
        count: u32,
    ) -> Result<VkPage<VkPost>, VkSourceError> {
        let params = [
            ("owner_id", owner_id.to_string()),
            ("offset", offset.to_string()),
            ("count", count.to_string()),
        ];
        let list: ListDto<PostDto> = self.call("wall.get", &params).await?;
        Ok(list.into_page(PostDto::into_domain))
    }

    async fn wall_post(
        &self,
        owner_id: i64,
        post_id: i64,
    ) -> Result<Option<VkPost>, VkSourceError> {
        let params = [("posts", format!("{owner_id}_{post_id}"))];
        let posts: PostsByIdDto = self.call("wall.getById", &params).await?;
        Ok(posts.into_first())
    }

    async fn wall_comments(
        &self,
        owner_id: i64,
        post_id: i64,
        offset: u32,
        count: u32,
    ) -> Result<VkPage<VkComment>, VkSourceError> {
        let params = [
            ("owner_id", owner_id.to_string()),
            ("post_id", post_id.to_string()),
            ("offset", offset.to_string()),
            ("count", count.to_string()),
            ("sort", "asc".to_owned()),
        ];
        let list: ListDto<CommentDto> = self.call("wall.getComments", &params).await?;
        Ok(list.into_page(CommentDto::into_domain))
    }
}

fn map_transport_error(error: reqwest::Error) -> VkSourceError {
    // Strip the URL; it carries the access token.
    let error = error.without_url();
    if error.is_timeout() {
        VkSourceError::timeout(error.to_string())
    } else {
        VkSourceError::transport(error.to_string())
    }
}

fn map_status_error(status: StatusCode, body: &[u8]) -> VkSourceError {
    let message = format!("status {}: {}", status.as_u16(), body_preview(body));
    match status {
        StatusCode::REQUEST_TIMEOUT | StatusCode::GATEWAY_TIMEOUT => VkSourceError::timeout(message),
        StatusCode::TOO_MANY_REQUESTS => VkSourceError::transport(message),
        _ if status.is_server_error() => VkSourceError::transport(message),
        _ => VkSourceError::decode(message),
    }
}

fn body_preview(body: &[u8]) -> String {
    const PREVIEW_CHAR_LIMIT: usize = 160;

    let compact = String::from_utf8_lossy(body)
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ");
    if compact.chars().count() > PREVIEW_CHAR_LIMIT {
        let preview: String = compact.chars().take(PREVIEW_CHAR_LIMIT).collect();
        format!("{preview}...")
    } else {
        compact
    }
}
