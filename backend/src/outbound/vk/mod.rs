//! VK API outbound adapter implementing the `VkSource` port.

mod dto;
mod http_source;

pub use http_source::{DEFAULT_API_VERSION, DEFAULT_MIN_INTERVAL, Throttle, VkHttpConfig, VkHttpSource};
