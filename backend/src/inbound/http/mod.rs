//! HTTP inbound adapter exposing REST endpoints.

pub mod auth;
pub mod comments;
pub mod dashboard;
pub mod error;
pub mod groups;
pub mod health;
pub mod keywords;
pub mod posts;
pub mod schemas;
pub mod state;
pub mod tasks;
#[cfg(test)]
pub mod test_utils;
pub mod users;
pub mod validation;

pub use error::ApiResult;
