//! Outbound adapters implementing domain ports for external infrastructure.
//!
//! - **auth**: Argon2 password hashing and HS256 token signing
//! - **cache**: Redis pool, refresh fingerprints and task status snapshots
//! - **persistence**: PostgreSQL repositories using Diesel
//! - **queue**: Redis-backed job queue
//! - **vk**: VK API client
//!
//! Adapters translate between domain types and infrastructure
//! representations. They contain no business logic.

pub mod auth;
pub mod cache;
pub mod persistence;
pub mod queue;
pub mod vk;
