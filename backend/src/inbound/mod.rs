//! Inbound adapters that translate external requests into domain service
//! calls while keeping framework details at the edge.
//!
//! HTTP handlers live under [`http`]; the queue consumer lives in
//! [`worker`].

pub mod http;
pub mod worker;
