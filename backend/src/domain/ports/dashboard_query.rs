//! Driving port for dashboard statistics.
use async_trait::async_trait;

use crate::domain::{DashboardStats, Error};

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait DashboardQuery: Send + Sync {
    /// Aggregate counts across every store.
    async fn stats(&self) -> Result<DashboardStats, Error>;
}
