//! API handlers module

pub mod auth;
pub mod finance;
pub mod health;
pub mod lessons;
pub mod rent;
pub mod students;
pub mod subscriptions;

use serde::Deserialize;

/// Common skip/limit pagination query parameters
#[derive(Debug, Deserialize)]
pub struct Pagination {
    #[serde(default)]
    pub skip: u64,
    #[serde(default = "default_limit")]
    pub limit: u64,
}

fn default_limit() -> u64 {
    100
}

impl Pagination {
    /// Effective limit, capped to keep list responses bounded
    pub fn limit(&self) -> u64 {
        self.limit.min(500)
    }
}
