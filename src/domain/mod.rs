//! Domain layer - value types with no knowledge of storage or scheduling.
//!
//! - Thresholds and request-rate parsing
//! - Rules, actions and reasons
//! - Requests and their outcomes
//! - Resolved client addresses
//! - Per-client counters
//! - Token buckets used for throttling

pub mod address;
pub mod counts;
pub mod request;
pub mod rule;
pub mod threshold;
pub mod token_bucket;
