//! # Herold Reliability Primitives
//!
//! Delivery reliability building blocks used by every channel worker:
//! exponential backoff with jitter and a token-bucket admission controller.
//! Both are plain synchronous state machines; callers supply the clock and
//! the random source so behavior is reproducible under test.

pub mod rate_limit;
pub mod retry;

pub use rate_limit::{AdmitResult, Admission, LimiterStatistics, RateLimiter};
pub use retry::RetryPolicy;
