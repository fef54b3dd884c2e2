//! Retry domain - bounded exponential backoff for model calls

mod executor;
mod policy;

pub use executor::{RetryExecutor, RetryLabel};
pub use policy::{RetryPolicy, StatusCoded};
