//! State module for tracking job lifecycle and per-domain request pacing
//!
//! # Components
//!
//! - `JobStatus`: forward-only lifecycle of crawl and batch jobs
//! - `DomainState`: per-domain sliding window used by the rate limiter

mod domain_state;
mod job_state;

pub use domain_state::{DomainState, RatePolicy};
pub use job_state::JobStatus;
