pub mod client;
pub mod rate_limiter;
pub mod source;

pub use client::GitHubClient;
pub use rate_limiter::RateLimiter;
pub use source::{RepoSource, SimulatedSource};
