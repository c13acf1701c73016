mod auth;
pub use auth::{AUTH_TOKEN, extract_context_fn};

mod rate_limit;
pub use rate_limit::{RateLimiter, rate_limit_fn};
