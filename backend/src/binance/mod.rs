pub mod client;
pub mod rate_limit;

pub use client::BinanceClient;
pub use rate_limit::RateLimitTracker;
