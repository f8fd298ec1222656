pub mod candle_store;
pub mod collector;
pub mod price_cache;

// Re-export for convenient access (e.g. `use crate::market_data::Candle`).
pub use candle_store::{Candle, CandleStore};
pub use price_cache::PriceCache;
