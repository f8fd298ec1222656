// =============================================================================
// Technical Indicators Module
// =============================================================================
//
// Pure, side-effect-free indicator functions. Every public function returns
// `Option<T>` so callers must handle insufficient data.

pub mod ema;
pub mod rsi;
