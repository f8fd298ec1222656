pub mod analyzer;
#[cfg(test)]
pub mod fixtures;
pub mod levels;
pub mod setup;
pub mod signal;
pub mod trend;

pub use analyzer::{has_enough_history, Analyzer, AnalyzerConfig, SeriesSet};
pub use signal::Signal;
