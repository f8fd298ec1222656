// =============================================================================
// Shared types used across the signal relay
// =============================================================================

use serde::{Deserialize, Serialize};

/// Candle aggregation granularity. Only these three series are tracked.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Timeframe {
    #[serde(rename = "1h")]
    H1,
    #[serde(rename = "4h")]
    H4,
    #[serde(rename = "1d")]
    D1,
}

impl Timeframe {
    pub const ALL: [Timeframe; 3] = [Timeframe::H1, Timeframe::H4, Timeframe::D1];

    /// Binance kline interval string.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::H1 => "1h",
            Self::H4 => "4h",
            Self::D1 => "1d",
        }
    }
}

impl std::fmt::Display for Timeframe {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Direction of a trade signal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Side {
    Long,
    Short,
}

impl std::fmt::Display for Side {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Long => write!(f, "LONG"),
            Self::Short => write!(f, "SHORT"),
        }
    }
}

/// Coarse trend classification of a candle series.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Trend {
    Bullish,
    Bearish,
    Neutral,
}

impl std::fmt::Display for Trend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Bullish => write!(f, "bullish"),
            Self::Bearish => write!(f, "bearish"),
            Self::Neutral => write!(f, "neutral"),
        }
    }
}

/// A named entry condition. LONG and SHORT each require their own five.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Condition {
    PriceAtSupport,
    SupportLevelWorks,
    RsiFromOversold,
    VolumeDecreasingOnRed,
    MarketNotFalling,
    PriceAtResistance,
    ResistanceLevelWorks,
    RsiFromOverbought,
    VolumeDecreasingOnGreen,
    MarketNotPumping,
}

impl Condition {
    pub const LONG: [Condition; 5] = [
        Condition::PriceAtSupport,
        Condition::SupportLevelWorks,
        Condition::RsiFromOversold,
        Condition::VolumeDecreasingOnRed,
        Condition::MarketNotFalling,
    ];

    pub const SHORT: [Condition; 5] = [
        Condition::PriceAtResistance,
        Condition::ResistanceLevelWorks,
        Condition::RsiFromOverbought,
        Condition::VolumeDecreasingOnGreen,
        Condition::MarketNotPumping,
    ];

    /// The full condition set a side must satisfy to emit a signal.
    pub fn required_for(side: Side) -> &'static [Condition; 5] {
        match side {
            Side::Long => &Self::LONG,
            Side::Short => &Self::SHORT,
        }
    }

    /// Short subscriber-facing description.
    pub fn label(&self) -> &'static str {
        match self {
            Self::PriceAtSupport => "Price at support level",
            Self::SupportLevelWorks => "Proven support level",
            Self::RsiFromOversold => "RSI turning up from oversold",
            Self::VolumeDecreasingOnRed => "Selling volume fading",
            Self::MarketNotFalling => "Market not falling",
            Self::PriceAtResistance => "Price at resistance level",
            Self::ResistanceLevelWorks => "Proven resistance level",
            Self::RsiFromOverbought => "RSI turning down from overbought",
            Self::VolumeDecreasingOnGreen => "Buying volume fading",
            Self::MarketNotPumping => "Market not pumping",
        }
    }
}

/// Suggested position size, a step function of satisfied-condition count.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PositionSize {
    Large,
    Medium,
    Small,
    None,
}

impl PositionSize {
    pub fn from_condition_count(count: usize) -> Self {
        match count {
            5 => Self::Large,
            4 => Self::Medium,
            3 => Self::Small,
            _ => Self::None,
        }
    }
}

impl std::fmt::Display for PositionSize {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Large => write!(f, "15-20%"),
            Self::Medium => write!(f, "10-12%"),
            Self::Small => write!(f, "5-8%"),
            Self::None => write!(f, "0% (no signal)"),
        }
    }
}
