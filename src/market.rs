//! Symbol, timeframe and chart values handed to and built from the terminal.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::terminal::models::RateRow;

/// Instrument as known to the terminal.
///
/// Brokers often suffix symbols (`EURUSD.r`); range and tick queries use the full
/// name while position queries use the short one.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Symbol {
    pub name: String,
    pub full_name: String,
}

impl Symbol {
    pub fn new(name: impl Into<String>) -> Self {
        let name = name.into();
        Self {
            full_name: name.clone(),
            name,
        }
    }

    pub fn with_full_name(name: impl Into<String>, full_name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            full_name: full_name.into(),
        }
    }
}

impl std::fmt::Display for Symbol {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.full_name)
    }
}

/// Bar timeframe
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Timeframe {
    M1,
    M5,
    M15,
    M30,
    H1,
    H4,
    D1,
    W1,
    MN1,
}

impl Timeframe {
    pub const ALL: [Timeframe; 9] = [
        Timeframe::M1,
        Timeframe::M5,
        Timeframe::M15,
        Timeframe::M30,
        Timeframe::H1,
        Timeframe::H4,
        Timeframe::D1,
        Timeframe::W1,
        Timeframe::MN1,
    ];

    /// Terminal's TIMEFRAME_* constant
    pub fn terminal_code(&self) -> u32 {
        match self {
            Self::M1 => 1,
            Self::M5 => 5,
            Self::M15 => 15,
            Self::M30 => 30,
            Self::H1 => 0x4000 | 1,
            Self::H4 => 0x4000 | 4,
            Self::D1 => 0x4000 | 24,
            Self::W1 => 0x8000 | 1,
            Self::MN1 => 0x4000 | 0x8000 | 1,
        }
    }

    pub fn from_terminal_code(code: u32) -> Option<Self> {
        Self::ALL.into_iter().find(|tf| tf.terminal_code() == code)
    }

    /// Number of one-minute bars covered by one bar of this timeframe.
    pub fn included_m1(&self) -> i64 {
        match self {
            Self::M1 => 1,
            Self::M5 => 5,
            Self::M15 => 15,
            Self::M30 => 30,
            Self::H1 => 60,
            Self::H4 => 240,
            Self::D1 => 1_440,
            Self::W1 => 10_080,
            Self::MN1 => 43_200,
        }
    }

    pub fn bar_duration(&self) -> Duration {
        Duration::minutes(self.included_m1())
    }
}

impl std::fmt::Display for Timeframe {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::M1 => "M1",
            Self::M5 => "M5",
            Self::M15 => "M15",
            Self::M30 => "M30",
            Self::H1 => "H1",
            Self::H4 => "H4",
            Self::D1 => "D1",
            Self::W1 => "W1",
            Self::MN1 => "MN1",
        };
        write!(f, "{}", s)
    }
}

impl std::str::FromStr for Timeframe {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let upper = s.trim().to_uppercase();
        Self::ALL
            .into_iter()
            .find(|tf| tf.to_string() == upper)
            .ok_or_else(|| format!("unknown timeframe '{}'", s))
    }
}

/// One OHLCV bar
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Bar {
    pub time: DateTime<Utc>,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub tick_volume: u64,
    pub spread: i32,
    pub real_volume: u64,
}

impl Bar {
    /// Rows with an out-of-range timestamp are dropped by [`Chart::from_rates`].
    fn from_rate(row: &RateRow) -> Option<Self> {
        Some(Self {
            time: DateTime::from_timestamp(row.time, 0)?,
            open: row.open,
            high: row.high,
            low: row.low,
            close: row.close,
            tick_volume: row.tick_volume,
            spread: row.spread,
            real_volume: row.real_volume,
        })
    }
}

/// Bars of one symbol on one timeframe, oldest first.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Chart {
    pub symbol: String,
    pub timeframe: Timeframe,
    pub bars: Vec<Bar>,
}

impl Chart {
    pub fn empty(symbol: impl Into<String>, timeframe: Timeframe) -> Self {
        Self {
            symbol: symbol.into(),
            timeframe,
            bars: Vec::new(),
        }
    }

    /// Build a chart from raw terminal rows.
    pub fn from_rates(symbol: impl Into<String>, rows: &[RateRow], timeframe: Timeframe) -> Self {
        let mut bars: Vec<Bar> = rows.iter().filter_map(Bar::from_rate).collect();
        bars.sort_by_key(|b| b.time);
        Self {
            symbol: symbol.into(),
            timeframe,
            bars,
        }
    }

    pub fn len(&self) -> usize {
        self.bars.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bars.is_empty()
    }

    pub fn last(&self) -> Option<&Bar> {
        self.bars.last()
    }

    pub fn last_time(&self) -> Option<DateTime<Utc>> {
        self.last().map(|b| b.time)
    }
}
