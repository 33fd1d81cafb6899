//! Configuration for the terminal client and the market-data streamer

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Polling parameters for the market-data streamer
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StreamConfig {
    /// Delay between refetches
    pub poll_interval: Duration,

    /// Bars refetched on each poll. More new bars than this between two polls
    /// are lost.
    pub refetch_window: usize,

    /// Bars yielded on activation
    pub history_count: usize,

    /// Position the fetch window ends at (1 skips the still-forming bar)
    pub start_pos: usize,
}

impl Default for StreamConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_secs(5),
            refetch_window: 5,
            history_count: 100,
            start_pos: 1,
        }
    }
}

/// Configuration for [`TerminalClient`](crate::client::TerminalClient)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClientConfig {
    /// Maximum price deviation (points) attached to every order
    pub deviation: u32,

    pub stream: StreamConfig,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            deviation: 10,
            stream: StreamConfig::default(),
        }
    }
}

impl ClientConfig {
    /// Load configuration from environment variables
    ///
    /// Every variable is optional and falls back to the default:
    /// - `MT5_DEVIATION` - order price deviation in points
    /// - `MT5_POLL_INTERVAL_SECS` - streamer poll interval
    /// - `MT5_REFETCH_WINDOW` - bars refetched per poll
    /// - `MT5_HISTORY_COUNT` - bars yielded on stream activation
    pub fn from_env() -> Result<Self> {
        let mut config = Self::default();

        if let Some(v) = env_parse::<u32>("MT5_DEVIATION")? {
            config.deviation = v;
        }
        if let Some(v) = env_parse::<u64>("MT5_POLL_INTERVAL_SECS")? {
            config.stream.poll_interval = Duration::from_secs(v);
        }
        if let Some(v) = env_parse::<usize>("MT5_REFETCH_WINDOW")? {
            config.stream.refetch_window = v;
        }
        if let Some(v) = env_parse::<usize>("MT5_HISTORY_COUNT")? {
            config.stream.history_count = v;
        }

        Ok(config)
    }
}

fn env_parse<T>(key: &str) -> Result<Option<T>>
where
    T: std::str::FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match std::env::var(key) {
        Ok(raw) => raw
            .trim()
            .parse::<T>()
            .map(Some)
            .with_context(|| format!("{} must be a valid number, got '{}'", key, raw)),
        Err(_) => Ok(None),
    }
}
