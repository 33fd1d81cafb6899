// Library crate - guarded access to a MetaTrader-5 style trading terminal

pub mod client;
pub mod config;
pub mod error;
pub mod market;
pub mod order_type;
pub mod result;
pub mod stream;
pub mod terminal;

// Re-export commonly used types
pub use client::{OrderParams, RangeOptions, TerminalClient};
pub use config::{ClientConfig, StreamConfig};
pub use error::{TerminalError, UnknownOrderType};
pub use market::{Bar, Chart, Symbol, Timeframe};
pub use order_type::{Direction, OrderKind};
pub use result::{LastError, TerminalResult, TickSnapshot};
pub use stream::{stream_market_data, stream_multiple_market_data, MarketDataPoller};
pub use terminal::{ReplayTerminal, Terminal};
