//! Order-type catalog

use serde::{Deserialize, Serialize};

use crate::error::UnknownOrderType;
use crate::terminal::{
    ORDER_TYPE_BUY, ORDER_TYPE_BUY_LIMIT, ORDER_TYPE_SELL, ORDER_TYPE_SELL_LIMIT,
    TRADE_ACTION_DEAL, TRADE_ACTION_PENDING,
};

/// Order direction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Direction {
    Buy,
    Sell,
}

impl std::fmt::Display for Direction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Buy => write!(f, "BUY"),
            Self::Sell => write!(f, "SELL"),
        }
    }
}

/// The order types this layer can submit
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum OrderKind {
    BuyLimit,
    BuyMarket,
    SellLimit,
    SellMarket,
}

impl OrderKind {
    pub const ALL: [OrderKind; 4] = [
        OrderKind::BuyLimit,
        OrderKind::BuyMarket,
        OrderKind::SellLimit,
        OrderKind::SellMarket,
    ];

    pub fn direction(&self) -> Direction {
        match self {
            Self::BuyLimit | Self::BuyMarket => Direction::Buy,
            Self::SellLimit | Self::SellMarket => Direction::Sell,
        }
    }

    /// Display name, also the lookup key for [`OrderKind::by_name`].
    pub fn name(&self) -> &'static str {
        match self {
            Self::BuyLimit => "Buy Limit",
            Self::BuyMarket => "Buy Market",
            Self::SellLimit => "Sell Limit",
            Self::SellMarket => "Sell Market",
        }
    }

    /// Terminal ORDER_TYPE_* code
    pub fn terminal_type(&self) -> u32 {
        match self {
            Self::BuyLimit => ORDER_TYPE_BUY_LIMIT,
            Self::BuyMarket => ORDER_TYPE_BUY,
            Self::SellLimit => ORDER_TYPE_SELL_LIMIT,
            Self::SellMarket => ORDER_TYPE_SELL,
        }
    }

    /// Terminal TRADE_ACTION_* code
    pub fn terminal_action(&self) -> u32 {
        match self {
            Self::BuyLimit | Self::SellLimit => TRADE_ACTION_PENDING,
            Self::BuyMarket | Self::SellMarket => TRADE_ACTION_DEAL,
        }
    }

    pub fn is_buy(&self) -> bool {
        self.direction() == Direction::Buy
    }

    pub fn is_sell(&self) -> bool {
        self.direction() == Direction::Sell
    }

    pub fn is_pending(&self) -> bool {
        self.terminal_action() == TRADE_ACTION_PENDING
    }

    pub fn names() -> Vec<&'static str> {
        Self::ALL.iter().map(|k| k.name()).collect()
    }

    /// Exact, case-sensitive match on the display name.
    pub fn by_name(name: &str) -> Result<Self, UnknownOrderType> {
        Self::ALL
            .into_iter()
            .find(|k| k.name() == name)
            .ok_or_else(|| UnknownOrderType {
                name: name.to_string(),
            })
    }
}

impl std::fmt::Display for OrderKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name())
    }
}

impl std::str::FromStr for OrderKind {
    type Err = UnknownOrderType;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::by_name(s)
    }
}
