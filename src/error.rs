//! Error types raised inside the terminal layer.
//!
//! Nothing here reaches callers of [`TerminalClient`](crate::client::TerminalClient)
//! directly: the call guard folds every [`TerminalError`] into a
//! [`TerminalResult`](crate::result::TerminalResult).

/// Failure raised by an operation body while talking to the terminal.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum TerminalError {
    /// The terminal returned nothing and its last error is not a success.
    #[error("{message}")]
    Io { message: String, code: i32 },
}

impl TerminalError {
    pub fn io(message: impl Into<String>, code: i32) -> Self {
        Self::Io {
            message: message.into(),
            code,
        }
    }
}

/// Order-type lookup by a name that is not in the catalog.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown order type '{name}'")]
pub struct UnknownOrderType {
    pub name: String,
}
