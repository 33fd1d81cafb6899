//! Result envelope returned by every terminal operation.

use serde::{Deserialize, Serialize};

use crate::terminal::RES_S_OK;

/// Terminal's own error state, as reported by `last_error`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LastError {
    pub code: i32,
    pub message: String,
}

impl LastError {
    pub fn new(code: i32, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }

    /// The terminal reports success as code 1, not 0.
    pub fn has_error(&self) -> bool {
        self.code != RES_S_OK
    }
}

impl std::fmt::Display for LastError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "HasError: {} Message: {} ResultCode: {}",
            self.has_error(),
            self.message,
            self.code
        )
    }
}

/// Uniform envelope around a terminal call.
///
/// `result` is present when the call succeeded or partially succeeded, e.g. a
/// rejected order still carries the terminal's send result.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TerminalResult<T> {
    pub has_error: bool,
    pub message: String,
    pub result_code: i32,
    pub result: Option<T>,
}

impl<T> TerminalResult<T> {
    /// Envelope whose error state mirrors the terminal's last error.
    pub fn from_last_error(last_error: LastError, result: Option<T>) -> Self {
        Self {
            has_error: last_error.has_error(),
            message: last_error.message,
            result_code: last_error.code,
            result,
        }
    }

    /// Success envelope not tied to a terminal query.
    pub fn success(result: T) -> Self {
        Self {
            has_error: false,
            message: "Success".to_string(),
            result_code: RES_S_OK,
            result: Some(result),
        }
    }

    /// Error envelope with an explicit message and code.
    pub fn failure(message: impl Into<String>, result_code: i32, result: Option<T>) -> Self {
        Self {
            has_error: true,
            message: message.into(),
            result_code,
            result,
        }
    }

    pub fn is_ok(&self) -> bool {
        !self.has_error
    }

    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> TerminalResult<U> {
        TerminalResult {
            has_error: self.has_error,
            message: self.message,
            result_code: self.result_code,
            result: self.result.map(f),
        }
    }

    /// Drop the payload, keeping the error state.
    pub fn without_result<U>(self) -> TerminalResult<U> {
        TerminalResult {
            has_error: self.has_error,
            message: self.message,
            result_code: self.result_code,
            result: None,
        }
    }
}

/// Best bid/ask at the time of the query.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TickSnapshot {
    pub bid: f64,
    pub ask: f64,
}

impl TickSnapshot {
    pub fn spread(&self) -> f64 {
        self.ask - self.bid
    }
}
