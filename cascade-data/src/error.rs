use crate::model::{
    ExchangeId, codec::CodecError, decimal::PackError, symbol::SymbolTableFull,
};
use cascade_integration::error::SocketError;
use thiserror::Error;

/// All errors generated in `cascade-data`.
#[derive(Debug, Clone, Eq, PartialEq, Error)]
pub enum DataError {
    #[error("SocketError: {0}")]
    Socket(String),

    #[error("failed to decode {exchange} message: {reason}")]
    Malformed {
        exchange: ExchangeId,
        reason: String,
    },

    #[error("unrepresentable {field}: {error}")]
    Pack {
        field: &'static str,
        error: PackError,
    },

    #[error("codec: {0}")]
    Codec(#[from] CodecError),

    #[error("{0}")]
    SymbolTable(#[from] SymbolTableFull),

    #[error("invalid {exchange} configuration: {reason}")]
    Config {
        exchange: ExchangeId,
        reason: String,
    },

    #[error("market context unavailable: {0}")]
    ContextUnavailable(String),
}

impl DataError {
    /// Determine if an error requires an adapter to tear down its connection & reconnect.
    #[allow(clippy::match_like_matches_macro)]
    pub fn is_terminal(&self) -> bool {
        match self {
            DataError::Socket(error_msg) => {
                let error_lower = error_msg.to_lowercase();
                error_lower.contains("terminated")
                    || error_lower.contains("connectionclosed")
                    || error_lower.contains("alreadyclosed")
                    || error_lower.contains("sendafterclosing")
                    || error_lower.contains("io(")
                    || error_lower.contains("timeout")
            }
            _ => false,
        }
    }
}

impl From<SocketError> for DataError {
    fn from(value: SocketError) -> Self {
        Self::Socket(value.to_string())
    }
}
