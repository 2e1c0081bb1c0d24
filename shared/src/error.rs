use thiserror::Error;

/// Errors that abort decoding of a single action request.
///
/// A request that fails to decode is dropped whole; nothing from it is
/// applied.
#[derive(Debug, Error)]
pub enum DecodeError {
    /// Data ended early or a field held bytes its type can't represent
    #[error("action request is truncated or malformed: {0}")]
    Malformed(#[from] bincode::Error),

    #[error("unknown action request kind {0}")]
    UnknownKind(u8),

    /// The sender runs a layout this peer doesn't understand
    #[error("action request kind {kind} has unsupported wire version {version}")]
    UnsupportedVersion { kind: u8, version: u8 },

    #[error("unknown target selector tag {0}")]
    UnknownTarget(u8),

    #[error("unknown peer predicate {0}")]
    UnknownPredicate(u8),

    #[error("{0} unexpected trailing bytes after action request")]
    TrailingBytes(usize),
}

/// Why a purchase could not be taken from a stock counter
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StockError {
    #[error("purchase amount must be positive, got {0}")]
    InvalidAmount(i32),

    #[error("only {available} left")]
    Insufficient { available: i32 },
}
