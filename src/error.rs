//! Error handling for the decoder crate.

/// Main library error type.
#[derive(thiserror::Error, Debug)]
pub enum Error {
    /// Invalid setup: bad decoder parameters, unresolvable tokenization
    /// symbols, malformed language model files. Fatal, reported before any
    /// decoding starts.
    #[error("config error: {0}")]
    Config(String),

    /// The probability matrix does not have the shape the decoder expects.
    /// Fatal to the decode call that presented it.
    #[error("shape error: {0}")]
    Shape(String),

    /// A cooperative cancellation was observed between frames. No partial
    /// results are produced.
    #[error("decode cancelled")]
    Cancelled,

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Candle(#[from] candle::Error),
}

pub type Result<T> = std::result::Result<T, Error>;
