use thiserror::Error;

/// Common error types for the application.
#[derive(Error, Debug, PartialEq)]
pub enum CommonError {
    /// Represents a transient transport failure (refused, reset, timeout).
    #[error("Transport error: {0}")]
    Transport(String),

    /// Represents a failed subscription handshake with an exchange feed.
    #[error("Subscribe error: {0}")]
    Subscribe(String),

    /// Represents a malformed or unexpected message from an exchange feed.
    #[error("Decode error: {0}")]
    Decode(String),

    /// Represents an invalid configuration.
    #[error("Invalid configuration: {0}")]
    InvalidConfiguration(String),

    /// Represents a feed whose reconnect budget is exhausted.
    #[error("Feed unavailable: {0}")]
    FeedUnavailable(String),

    /// Represents a closed channel between pipeline stages.
    #[error("Channel closed: {0}")]
    ChannelClosed(String),
}
