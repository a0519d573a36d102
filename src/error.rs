use thiserror::Error;

#[derive(Debug, Error)]
pub(crate) enum AppError {
    /// Forecast or other provider unreachable, non-2xx, or malformed.
    #[error("fetch failed: {0}")]
    Fetch(String),

    #[error("language model error: {0}")]
    Llm(String),

    /// Cannot open or authenticate the outbound transport. Aborts the batch.
    #[error("transport connection failed: {0}")]
    TransportConnect(String),

    /// One send or probe failed. The retrier absorbs these.
    #[error("transport error: {0}")]
    Transport(String),

    #[error("could not record prediction: {0}")]
    Persistence(String),

    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("configuration error: {0}")]
    Config(String),

    #[error("could not load recipients: {0}")]
    Recipients(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}
