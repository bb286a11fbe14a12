use tandem_types::models::MessageType;

#[derive(Debug, thiserror::Error)]
pub enum ChatError {
    #[error("message {0} not found")]
    NotFound(i64),

    #[error("operation not permitted for this user")]
    Forbidden,

    /// A stored column could not be decoded.
    #[error("malformed stored state: {0}")]
    MalformedState(String),

    #[error("messages of type {0} cannot be sent")]
    Unsendable(MessageType),

    #[error(transparent)]
    Storage(#[from] anyhow::Error),
}
