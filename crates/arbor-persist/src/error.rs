use thiserror::Error;

#[derive(Error, Debug)]
pub enum PersistError {
    #[error("Database error: {0}")]
    Database(#[from] mongodb::error::Error),

    #[error("Conversation not found: {0}")]
    ConversationNotFound(String),

    #[error("Parent message not found: {0}")]
    ParentNotFound(String),

    #[error("Duplicate message id: {0}")]
    DuplicateMessage(String),

    #[error("Connection error: {0}")]
    Connection(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

pub type Result<T> = std::result::Result<T, PersistError>;

/// MongoDB duplicate-key write failures map to `DuplicateMessage` at the
/// call sites that insert messages.
pub(crate) fn is_duplicate_key(err: &mongodb::error::Error) -> bool {
    use mongodb::error::{ErrorKind, WriteFailure};

    match err.kind.as_ref() {
        ErrorKind::Write(WriteFailure::WriteError(write_error)) => write_error.code == 11000,
        _ => false,
    }
}
