use thiserror::Error;

#[derive(Error, Debug)]
pub enum GenError {
    #[error("failed to connect to generation service: {0}")]
    Connect(#[from] tonic::transport::Error),

    #[error("generation call failed: {0}")]
    Call(tonic::Status),

    #[error("generation stream error: {0}")]
    Transport(tonic::Status),

    #[error("failed to encode generation request: {0}")]
    Encode(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, GenError>;
