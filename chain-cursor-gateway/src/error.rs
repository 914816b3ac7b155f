use chain_cursor_connector::SyncError;
use thiserror::Error;
use tonic::Status;

/// Defines the primary error types for the gRPC gateway.
#[derive(Error, Debug)]
pub enum GatewayError {
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// The notifier stopped; this stream cannot continue.
    #[error("Cursor stream stopped: {0}")]
    Stopped(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl From<SyncError> for GatewayError {
    fn from(err: SyncError) -> Self {
        match err {
            SyncError::InvalidStart { .. } => GatewayError::InvalidArgument(err.to_string()),
            SyncError::Stopped | SyncError::Cancelled => GatewayError::Stopped(err.to_string()),
            other => GatewayError::Internal(other.to_string()),
        }
    }
}

/// Allows automatic conversion from our custom `GatewayError` into a `tonic::Status`.
impl From<GatewayError> for Status {
    fn from(err: GatewayError) -> Self {
        match err {
            GatewayError::InvalidArgument(reason) => Status::invalid_argument(reason),
            GatewayError::Stopped(reason) => Status::cancelled(reason),
            GatewayError::Internal(reason) => Status::internal(reason),
        }
    }
}
