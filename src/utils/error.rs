use std::net::IpAddr;
use thiserror::Error;
use uuid::Uuid;

use crate::capture::pcap_file::CaptureFileError;
use crate::capture::source::SourceError;

/// Application error types
#[derive(Error, Debug)]
pub enum AppError {
    /// Capture source could not be opened or failed mid-session
    #[error("Capture source error: {0}")]
    SourceError(#[from] SourceError),

    /// Error reading or writing a capture file
    #[error("Capture file error: {0}")]
    CaptureFileError(#[from] CaptureFileError),

    /// Error from I/O operations
    #[error("I/O error: {0}")]
    IoError(#[from] std::io::Error),

    /// Error from JSON serialization/deserialization
    #[error("JSON error: {0}")]
    JsonError(#[from] serde_json::Error),

    /// `start` while a session is active
    #[error("Capture is already running on {0}")]
    AlreadyRunning(String),

    /// `stop` or `join` with no session
    #[error("Capture is not running")]
    NotRunning,

    /// No packet with this id in the current store
    #[error("Packet with ID {0} not found")]
    UnknownPacket(u64),

    /// No conversation between these addresses in the current store
    #[error("No conversation from {from} to {to}")]
    UnknownConversation { from: IpAddr, to: IpAddr },

    /// No detail request with this id
    #[error("Detail request {0} not found")]
    UnknownRequest(Uuid),

    /// The detail worker pool has shut down
    #[error("Detail pipeline is not accepting requests")]
    PipelineClosed,

    /// Generic error
    #[error("{0}")]
    GenericError(String),
}

/// Result type for application
pub type AppResult<T> = Result<T, AppError>;
