//! Error taxonomy for session operations.

use std::path::PathBuf;

use thiserror::Error;

use crate::contract::{RemoteFailure, RemoteResponse};

/// Broad class of a [`SessionError`], used for reporting.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// No active session where one is required, or one exists where none is expected.
    Precondition,
    /// The part folder is unusable.
    Input,
    /// The persisted session record cannot be read back.
    CorruptState,
    /// The storage service call itself failed.
    Remote,
    /// The storage service answered with a non-confirming status.
    RemoteRejected,
    Io,
}

#[derive(Error, Debug)]
pub enum SessionError {
    #[error("No active multipart upload in progress!")]
    NoActiveSession,

    #[error("A multipart upload is already in progress for s3://{bucket}/{key}")]
    SessionAlreadyActive { bucket: String, key: String },

    #[error("{} is not a directory; pass in a folder containing the file parts", .0.display())]
    NotADirectory(PathBuf),

    #[error("Unable to find file parts in {}!", .0.display())]
    NoPartsFound(PathBuf),

    #[error("Part file {} has part number {part_number}, expected 1..=10000", .path.display())]
    InvalidPartNumber { path: PathBuf, part_number: String },

    #[error(
        "Part number {part_number} is claimed by both {} and {}",
        .first.display(),
        .second.display()
    )]
    DuplicatePartNumber {
        part_number: i32,
        first: PathBuf,
        second: PathBuf,
    },

    #[error("Session state at {} is corrupt: {reason}", .path.display())]
    CorruptState { path: PathBuf, reason: String },

    #[error("{operation} failed: {cause}")]
    Remote {
        operation: &'static str,
        cause: RemoteFailure,
    },

    #[error("{operation} was rejected with HTTP status {}", .response.status)]
    RemoteRejected {
        operation: &'static str,
        response: RemoteResponse,
    },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl SessionError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            SessionError::NoActiveSession | SessionError::SessionAlreadyActive { .. } => {
                ErrorKind::Precondition
            }
            SessionError::NotADirectory(_)
            | SessionError::NoPartsFound(_)
            | SessionError::InvalidPartNumber { .. }
            | SessionError::DuplicatePartNumber { .. } => ErrorKind::Input,
            SessionError::CorruptState { .. } => ErrorKind::CorruptState,
            SessionError::Remote { .. } => ErrorKind::Remote,
            SessionError::RemoteRejected { .. } => ErrorKind::RemoteRejected,
            SessionError::Io(_) => ErrorKind::Io,
        }
    }

    /// Raw service response, when the service answered but did not confirm.
    pub fn remote_response(&self) -> Option<&RemoteResponse> {
        match self {
            SessionError::RemoteRejected { response, .. } => Some(response),
            _ => None,
        }
    }
}
