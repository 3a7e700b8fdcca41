#![doc = "s3multipart-core: session state machine and bookkeeping for s3multipart."]

//! This crate holds all the logic of a resumable multi-part upload: part
//! discovery, the persisted session record and the state machine that moves a
//! session from `init` through `upload` to `finalize` or `abort`.
//! It has no storage-vendor dependency; the remote service is reached through
//! the [`contract::StorageClient`] trait.

pub mod contract;
pub mod error;
pub mod parts;
pub mod session;
pub mod state;

pub use contract::{
    CompletedPart, CreatedUpload, RemoteFailure, RemoteResponse, ServerSideEncryption,
    StorageClient, UploadTarget,
};
pub use error::{ErrorKind, SessionError};
pub use parts::{resolve_parts, PartFile};
pub use session::{
    MultipartUpload, PartProgress, SessionState, UploadOptions, UploadPlan, UploadReport,
};
pub use state::{
    FileSessionStore, MemorySessionStore, SessionStore, UploadSession, DEFAULT_STATE_FILE,
};
