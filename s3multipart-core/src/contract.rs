#![allow(unused)]

//! # contract: interface to the remote object store
//!
//! This module defines the [`StorageClient`] trait and the plain data types that
//! cross it. The state machine in [`crate::session`] only ever talks to the
//! storage service through this trait, so the CLI can plug in the S3 SDK client
//! while tests plug in a `mockall` mock.
//!
//! ## Error contract
//! - A call that could not be carried out at all (transport failure, timeout,
//!   request construction) returns `Err(RemoteFailure)`.
//! - A call the service answered with a non-success HTTP status returns
//!   `Ok(RemoteResponse)` carrying that status and the raw payload, for the
//!   operations where the caller inspects confirmation (`complete`, `abort`).
//!
//! ## Mocking & Testing
//! - The trait is annotated for `mockall`; `MockStorageClient` is exported
//!   under the default `test-export-mocks` feature.

use std::fmt;
use std::path::Path;

use async_trait::async_trait;
use mockall::{automock, predicate::*};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Boxed error returned by storage client implementations.
pub type RemoteFailure = Box<dyn std::error::Error + Send + Sync>;

/// Server-side encryption requested when a session is created.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServerSideEncryption {
    Aes256,
}

impl ServerSideEncryption {
    pub fn as_str(&self) -> &'static str {
        match self {
            ServerSideEncryption::Aes256 => "AES256",
        }
    }
}

impl fmt::Display for ServerSideEncryption {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Identifies an open multi-part upload on the remote service.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadTarget {
    pub bucket: String,
    pub key: String,
    pub upload_id: String,
}

/// Result of opening a session remotely.
#[derive(Debug, Clone, PartialEq)]
pub struct CreatedUpload {
    /// Opaque handle for all later calls on this session.
    pub upload_id: String,
    /// Remaining fields of the creation response, stored alongside the session
    /// record as-is.
    pub fields: Map<String, Value>,
}

impl CreatedUpload {
    pub fn new(upload_id: impl Into<String>) -> Self {
        Self {
            upload_id: upload_id.into(),
            fields: Map::new(),
        }
    }
}

/// One transferred part as recorded in the session and submitted on completion.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompletedPart {
    #[serde(rename = "ETag")]
    pub e_tag: String,
    #[serde(rename = "PartNumber")]
    pub part_number: i32,
}

/// Raw outcome of a call whose success is judged by HTTP status.
#[derive(Debug, Clone, PartialEq)]
pub struct RemoteResponse {
    pub status: u16,
    pub payload: Value,
}

impl RemoteResponse {
    pub fn new(status: u16, payload: Value) -> Self {
        Self { status, payload }
    }

    /// Payload pretty-printed for operator output.
    pub fn pretty_payload(&self) -> String {
        serde_json::to_string_pretty(&self.payload).unwrap_or_else(|_| self.payload.to_string())
    }
}

/// Trait for the four remote operations of a multi-part upload.
///
/// Implementors own authentication and transport. All methods are async and
/// are awaited one at a time by the session state machine.
#[cfg_attr(any(test, feature = "test-export-mocks"), automock)]
#[async_trait]
pub trait StorageClient: Send + Sync {
    /// Open a new multi-part upload for `bucket`/`key` with the requested
    /// encryption at rest.
    async fn create_multipart_upload(
        &self,
        bucket: &str,
        key: &str,
        encryption: ServerSideEncryption,
    ) -> Result<CreatedUpload, RemoteFailure>;

    /// Transfer the bytes of the file at `body` as part `part_number`.
    /// Returns the ETag exactly as the service sent it.
    async fn upload_part(
        &self,
        target: &UploadTarget,
        part_number: i32,
        body: &Path,
    ) -> Result<String, RemoteFailure>;

    /// Ask the service to assemble `parts` into the final object.
    async fn complete_multipart_upload(
        &self,
        target: &UploadTarget,
        parts: Vec<CompletedPart>,
    ) -> Result<RemoteResponse, RemoteFailure>;

    /// Discard the upload and every part transferred so far.
    async fn abort_multipart_upload(
        &self,
        target: &UploadTarget,
    ) -> Result<RemoteResponse, RemoteFailure>;
}
