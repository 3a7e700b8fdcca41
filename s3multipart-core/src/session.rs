//! Upload session state machine: `init` → `plan`/`commit` (repeatable) → `finalize` | `abort`.
//!
//! [`MultipartUpload`] owns an injected [`SessionStore`] and [`StorageClient`]
//! and holds the current [`SessionState`] explicitly. Every operation opens
//! with a precondition check and fails with a typed error before any remote
//! call when the session is not in the required state.
//!
//! # Durability
//! After each transferred part the record is re-loaded from the store,
//! updated and saved again, so a crash between parts leaves every part
//! completed so far recorded. A failed part stops the remaining queue and
//! leaves the session active; running the upload again is safe.
//!
//! # Confirmation
//! Uploading is split in two calls. [`MultipartUpload::plan`] discovers the
//! parts without side effects; the caller shows the plan, asks for
//! confirmation, then hands it to [`MultipartUpload::commit`].
//!
//! Parts are transferred strictly one at a time.

use std::path::{Path, PathBuf};

use tracing::{error, info, warn};

use crate::contract::{CompletedPart, ServerSideEncryption, StorageClient};
use crate::error::SessionError;
use crate::parts::{resolve_parts, PartFile};
use crate::state::{SessionStore, UploadSession};

/// HTTP status confirming a completed upload.
pub const COMPLETE_CONFIRMED: u16 = 200;

/// HTTP status confirming an aborted upload.
pub const ABORT_CONFIRMED: u16 = 204;

/// Lifecycle position of the upload in this working directory.
#[derive(Debug, Clone, PartialEq)]
pub enum SessionState {
    NoSession,
    Active(UploadSession),
    Finalized { bucket: String, key: String },
    Aborted { bucket: String, key: String },
}

impl SessionState {
    pub fn is_active(&self) -> bool {
        matches!(self, SessionState::Active(_))
    }
}

/// One part of an [`UploadPlan`].
#[derive(Debug, Clone, PartialEq)]
pub struct PlannedPart {
    pub part: PartFile,
    /// Whether the session already records this part number.
    pub already_recorded: bool,
}

/// Parts discovered for an upload, in transfer order.
#[derive(Debug, Clone, PartialEq)]
pub struct UploadPlan {
    pub source: PathBuf,
    pub parts: Vec<PlannedPart>,
}

impl UploadPlan {
    pub fn total_bytes(&self) -> u64 {
        self.parts.iter().map(|p| p.part.size).sum()
    }

    pub fn already_recorded(&self) -> usize {
        self.parts.iter().filter(|p| p.already_recorded).count()
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct UploadOptions {
    /// Skip parts the session already records instead of transferring them again.
    pub skip_completed: bool,
}

/// Progress notifications emitted by [`MultipartUpload::commit`].
#[derive(Debug, Clone, Copy)]
pub enum PartProgress<'a> {
    Started {
        part: &'a PartFile,
        index: usize,
        total: usize,
    },
    Completed {
        part: &'a PartFile,
        e_tag: &'a str,
        index: usize,
        total: usize,
    },
    Skipped {
        part: &'a PartFile,
        index: usize,
        total: usize,
    },
}

/// Outcome of a successful [`MultipartUpload::commit`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UploadReport {
    pub uploaded: Vec<i32>,
    pub skipped: Vec<i32>,
    /// Number of parts the session records after the run.
    pub recorded: usize,
}

/// Strip the quote characters the service wraps ETags in.
pub fn strip_etag_quotes(e_tag: &str) -> String {
    e_tag.trim_matches('"').to_string()
}

/// The upload session state machine.
pub struct MultipartUpload<S, C> {
    store: S,
    client: C,
    state: SessionState,
}

impl<S, C> MultipartUpload<S, C>
where
    S: SessionStore,
    C: StorageClient,
{
    /// Read the store once and derive the starting state.
    pub fn open(store: S, client: C) -> Result<Self, SessionError> {
        let state = if store.exists() {
            SessionState::Active(store.load()?)
        } else {
            SessionState::NoSession
        };
        Ok(Self {
            store,
            client,
            state,
        })
    }

    pub fn state(&self) -> &SessionState {
        &self.state
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    /// The active session, or `NoActiveSession`.
    pub fn active(&self) -> Result<&UploadSession, SessionError> {
        match &self.state {
            SessionState::Active(session) => Ok(session),
            _ => Err(SessionError::NoActiveSession),
        }
    }

    /// Open a new upload for `bucket`/`key` and persist its record.
    pub async fn init(&mut self, bucket: &str, key: &str) -> Result<&UploadSession, SessionError> {
        if let SessionState::Active(existing) = &self.state {
            warn!(
                bucket = %existing.bucket,
                key = %existing.key,
                upload_id = %existing.upload_id,
                "Refusing to start a new upload while one is active"
            );
            return Err(SessionError::SessionAlreadyActive {
                bucket: existing.bucket.clone(),
                key: existing.key.clone(),
            });
        }

        info!(bucket, key, "Creating multipart upload");
        let created = self
            .client
            .create_multipart_upload(bucket, key, ServerSideEncryption::Aes256)
            .await
            .map_err(|cause| {
                error!(bucket, key, error = %cause, "create_multipart_upload failed");
                SessionError::Remote {
                    operation: "create_multipart_upload",
                    cause,
                }
            })?;

        let session = UploadSession::new(bucket, key, created);
        self.store.save(&session)?;
        info!(
            bucket,
            key,
            upload_id = %session.upload_id,
            "Started multipart upload"
        );

        self.state = SessionState::Active(session);
        self.active()
    }

    /// Discover the parts in `source` and mark those already recorded.
    pub fn plan(&self, source: &Path) -> Result<UploadPlan, SessionError> {
        let session = self.active()?;
        let parts = resolve_parts(source)?
            .into_iter()
            .map(|part| PlannedPart {
                already_recorded: session.has_part(part.part_number),
                part,
            })
            .collect();
        Ok(UploadPlan {
            source: source.to_path_buf(),
            parts,
        })
    }

    /// Transfer the planned parts in order, recording each one as it completes.
    pub async fn commit<F>(
        &mut self,
        plan: &UploadPlan,
        options: UploadOptions,
        mut progress: F,
    ) -> Result<UploadReport, SessionError>
    where
        F: FnMut(PartProgress<'_>),
    {
        let target = self.active()?.target();
        let total = plan.parts.len();
        let mut report = UploadReport::default();

        for (index, planned) in plan.parts.iter().enumerate() {
            let part = &planned.part;

            if options.skip_completed && planned.already_recorded {
                info!(part_number = part.part_number, file = %part.file_name, "Skipping recorded part");
                report.skipped.push(part.part_number);
                progress(PartProgress::Skipped { part, index, total });
                continue;
            }

            progress(PartProgress::Started { part, index, total });
            info!(
                upload_id = %target.upload_id,
                part_number = part.part_number,
                path = %part.path.display(),
                size = part.size,
                "Uploading part"
            );

            let raw_e_tag = self
                .client
                .upload_part(&target, part.part_number, &part.path)
                .await
                .map_err(|cause| {
                    error!(
                        part_number = part.part_number,
                        path = %part.path.display(),
                        error = %cause,
                        uploaded = report.uploaded.len(),
                        "upload_part failed, stopping"
                    );
                    SessionError::Remote {
                        operation: "upload_part",
                        cause,
                    }
                })?;
            let e_tag = strip_etag_quotes(&raw_e_tag);

            let mut record = self.store.load()?;
            record.record_part(CompletedPart {
                e_tag: e_tag.clone(),
                part_number: part.part_number,
            });
            self.store.save(&record)?;
            self.state = SessionState::Active(record);

            report.uploaded.push(part.part_number);
            progress(PartProgress::Completed {
                part,
                e_tag: &e_tag,
                index,
                total,
            });
        }

        report.recorded = self.active()?.parts.len();
        info!(
            uploaded = report.uploaded.len(),
            skipped = report.skipped.len(),
            recorded = report.recorded,
            "Upload run complete"
        );
        Ok(report)
    }

    /// Discard the upload remotely, then drop the local record.
    pub async fn abort(&mut self) -> Result<UploadSession, SessionError> {
        let session = self.active()?.clone();
        let response = self
            .client
            .abort_multipart_upload(&session.target())
            .await
            .map_err(|cause| {
                error!(upload_id = %session.upload_id, error = %cause, "abort_multipart_upload failed");
                SessionError::Remote {
                    operation: "abort_multipart_upload",
                    cause,
                }
            })?;

        if response.status != ABORT_CONFIRMED {
            warn!(
                upload_id = %session.upload_id,
                status = response.status,
                "Abort not confirmed, keeping session state"
            );
            return Err(SessionError::RemoteRejected {
                operation: "abort_multipart_upload",
                response,
            });
        }

        self.store.delete()?;
        info!(bucket = %session.bucket, key = %session.key, "Aborted multipart upload");
        self.state = SessionState::Aborted {
            bucket: session.bucket.clone(),
            key: session.key.clone(),
        };
        Ok(session)
    }

    /// Submit the recorded parts for assembly, then drop the local record.
    pub async fn finalize(&mut self) -> Result<UploadSession, SessionError> {
        let session = self.active()?.clone();
        if session.parts.is_empty() {
            warn!(upload_id = %session.upload_id, "Finalizing with no recorded parts");
        }

        let response = self
            .client
            .complete_multipart_upload(&session.target(), session.parts.clone())
            .await
            .map_err(|cause| {
                error!(upload_id = %session.upload_id, error = %cause, "complete_multipart_upload failed");
                SessionError::Remote {
                    operation: "complete_multipart_upload",
                    cause,
                }
            })?;

        if response.status != COMPLETE_CONFIRMED {
            warn!(
                upload_id = %session.upload_id,
                status = response.status,
                "Completion not confirmed, keeping session state"
            );
            return Err(SessionError::RemoteRejected {
                operation: "complete_multipart_upload",
                response,
            });
        }

        self.store.delete()?;
        info!(
            bucket = %session.bucket,
            key = %session.key,
            parts = session.parts.len(),
            "Finalized multipart upload"
        );
        self.state = SessionState::Finalized {
            bucket: session.bucket.clone(),
            key: session.key.clone(),
        };
        Ok(session)
    }
}
