//! # s3multipart CLI Interface
//!
//! Command parsing, user prompts and console output for s3multipart.
//! Each subcommand maps to exactly one transition of the upload session; all
//! session logic lives in the `s3multipart-core` crate.
//!
//! - [`Cli`] / [`Commands`] define the user-facing surface.
//! - [`run`] builds the real S3 client and dispatches; it is also the entry
//!   point for integration tests.
//! - [`run_with_client`] dispatches against any store/client pair, which lets
//!   tests drive the full command flow with mocks.

use crate::load_config::load_config;
use crate::storage::S3Client;
use anyhow::Result;
use clap::{Parser, Subcommand};
use s3multipart_core::contract::StorageClient;
use s3multipart_core::session::{MultipartUpload, PartProgress, UploadOptions, UploadPlan};
use s3multipart_core::state::{FileSessionStore, SessionStore};
use s3multipart_core::SessionError;
use std::io::{self, BufRead, Write};
use std::path::PathBuf;

/// CLI for s3multipart: resumable multi-part uploads of pre-split files.
#[derive(Parser)]
#[clap(
    name = "s3multipart",
    version,
    about = "Upload a pre-split file to S3 as a resumable multipart upload"
)]
pub struct Cli {
    /// Path of the session state file [default: multipart.json]
    #[clap(long, global = true)]
    pub state_file: Option<PathBuf>,

    /// Path to a YAML config file
    #[clap(long, global = true)]
    pub config: Option<PathBuf>,

    #[clap(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug, Clone)]
pub enum Commands {
    /// Start a new multipart upload; its metadata is saved to the state file
    Init {
        /// Target bucket
        bucket: String,
        /// Target object key
        key: String,
    },
    /// Upload every numbered part file (.01, .02, ...) found in SOURCE_FOLDER
    Upload {
        /// Folder containing the part files
        source_folder: PathBuf,
        /// Do not ask for confirmation before uploading
        #[clap(long, short)]
        yes: bool,
        /// Skip parts already recorded in the state file
        #[clap(long)]
        skip_completed: bool,
    },
    /// Abort the multipart upload and discard uploaded parts
    Abort,
    /// Finalize the multipart upload and create the object
    Finalize,
    /// Show the active multipart upload and its recorded parts
    Status,
}

impl Commands {
    fn name(&self) -> &'static str {
        match self {
            Commands::Init { .. } => "init",
            Commands::Upload { .. } => "upload",
            Commands::Abort => "abort",
            Commands::Finalize => "finalize",
            Commands::Status => "status",
        }
    }
}

/// Extracted async CLI logic entrypoint for integration tests and main()
pub async fn run(cli: Cli) -> Result<()> {
    // Emit a top-level 'trace_initialised' event at the very start
    tracing::info!("trace_initialised");

    let config = load_config(cli.config.as_deref())?;
    let store = FileSessionStore::new(config.state_file(cli.state_file.clone()));
    tracing::info!(
        command = cli.command.name(),
        state_file = %store.path().display(),
        "Dispatching command"
    );

    // Commands that need an active session fail here, before any client or
    // credential lookup happens.
    match &cli.command {
        Commands::Init { .. } => {}
        Commands::Status => return show_status(&store),
        _ if !store.exists() => {
            tracing::error!(command = cli.command.name(), "No active multipart upload");
            return Err(SessionError::NoActiveSession.into());
        }
        _ => {}
    }

    let client = S3Client::new(&config.storage).await;
    run_with_client(cli.command, store, client, confirm_on_stdin).await
}

/// Dispatch `command` against the given store and client.
///
/// `confirm` is asked before any part is transferred; returning `false`
/// cancels the upload with no side effect.
pub async fn run_with_client<S, C, F>(
    command: Commands,
    store: S,
    client: C,
    mut confirm: F,
) -> Result<()>
where
    S: SessionStore,
    C: StorageClient,
    F: FnMut(&UploadPlan) -> io::Result<bool>,
{
    let name = command.name();
    let mut upload = MultipartUpload::open(store, client)?;

    let result = match command {
        Commands::Init { bucket, key } => upload.init(&bucket, &key).await.map(|session| {
            println!("Started multipart upload for {}", session.location());
        }),
        Commands::Upload {
            source_folder,
            yes,
            skip_completed,
        } => match upload.plan(&source_folder) {
            Err(e) => Err(e),
            Ok(plan) => {
                print_plan(&plan);
                if !yes && !confirm(&plan)? {
                    println!("Upload cancelled.");
                    tracing::info!(command = name, "Upload cancelled at confirmation prompt");
                    return Ok(());
                }
                upload
                    .commit(&plan, UploadOptions { skip_completed }, print_progress)
                    .await
                    .map(|report| {
                        println!(
                            "Uploaded {} part(s), skipped {}; {} part(s) recorded for {}.",
                            report.uploaded.len(),
                            report.skipped.len(),
                            report.recorded,
                            upload
                                .active()
                                .map(|s| s.location())
                                .unwrap_or_default()
                        );
                    })
            }
        },
        Commands::Abort => upload.abort().await.map(|session| {
            println!("Aborted multipart upload for {}", session.location());
        }),
        Commands::Finalize => upload.finalize().await.map(|session| {
            println!("Finalized multipart upload for {}", session.location());
        }),
        Commands::Status => upload.active().map(print_session),
    };

    match result {
        Ok(()) => {
            tracing::info!(command = name, "Command succeeded");
            Ok(())
        }
        Err(e) => {
            tracing::error!(command = name, kind = ?e.kind(), error = %e, "Command failed");
            if let Some(response) = e.remote_response() {
                eprintln!("Bad HTTP response ({})", response.status);
                eprintln!("{}", response.pretty_payload());
            }
            Err(e.into())
        }
    }
}

fn show_status(store: &FileSessionStore) -> Result<()> {
    let session = store.load()?;
    print_session(&session);
    Ok(())
}

fn print_session(session: &s3multipart_core::UploadSession) {
    println!("Active multipart upload for {}", session.location());
    println!("Upload ID: {}", session.upload_id);
    println!("Recorded parts: {}", session.parts.len());
    for part in &session.parts {
        println!("  {:>5}  {}", part.part_number, part.e_tag);
    }
}

fn print_plan(plan: &UploadPlan) {
    println!("Found the following file parts in {}:", plan.source.display());
    for planned in &plan.parts {
        let marker = if planned.already_recorded {
            " (already recorded)"
        } else {
            ""
        };
        println!(
            "  {}  part {}, {} bytes{}",
            planned.part.file_name, planned.part.part_number, planned.part.size, marker
        );
    }
    println!(
        "{} part(s), {} bytes total",
        plan.parts.len(),
        plan.total_bytes()
    );
}

fn print_progress(event: PartProgress<'_>) {
    match event {
        PartProgress::Started { part, index, total } => {
            println!("[{}/{}] Uploading {}", index + 1, total, part.file_name);
        }
        PartProgress::Completed {
            part,
            e_tag,
            index,
            total,
        } => {
            println!(
                "[{}/{}] Uploaded {} (part {}, ETag {})",
                index + 1,
                total,
                part.file_name,
                part.part_number,
                e_tag
            );
        }
        PartProgress::Skipped { part, index, total } => {
            println!(
                "[{}/{}] Skipping {} (already recorded)",
                index + 1,
                total,
                part.file_name
            );
        }
    }
}

/// Ask `Proceed? [y/N]` on stdin.
fn confirm_on_stdin(_plan: &UploadPlan) -> io::Result<bool> {
    print!("Proceed? [y/N] ");
    io::stdout().flush()?;

    let mut input = String::new();
    io::stdin().lock().read_line(&mut input)?;
    let input = input.trim().to_lowercase();
    Ok(input == "y" || input == "yes")
}
