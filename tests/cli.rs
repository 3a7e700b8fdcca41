use assert_cmd::Command;
use predicates::prelude::*;
use std::fs;
use std::path::Path;
use tempfile::{tempdir, TempDir};

const SESSION_JSON: &str = r#"{
  "Bucket": "bucket1",
  "Key": "obj.bin",
  "UploadId": "U1",
  "Parts": [
    {"ETag": "etag-1", "PartNumber": 1}
  ]
}"#;

/// Binary invocation isolated from the caller's environment, run inside `dir`.
fn s3multipart(dir: &Path) -> Command {
    let mut cmd = Command::cargo_bin("s3multipart").expect("Binary exists");
    cmd.current_dir(dir)
        .env_remove("S3MULTIPART_STATE_FILE")
        .env_remove("S3MULTIPART_CONFIG")
        .env_remove("S3_ENDPOINT")
        .env_remove("S3_FORCE_PATH_STYLE")
        .env("AWS_REGION", "us-east-1")
        .env("AWS_EC2_METADATA_DISABLED", "true");
    cmd
}

fn with_session() -> TempDir {
    let dir = tempdir().expect("temp dir");
    fs::write(dir.path().join("multipart.json"), SESSION_JSON).unwrap();
    dir
}

#[test]
fn help_lists_every_subcommand() {
    let dir = tempdir().unwrap();
    s3multipart(dir.path())
        .arg("--help")
        .assert()
        .success()
        .stdout(
            predicate::str::contains("init")
                .and(predicate::str::contains("upload"))
                .and(predicate::str::contains("abort"))
                .and(predicate::str::contains("finalize"))
                .and(predicate::str::contains("status")),
        );
}

#[test]
fn commands_without_session_fail_with_precondition_message() {
    let dir = tempdir().unwrap();
    fs::create_dir(dir.path().join("parts")).unwrap();
    fs::write(dir.path().join("parts").join("f.01"), b"data").unwrap();

    for args in [vec!["finalize"], vec!["abort"], vec!["upload", "parts", "--yes"]] {
        s3multipart(dir.path())
            .args(&args)
            .assert()
            .failure()
            .stderr(predicate::str::contains("No active multipart upload"));
    }
    assert!(!dir.path().join("multipart.json").exists());
}

#[test]
fn init_refuses_to_replace_active_session() {
    let dir = with_session();

    s3multipart(dir.path())
        .args(["init", "other-bucket", "other.bin"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("already in progress"));

    assert_eq!(
        fs::read_to_string(dir.path().join("multipart.json")).unwrap(),
        SESSION_JSON
    );
}

#[test]
fn upload_from_folder_without_parts_fails() {
    let dir = with_session();
    fs::create_dir(dir.path().join("empty")).unwrap();
    fs::write(dir.path().join("empty").join("notes.txt"), b"no parts").unwrap();

    s3multipart(dir.path())
        .args(["upload", "empty"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("Unable to find file parts"));
}

#[test]
fn declining_the_prompt_cancels_upload() {
    let dir = with_session();
    fs::create_dir(dir.path().join("parts")).unwrap();
    fs::write(dir.path().join("parts").join("f.01"), b"data").unwrap();

    s3multipart(dir.path())
        .args(["upload", "parts"])
        .write_stdin("n\n")
        .assert()
        .success()
        .stdout(
            predicate::str::contains("f.01")
                .and(predicate::str::contains("Proceed? [y/N]"))
                .and(predicate::str::contains("Upload cancelled.")),
        );

    assert_eq!(
        fs::read_to_string(dir.path().join("multipart.json")).unwrap(),
        SESSION_JSON
    );
}

#[test]
fn status_prints_active_session() {
    let dir = with_session();

    s3multipart(dir.path())
        .arg("status")
        .assert()
        .success()
        .stdout(
            predicate::str::contains("s3://bucket1/obj.bin")
                .and(predicate::str::contains("U1"))
                .and(predicate::str::contains("Recorded parts: 1")),
        );
}

#[test]
fn state_file_flag_and_env_select_record() {
    let dir = tempdir().unwrap();
    fs::write(dir.path().join("custom.json"), SESSION_JSON).unwrap();

    s3multipart(dir.path())
        .args(["status", "--state-file", "custom.json"])
        .assert()
        .success()
        .stdout(predicate::str::contains("s3://bucket1/obj.bin"));

    s3multipart(dir.path())
        .arg("status")
        .env("S3MULTIPART_STATE_FILE", "custom.json")
        .assert()
        .success()
        .stdout(predicate::str::contains("U1"));
}

#[test]
fn corrupt_state_file_is_reported() {
    let dir = tempdir().unwrap();
    fs::write(dir.path().join("multipart.json"), b"{ not json").unwrap();

    s3multipart(dir.path())
        .arg("status")
        .assert()
        .failure()
        .stderr(predicate::str::contains("multipart.json"));
}

use std::sync::{Arc, Mutex};
use tracing_subscriber::prelude::*;
use tracing_subscriber::{layer::Context, Layer, Registry};

/// Custom Layer to collect emitted event messages.
struct EventCollector {
    events: Arc<Mutex<Vec<String>>>,
}

impl<S> Layer<S> for EventCollector
where
    S: tracing::Subscriber,
{
    fn on_event(&self, event: &tracing::Event<'_>, _ctx: Context<'_, S>) {
        self.events.lock().unwrap().push(format!("{:?}", event));
    }
}

#[tokio::test]
async fn emits_trace_initialised_event() {
    let events = Arc::new(Mutex::new(Vec::new()));
    let collector = EventCollector {
        events: events.clone(),
    };
    let subscriber = Registry::default().with(collector);
    let _guard = tracing::subscriber::set_default(subscriber);

    use s3multipart::cli::{run, Cli, Commands};

    // No record exists, so the command stops at the precondition check.
    let dir = tempdir().unwrap();
    let cli = Cli {
        state_file: Some(dir.path().join("multipart.json")),
        config: None,
        command: Commands::Finalize,
    };

    let result = run(cli).await;
    assert!(result.is_err());

    let event_msgs = events.lock().unwrap();
    assert!(
        event_msgs.iter().any(|msg| msg.contains("trace_initialised")),
        "Expected a 'trace_initialised' trace event, got: {:?}",
        event_msgs
    );
}
