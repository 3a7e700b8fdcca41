//! Part discovery: turn a folder of pre-split files into an ordered part list.
//!
//! A part file is any regular file whose name ends in a dot followed by one or
//! more ASCII digits (`object.bin.01`, `chunk.7`). Everything else in the
//! folder is ignored, so a manifest or readme can sit next to the parts.
//!
//! Parts are ordered by file name, not by number. Zero padding must therefore
//! be consistent across the folder (`.01` ... `.12`, never `.1` ... `.12`) for
//! the name order to match the numeric order; this is not checked here.

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;

use regex::Regex;
use tracing::{debug, info};

use crate::error::SessionError;

/// Highest part number the storage service accepts.
pub const MAX_PART_NUMBER: u32 = 10_000;

/// A discovered part file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PartFile {
    pub path: PathBuf,
    pub file_name: String,
    pub part_number: i32,
    pub size: u64,
}

fn part_suffix() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"^.+\.([0-9]+)$").expect("part suffix pattern is valid"))
}

/// Returns the numeric suffix of `file_name`, if it has one.
fn numeric_suffix(file_name: &str) -> Option<&str> {
    part_suffix()
        .captures(file_name)
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str())
}

/// Discover the part files in `dir`, sorted by file name.
pub fn resolve_parts(dir: &Path) -> Result<Vec<PartFile>, SessionError> {
    if !dir.is_dir() {
        return Err(SessionError::NotADirectory(dir.to_path_buf()));
    }

    let mut parts = Vec::new();
    for entry in fs::read_dir(dir)? {
        let entry = entry?;
        let path = entry.path();
        let file_name = entry.file_name().to_string_lossy().into_owned();

        let Some(digits) = numeric_suffix(&file_name) else {
            debug!(file = %file_name, "Skipping entry without numeric extension");
            continue;
        };
        if !path.is_file() {
            debug!(file = %file_name, "Skipping non-file entry");
            continue;
        }

        let part_number = match digits.parse::<u32>() {
            Ok(n) if (1..=MAX_PART_NUMBER).contains(&n) => n as i32,
            _ => {
                return Err(SessionError::InvalidPartNumber {
                    path,
                    part_number: digits.to_string(),
                })
            }
        };
        let size = entry.metadata()?.len();

        parts.push(PartFile {
            path,
            file_name,
            part_number,
            size,
        });
    }

    if parts.is_empty() {
        return Err(SessionError::NoPartsFound(dir.to_path_buf()));
    }

    parts.sort_by(|a, b| a.file_name.cmp(&b.file_name));

    let mut claimed: HashMap<i32, &Path> = HashMap::new();
    for part in &parts {
        if let Some(first) = claimed.insert(part.part_number, &part.path) {
            return Err(SessionError::DuplicatePartNumber {
                part_number: part.part_number,
                first: first.to_path_buf(),
                second: part.path.clone(),
            });
        }
    }

    info!(dir = %dir.display(), count = parts.len(), "Resolved part files");
    Ok(parts)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs::write;
    use tempfile::tempdir;

    #[test]
    fn test_resolves_padded_parts_in_numeric_order() {
        let dir = tempdir().unwrap();
        for n in [3, 1, 10, 2] {
            write(dir.path().join(format!("disk.img.{n:02}")), b"data").unwrap();
        }
        write(dir.path().join("MANIFEST.txt"), b"not a part").unwrap();

        let parts = resolve_parts(dir.path()).expect("parts should resolve");
        let numbers: Vec<i32> = parts.iter().map(|p| p.part_number).collect();
        assert_eq!(numbers, vec![1, 2, 3, 10]);
        assert_eq!(parts[0].file_name, "disk.img.01");
        assert_eq!(parts[0].size, 4);
    }

    #[test]
    fn test_ordering_is_by_name_not_number() {
        let dir = tempdir().unwrap();
        for name in ["part.1", "part.2", "part.10"] {
            write(dir.path().join(name), b"x").unwrap();
        }

        let parts = resolve_parts(dir.path()).unwrap();
        let numbers: Vec<i32> = parts.iter().map(|p| p.part_number).collect();
        assert_eq!(numbers, vec![1, 10, 2]);
    }

    #[test]
    fn test_ignores_subdirectories_and_hidden_suffix_only_names() {
        let dir = tempdir().unwrap();
        fs::create_dir(dir.path().join("nested.01")).unwrap();
        write(dir.path().join(".02"), b"x").unwrap();
        write(dir.path().join("part.03"), b"x").unwrap();

        let parts = resolve_parts(dir.path()).unwrap();
        assert_eq!(parts.len(), 1);
        assert_eq!(parts[0].part_number, 3);
    }

    #[test]
    fn test_empty_folder_yields_no_parts_found() {
        let dir = tempdir().unwrap();
        write(dir.path().join("README.md"), b"hello").unwrap();

        let err = resolve_parts(dir.path()).unwrap_err();
        assert!(matches!(err, SessionError::NoPartsFound(_)));
    }

    #[test]
    fn test_missing_path_yields_not_a_directory() {
        let dir = tempdir().unwrap();
        let missing = dir.path().join("does-not-exist");
        let err = resolve_parts(&missing).unwrap_err();
        assert!(matches!(err, SessionError::NotADirectory(_)));

        let file = dir.path().join("file.01");
        write(&file, b"x").unwrap();
        let err = resolve_parts(&file).unwrap_err();
        assert!(matches!(err, SessionError::NotADirectory(_)));
    }

    #[test]
    fn test_part_number_zero_is_rejected() {
        let dir = tempdir().unwrap();
        write(dir.path().join("part.00"), b"x").unwrap();
        let err = resolve_parts(dir.path()).unwrap_err();
        assert!(matches!(err, SessionError::InvalidPartNumber { .. }));
    }

    #[test]
    fn test_two_files_with_same_part_number_are_rejected() {
        let dir = tempdir().unwrap();
        write(dir.path().join("a.bin.01"), b"first").unwrap();
        write(dir.path().join("b.bin.1"), b"second").unwrap();
        write(dir.path().join("b.bin.02"), b"third").unwrap();

        match resolve_parts(dir.path()).unwrap_err() {
            SessionError::DuplicatePartNumber {
                part_number,
                first,
                second,
            } => {
                assert_eq!(part_number, 1);
                assert_eq!(first, dir.path().join("a.bin.01"));
                assert_eq!(second, dir.path().join("b.bin.1"));
            }
            other => panic!("expected DuplicatePartNumber, got {other:?}"),
        }
    }
}
