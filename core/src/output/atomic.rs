//! Write-to-temporary-then-rename.
//!
//! RULE: A reader never observes a half-written artifact. Either the old
//! file (or nothing) or the complete new file is visible at `path`.

use crate::error::{SynthError, SynthResult};
use serde::Serialize;
use std::fs::{create_dir_all, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};

/// Serialize rows to CSV (header from the row type) and publish atomically.
pub fn write_csv_atomic<R: Serialize>(path: &Path, rows: &[R]) -> SynthResult<()> {
    let mut writer = csv::WriterBuilder::new().has_headers(true).from_writer(Vec::new());
    for row in rows {
        writer.serialize(row)?;
    }
    writer.flush()?;
    let data = writer
        .into_inner()
        .map_err(|e| SynthError::Io(io::Error::other(e.to_string())))?;
    write_bytes_atomic(path, &data)
}

pub fn write_bytes_atomic(path: &Path, data: &[u8]) -> SynthResult<()> {
    let tmp = temp_path(path);
    let result = ensure_parent(path).and_then(|_| {
        let mut file = OpenOptions::new()
            .create(true)
            .truncate(true)
            .write(true)
            .open(&tmp)?;
        file.write_all(data)?;
        file.sync_all()
    });
    match result {
        Ok(()) => publish(&tmp, path),
        Err(source) => {
            let _ = std::fs::remove_file(&tmp);
            Err(SynthError::PartialWrite { artifact: path.to_path_buf(), source })
        }
    }
}

/// Rename a finished temporary file into place.
pub fn publish(tmp: &Path, path: &Path) -> SynthResult<()> {
    let result = std::fs::rename(tmp, path).and_then(|_| match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => sync_dir(parent),
        _ => Ok(()),
    });
    result.map_err(|source| {
        let _ = std::fs::remove_file(tmp);
        SynthError::PartialWrite { artifact: path.to_path_buf(), source }
    })
}

/// `<name>.tmp` next to the target.
pub fn temp_path(path: &Path) -> PathBuf {
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    path.with_file_name(format!("{name}.tmp"))
}

pub fn ensure_parent(path: &Path) -> io::Result<()> {
    match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => create_dir_all(parent),
        _ => Ok(()),
    }
}

fn sync_dir(path: &Path) -> io::Result<()> {
    // Directories cannot be opened for sync on every platform.
    match OpenOptions::new().read(true).open(path) {
        Ok(dir) => dir.sync_all().or(Ok(())),
        Err(_) => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Serialize)]
    struct Row {
        id: u32,
        name: &'static str,
    }

    fn scratch(name: &str) -> PathBuf {
        let dir = std::env::temp_dir().join(format!("amlsynth-atomic-{name}-{}", std::process::id()));
        let _ = std::fs::remove_dir_all(&dir);
        dir
    }

    #[test]
    fn writes_header_and_leaves_no_tmp() {
        let dir = scratch("ok");
        let path = dir.join("nested").join("rows.csv");
        write_csv_atomic(&path, &[Row { id: 1, name: "a" }, Row { id: 2, name: "b" }]).unwrap();
        let text = std::fs::read_to_string(&path).unwrap();
        assert_eq!(text, "id,name\n1,a\n2,b\n");
        assert!(!temp_path(&path).exists());
        let _ = std::fs::remove_dir_all(&dir);
    }

    #[test]
    fn failed_write_reports_partial_write_and_publishes_nothing() {
        let dir = scratch("fail");
        std::fs::create_dir_all(&dir).unwrap();
        // A regular file where the parent directory should be.
        let blocker = dir.join("blocked");
        std::fs::write(&blocker, b"x").unwrap();
        let path = blocker.join("rows.csv");
        let err = write_csv_atomic(&path, &[Row { id: 1, name: "a" }]).unwrap_err();
        assert!(matches!(err, SynthError::PartialWrite { .. }));
        assert!(!path.exists());
        let _ = std::fs::remove_dir_all(&dir);
    }
}
