//! Bulk staging artifacts
//!
//! A staging artifact is an NDJSON temp file holding one serialized
//! [`EnrichedRecord`] per line. It is created with owner-only permissions,
//! written on the blocking pool, and removed when dropped.

use crate::domain::{EnrichedRecord, Result, StrataError};
use sha2::{Digest, Sha256};
use std::io::{BufWriter, Read, Write};
use std::path::{Path, PathBuf};
use sysinfo::{DiskExt, System, SystemExt};
use tempfile::NamedTempFile;

/// Bytes reserved per estimated record when checking free space
pub const BYTES_PER_RECORD: u64 = 400;

/// Safety factor applied to the estimated artifact size
pub const SPACE_FACTOR: u64 = 2;

/// NDJSON temp file feeding one bulk load
#[derive(Debug)]
pub struct StagingArtifact {
    file: Option<NamedTempFile>,
    records: u64,
    bytes: u64,
}

impl StagingArtifact {
    /// Create an empty artifact in `dir`, or the system temp dir
    pub fn create(dir: Option<&Path>) -> Result<Self> {
        let mut builder = tempfile::Builder::new();
        builder.prefix("strata-staging-").suffix(".ndjson");
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            builder.permissions(std::fs::Permissions::from_mode(0o600));
        }

        let file = match dir {
            Some(dir) => builder.tempfile_in(dir),
            None => builder.tempfile(),
        }
        .map_err(|e| StrataError::BulkLoad(format!("Cannot create staging artifact: {e}")))?;

        Ok(Self {
            file: Some(file),
            records: 0,
            bytes: 0,
        })
    }

    pub fn path(&self) -> Option<&Path> {
        self.file.as_ref().map(NamedTempFile::path)
    }

    pub fn records(&self) -> u64 {
        self.records
    }

    pub fn bytes(&self) -> u64 {
        self.bytes
    }

    /// Append records as NDJSON lines on the blocking pool
    pub async fn append(&mut self, records: Vec<EnrichedRecord>) -> Result<()> {
        if records.is_empty() {
            return Ok(());
        }
        let file = self
            .file
            .take()
            .ok_or_else(|| StrataError::BulkLoad("Staging artifact already closed".to_string()))?;
        let count = records.len() as u64;

        let (file, written) = tokio::task::spawn_blocking(move || -> Result<(NamedTempFile, u64)> {
            let mut writer = BufWriter::new(file);
            let mut written = 0u64;
            for record in &records {
                let line = serde_json::to_vec(record)?;
                writer.write_all(&line)?;
                writer.write_all(b"\n")?;
                written += line.len() as u64 + 1;
            }
            let file = writer
                .into_inner()
                .map_err(|e| StrataError::Io(format!("Failed to flush staging artifact: {e}")))?;
            Ok((file, written))
        })
        .await
        .map_err(|e| StrataError::BulkLoad(format!("Staging writer task failed: {e}")))?
        .map_err(|e| StrataError::BulkLoad(format!("Cannot write staging artifact: {e}")))?;

        self.file = Some(file);
        self.records += count;
        self.bytes += written;
        Ok(())
    }

    /// Hex SHA-256 of the artifact contents
    pub async fn checksum(&self) -> Result<String> {
        let path: PathBuf = self
            .path()
            .ok_or_else(|| StrataError::BulkLoad("Staging artifact already closed".to_string()))?
            .to_path_buf();

        tokio::task::spawn_blocking(move || -> Result<String> {
            let mut file = std::fs::File::open(&path)?;
            let mut hasher = Sha256::new();
            let mut buf = [0u8; 64 * 1024];
            loop {
                let n = file.read(&mut buf)?;
                if n == 0 {
                    break;
                }
                hasher.update(&buf[..n]);
            }
            Ok(format!("{:x}", hasher.finalize()))
        })
        .await
        .map_err(|e| StrataError::BulkLoad(format!("Checksum task failed: {e}")))?
    }

    /// Delete the file now rather than on drop
    pub fn close(mut self) -> Result<()> {
        if let Some(file) = self.file.take() {
            file.close()
                .map_err(|e| StrataError::Io(format!("Failed to remove staging artifact: {e}")))?;
        }
        Ok(())
    }
}

/// Bytes a bulk window of `estimated_records` needs on disk
pub fn required_space(estimated_records: u64) -> u64 {
    estimated_records
        .saturating_mul(BYTES_PER_RECORD)
        .saturating_mul(SPACE_FACTOR)
}

/// Free bytes on the disk holding `dir`, `None` if it cannot be determined
pub fn available_space(dir: &Path) -> Option<u64> {
    let dir = dir.canonicalize().ok()?;
    let mut sys = System::new();
    sys.refresh_disks_list();
    sys.disks()
        .iter()
        .filter(|disk| dir.starts_with(disk.mount_point()))
        .max_by_key(|disk| disk.mount_point().as_os_str().len())
        .map(|disk| disk.available_space())
}

/// Fail with `BulkLoad` when the staging dir cannot hold the artifact
///
/// An undeterminable free-space figure is not treated as a failure.
pub fn ensure_space(dir: &Path, estimated_records: u64) -> Result<()> {
    let needed = required_space(estimated_records);
    match available_space(dir) {
        Some(available) if available < needed => Err(StrataError::BulkLoad(format!(
            "Insufficient staging space in {}: need {needed} bytes, {available} available",
            dir.display()
        ))),
        Some(_) => Ok(()),
        None => {
            tracing::debug!(dir = %dir.display(), "Free space unknown, skipping check");
            Ok(())
        }
    }
}
