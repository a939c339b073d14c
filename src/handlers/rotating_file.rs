//! Append-only log file with size-triggered rotation
//!
//! When a write would push the active file past `max_bytes`, the file is
//! closed, shifted into the backup chain (`app.log.1`, `app.log.2`, ...),
//! optionally gzip-compressed (`app.log.1.gz`), and a fresh file is opened.
//! Backups beyond `max_backups` or older than `max_age` are removed.
//! Rotation runs inside the caller's write, so ordering is preserved and the
//! triggering line lands in the fresh file.

use crate::core::error::SetupError;
use std::fs::{self, File, OpenOptions};
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};

const MAX_DELETION_FAILURES: usize = 5;

/// Configuration for rotating files
///
/// # Examples
///
/// ```
/// use log_fabric::handlers::RotationPolicy;
/// use std::time::Duration;
///
/// let policy = RotationPolicy::new()
///     .with_max_size(50 * 1024 * 1024)
///     .with_max_backups(7)
///     .with_max_age(Duration::from_secs(7 * 24 * 3600))
///     .with_compression(true);
/// assert_eq!(policy.max_backups, 7);
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct RotationPolicy {
    /// Rotate once the active file would exceed this size. `None` disables rotation.
    pub max_bytes: Option<u64>,
    /// Maximum number of rotated files to keep
    pub max_backups: usize,
    /// Remove rotated files older than this
    pub max_age: Option<Duration>,
    /// Whether to gzip rotated files
    pub compress: bool,
}

impl Default for RotationPolicy {
    fn default() -> Self {
        Self {
            max_bytes: Some(100 * 1024 * 1024),
            max_backups: 5,
            max_age: Some(Duration::from_secs(30 * 24 * 3600)),
            compress: true,
        }
    }
}

impl RotationPolicy {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// A policy that never rotates
    #[must_use]
    pub fn never() -> Self {
        Self {
            max_bytes: None,
            max_backups: 0,
            max_age: None,
            compress: false,
        }
    }

    #[must_use = "builder methods return a new value and do not modify the original"]
    pub fn with_max_size(mut self, bytes: u64) -> Self {
        self.max_bytes = Some(bytes);
        self
    }

    #[must_use = "builder methods return a new value and do not modify the original"]
    pub fn with_max_backups(mut self, count: usize) -> Self {
        self.max_backups = count;
        self
    }

    #[must_use = "builder methods return a new value and do not modify the original"]
    pub fn with_max_age(mut self, age: Duration) -> Self {
        self.max_age = Some(age);
        self
    }

    #[must_use = "builder methods return a new value and do not modify the original"]
    pub fn with_compression(mut self, enabled: bool) -> Self {
        self.compress = enabled;
        self
    }
}

pub struct RotatingFile {
    base_path: PathBuf,
    policy: RotationPolicy,
    writer: Option<BufWriter<File>>,
    current_size: u64,
    /// Counter for consecutive deletion failures (reset on successful deletion)
    deletion_failure_count: usize,
}

impl RotatingFile {
    /// Open `path` for appending, creating parent directories as needed
    ///
    /// # Errors
    ///
    /// Returns [`SetupError::Io`] if the directory or file cannot be created.
    pub fn open<P: AsRef<Path>>(path: P, policy: RotationPolicy) -> Result<Self, SetupError> {
        let base_path = path.as_ref().to_path_buf();

        if let Some(parent) = base_path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(|e| {
                SetupError::io("create log directory", parent.display().to_string(), e)
            })?;
        }

        let (file, current_size) = Self::open_append(&base_path)
            .map_err(|e| SetupError::io("open log file", base_path.display().to_string(), e))?;

        Ok(Self {
            base_path,
            policy,
            writer: Some(BufWriter::new(file)),
            current_size,
            deletion_failure_count: 0,
        })
    }

    fn open_append(path: &Path) -> io::Result<(File, u64)> {
        let file = OpenOptions::new().create(true).append(true).open(path)?;
        let size = file.metadata()?.len();
        Ok((file, size))
    }

    /// Append one complete line, rotating first if it would overflow the file
    pub fn write_line(&mut self, line: &[u8]) -> io::Result<()> {
        let incoming = line.len() as u64;
        if self.should_rotate(incoming) {
            if let Err(e) = self.rotate() {
                // Keep logging into whatever file is available
                eprintln!(
                    "[WARN] Log rotation failed for {}: {}. Continuing with current file.",
                    self.base_path.display(),
                    e
                );
                if self.writer.is_none() {
                    let (file, size) = Self::open_append(&self.base_path)?;
                    self.writer = Some(BufWriter::new(file));
                    self.current_size = size;
                }
                // Allow the file to grow past the limit rather than retry every line
                self.current_size = 0;
            }
        }

        let writer = self
            .writer
            .as_mut()
            .ok_or_else(|| io::Error::other("log file writer not initialized"))?;
        writer.write_all(line)?;
        self.current_size += incoming;
        Ok(())
    }

    pub fn flush(&mut self) -> io::Result<()> {
        if let Some(ref mut writer) = self.writer {
            writer.flush()?;
        }
        Ok(())
    }

    fn should_rotate(&self, incoming: u64) -> bool {
        match self.policy.max_bytes {
            Some(max) => self.current_size > 0 && self.current_size + incoming > max,
            None => false,
        }
    }

    fn rotate(&mut self) -> io::Result<()> {
        // Explicitly drop writer to release file handle before renaming
        if let Some(mut writer) = self.writer.take() {
            writer.flush()?;
        }

        if self.policy.max_backups == 0 {
            // No backups kept: truncate in place
            fs::remove_file(&self.base_path).or_else(ignore_not_found)?;
        } else {
            self.remove_backup(self.policy.max_backups)?;

            for i in (1..self.policy.max_backups).rev() {
                for compressed in [true, false] {
                    let from = self.backup_path(i, compressed);
                    if from.exists() {
                        fs::rename(&from, self.backup_path(i + 1, compressed))?;
                    }
                }
            }

            let first = self.backup_path(1, false);
            if self.base_path.exists() {
                fs::rename(&self.base_path, &first)?;
                if self.policy.compress {
                    self.compress_file(&first)?;
                }
            }
        }

        let (file, _) = Self::open_append(&self.base_path)?;
        self.writer = Some(BufWriter::new(file));
        self.current_size = 0;

        if let Some(max_age) = self.policy.max_age {
            self.prune_older_than(max_age);
        }
        Ok(())
    }

    /// Delete both forms of the backup at `index`, aborting after repeated failures
    fn remove_backup(&mut self, index: usize) -> io::Result<()> {
        let mut deletion_failed = false;
        for compressed in [true, false] {
            let path = self.backup_path(index, compressed);
            if path.exists() {
                if let Err(e) = fs::remove_file(&path) {
                    deletion_failed = true;
                    eprintln!(
                        "[WARN] Failed to remove oldest backup {}: {} (failure #{}/{})",
                        path.display(),
                        e,
                        self.deletion_failure_count + 1,
                        MAX_DELETION_FAILURES
                    );
                }
            }
        }

        if !deletion_failed {
            self.deletion_failure_count = 0;
            return Ok(());
        }

        self.deletion_failure_count += 1;
        if self.deletion_failure_count >= MAX_DELETION_FAILURES {
            return Err(io::Error::other(format!(
                "rotation aborted: failed to delete old backups {} consecutive times",
                self.deletion_failure_count
            )));
        }
        Ok(())
    }

    fn prune_older_than(&self, max_age: Duration) {
        let now = SystemTime::now();
        for i in 1..=self.policy.max_backups {
            for compressed in [true, false] {
                let path = self.backup_path(i, compressed);
                let expired = fs::metadata(&path)
                    .and_then(|m| m.modified())
                    .ok()
                    .and_then(|modified| now.duration_since(modified).ok())
                    .is_some_and(|age| age > max_age);
                if expired {
                    if let Err(e) = fs::remove_file(&path) {
                        eprintln!("[WARN] Failed to remove expired backup {}: {}", path.display(), e);
                    }
                }
            }
        }
    }

    /// Backup file path for given index: `app.log.3` or `app.log.3.gz`
    fn backup_path(&self, index: usize, compressed: bool) -> PathBuf {
        let filename = self
            .base_path
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or("app.log");
        let suffix = if compressed { ".gz" } else { "" };
        self.base_path
            .with_file_name(format!("{}.{}{}", filename, index, suffix))
    }

    /// Compress `path` to `path.gz`, removing the original only on success
    fn compress_file(&self, path: &Path) -> io::Result<()> {
        use std::io::BufReader;

        let mut gz_name = path.as_os_str().to_owned();
        gz_name.push(".gz");
        let gz_path = PathBuf::from(gz_name);
        let mut tmp_name = gz_path.as_os_str().to_owned();
        tmp_name.push(".tmp");
        let temp_gz_path = PathBuf::from(tmp_name);

        let result = (|| {
            let mut reader = BufReader::with_capacity(64 * 1024, File::open(path)?);
            let output = BufWriter::with_capacity(64 * 1024, File::create(&temp_gz_path)?);
            let mut encoder = flate2::write::GzEncoder::new(output, flate2::Compression::default());
            io::copy(&mut reader, &mut encoder)?;
            encoder.finish()?.flush()?;
            fs::rename(&temp_gz_path, &gz_path)
        })();

        if let Err(e) = result {
            let _ = fs::remove_file(&temp_gz_path);
            return Err(e);
        }

        if let Err(e) = fs::remove_file(path) {
            eprintln!(
                "[WARN] Compression succeeded but failed to remove original file {}: {}",
                path.display(),
                e
            );
        }
        Ok(())
    }

    #[must_use]
    pub fn current_size(&self) -> u64 {
        self.current_size
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.base_path
    }

    #[must_use]
    pub fn policy(&self) -> &RotationPolicy {
        &self.policy
    }
}

fn ignore_not_found(e: io::Error) -> io::Result<()> {
    if e.kind() == io::ErrorKind::NotFound {
        Ok(())
    } else {
        Err(e)
    }
}

impl Drop for RotatingFile {
    fn drop(&mut self) {
        if let Some(mut writer) = self.writer.take() {
            let _ = writer.flush();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Read;
    use tempfile::tempdir;

    fn line(i: usize) -> Vec<u8> {
        format!("line {:04} padding padding padding\n", i).into_bytes()
    }

    #[test]
    fn test_creates_parent_directories() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("nested/deeper/app.log");

        let mut file = RotatingFile::open(&path, RotationPolicy::never()).unwrap();
        file.write_line(b"hello\n").unwrap();
        file.flush().unwrap();

        assert_eq!(fs::read_to_string(&path).unwrap(), "hello\n");
    }

    #[test]
    fn test_open_failure_is_setup_error() {
        let dir = tempdir().unwrap();
        // A directory cannot be opened as a log file
        let result = RotatingFile::open(dir.path(), RotationPolicy::never());
        assert!(matches!(result, Err(SetupError::Io { .. })));
    }

    #[test]
    fn test_size_rotation_keeps_every_line() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("app.log");
        let policy = RotationPolicy::new()
            .with_max_size(200)
            .with_max_backups(50)
            .with_compression(false);

        let mut file = RotatingFile::open(&path, policy).unwrap();
        for i in 0..20 {
            file.write_line(&line(i)).unwrap();
        }
        file.flush().unwrap();

        assert!(dir.path().join("app.log.1").exists());

        // Reassemble oldest to newest and check nothing was lost or reordered
        let mut backups: Vec<PathBuf> = (1..=50)
            .map(|i| dir.path().join(format!("app.log.{}", i)))
            .filter(|p| p.exists())
            .collect();
        backups.reverse();
        backups.push(path.clone());

        let all: String = backups
            .iter()
            .map(|p| fs::read_to_string(p).unwrap())
            .collect();
        let expected: String = (0..20)
            .map(|i| String::from_utf8(line(i)).unwrap())
            .collect();
        assert_eq!(all, expected);
    }

    #[test]
    fn test_max_backups_enforced() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("app.log");
        let policy = RotationPolicy::new()
            .with_max_size(100)
            .with_max_backups(2)
            .with_compression(false);

        let mut file = RotatingFile::open(&path, policy).unwrap();
        for i in 0..30 {
            file.write_line(&line(i)).unwrap();
        }

        assert!(dir.path().join("app.log.1").exists());
        assert!(dir.path().join("app.log.2").exists());
        assert!(!dir.path().join("app.log.3").exists());
    }

    #[test]
    fn test_compressed_backups() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("app.log");
        let policy = RotationPolicy::new()
            .with_max_size(100)
            .with_max_backups(3)
            .with_compression(true);

        let mut file = RotatingFile::open(&path, policy).unwrap();
        for i in 0..4 {
            file.write_line(&line(i)).unwrap();
        }

        let gz = dir.path().join("app.log.1.gz");
        assert!(gz.exists());
        assert!(!dir.path().join("app.log.1").exists());

        let mut decoded = String::new();
        flate2::read::GzDecoder::new(File::open(gz).unwrap())
            .read_to_string(&mut decoded)
            .unwrap();
        assert!(decoded.starts_with("line "));
    }

    #[test]
    fn test_appends_to_existing_file() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("app.log");
        fs::write(&path, "existing\n").unwrap();

        let file = RotatingFile::open(&path, RotationPolicy::never()).unwrap();
        assert_eq!(file.current_size(), 9);
    }
}
