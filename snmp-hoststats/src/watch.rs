//! File change detection and self re-exec.

use std::io;
use std::path::{Path, PathBuf};
use std::time::SystemTime;

/// Identity of a file on disk: device, inode and modification time.
///
/// Replacing a file (rename over it) changes the inode; editing it in place
/// changes the mtime. Either counts as a change.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FileFingerprint {
    dev: u64,
    ino: u64,
    mtime: Option<SystemTime>,
}

impl FileFingerprint {
    /// Stat `path` and capture its fingerprint.
    pub fn of(path: &Path) -> io::Result<Self> {
        let metadata = std::fs::metadata(path)?;
        let mtime = metadata.modified().ok();

        #[cfg(unix)]
        let (dev, ino) = {
            use std::os::unix::fs::MetadataExt;
            (metadata.dev(), metadata.ino())
        };
        #[cfg(not(unix))]
        let (dev, ino) = (0, metadata.len());

        Ok(Self { dev, ino, mtime })
    }
}

/// Watches the running executable so upgrades are picked up without an
/// external supervisor.
#[derive(Debug, Clone)]
pub struct ExecutableWatch {
    path: PathBuf,
    fingerprint: FileFingerprint,
}

impl ExecutableWatch {
    /// Fingerprint the current executable.
    pub fn current() -> io::Result<Self> {
        Self::new(std::env::current_exe()?)
    }

    pub fn new(path: impl Into<PathBuf>) -> io::Result<Self> {
        let path = path.into();
        let fingerprint = FileFingerprint::of(&path)?;
        Ok(Self { path, fingerprint })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Returns true once the executable on disk differs from the one we
    /// started from. A failing stat (mid-upgrade) is logged and ignored.
    pub fn changed(&self) -> bool {
        match FileFingerprint::of(&self.path) {
            Ok(current) => current != self.fingerprint,
            Err(e) => {
                tracing::warn!(path = %self.path.display(), error = %e, "Cannot stat executable");
                false
            }
        }
    }
}

/// Replace the current process with a fresh copy of `path`, keeping the
/// original arguments. Only returns on failure.
#[cfg(unix)]
pub fn reexec(path: &Path) -> io::Error {
    use std::os::unix::process::CommandExt;

    tracing::info!(path = %path.display(), "Executable has changed, re-executing");
    std::process::Command::new(path)
        .args(std::env::args_os().skip(1))
        .exec()
}

#[cfg(not(unix))]
pub fn reexec(path: &Path) -> io::Error {
    io::Error::new(
        io::ErrorKind::Unsupported,
        format!("cannot re-exec {} on this platform", path.display()),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_fingerprint_stable() {
        let file = tempfile::NamedTempFile::new().unwrap();
        let a = FileFingerprint::of(file.path()).unwrap();
        let b = FileFingerprint::of(file.path()).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn test_fingerprint_changes_on_replace() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("binary");
        std::fs::write(&path, b"v1").unwrap();

        let watch = ExecutableWatch::new(&path).unwrap();
        assert!(!watch.changed());

        let staged = dir.path().join("binary.new");
        let mut f = std::fs::File::create(&staged).unwrap();
        f.write_all(b"v2").unwrap();
        drop(f);
        std::fs::rename(&staged, &path).unwrap();

        assert!(watch.changed());
    }

    #[test]
    fn test_missing_file_is_not_a_change() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("binary");
        std::fs::write(&path, b"v1").unwrap();

        let watch = ExecutableWatch::new(&path).unwrap();
        std::fs::remove_file(&path).unwrap();
        assert!(!watch.changed());
    }

    #[test]
    fn test_fingerprint_missing_file() {
        assert!(FileFingerprint::of(Path::new("/nonexistent/snmp-hoststats")).is_err());
    }
}
