// NexusLIMS Logger - platform/instance_lock.rs
//
// Single-instance guard. Two loggers on one instrument PC would open two
// sessions for the same instrument, so a second start is refused.
//
// The lock is a file holding the owner's PID, created exclusively.
// - Windows: the file is kept open with no sharing, so the OS releases it
//   when the process exits, even after a crash.
// - Unix: a lock whose PID no longer exists (via /proc on Linux, a
//   signal-0 probe elsewhere) is stale and taken over.
// The file is removed when the guard is dropped.

use crate::util::error::LockError;
use std::fs::{File, OpenOptions};
use std::io::{self, Read, Write};
use std::path::{Path, PathBuf};

/// Held for the lifetime of the process; releases the lock on drop.
#[derive(Debug)]
pub struct InstanceLock {
    path: PathBuf,
    file: Option<File>,
}

impl InstanceLock {
    /// Take the lock at `path`, failing if another live logger holds it.
    pub fn acquire(path: &Path) -> Result<Self, LockError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|source| LockError::Io {
                path: parent.to_path_buf(),
                source,
            })?;
        }

        match create_exclusive(path) {
            Ok(file) => Self::finish(path, file),
            Err(e) if e.kind() == io::ErrorKind::AlreadyExists => {
                let pid = read_pid(path);
                if pid.is_some_and(is_stale) {
                    tracing::warn!(path = %path.display(), pid = ?pid, "Removing stale instance lock");
                    let _ = std::fs::remove_file(path);
                    let file = create_exclusive(path).map_err(|e| classify(path, e))?;
                    Self::finish(path, file)
                } else {
                    Err(LockError::AlreadyRunning {
                        path: path.to_path_buf(),
                        pid,
                    })
                }
            }
            Err(e) => Err(classify(path, e)),
        }
    }

    fn finish(path: &Path, mut file: File) -> Result<Self, LockError> {
        write!(file, "{}", std::process::id())
            .and_then(|_| file.flush())
            .map_err(|source| LockError::Io {
                path: path.to_path_buf(),
                source,
            })?;
        tracing::debug!(path = %path.display(), pid = std::process::id(), "Instance lock acquired");
        Ok(Self {
            path: path.to_path_buf(),
            file: Some(file),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for InstanceLock {
    fn drop(&mut self) {
        // Close first: Windows refuses to delete a file that is still open.
        drop(self.file.take());
        if let Err(e) = std::fs::remove_file(&self.path) {
            tracing::debug!(path = %self.path.display(), error = %e, "Cannot remove instance lock");
        }
    }
}

#[cfg(target_os = "windows")]
fn create_exclusive(path: &Path) -> io::Result<File> {
    use std::os::windows::fs::OpenOptionsExt;
    // No sharing: a second open fails with ERROR_SHARING_VIOLATION while we live.
    match OpenOptions::new()
        .write(true)
        .create(true)
        .truncate(true)
        .share_mode(0)
        .open(path)
    {
        Ok(f) => Ok(f),
        Err(e) if e.raw_os_error() == Some(32) => {
            Err(io::Error::new(io::ErrorKind::AlreadyExists, e))
        }
        Err(e) => Err(e),
    }
}

#[cfg(not(target_os = "windows"))]
fn create_exclusive(path: &Path) -> io::Result<File> {
    OpenOptions::new().write(true).create_new(true).open(path)
}

fn classify(path: &Path, e: io::Error) -> LockError {
    if e.kind() == io::ErrorKind::AlreadyExists {
        LockError::AlreadyRunning {
            path: path.to_path_buf(),
            pid: read_pid(path),
        }
    } else {
        LockError::Io {
            path: path.to_path_buf(),
            source: e,
        }
    }
}

fn read_pid(path: &Path) -> Option<u32> {
    let mut text = String::new();
    File::open(path).ok()?.read_to_string(&mut text).ok()?;
    text.trim().parse().ok()
}

/// Whether the process that wrote the lock is gone.
fn is_stale(pid: u32) -> bool {
    if pid == std::process::id() {
        return false;
    }
    #[cfg(target_os = "linux")]
    {
        !Path::new("/proc").join(pid.to_string()).exists()
    }
    #[cfg(all(unix, not(target_os = "linux")))]
    {
        !process_alive(pid)
    }
    #[cfg(not(unix))]
    {
        // Sharing semantics at open time already release a crashed owner's lock.
        false
    }
}

/// Signal 0 probes for existence without delivering anything.
#[cfg(all(unix, not(target_os = "linux")))]
fn process_alive(pid: u32) -> bool {
    extern "C" {
        fn kill(pid: i32, sig: i32) -> i32;
    }
    const ESRCH: i32 = 3;
    let Ok(pid) = i32::try_from(pid) else {
        return false;
    };
    // SAFETY: kill with signal 0 has no side effects.
    if unsafe { kill(pid, 0) } == 0 {
        return true;
    }
    // EPERM means the process exists under another user.
    io::Error::last_os_error().raw_os_error() != Some(ESRCH)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn second_acquire_is_refused_until_release() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("gui").join("logger.lock");

        let first = InstanceLock::acquire(&path).unwrap();
        let err = InstanceLock::acquire(&path).unwrap_err();
        assert!(matches!(err, LockError::AlreadyRunning { .. }));

        drop(first);
        assert!(!path.exists());
        assert!(InstanceLock::acquire(&path).is_ok());
    }

    #[cfg(unix)]
    #[test]
    fn stale_lock_from_dead_process_is_taken_over() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("logger.lock");
        // Beyond any real PID on Linux, macOS or the BSDs.
        std::fs::write(&path, "4000000000").unwrap();

        let lock = InstanceLock::acquire(&path).unwrap();
        assert_eq!(read_pid(lock.path()), Some(std::process::id()));
    }

    #[cfg(unix)]
    #[test]
    fn lock_held_by_live_process_is_respected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("logger.lock");
        // PID 1 always exists.
        std::fs::write(&path, "1").unwrap();
        let err = InstanceLock::acquire(&path).unwrap_err();
        assert!(matches!(err, LockError::AlreadyRunning { pid: Some(1), .. }));
    }
}
