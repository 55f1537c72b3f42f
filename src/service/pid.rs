use nix::fcntl::{Flock, FlockArg};
use std::fs::{self, File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::{debug, info, instrument, warn};

#[cfg(unix)]
use std::os::unix::fs::PermissionsExt;

/// Single-instance guard: a locked file holding our PID
pub struct PidFile {
    path: PathBuf,
    pid: u32,
    lock: Option<Flock<File>>,
}

impl PidFile {
    /// Create and lock the PID file, replacing stale files of dead processes
    #[instrument(skip_all, fields(path = ?path.as_ref()))]
    pub fn create<P: AsRef<Path>>(path: P) -> crate::Result<Self> {
        let path = path.as_ref().to_path_buf();
        let pid = std::process::id();

        if let Ok(existing_pid) = Self::read_pid(&path) {
            if existing_pid != pid && Self::is_process_running(existing_pid) {
                return Err(crate::Error::Service(format!(
                    "Another updater is already running with PID {existing_pid} ({})",
                    path.display()
                )));
            }
            info!(
                "Replacing stale PID file for non-running process {}",
                existing_pid
            );
        }

        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(|e| {
                crate::Error::Service(format!("Failed to create PID directory: {e}"))
            })?;
        }

        if path.is_symlink() {
            return Err(crate::Error::Service(format!(
                "Refusing to use PID file {}: it is a symbolic link",
                path.display()
            )));
        }

        // Lock before truncating so a live owner's file is never clobbered
        let file = OpenOptions::new()
            .create(true)
            .truncate(false)
            .read(true)
            .write(true)
            .open(&path)
            .map_err(|e| crate::Error::Service(format!("Failed to open PID file: {e}")))?;

        let mut lock = Flock::lock(file, FlockArg::LockExclusiveNonblock).map_err(|(_, e)| {
            crate::Error::Service(format!(
                "PID file {} is locked by another updater: {e}",
                path.display()
            ))
        })?;

        lock.set_len(0)
            .and_then(|()| writeln!(&mut *lock, "{pid}"))
            .and_then(|()| lock.sync_all())
            .map_err(|e| crate::Error::Service(format!("Failed to write PID: {e}")))?;

        Self::set_secure_permissions(&path);
        debug!("PID file locked");

        Ok(Self {
            path,
            pid,
            lock: Some(lock),
        })
    }

    /// Read PID from file
    fn read_pid(path: &Path) -> crate::Result<u32> {
        let contents = fs::read_to_string(path)
            .map_err(|e| crate::Error::Service(format!("Failed to read PID file: {e}")))?;

        contents
            .trim()
            .parse::<u32>()
            .map_err(|e| crate::Error::Service(format!("Invalid PID in file: {e}")))
    }

    /// Check if a process is running
    fn is_process_running(pid: u32) -> bool {
        use nix::sys::signal;
        use nix::unistd::Pid;

        let Ok(raw) = i32::try_from(pid) else {
            return false;
        };

        // Signal 0 only checks that the process exists
        match signal::kill(Pid::from_raw(raw), None) {
            Ok(()) | Err(nix::errno::Errno::EPERM) => true,
            Err(_) => false,
        }
    }

    /// Remove the PID file and release the lock
    pub fn remove(&mut self) -> crate::Result<()> {
        if self.lock.is_none() {
            return Ok(());
        }

        info!("Removing PID file at {:?}", self.path);
        let result = fs::remove_file(&self.path);
        self.lock = None;

        result.map_err(|e| crate::Error::Service(format!("Failed to remove PID file: {e}")))
    }

    /// Get the PID
    #[must_use]
    pub const fn pid(&self) -> u32 {
        self.pid
    }

    /// Get the path
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Check if the PID file is locked
    #[must_use]
    pub const fn is_locked(&self) -> bool {
        self.lock.is_some()
    }

    /// Owner read/write only
    fn set_secure_permissions(path: &Path) {
        #[cfg(unix)]
        if let Err(e) = fs::set_permissions(path, fs::Permissions::from_mode(0o600)) {
            warn!("Failed to restrict PID file permissions: {}", e);
        }
    }
}

impl Drop for PidFile {
    fn drop(&mut self) {
        if let Err(e) = self.remove() {
            warn!("{}", e);
        }
    }
}

impl std::fmt::Debug for PidFile {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PidFile")
            .field("path", &self.path)
            .field("pid", &self.pid)
            .field("locked", &self.is_locked())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_pid_file_creation() {
        let temp_dir = TempDir::new().unwrap();
        let pid_path = temp_dir.path().join("test.pid");

        let pid_file = PidFile::create(&pid_path).unwrap();
        assert!(pid_path.exists());
        assert!(pid_file.is_locked());
        assert_eq!(pid_file.pid(), std::process::id());
        assert_eq!(
            fs::read_to_string(&pid_path).unwrap().trim(),
            std::process::id().to_string()
        );
    }

    #[test]
    fn test_pid_file_removal() {
        let temp_dir = TempDir::new().unwrap();
        let pid_path = temp_dir.path().join("test.pid");

        let mut pid_file = PidFile::create(&pid_path).unwrap();
        pid_file.remove().unwrap();
        assert!(!pid_path.exists());
        assert!(!pid_file.is_locked());

        drop(pid_file);
        assert!(!pid_path.exists());
    }

    #[test]
    fn test_second_instance_is_rejected() {
        let temp_dir = TempDir::new().unwrap();
        let pid_path = temp_dir.path().join("test.pid");

        let first = PidFile::create(&pid_path).unwrap();
        assert!(PidFile::create(&pid_path).is_err());

        drop(first);
        assert!(!pid_path.exists());
        assert!(PidFile::create(&pid_path).is_ok());
    }

    #[test]
    fn test_stale_pid_is_replaced() {
        let temp_dir = TempDir::new().unwrap();
        let pid_path = temp_dir.path().join("test.pid");
        // above the kernel's PID_MAX_LIMIT, so never a live process
        fs::write(&pid_path, "4194305\n").unwrap();

        let _pid_file = PidFile::create(&pid_path).unwrap();
        assert_eq!(
            fs::read_to_string(&pid_path).unwrap().trim(),
            std::process::id().to_string()
        );
    }

    #[test]
    fn test_process_running_check() {
        assert!(PidFile::is_process_running(std::process::id()));
        assert!(!PidFile::is_process_running(4_194_305));
    }
}
