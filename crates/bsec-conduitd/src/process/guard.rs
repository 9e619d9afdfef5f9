use std::fs::{self, File, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use nix::errno::Errno;
use nix::sys::signal::kill;
use nix::unistd::Pid;
use tracing::{info, warn};

use super::PROCESS_TARGET;
use super::errors::LaunchError;

/// Lock and PID file locations inside the artifact directory.
#[derive(Debug, Clone)]
pub struct ProcessPaths {
    lock_path: PathBuf,
    pid_path: PathBuf,
}

impl ProcessPaths {
    /// Places the runtime files in `dir`, creating it when missing.
    pub fn under(dir: &Path) -> Result<Self, LaunchError> {
        fs::create_dir_all(dir).map_err(|source| LaunchError::Directory {
            path: dir.to_path_buf(),
            source,
        })?;
        Ok(Self {
            lock_path: dir.join(concat!(env!("CARGO_PKG_NAME"), ".lock")),
            pid_path: dir.join(concat!(env!("CARGO_PKG_NAME"), ".pid")),
        })
    }

    /// Path to the lock file guarding singleton startup.
    pub fn lock_path(&self) -> &Path {
        self.lock_path.as_path()
    }

    /// Path to the PID file.
    pub fn pid_path(&self) -> &Path {
        self.pid_path.as_path()
    }
}

/// Holds the singleton lock for the lifetime of the daemon.
#[derive(Debug)]
pub(super) struct ProcessGuard {
    paths: ProcessPaths,
    _lock: File,
}

impl ProcessGuard {
    pub(super) fn acquire(paths: ProcessPaths) -> Result<Self, LaunchError> {
        let lock = acquire_lock(&paths)?;
        Ok(Self { paths, _lock: lock })
    }

    pub(super) fn write_pid(&self, pid: u32) -> Result<(), LaunchError> {
        let path = self.paths.pid_path();
        let pid_error = |source| LaunchError::PidWrite {
            path: path.to_path_buf(),
            source,
        };
        let mut file = private_options()
            .truncate(true)
            .create(true)
            .open(path)
            .map_err(pid_error)?;
        writeln!(file, "{pid}").map_err(pid_error)?;
        file.sync_all().map_err(pid_error)?;
        info!(
            target: PROCESS_TARGET,
            pid,
            file = %path.display(),
            "pid file written"
        );
        Ok(())
    }
}

impl Drop for ProcessGuard {
    fn drop(&mut self) {
        for (path, label) in [
            (self.paths.lock_path(), "lock"),
            (self.paths.pid_path(), "pid"),
        ] {
            match fs::remove_file(path) {
                Err(error) if error.kind() != io::ErrorKind::NotFound => {
                    warn!(
                        target: PROCESS_TARGET,
                        file = %path.display(),
                        error = %error,
                        "failed to remove {label} file"
                    );
                }
                _ => {}
            }
        }
    }
}

fn private_options() -> OpenOptions {
    let mut options = OpenOptions::new();
    options.write(true);
    #[cfg(unix)]
    {
        use std::os::unix::fs::OpenOptionsExt;
        options.mode(0o600);
    }
    options
}

fn acquire_lock(paths: &ProcessPaths) -> Result<File, LaunchError> {
    match private_options().create_new(true).open(paths.lock_path()) {
        Ok(file) => {
            info!(
                target: PROCESS_TARGET,
                file = %paths.lock_path().display(),
                "acquired daemon lock"
            );
            Ok(file)
        }
        Err(error) if error.kind() == io::ErrorKind::AlreadyExists => handle_existing_lock(paths),
        Err(source) => Err(LaunchError::LockCreate {
            path: paths.lock_path().to_path_buf(),
            source,
        }),
    }
}

fn handle_existing_lock(paths: &ProcessPaths) -> Result<File, LaunchError> {
    if let Some(pid) = read_pid(paths.pid_path())
        && check_process(pid)?
    {
        info!(
            target: PROCESS_TARGET,
            pid,
            "refusing to start: existing daemon alive"
        );
        return Err(LaunchError::AlreadyRunning { pid });
    }
    warn!(
        target: PROCESS_TARGET,
        file = %paths.lock_path().display(),
        "existing daemon not detected; cleaning stale files"
    );
    remove_file(paths.lock_path())?;
    remove_file(paths.pid_path())?;
    match private_options().create_new(true).open(paths.lock_path()) {
        Ok(file) => Ok(file),
        Err(source) => Err(LaunchError::LockCreate {
            path: paths.lock_path().to_path_buf(),
            source,
        }),
    }
}

fn read_pid(path: &Path) -> Option<u32> {
    let content = fs::read_to_string(path).ok()?;
    content.trim().parse::<u32>().ok()
}

fn remove_file(path: &Path) -> Result<(), LaunchError> {
    match fs::remove_file(path) {
        Ok(()) => Ok(()),
        Err(error) if error.kind() == io::ErrorKind::NotFound => Ok(()),
        Err(source) => Err(LaunchError::Cleanup {
            path: path.to_path_buf(),
            source,
        }),
    }
}

fn check_process(pid: u32) -> Result<bool, LaunchError> {
    let Ok(raw) = i32::try_from(pid) else {
        return Ok(false);
    };
    if raw == 0 {
        return Ok(false);
    }
    match kill(Pid::from_raw(raw), None) {
        Ok(()) | Err(Errno::EPERM) => Ok(true),
        Err(Errno::ESRCH) => Ok(false),
        Err(errno) => Err(LaunchError::CheckProcess { pid, source: errno }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn paths() -> (tempfile::TempDir, ProcessPaths) {
        let dir = tempfile::tempdir().expect("tempdir");
        let paths = ProcessPaths::under(dir.path()).expect("paths");
        (dir, paths)
    }

    #[test]
    fn guard_removes_its_files_on_drop() {
        let (_dir, paths) = paths();
        let guard = ProcessGuard::acquire(paths.clone()).expect("acquire");
        guard.write_pid(std::process::id()).expect("write pid");
        assert!(paths.lock_path().exists());
        assert!(paths.pid_path().exists());

        drop(guard);

        assert!(!paths.lock_path().exists());
        assert!(!paths.pid_path().exists());
    }

    #[test]
    fn live_owner_blocks_a_second_guard() {
        let (_dir, paths) = paths();
        let guard = ProcessGuard::acquire(paths.clone()).expect("acquire");
        guard.write_pid(std::process::id()).expect("write pid");

        let error = ProcessGuard::acquire(paths).expect_err("second guard must fail");

        assert!(matches!(
            error,
            LaunchError::AlreadyRunning { pid } if pid == std::process::id()
        ));
    }

    #[test]
    fn stale_lock_is_replaced() {
        let (_dir, paths) = paths();
        fs::write(paths.lock_path(), b"").expect("stale lock");
        fs::write(paths.pid_path(), b"0\n").expect("stale pid");

        let guard = ProcessGuard::acquire(paths.clone()).expect("stale lock is cleaned");

        assert!(paths.lock_path().exists());
        assert!(!paths.pid_path().exists());
        drop(guard);
    }
}
