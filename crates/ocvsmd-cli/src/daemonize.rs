//! SysV-style daemonization: double fork, new session, redirect stdio to
//! `/dev/null`, drop a locked PID file. Mirrors the `daemon(7)` recipe the
//! upstream daemon follows; kept as a single free function with no
//! protocol awareness.

use std::fs::OpenOptions;
use std::os::fd::AsRawFd;
use std::path::Path;

use nix::fcntl::{flock, FlockArg};
use nix::sys::stat::{umask, Mode};
use nix::unistd::{chdir, close, dup2, fork, setsid, ForkResult};

#[derive(Debug)]
pub enum DaemonizeError {
    Nix(nix::Error),
    Io(std::io::Error),
    PidFileLocked,
}

impl std::fmt::Display for DaemonizeError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DaemonizeError::Nix(e) => write!(f, "{e}"),
            DaemonizeError::Io(e) => write!(f, "{e}"),
            DaemonizeError::PidFileLocked => write!(f, "pid file is locked by another instance"),
        }
    }
}

impl std::error::Error for DaemonizeError {}

impl From<nix::Error> for DaemonizeError {
    fn from(e: nix::Error) -> Self {
        DaemonizeError::Nix(e)
    }
}

/// Fork off the parent and `exit(0)` it, leaving only the child running.
/// # Safety
/// Must be called before any threads other than the current one exist.
unsafe fn fork_and_exit_parent() -> Result<(), DaemonizeError> {
    match fork()? {
        ForkResult::Parent { .. } => std::process::exit(0),
        ForkResult::Child => Ok(()),
    }
}

/// Run the full daemonization sequence: double fork (so the daemon can
/// never reacquire a controlling terminal), a fresh session, stdio
/// redirected to `/dev/null`, and a locked PID file written at `pid_path`.
///
/// # Safety
/// Must be called as close to `main` as possible, before any other
/// threads are spawned — forking a multi-threaded process is undefined
/// behavior per `fork(2)`.
pub unsafe fn daemonize(pid_path: &Path) -> Result<(), DaemonizeError> {
    fork_and_exit_parent()?;
    setsid()?;
    fork_and_exit_parent()?;

    let devnull = OpenOptions::new().read(true).write(true).open("/dev/null").map_err(DaemonizeError::Io)?;
    let devnull_fd = devnull.as_raw_fd();
    for target in [0, 1, 2] {
        let _ = dup2(devnull_fd, target);
    }
    if devnull_fd > 2 {
        let _ = close(devnull_fd);
    }

    umask(Mode::empty());
    chdir("/")?;

    write_locked_pid_file(pid_path)
}

/// Create (or reuse) `pid_path`, `flock` it exclusively and non-blocking
/// (a second instance sees an already-locked file and fails fast), then
/// overwrite it with this process's pid. The file descriptor is leaked
/// intentionally: the lock must outlive this function and is released
/// only when the process exits.
fn write_locked_pid_file(pid_path: &Path) -> Result<(), DaemonizeError> {
    let file = OpenOptions::new()
        .read(true)
        .write(true)
        .create(true)
        .truncate(false)
        .open(pid_path)
        .map_err(DaemonizeError::Io)?;

    flock(file.as_raw_fd(), FlockArg::LockExclusiveNonblock).map_err(|_| DaemonizeError::PidFileLocked)?;

    file.set_len(0).map_err(DaemonizeError::Io)?;
    std::io::Write::write_all(&mut &file, format!("{}\n", std::process::id()).as_bytes())
        .map_err(DaemonizeError::Io)?;

    std::mem::forget(file);
    Ok(())
}
