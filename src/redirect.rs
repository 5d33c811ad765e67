//! Applying a [`RedirectionSpec`] to the process descriptors and undoing it.

use crate::error::{Result, ShellError};
use crate::parser::{Direction, RedirectionSpec};
use nix::fcntl::{FcntlArg, fcntl};
use nix::errno::Errno;
use nix::libc::STDERR_FILENO;
use nix::unistd::{close, dup2};
use std::fs::{File, OpenOptions};
use std::io::{self, Write};
use std::os::fd::{AsRawFd, FromRawFd, OwnedFd, RawFd};
use std::os::unix::fs::OpenOptionsExt;

/// Descriptors overwritten by a redirection, with copies of their previous values.
///
/// Dropping the value puts every descriptor back, so restoration happens on every
/// exit path of a command, including error returns.
#[must_use = "the redirection is undone as soon as this is dropped"]
#[derive(Debug)]
pub struct SavedDescriptors {
    /// `(slot, previous)`; `None` when the slot was closed before the redirection.
    saved: Vec<(RawFd, Option<OwnedFd>)>,
}

/// Duplicate `fd` close-on-exec onto the lowest free descriptor `>= floor`.
fn dup_above(fd: RawFd, floor: RawFd) -> nix::Result<OwnedFd> {
    let copy = fcntl(fd, FcntlArg::F_DUPFD_CLOEXEC(floor))?;
    // SAFETY: fcntl just returned this descriptor and nothing else owns it.
    Ok(unsafe { OwnedFd::from_raw_fd(copy) })
}

fn open_target(spec: &RedirectionSpec) -> io::Result<File> {
    match spec.direction {
        Direction::Out => OpenOptions::new()
            .write(true)
            .create(true)
            .append(spec.append)
            .truncate(!spec.append)
            .mode(0o644)
            .open(&spec.filename),
        Direction::In => File::open(&spec.filename),
    }
}

/// Open the target of `spec` and remap its descriptor(s) onto it.
///
/// If the target cannot be opened nothing is touched.
pub fn apply(spec: &RedirectionSpec) -> Result<SavedDescriptors> {
    let target_name = spec.filename.display().to_string();
    let file = open_target(spec).map_err(|e| ShellError::io(&target_name, e))?;

    let mut slots = vec![spec.target_fd];
    if spec.duplicate_stderr && spec.target_fd != STDERR_FILENO {
        slots.push(STDERR_FILENO);
    }
    // Keep the opened file and the saved copies clear of every slot we overwrite.
    let floor = slots.iter().copied().max().unwrap_or(STDERR_FILENO).max(STDERR_FILENO) + 1;
    let source = dup_above(file.as_raw_fd(), floor).map_err(|e| ShellError::io(&target_name, e))?;
    drop(file);

    let mut saved = SavedDescriptors { saved: Vec::new() };
    for &slot in &slots {
        let previous = match dup_above(slot, floor) {
            Ok(fd) => Some(fd),
            Err(Errno::EBADF) => None,
            Err(e) => return Err(ShellError::io(format!("fd {slot}"), e)),
        };
        saved.saved.push((slot, previous));
    }

    flush_std_streams();
    for &slot in &slots {
        dup2(source.as_raw_fd(), slot).map_err(|e| ShellError::io(format!("fd {slot}"), e))?;
    }
    tracing::debug!(?slots, target = %target_name, "redirection applied");
    Ok(saved)
}

impl SavedDescriptors {
    /// Put the original descriptors back. Equivalent to dropping the value.
    pub fn restore(self) {}

    fn restore_all(&mut self) {
        flush_std_streams();
        for (slot, previous) in self.saved.drain(..).rev() {
            let result = match &previous {
                Some(fd) => dup2(fd.as_raw_fd(), slot).map(drop),
                None => close(slot),
            };
            if let Err(e) = result {
                tracing::warn!(slot, error = %e, "failed to restore descriptor");
            }
        }
        tracing::debug!("redirection restored");
    }
}

impl Drop for SavedDescriptors {
    fn drop(&mut self) {
        self.restore_all();
    }
}

fn flush_std_streams() {
    let _ = io::stdout().flush();
    let _ = io::stderr().flush();
}
