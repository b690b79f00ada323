// src/exec/process.rs

//! Small helpers around `tokio::process::Child`: pid extraction, forceful
//! kill, and tolerant stream teardown. Everything here is best-effort; a
//! process that already exited is never an error.

use tokio::process::Child;

/// Best-effort numeric process id. Returns 0 when unavailable (the child
/// has already been reaped).
pub fn process_id(child: &Child) -> u32 {
    child.id().unwrap_or(0)
}

/// Forcefully terminate a child process.
///
/// On unix this sends a targeted `SIGKILL` by pid first, then falls back to
/// the handle's generic kill. Failures on either step are ignored; the
/// process may have exited on its own.
pub fn kill_child(child: &mut Child) {
    #[cfg(unix)]
    {
        let pid = process_id(child);
        if pid > 0 {
            unsafe {
                libc::kill(pid as libc::pid_t, libc::SIGKILL);
            }
        }
    }
    let _ = child.start_kill();
}

/// Close the child's standard streams, tolerating any of them being absent
/// or already taken.
pub fn close_streams(child: &mut Child) {
    drop(child.stdin.take());
    drop(child.stdout.take());
    drop(child.stderr.take());
}
