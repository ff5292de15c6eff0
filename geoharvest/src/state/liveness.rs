//! Process-table lookups used by housekeeping.

/// Answers whether an OS process id is currently running.
///
/// Injected into housekeeping so tests can simulate crashed workers without
/// killing real processes.
pub trait ProcessLiveness: Send + Sync {
    fn is_alive(&self, pid: u32) -> bool;
}

/// Queries the operating system process table.
///
/// Uses `kill(pid, 0)`, which performs permission and existence checks
/// without delivering a signal. `EPERM` means the process exists but belongs
/// to another user, so it counts as alive.
#[derive(Debug, Clone, Copy, Default)]
pub struct OsProcessTable;

impl OsProcessTable {
    pub fn new() -> Self {
        Self
    }
}

impl ProcessLiveness for OsProcessTable {
    fn is_alive(&self, pid: u32) -> bool {
        let Ok(pid) = libc::pid_t::try_from(pid) else {
            return false;
        };
        if pid <= 0 {
            return false;
        }

        // SAFETY: signal 0 only probes the target; no signal is delivered.
        let rc = unsafe { libc::kill(pid, 0) };
        if rc == 0 {
            return true;
        }
        std::io::Error::last_os_error().raw_os_error() == Some(libc::EPERM)
    }
}

impl<F> ProcessLiveness for F
where
    F: Fn(u32) -> bool + Send + Sync,
{
    fn is_alive(&self, pid: u32) -> bool {
        self(pid)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_current_process_is_alive() {
        assert!(OsProcessTable::new().is_alive(std::process::id()));
    }

    #[test]
    fn test_pid_zero_is_not_alive() {
        assert!(!OsProcessTable.is_alive(0));
    }

    #[test]
    fn test_reaped_child_is_not_alive() {
        let mut child = std::process::Command::new("true")
            .spawn()
            .expect("spawn `true`");
        let pid = child.id();
        child.wait().expect("wait for child");

        assert!(!OsProcessTable.is_alive(pid));
    }

    #[test]
    fn test_closure_liveness() {
        let only_42 = |pid: u32| pid == 42;
        assert!(only_42.is_alive(42));
        assert!(!only_42.is_alive(7));
    }
}
