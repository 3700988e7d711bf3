//! Platform strategies for terminating a process tree.

use std::io;
use std::process::{Child, Command};

/// Terminates a launched process together with its descendants.
///
/// Implementations must tolerate being called after the process already
/// exited; that case is a no-op, not an error.
pub trait TreeTerminator: Send {
    /// Ask the tree to exit. May be graceful (a signal the process can handle).
    fn request_exit(&self, child: &mut Child) -> io::Result<()>;

    /// Kill the tree unconditionally.
    fn force_kill(&self, child: &mut Child) -> io::Result<()>;
}

#[cfg(unix)]
pub use unix::ProcessGroup as PlatformTerminator;

#[cfg(windows)]
pub use windows_job::JobObject as PlatformTerminator;

#[cfg(not(any(unix, windows)))]
pub use fallback::ChildOnly as PlatformTerminator;

#[cfg(unix)]
mod unix {
    use super::*;
    use std::os::unix::process::CommandExt;

    /// Runs the interpreter as leader of a fresh process group and signals
    /// the whole group.
    pub struct ProcessGroup {
        pgid: libc::pid_t,
    }

    impl ProcessGroup {
        /// Configure `cmd` so the child becomes a process group leader.
        pub fn prepare(cmd: &mut Command) {
            cmd.process_group(0);
        }

        /// Bind to a child spawned from a prepared command.
        pub fn attach(child: &Child) -> io::Result<Self> {
            let pgid = libc::pid_t::try_from(child.id())
                .map_err(|_| io::Error::new(io::ErrorKind::InvalidData, "pid out of range"))?;
            Ok(Self { pgid })
        }

        fn signal(&self, signal: libc::c_int) -> io::Result<()> {
            // SAFETY: killpg takes plain integers and has no memory-safety
            // preconditions.
            let rc = unsafe { libc::killpg(self.pgid, signal) };
            if rc == 0 {
                return Ok(());
            }
            let err = io::Error::last_os_error();
            // Group already gone
            if err.raw_os_error() == Some(libc::ESRCH) {
                Ok(())
            } else {
                Err(err)
            }
        }
    }

    impl TreeTerminator for ProcessGroup {
        fn request_exit(&self, _child: &mut Child) -> io::Result<()> {
            self.signal(libc::SIGTERM)
        }

        fn force_kill(&self, child: &mut Child) -> io::Result<()> {
            let result = self.signal(libc::SIGKILL);
            let _ = child.kill();
            result
        }
    }
}

#[cfg(windows)]
mod windows_job {
    use super::*;
    use std::os::windows::io::AsRawHandle;
    use std::os::windows::process::CommandExt;

    use windows::Win32::Foundation::{CloseHandle, HANDLE};
    use windows::Win32::System::JobObjects::{
        AssignProcessToJobObject, CreateJobObjectW, JobObjectExtendedLimitInformation,
        SetInformationJobObject, TerminateJobObject, JOBOBJECT_EXTENDED_LIMIT_INFORMATION,
        JOB_OBJECT_LIMIT_KILL_ON_JOB_CLOSE,
    };

    const CREATE_NO_WINDOW: u32 = 0x0800_0000;

    /// Places the interpreter in a job object configured to kill every member
    /// when the job is terminated or its handle closes.
    pub struct JobObject {
        handle: HANDLE,
    }

    // SAFETY: a job HANDLE is an opaque kernel object reference usable from
    // any thread.
    unsafe impl Send for JobObject {}

    fn to_io(e: windows::core::Error) -> io::Error {
        io::Error::other(e.to_string())
    }

    impl JobObject {
        /// Configure `cmd` to run without a console window.
        pub fn prepare(cmd: &mut Command) {
            cmd.creation_flags(CREATE_NO_WINDOW);
        }

        /// Create a kill-on-close job and assign the child to it.
        pub fn attach(child: &Child) -> io::Result<Self> {
            unsafe {
                let handle = CreateJobObjectW(None, None).map_err(to_io)?;
                let job = Self { handle };

                let mut info: JOBOBJECT_EXTENDED_LIMIT_INFORMATION = std::mem::zeroed();
                info.BasicLimitInformation.LimitFlags = JOB_OBJECT_LIMIT_KILL_ON_JOB_CLOSE;
                SetInformationJobObject(
                    job.handle,
                    JobObjectExtendedLimitInformation,
                    std::ptr::addr_of!(info).cast(),
                    std::mem::size_of::<JOBOBJECT_EXTENDED_LIMIT_INFORMATION>() as u32,
                )
                .map_err(to_io)?;

                AssignProcessToJobObject(job.handle, HANDLE(child.as_raw_handle()))
                    .map_err(to_io)?;
                Ok(job)
            }
        }
    }

    impl TreeTerminator for JobObject {
        fn request_exit(&self, _child: &mut Child) -> io::Result<()> {
            // No graceful equivalent of SIGTERM for console-less processes
            unsafe { TerminateJobObject(self.handle, 1).map_err(to_io) }
        }

        fn force_kill(&self, child: &mut Child) -> io::Result<()> {
            let result = unsafe { TerminateJobObject(self.handle, 1).map_err(to_io) };
            let _ = child.kill();
            result
        }
    }

    impl Drop for JobObject {
        fn drop(&mut self) {
            unsafe {
                let _ = CloseHandle(self.handle);
            }
        }
    }
}

#[cfg(not(any(unix, windows)))]
mod fallback {
    use super::*;

    /// Only the immediate child can be terminated on this platform.
    pub struct ChildOnly;

    impl ChildOnly {
        pub fn prepare(_cmd: &mut Command) {}

        pub fn attach(_child: &Child) -> io::Result<Self> {
            Ok(Self)
        }
    }

    impl TreeTerminator for ChildOnly {
        fn request_exit(&self, child: &mut Child) -> io::Result<()> {
            child.kill()
        }

        fn force_kill(&self, child: &mut Child) -> io::Result<()> {
            child.kill()
        }
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use std::process::Stdio;
    use std::time::{Duration, Instant};

    fn spawn_in_group(script: &str) -> (Child, PlatformTerminator) {
        let mut cmd = Command::new("sh");
        cmd.arg("-c").arg(script).stdin(Stdio::null());
        PlatformTerminator::prepare(&mut cmd);
        let child = cmd.spawn().unwrap();
        let group = PlatformTerminator::attach(&child).unwrap();
        (child, group)
    }

    fn wait_with_deadline(child: &mut Child, limit: Duration) -> bool {
        let deadline = Instant::now() + limit;
        while Instant::now() < deadline {
            if let Ok(Some(_)) = child.try_wait() {
                return true;
            }
            std::thread::sleep(Duration::from_millis(10));
        }
        false
    }

    #[test]
    fn test_request_exit_stops_group() {
        let (mut child, group) = spawn_in_group("sleep 30");
        group.request_exit(&mut child).unwrap();
        assert!(wait_with_deadline(&mut child, Duration::from_secs(5)));
    }

    #[test]
    fn test_force_kill_ignores_trap() {
        let (mut child, group) = spawn_in_group("trap '' TERM; sleep 30");
        group.request_exit(&mut child).unwrap();
        assert!(!wait_with_deadline(&mut child, Duration::from_millis(200)));

        group.force_kill(&mut child).unwrap();
        assert!(wait_with_deadline(&mut child, Duration::from_secs(5)));
    }

    #[test]
    fn test_terminate_after_exit_is_noop() {
        let (mut child, group) = spawn_in_group("true");
        assert!(wait_with_deadline(&mut child, Duration::from_secs(5)));

        assert!(group.request_exit(&mut child).is_ok());
        assert!(group.force_kill(&mut child).is_ok());
    }
}
