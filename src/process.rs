//! Process spawning and liveness checks used on both sides of the handoff.

use std::{
    ffi::OsString,
    io,
    path::Path,
    process::{Command, Stdio},
    sync::Arc,
    thread,
    time::{Duration, Instant},
};
use sysinfo::{Pid, ProcessStatus, ProcessesToUpdate, System};

/// Starts programs that must outlive the caller.
pub trait ProcessLauncher: Send + Sync {
    /// Spawn `program` detached from the caller and return its pid.
    fn spawn_detached(&self, program: &Path, args: &[OsString], working_dir: &Path)
    -> io::Result<u32>;
}

impl<T: ProcessLauncher + ?Sized> ProcessLauncher for &T {
    fn spawn_detached(
        &self,
        program: &Path,
        args: &[OsString],
        working_dir: &Path,
    ) -> io::Result<u32> {
        (**self).spawn_detached(program, args, working_dir)
    }
}

impl<T: ProcessLauncher + ?Sized> ProcessLauncher for Arc<T> {
    fn spawn_detached(
        &self,
        program: &Path,
        args: &[OsString],
        working_dir: &Path,
    ) -> io::Result<u32> {
        (**self).spawn_detached(program, args, working_dir)
    }
}

/// Launches real OS processes with no inherited stdio, in their own process
/// group (Unix) or detached console (Windows).
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemLauncher;

impl ProcessLauncher for SystemLauncher {
    fn spawn_detached(
        &self,
        program: &Path,
        args: &[OsString],
        working_dir: &Path,
    ) -> io::Result<u32> {
        let mut cmd = Command::new(program);
        cmd.args(args)
            .current_dir(working_dir)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null());

        #[cfg(unix)]
        {
            use std::os::unix::process::CommandExt;
            cmd.process_group(0);
        }

        #[cfg(windows)]
        {
            use std::os::windows::process::CommandExt;
            const DETACHED_PROCESS: u32 = 0x0000_0008;
            const CREATE_NEW_PROCESS_GROUP: u32 = 0x0000_0200;
            cmd.creation_flags(DETACHED_PROCESS | CREATE_NEW_PROCESS_GROUP);
        }

        let child = cmd.spawn()?;
        Ok(child.id())
    }
}

/// View of the process that started the updater.
pub trait ParentProcess {
    fn is_alive(&self, pid: u32) -> bool;

    /// Block until `pid` exits or `timeout` elapses. Returns `true` if the
    /// process is gone.
    fn wait_for_exit(&self, pid: u32, timeout: Duration) -> bool;
}

/// [`ParentProcess`] backed by the OS process table.
#[derive(Debug, Clone)]
pub struct SysinfoProcesses {
    poll_interval: Duration,
}

impl Default for SysinfoProcesses {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_millis(250),
        }
    }
}

impl SysinfoProcesses {
    fn probe(sys: &mut System, pid: Pid) -> bool {
        sys.refresh_processes(ProcessesToUpdate::Some(&[pid]), true);
        match sys.process(pid) {
            Some(p) => !matches!(p.status(), ProcessStatus::Zombie | ProcessStatus::Dead),
            None => false,
        }
    }
}

impl ParentProcess for SysinfoProcesses {
    fn is_alive(&self, pid: u32) -> bool {
        let mut sys = System::new();
        Self::probe(&mut sys, Pid::from_u32(pid))
    }

    fn wait_for_exit(&self, pid: u32, timeout: Duration) -> bool {
        let pid = Pid::from_u32(pid);
        let mut sys = System::new();
        let deadline = Instant::now() + timeout;

        while Self::probe(&mut sys, pid) {
            let now = Instant::now();
            if now >= deadline {
                return false;
            }
            thread::sleep(self.poll_interval.min(deadline - now));
        }
        true
    }
}
