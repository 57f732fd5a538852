//! Keeps the machine from idling to sleep during long batches.
//!
//! The inhibitor is a helper process held for the lifetime of the guard.

use std::process::{Child, Command, Stdio};
use std::thread;
use std::time::{Duration, Instant};

use tracing::{debug, warn};

/// How long the inhibitor must survive before it is trusted. systemd-inhibit
/// exits at once when logind refuses the lock.
const SETTLE: Duration = Duration::from_millis(200);

/// Idle-sleep inhibitor, released on drop.
#[derive(Debug)]
pub struct KeepAwake {
    child: Option<Child>,
}

impl KeepAwake {
    /// Never fails: if no inhibitor is available the batch runs anyway.
    pub fn acquire(reason: &str) -> Self {
        let child = match inhibitor(reason) {
            Some(mut command) => hold(&mut command, SETTLE),
            None => {
                warn!("idle sleep inhibition is not supported on this platform");
                None
            }
        };
        KeepAwake { child }
    }

    /// A guard that holds nothing.
    pub fn disabled() -> Self {
        KeepAwake { child: None }
    }

    pub fn is_active(&self) -> bool {
        self.child.is_some()
    }
}

impl Drop for KeepAwake {
    fn drop(&mut self) {
        if let Some(mut child) = self.child.take() {
            if let Err(e) = child.kill() {
                debug!("inhibitor already gone: {}", e);
            }
            let _ = child.wait();
            debug!("idle sleep released");
        }
    }
}

/// Spawns the inhibitor and keeps it only if it is still running after `settle`.
fn hold(command: &mut Command, settle: Duration) -> Option<Child> {
    let mut child = match command
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .spawn()
    {
        Ok(child) => child,
        Err(e) => {
            warn!("could not inhibit idle sleep: {}", e);
            return None;
        }
    };

    let deadline = Instant::now() + settle;
    loop {
        match child.try_wait() {
            Ok(Some(status)) => {
                warn!("could not inhibit idle sleep: inhibitor exited with {}", status);
                return None;
            }
            Ok(None) if Instant::now() >= deadline => break,
            Ok(None) => thread::sleep(Duration::from_millis(20)),
            Err(e) => {
                debug!("could not poll inhibitor: {}", e);
                break;
            }
        }
    }
    debug!("idle sleep inhibited (pid {})", child.id());
    Some(child)
}

#[cfg(target_os = "linux")]
fn inhibitor(reason: &str) -> Option<Command> {
    let mut command = Command::new("systemd-inhibit");
    command
        .arg("--what=idle:sleep")
        .arg(format!("--who={}", env!("CARGO_PKG_NAME")))
        .arg(format!("--why={}", reason))
        .arg("--mode=block")
        .arg("sleep")
        .arg("infinity");
    Some(command)
}

#[cfg(target_os = "macos")]
fn inhibitor(_reason: &str) -> Option<Command> {
    let mut command = Command::new("caffeinate");
    command.arg("-i").arg("-w").arg(std::process::id().to_string());
    Some(command)
}

#[cfg(not(any(target_os = "linux", target_os = "macos")))]
fn inhibitor(_reason: &str) -> Option<Command> {
    None
}
