//! Process group termination

use command_group::AsyncGroupChild;
use std::time::Duration;
use tracing::{debug, warn};

const POLL_INTERVAL: Duration = Duration::from_millis(50);

/// Terminates the whole process group led by `child`
///
/// On Unix: SIGTERM to the group, wait up to `grace` for the leader to
/// exit, SIGKILL whatever is left of the group, then reap the leader.
#[cfg(unix)]
pub(crate) async fn terminate_group(child: &mut AsyncGroupChild, pid: Option<u32>, grace: Duration) {
    use nix::sys::signal::Signal;

    let Some(pid) = pid else {
        let _ = child.wait().await;
        return;
    };

    signal_group(pid, Signal::SIGTERM);

    let deadline = tokio::time::Instant::now() + grace;
    while tokio::time::Instant::now() < deadline {
        match child.inner().try_wait() {
            Ok(Some(_)) => break,
            Ok(None) => tokio::time::sleep(POLL_INTERVAL).await,
            Err(e) => {
                warn!(pid, "Failed to poll process: {}", e);
                break;
            }
        }
    }

    signal_group(pid, Signal::SIGKILL);

    if let Err(e) = child.wait().await {
        warn!(pid, "Failed to reap process: {}", e);
    }
}

#[cfg(not(unix))]
pub(crate) async fn terminate_group(child: &mut AsyncGroupChild, _pid: Option<u32>, _grace: Duration) {
    if let Err(e) = child.kill().await {
        warn!("Failed to kill process group: {}", e);
    }
    let _ = child.wait().await;
}

/// Kills processes still left in the group of an already reaped leader
#[cfg(unix)]
pub(crate) fn kill_leftovers(pid: u32) {
    signal_group(pid, nix::sys::signal::Signal::SIGKILL);
}

#[cfg(not(unix))]
pub(crate) fn kill_leftovers(_pid: u32) {}

#[cfg(unix)]
fn signal_group(pid: u32, signal: nix::sys::signal::Signal) {
    use nix::errno::Errno;
    use nix::sys::signal::killpg;
    use nix::unistd::Pid;

    match killpg(Pid::from_raw(pid as i32), signal) {
        Ok(()) => debug!(pid, ?signal, "Signalled process group"),
        Err(Errno::ESRCH) => {}
        Err(e) => warn!(pid, ?signal, "Failed to signal process group: {}", e),
    }
}
