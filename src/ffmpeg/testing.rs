//! Encoder finto per i test di cancellazione.

use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Write a script that behaves like an encoder stuck mid-run.
///
/// It ignores the ffmpeg flags, writes a partial file at its last argument,
/// starts a helper in its own process group, then records `<pid> <helper pid>`
/// in the returned pid file and waits.
pub(crate) fn stuck_encoder(dir: &Path) -> (PathBuf, PathBuf) {
    let script = dir.join("stuck-ffmpeg");
    let pids = dir.join("pids");
    let body = format!(
        "#!/bin/sh\n\
         for last; do :; done\n\
         echo partial > \"$last\"\n\
         sleep 30 &\n\
         echo \"$$ $!\" > '{pids}.tmp'\n\
         mv '{pids}.tmp' '{pids}'\n\
         wait\n",
        pids = pids.display()
    );
    std::fs::write(&script, body).unwrap();
    std::fs::set_permissions(&script, std::fs::Permissions::from_mode(0o755)).unwrap();
    (script, pids)
}

/// Pids recorded by [`stuck_encoder`] once it is running
pub(crate) async fn wait_for_pids(pids: &Path) -> Vec<u32> {
    tokio::time::timeout(Duration::from_secs(5), async {
        loop {
            if let Ok(text) = tokio::fs::read_to_string(pids).await {
                return text
                    .split_whitespace()
                    .map(|pid| pid.parse().unwrap())
                    .collect::<Vec<u32>>();
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .unwrap()
}

fn is_running(pid: u32) -> bool {
    // zombies are dead, only waiting for a parent to reap them
    match std::fs::read_to_string(format!("/proc/{pid}/stat")) {
        Ok(stat) => stat
            .rsplit(')')
            .next()
            .and_then(|rest| rest.split_whitespace().next())
            .is_some_and(|state| state != "Z"),
        Err(_) => false,
    }
}

/// Whether `pid` stops running within two seconds
pub(crate) async fn exited(pid: u32) -> bool {
    for _ in 0..200 {
        if !is_running(pid) {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    false
}
