use std::{
    env,
    path::{Path, PathBuf},
    process::Stdio,
};

use anyhow::Result;
use sysinfo::{get_current_pid, Signal, System};

/// Terminates every other process running this executable. Matching by exe
/// path is crude but works for the one-daemon-per-user setup this targets.
pub fn kill_running_daemons(name: &Path) {
    let system = System::new_all();
    let current_id = get_current_pid().unwrap();
    for (pid, process) in system.processes().iter() {
        if *pid == current_id {
            continue;
        }
        if matches!(process.parent(), Some(parent) if parent == current_id) {
            continue;
        }

        let same_exe = process
            .exe()
            .filter(|v| v.exists())
            .is_some_and(|v| name == v);
        if !same_exe {
            continue;
        }

        // Term lets the daemon close its open session; on Windows detached
        // processes only respond to a forceful kill.
        if process.kill_with(Signal::Term).is_none() {
            process.kill();
        }
        process.wait();
    }
}

/// Shuts down any previous daemon and starts a fresh one as a detached
/// process running the `serve` subcommand of this executable.
pub fn restart_daemon(dir: Option<PathBuf>) -> Result<()> {
    let process_name = env::current_exe().expect("Can't operate without an executable");
    kill_running_daemons(&process_name);

    let mut command = std::process::Command::new(process_name);
    command.arg("serve");
    if let Some(dir) = dir {
        command.arg("--dir");
        command.arg(dir);
    }

    #[cfg(feature = "win")]
    {
        use std::os::windows::process::CommandExt;
        use windows::Win32::System::Threading::DETACHED_PROCESS;
        command.creation_flags(DETACHED_PROCESS.0);
    }
    #[cfg(unix)]
    {
        use std::os::unix::process::CommandExt;
        command.process_group(0);
        command.stdin(Stdio::null());
        command.stdout(Stdio::null());
    }

    println!("Starting tracking daemon");
    #[allow(clippy::zombie_processes)]
    let _ = command.spawn()?;
    println!("Daemon started");
    Ok(())
}
