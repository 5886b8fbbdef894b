//! `deploylog daemon`: run, stop and query the store daemon.

use anyhow::{Context as _, Result};
use clap::Subcommand;

use deploylog_daemon::paths::socket_path;
use deploylog_daemon::{request_status, request_stop, start_blocking, DaemonConfig, DaemonError};

use super::{print_json, Context};

#[derive(Subcommand, Debug)]
pub enum DaemonCommand {
    /// Run the daemon in the foreground (store + socket server).
    Start,
    /// Request graceful daemon shutdown over the Unix socket.
    Stop,
    /// Query daemon runtime status over the Unix socket.
    Status,
}

pub fn run(command: DaemonCommand, ctx: &Context) -> Result<()> {
    match command {
        DaemonCommand::Start => {
            start_blocking(DaemonConfig::from_env(&ctx.home))
                .context("daemon exited with error")?;
        }
        DaemonCommand::Stop => match request_stop(&ctx.home) {
            Ok(()) => println!("daemon stop requested"),
            Err(DaemonError::DaemonNotRunning { .. }) => {
                println!("daemon is not running");
            }
            Err(err) => return Err(err).context("failed to stop daemon"),
        },
        DaemonCommand::Status => match request_status(&ctx.home) {
            Ok(status) => print_json(&status)?,
            Err(DaemonError::DaemonNotRunning { .. }) => {
                print_json(&serde_json::json!({
                    "running": false,
                    "socket": socket_path(&ctx.home).display().to_string(),
                }))?;
            }
            Err(err) => return Err(err).context("failed to query daemon status"),
        },
    }

    Ok(())
}
