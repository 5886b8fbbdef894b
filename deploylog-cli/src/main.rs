//! deploylog: deploy history and module inventory CLI.
//!
//! # Usage
//!
//! ```text
//! deploylog project create <name> [--description ..] [--repository-url ..] [--use]
//! deploylog project list|show [<name>]|delete <name>|use <name>
//! deploylog deploy add --user <u> --version <v> --client <c> [--module add:<name>@<ver>]..
//! deploylog deploy show <deploy-id>
//! deploylog deploy list [--max <n>]
//! deploylog event add <deploy-id> <status> [--description ..]
//! deploylog clients
//! deploylog modules <client> [--as-of <deploy-id>]
//! deploylog daemon start|stop|status
//! ```
//!
//! Every command except `daemon start` talks to a running daemon.

mod commands;
mod session;

use anyhow::{Context as _, Result};
use clap::{Parser, Subcommand};

use commands::{
    daemon::DaemonCommand, deploy::DeployCommand, event::EventCommand, inventory::ModulesArgs,
    project::ProjectCommand, Context,
};
use session::Session;

// ---------------------------------------------------------------------------
// CLI entry point
// ---------------------------------------------------------------------------

#[derive(Parser, Debug)]
#[command(
    name = "deploylog",
    version,
    about = "Record deploys per project and derive installed-module inventories",
    long_about = None,
)]
struct Cli {
    /// Project to act on instead of the active one.
    #[arg(long, short = 'p', global = true)]
    project: Option<String>,

    /// Emit machine-readable JSON.
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Create, inspect and select projects.
    Project {
        #[command(subcommand)]
        command: ProjectCommand,
    },

    /// Record and inspect deploys of the active project.
    Deploy {
        #[command(subcommand)]
        command: DeployCommand,
    },

    /// Append status events to a deploy.
    Event {
        #[command(subcommand)]
        command: EventCommand,
    },

    /// List the clients that received deploys, most recent first.
    Clients,

    /// Show the modules currently installed for a client.
    Modules(ModulesArgs),

    /// Run and manage the deploylog daemon.
    Daemon {
        #[command(subcommand)]
        command: DaemonCommand,
    },
}

// ---------------------------------------------------------------------------
// Main
// ---------------------------------------------------------------------------

fn main() -> Result<()> {
    let cli = Cli::parse();
    let home = deploylog_core::storage::home().context("could not determine home directory")?;
    let session = Session::load(&home)?;
    let mut ctx = Context {
        home,
        session,
        project: cli.project,
        json: cli.json,
    };

    match cli.command {
        Commands::Project { command } => commands::project::run(command, &mut ctx),
        Commands::Deploy { command } => commands::deploy::run(command, &ctx),
        Commands::Event { command } => commands::event::run(command, &ctx),
        Commands::Clients => commands::inventory::clients(&ctx),
        Commands::Modules(args) => commands::inventory::modules(args, &ctx),
        Commands::Daemon { command } => commands::daemon::run(command, &ctx),
    }
}
