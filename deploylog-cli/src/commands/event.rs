//! `deploylog event add <deploy-id> <status>`

use anyhow::Result;
use clap::{Args, Subcommand};

use deploylog_core::Event;
use deploylog_daemon::DaemonRequest;

use super::{event_label, print_json, Context};

#[derive(Subcommand, Debug)]
pub enum EventCommand {
    /// Append a status event to a deploy.
    Add(AddArgs),
}

#[derive(Args, Debug)]
pub struct AddArgs {
    pub deploy_id: String,

    /// STARTED, SKIPPED, FAILED, SUCCESS or LOG.
    pub status: String,

    #[arg(long, short = 'd', default_value = "")]
    pub description: String,
}

pub fn run(cmd: EventCommand, ctx: &Context) -> Result<()> {
    match cmd {
        EventCommand::Add(args) => add(args, ctx),
    }
}

fn add(args: AddArgs, ctx: &Context) -> Result<()> {
    let project = ctx.project()?;
    let event: Event = ctx.fetch(DaemonRequest::AddEvent {
        project: project.to_string(),
        deploy_id: args.deploy_id.clone(),
        status: args.status,
        description: args.description,
    })?;

    if ctx.json {
        return print_json(&event);
    }
    println!(
        "✓ {} recorded on deploy {}",
        event_label(event.status),
        args.deploy_id
    );
    Ok(())
}
