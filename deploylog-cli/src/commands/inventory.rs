//! `deploylog clients` and `deploylog modules <client>`

use anyhow::Result;
use clap::Args;
use tabled::{settings::Style, Table, Tabled};

use deploylog_core::ResponseModule;
use deploylog_daemon::DaemonRequest;

use super::{print_json, Context};

#[derive(Args, Debug)]
pub struct ModulesArgs {
    pub client: String,

    /// Reconstruct the inventory as it stood right after this deploy.
    #[arg(long = "as-of", value_name = "DEPLOY_ID")]
    pub as_of: Option<String>,
}

#[derive(Tabled)]
struct ModuleRow {
    #[tabled(rename = "module")]
    name: String,
    #[tabled(rename = "version")]
    version: String,
}

pub fn clients(ctx: &Context) -> Result<()> {
    let project = ctx.project()?;
    let clients: Vec<String> = ctx.fetch(DaemonRequest::ListClients {
        project: project.to_string(),
    })?;
    if ctx.json {
        return print_json(&clients);
    }

    if clients.is_empty() {
        println!("No deploys recorded for '{project}'.");
        return Ok(());
    }
    for client in clients {
        println!("{client}");
    }
    Ok(())
}

pub fn modules(args: ModulesArgs, ctx: &Context) -> Result<()> {
    let project = ctx.project()?.to_string();
    let request = match args.as_of {
        Some(deploy_id) => DaemonRequest::GetModulesAsOf {
            project,
            client: args.client.clone(),
            deploy_id,
        },
        None => DaemonRequest::GetModules {
            project,
            client: args.client.clone(),
        },
    };
    let modules: Vec<ResponseModule> = ctx.fetch(request)?;
    if ctx.json {
        return print_json(&modules);
    }

    if modules.is_empty() {
        println!("No modules installed for client '{}'.", args.client);
        return Ok(());
    }
    let rows: Vec<ModuleRow> = modules
        .into_iter()
        .map(|module| ModuleRow {
            name: module.name,
            version: module.version,
        })
        .collect();
    let mut table = Table::new(rows);
    table.with(Style::rounded());
    println!("{table}");
    Ok(())
}
