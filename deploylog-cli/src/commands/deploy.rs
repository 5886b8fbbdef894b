//! `deploylog deploy add|show|list`

use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

use anyhow::{Context as _, Result};
use clap::{Args, Subcommand};
use tabled::{settings::Style, Table, Tabled};

use deploylog_core::{Commit, Deploy};
use deploylog_daemon::{DaemonRequest, DeployRequest, ModuleChangeRequest};

use super::{age, event_label, module_label, print_json, Context};

#[derive(Subcommand, Debug)]
pub enum DeployCommand {
    /// Record a new deploy for the active project.
    Add(AddArgs),

    /// Show one deploy with its modules and events.
    Show {
        deploy_id: String,
    },

    /// List the latest deploys, newest first.
    List {
        /// Maximum number of deploys to show.
        #[arg(long)]
        max: Option<usize>,
    },
}

#[derive(Args, Debug)]
pub struct AddArgs {
    #[arg(long)]
    pub user: String,

    #[arg(long)]
    pub version: String,

    /// Client environment the deploy targets.
    #[arg(long)]
    pub client: String,

    #[arg(long, default_value = "")]
    pub branch: String,

    #[arg(long = "hash", default_value = "")]
    pub commit_hash: String,

    #[arg(long, default_value = "")]
    pub description: String,

    #[arg(long = "changelog-url", default_value = "")]
    pub changelog_url: String,

    /// Mark the deploy as triggered by automation.
    #[arg(long)]
    pub automatic: bool,

    /// Module change as `add:<name>@<version>` or `remove:<name>@<version>`. Repeatable.
    #[arg(long = "module", value_name = "CHANGE")]
    pub modules: Vec<ModuleChangeArg>,

    /// File whose contents are stored as the deploy's config.
    #[arg(long = "config-file")]
    pub config_file: Option<PathBuf>,

    /// Print only the new deploy id.
    #[arg(long)]
    pub print_id: bool,
}

/// `add:<name>@<version>` parsed for clap.
///
/// The status is kept as text; the daemon decides whether it is valid.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModuleChangeArg(pub ModuleChangeRequest);

impl FromStr for ModuleChangeArg {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        let usage = || format!("invalid module change '{s}'; expected <add|remove>:<name>@<version>");
        let (status, rest) = s.split_once(':').ok_or_else(usage)?;
        let (name, version) = rest.rsplit_once('@').ok_or_else(usage)?;
        if status.is_empty() || name.is_empty() || version.is_empty() {
            return Err(usage());
        }
        Ok(Self(ModuleChangeRequest {
            name: name.to_string(),
            version: version.to_string(),
            status: status.to_ascii_uppercase(),
        }))
    }
}

impl fmt::Display for ModuleChangeArg {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}:{}@{}",
            self.0.status.to_ascii_lowercase(),
            self.0.name,
            self.0.version
        )
    }
}

#[derive(Tabled)]
struct DeployRow {
    #[tabled(rename = "id")]
    id: String,
    #[tabled(rename = "client")]
    client: String,
    #[tabled(rename = "version")]
    version: String,
    #[tabled(rename = "user")]
    user: String,
    #[tabled(rename = "status")]
    status: String,
    #[tabled(rename = "when")]
    when: String,
}

pub fn run(cmd: DeployCommand, ctx: &Context) -> Result<()> {
    match cmd {
        DeployCommand::Add(args) => add(args, ctx),
        DeployCommand::Show { deploy_id } => show(deploy_id, ctx),
        DeployCommand::List { max } => list(max, ctx),
    }
}

fn add(args: AddArgs, ctx: &Context) -> Result<()> {
    let project = ctx.project()?;
    let config = match args.config_file {
        Some(path) => Some(
            std::fs::read_to_string(&path)
                .with_context(|| format!("failed to read config file {}", path.display()))?,
        ),
        None => None,
    };

    let deploy: Deploy = ctx.fetch(DaemonRequest::AddDeploy {
        project: project.to_string(),
        deploy: DeployRequest {
            user: args.user,
            commit: Commit {
                branch: args.branch,
                hash: args.commit_hash,
            },
            description: args.description,
            changelog_url: args.changelog_url,
            version: args.version,
            automatic: args.automatic,
            client: args.client,
            modules: args.modules.into_iter().map(|m| m.0).collect(),
            config,
        },
    })?;

    if args.print_id {
        println!("{}", deploy.id);
        return Ok(());
    }
    if ctx.json {
        return print_json(&deploy);
    }
    println!(
        "✓ Recorded deploy {} of {} to '{}' ({})",
        deploy.id, deploy.version, deploy.client, project
    );
    Ok(())
}

fn show(deploy_id: String, ctx: &Context) -> Result<()> {
    let project = ctx.project()?;
    let deploy: Deploy = ctx.fetch(DaemonRequest::GetDeploy {
        project: project.to_string(),
        deploy_id,
    })?;
    if ctx.json {
        return print_json(&deploy);
    }

    println!("Deploy:    {}", deploy.id);
    println!("Project:   {}", deploy.project_name);
    println!("Client:    {}", deploy.client);
    println!("Version:   {}", deploy.version);
    println!(
        "By:        {}{}",
        deploy.user,
        if deploy.automatic { " (automatic)" } else { "" }
    );
    if !deploy.commit.branch.is_empty() || !deploy.commit.hash.is_empty() {
        println!("Commit:    {} {}", deploy.commit.branch, deploy.commit.hash);
    }
    if !deploy.description.is_empty() {
        println!("About:     {}", deploy.description);
    }
    if !deploy.changelog_url.is_empty() {
        println!("Changelog: {}", deploy.changelog_url);
    }
    println!(
        "When:      {}",
        deploy.timestamp.format("%Y-%m-%d %H:%M:%S UTC")
    );

    if !deploy.modules.is_empty() {
        println!("Modules:");
        for module in &deploy.modules {
            println!(
                "  {:<6} {} {}",
                module_label(module.status),
                module.name,
                module.version
            );
        }
    }
    println!("Events:");
    for event in &deploy.events {
        println!(
            "  {}  {:<8} {}",
            event.timestamp.format("%H:%M:%S"),
            event_label(event.status),
            event.description
        );
    }
    if let Some(config) = deploy.config.as_deref() {
        println!("Config:");
        for line in config.lines() {
            println!("  {line}");
        }
    }
    Ok(())
}

fn list(max: Option<usize>, ctx: &Context) -> Result<()> {
    let project = ctx.project()?;
    let deploys: Vec<Deploy> = ctx.fetch(DaemonRequest::ListDeploys {
        project: project.to_string(),
        max,
    })?;
    if ctx.json {
        return print_json(&deploys);
    }

    if deploys.is_empty() {
        println!("No deploys recorded for '{project}'.");
        return Ok(());
    }

    let now = chrono::Utc::now();
    let rows: Vec<DeployRow> = deploys
        .iter()
        .map(|deploy| DeployRow {
            id: deploy.id.to_string(),
            client: deploy.client.clone(),
            version: deploy.version.clone(),
            user: deploy.user.clone(),
            status: deploy
                .last_status()
                .map(event_label)
                .unwrap_or_else(|| "-".to_string()),
            when: age(deploy.timestamp, now),
        })
        .collect();
    let mut table = Table::new(rows);
    table.with(Style::rounded());
    println!("{table}");
    Ok(())
}
