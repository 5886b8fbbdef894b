//! `deploylog project create|list|show|delete|use`

use anyhow::{Context as _, Result};
use clap::{Args, Subcommand};
use tabled::{settings::Style, Table, Tabled};

use deploylog_core::{Project, ProjectName};
use deploylog_daemon::DaemonRequest;

use super::{event_label, print_json, Context};

#[derive(Subcommand, Debug)]
pub enum ProjectCommand {
    /// Register a new project.
    Create(CreateArgs),

    /// List projects, newest first.
    List,

    /// Show one project and its latest deploys. Defaults to the active project.
    Show {
        name: Option<String>,
    },

    /// Delete a project and its whole deploy history.
    Delete {
        name: String,
    },

    /// Make a project the default for later commands.
    Use {
        name: String,
    },
}

#[derive(Args, Debug)]
pub struct CreateArgs {
    /// Project name (letters, digits, '-', '_' and '.').
    pub name: String,

    #[arg(long, default_value = "")]
    pub description: String,

    #[arg(long = "repository-url", default_value = "")]
    pub repository_url: String,

    /// Also make the new project the active one.
    #[arg(long = "use")]
    pub use_it: bool,
}

#[derive(Tabled)]
struct ProjectRow {
    #[tabled(rename = "project")]
    name: String,
    #[tabled(rename = "description")]
    description: String,
    #[tabled(rename = "deploys")]
    deploys: usize,
    #[tabled(rename = "last status")]
    last_status: String,
    #[tabled(rename = "created")]
    created: String,
}

pub fn run(cmd: ProjectCommand, ctx: &mut Context) -> Result<()> {
    match cmd {
        ProjectCommand::Create(args) => create(args, ctx),
        ProjectCommand::List => list(ctx),
        ProjectCommand::Show { name } => show(name, ctx),
        ProjectCommand::Delete { name } => delete(name, ctx),
        ProjectCommand::Use { name } => use_project(name, ctx),
    }
}

fn create(args: CreateArgs, ctx: &mut Context) -> Result<()> {
    let project: Project = ctx.fetch(DaemonRequest::CreateProject {
        name: args.name.clone(),
        description: args.description,
        repository_url: args.repository_url,
    })?;

    if args.use_it {
        set_active(ctx, project.name.clone())?;
    }

    if ctx.json {
        return print_json(&project);
    }
    println!("✓ Created project '{}'", project.name);
    Ok(())
}

fn list(ctx: &Context) -> Result<()> {
    let projects: Vec<Project> = ctx.fetch(DaemonRequest::ListProjects)?;
    if ctx.json {
        return print_json(&projects);
    }

    if projects.is_empty() {
        println!("No projects registered.");
        println!("Run: deploylog project create <name>");
        return Ok(());
    }

    let active = ctx.session.project.as_ref();
    let rows: Vec<ProjectRow> = projects
        .iter()
        .map(|project| ProjectRow {
            name: if Some(&project.name) == active {
                format!("* {}", project.name)
            } else {
                project.name.to_string()
            },
            description: project.description.clone(),
            deploys: project.deploys.len(),
            last_status: project
                .deploys
                .last()
                .and_then(|deploy| deploy.last_status())
                .map(event_label)
                .unwrap_or_else(|| "-".to_string()),
            created: project.created_at.format("%Y-%m-%d %H:%M").to_string(),
        })
        .collect();

    let mut table = Table::new(rows);
    table.with(Style::rounded());
    println!("{table}");
    Ok(())
}

fn show(name: Option<String>, ctx: &Context) -> Result<()> {
    let name = match name {
        Some(name) => ProjectName::from(name),
        None => ctx.project()?,
    };
    let project: Project = ctx.fetch(DaemonRequest::GetProject {
        name: name.to_string(),
    })?;
    if ctx.json {
        return print_json(&project);
    }

    println!("Project:    {}", project.name);
    if !project.description.is_empty() {
        println!("About:      {}", project.description);
    }
    if !project.repository_url.is_empty() {
        println!("Repository: {}", project.repository_url);
    }
    println!(
        "Created:    {}",
        project.created_at.format("%Y-%m-%d %H:%M:%S UTC")
    );
    println!("Deploys:    {}", project.deploys.len());
    for deploy in project.deploys_newest_first().take(5) {
        println!(
            "  {}  {:<10} {:<12} {}",
            deploy.id,
            deploy.client,
            deploy.version,
            deploy
                .last_status()
                .map(event_label)
                .unwrap_or_else(|| "-".to_string())
        );
    }
    Ok(())
}

fn delete(name: String, ctx: &mut Context) -> Result<()> {
    ctx.request(DaemonRequest::DeleteProject { name: name.clone() })?;

    if ctx.session.project.as_ref().map(ProjectName::as_str) == Some(name.as_str()) {
        ctx.session.project = None;
        ctx.session
            .save(&ctx.home)
            .context("failed to clear the active project")?;
    }

    if ctx.json {
        return print_json(&serde_json::json!({ "deleted": name }));
    }
    println!("✓ Deleted project '{name}'");
    Ok(())
}

fn use_project(name: String, ctx: &mut Context) -> Result<()> {
    let project: Project = ctx
        .fetch(DaemonRequest::GetProject { name })
        .context("cannot select project")?;
    set_active(ctx, project.name.clone())?;

    if ctx.json {
        return print_json(&ctx.session);
    }
    println!("✓ Now using project '{}'", project.name);
    Ok(())
}

fn set_active(ctx: &mut Context, name: ProjectName) -> Result<()> {
    ctx.session.project = Some(name);
    ctx.session
        .save(&ctx.home)
        .context("failed to save the active project")
}
