pub mod daemon;
pub mod deploy;
pub mod event;
pub mod inventory;
pub mod project;

use std::path::PathBuf;

use anyhow::{anyhow, Context as _, Result};
use chrono::{DateTime, Utc};
use colored::Colorize;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;

use deploylog_core::{EventStatus, ModuleStatus, ProjectName};
use deploylog_daemon::{call, DaemonError, DaemonRequest};

use crate::session::Session;

/// Everything a command needs from the invocation, resolved once in `main`.
#[derive(Debug)]
pub struct Context {
    pub home: PathBuf,
    pub session: Session,
    /// `--project` override for this invocation.
    pub project: Option<String>,
    pub json: bool,
}

impl Context {
    pub fn project(&self) -> Result<ProjectName> {
        self.session.resolve_project(self.project.as_deref())
    }

    /// Send one request to the daemon and return its payload.
    pub fn request(&self, request: DaemonRequest) -> Result<Value> {
        call(&self.home, &request).map_err(|err| match err {
            DaemonError::DaemonNotRunning { socket } => anyhow!(
                "daemon is not running (no socket at {}). Start it with `deploylog daemon start`.",
                socket.display()
            ),
            DaemonError::Remote { message, .. } => anyhow!(message),
            other => anyhow::Error::new(other).context("daemon request failed"),
        })
    }

    /// Like [`Context::request`], decoding the payload into `T`.
    pub fn fetch<T: DeserializeOwned>(&self, request: DaemonRequest) -> Result<T> {
        let data = self.request(request)?;
        serde_json::from_value(data).context("daemon returned an unexpected payload")
    }
}

pub fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!(
        "{}",
        serde_json::to_string_pretty(value).context("failed to render JSON")?
    );
    Ok(())
}

pub fn event_label(status: EventStatus) -> String {
    match status {
        EventStatus::Started => status.as_str().cyan().bold().to_string(),
        EventStatus::Skipped => status.as_str().bright_black().bold().to_string(),
        EventStatus::Failed => status.as_str().red().bold().to_string(),
        EventStatus::Success => status.as_str().green().bold().to_string(),
        EventStatus::Log => status.as_str().normal().to_string(),
    }
}

pub fn module_label(status: ModuleStatus) -> String {
    match status {
        ModuleStatus::Add => status.as_str().green().to_string(),
        ModuleStatus::Remove => status.as_str().red().to_string(),
    }
}

/// Coarse age of `timestamp` relative to `now`, e.g. `5m ago`.
pub fn age(timestamp: DateTime<Utc>, now: DateTime<Utc>) -> String {
    let seconds = now.signed_duration_since(timestamp).num_seconds().max(0);
    let (value, unit) = match seconds {
        s if s < 60 => (s, "s"),
        s if s < 60 * 60 => (s / 60, "m"),
        s if s < 60 * 60 * 24 => (s / (60 * 60), "h"),
        s => (s / (60 * 60 * 24), "d"),
    };
    format!("{value}{unit} ago")
}
