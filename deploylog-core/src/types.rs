//! Domain types for the deploy ledger.
//!
//! Every type is serializable via serde + serde_yaml; the on-disk project
//! document is simply a serialized [`Project`].

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::LedgerError;

/// Longest accepted project name.
pub const MAX_PROJECT_NAME_LEN: usize = 128;

// ---------------------------------------------------------------------------
// Newtypes
// ---------------------------------------------------------------------------

/// Unique, immutable name of a project. Doubles as its file stem on disk.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ProjectName(pub String);

impl ProjectName {
    /// Parse a caller-supplied name, rejecting anything that cannot be used
    /// as a file stem.
    pub fn parse(raw: impl Into<String>) -> Result<Self, LedgerError> {
        let raw = raw.into();
        if raw.is_empty() {
            return Err(LedgerError::Validation("project name must not be empty".into()));
        }
        if raw.len() > MAX_PROJECT_NAME_LEN {
            return Err(LedgerError::Validation(format!(
                "project name is longer than {MAX_PROJECT_NAME_LEN} characters"
            )));
        }
        if raw.starts_with('.') {
            return Err(LedgerError::Validation(format!(
                "project name '{raw}' must not start with '.'"
            )));
        }
        if let Some(bad) = raw
            .chars()
            .find(|c| !(c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.')))
        {
            return Err(LedgerError::Validation(format!(
                "project name '{raw}' contains invalid character '{bad}'"
            )));
        }
        Ok(Self(raw))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ProjectName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl From<String> for ProjectName {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for ProjectName {
    fn from(s: &str) -> Self {
        Self(s.to_owned())
    }
}

/// Store-wide unique deploy identifier.
///
/// Uses UUIDv7, so ids stay unique across restarts and sort by creation time.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DeployId(Uuid);

impl DeployId {
    pub fn new() -> Self {
        Self(Uuid::now_v7())
    }
}

impl Default for DeployId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for DeployId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl From<Uuid> for DeployId {
    fn from(value: Uuid) -> Self {
        Self(value)
    }
}

impl FromStr for DeployId {
    type Err = LedgerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Uuid::parse_str(s.trim())
            .map(Self)
            .map_err(|_| LedgerError::Validation(format!("'{s}' is not a valid deploy id")))
    }
}

// ---------------------------------------------------------------------------
// Enums
// ---------------------------------------------------------------------------

/// Status carried by a deploy [`Event`].
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum EventStatus {
    Started,
    Skipped,
    Failed,
    Success,
    Log,
}

impl EventStatus {
    pub const ALL: [EventStatus; 5] = [
        EventStatus::Started,
        EventStatus::Skipped,
        EventStatus::Failed,
        EventStatus::Success,
        EventStatus::Log,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            EventStatus::Started => "STARTED",
            EventStatus::Skipped => "SKIPPED",
            EventStatus::Failed => "FAILED",
            EventStatus::Success => "SUCCESS",
            EventStatus::Log => "LOG",
        }
    }
}

impl fmt::Display for EventStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EventStatus {
    type Err = LedgerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        EventStatus::ALL
            .into_iter()
            .find(|status| status.as_str().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| {
                LedgerError::Validation(format!(
                    "unknown event status '{s}'; expected: STARTED, SKIPPED, FAILED, SUCCESS, LOG"
                ))
            })
    }
}

/// Whether a [`ModuleChange`] installs or removes a module.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ModuleStatus {
    Add,
    Remove,
}

impl ModuleStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ModuleStatus::Add => "ADD",
            ModuleStatus::Remove => "REMOVE",
        }
    }
}

impl fmt::Display for ModuleStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ModuleStatus {
    type Err = LedgerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "ADD" => Ok(ModuleStatus::Add),
            "REMOVE" => Ok(ModuleStatus::Remove),
            _ => Err(LedgerError::Validation(format!(
                "unknown module status '{s}'; expected: ADD, REMOVE"
            ))),
        }
    }
}

// ---------------------------------------------------------------------------
// Domain structs
// ---------------------------------------------------------------------------

/// Source revision a deploy was built from.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Commit {
    pub branch: String,
    pub hash: String,
}

/// A module added to or removed from a client by a deploy.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModuleChange {
    pub name: String,
    pub version: String,
    pub status: ModuleStatus,
}

impl ModuleChange {
    pub fn add(name: impl Into<String>, version: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            version: version.into(),
            status: ModuleStatus::Add,
        }
    }

    pub fn remove(name: impl Into<String>, version: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            version: version.into(),
            status: ModuleStatus::Remove,
        }
    }
}

/// A timestamped status update on a deploy. Never edited once recorded.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Event {
    pub status: EventStatus,
    #[serde(default)]
    pub description: String,
    pub timestamp: DateTime<Utc>,
}

/// Caller-supplied fields of a new deploy.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct DeployInput {
    pub user: String,
    pub commit: Commit,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub changelog_url: String,
    pub version: String,
    #[serde(default)]
    pub automatic: bool,
    pub client: String,
    #[serde(default)]
    pub modules: Vec<ModuleChange>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub config: Option<String>,
}

/// One recorded deployment of a project to a client.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Deploy {
    pub id: DeployId,
    pub project_name: ProjectName,
    pub user: String,
    pub commit: Commit,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub changelog_url: String,
    pub version: String,
    #[serde(default)]
    pub automatic: bool,
    pub client: String,
    #[serde(default)]
    pub modules: Vec<ModuleChange>,
    #[serde(default)]
    pub events: Vec<Event>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub config: Option<String>,
    pub timestamp: DateTime<Utc>,
}

impl Deploy {
    /// Build a deploy from caller input. The implicit `STARTED` event is
    /// always the first entry of `events`.
    pub fn new(project_name: ProjectName, input: DeployInput, now: DateTime<Utc>) -> Self {
        Self {
            id: DeployId::new(),
            project_name,
            user: input.user,
            commit: input.commit,
            description: input.description,
            changelog_url: input.changelog_url,
            version: input.version,
            automatic: input.automatic,
            client: input.client,
            modules: input.modules,
            events: vec![Event {
                status: EventStatus::Started,
                description: String::new(),
                timestamp: now,
            }],
            config: input.config,
            timestamp: now,
        }
    }

    /// Latest event status, `STARTED` for a fresh deploy.
    pub fn last_status(&self) -> Option<EventStatus> {
        self.events.last().map(|e| e.status)
    }
}

/// A project and its full deploy history.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Project {
    pub name: ProjectName,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub repository_url: String,
    pub created_at: DateTime<Utc>,
    /// Chronological: oldest deploy first.
    #[serde(default)]
    pub deploys: Vec<Deploy>,
}

impl Project {
    pub fn new(
        name: ProjectName,
        description: impl Into<String>,
        repository_url: impl Into<String>,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            name,
            description: description.into(),
            repository_url: repository_url.into(),
            created_at: now,
            deploys: vec![],
        }
    }

    pub fn deploy(&self, id: &DeployId) -> Option<&Deploy> {
        self.deploys.iter().find(|d| &d.id == id)
    }

    /// Append a new deploy and return a copy of it.
    pub fn record_deploy(&mut self, input: DeployInput, now: DateTime<Utc>) -> Deploy {
        let deploy = Deploy::new(self.name.clone(), input, now);
        self.deploys.push(deploy.clone());
        deploy
    }

    /// Append an event to one of this project's deploys.
    pub fn record_event(
        &mut self,
        deploy_id: &DeployId,
        status: EventStatus,
        description: impl Into<String>,
        now: DateTime<Utc>,
    ) -> Result<Event, LedgerError> {
        let name = self.name.clone();
        let deploy = self
            .deploys
            .iter_mut()
            .find(|d| &d.id == deploy_id)
            .ok_or_else(|| LedgerError::deploy_not_found(&name, deploy_id))?;
        let event = Event {
            status,
            description: description.into(),
            timestamp: now,
        };
        deploy.events.push(event.clone());
        Ok(event)
    }

    /// Deploys, newest first.
    pub fn deploys_newest_first(&self) -> impl Iterator<Item = &Deploy> {
        self.deploys.iter().rev()
    }
}

/// One entry of a derived module inventory.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResponseModule {
    pub name: String,
    pub version: String,
    pub status: ModuleStatus,
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    fn input(client: &str) -> DeployInput {
        DeployInput {
            user: "ci".into(),
            commit: Commit {
                branch: "main".into(),
                hash: "abc123".into(),
            },
            version: "1.0.0".into(),
            client: client.into(),
            ..DeployInput::default()
        }
    }

    #[test]
    fn project_name_rejects_path_like_values() {
        assert!(ProjectName::parse("billing-api").is_ok());
        assert!(ProjectName::parse("").is_err());
        assert!(ProjectName::parse("../etc").is_err());
        assert!(ProjectName::parse(".hidden").is_err());
        assert!(ProjectName::parse("a b").is_err());
        assert!(ProjectName::parse("x".repeat(MAX_PROJECT_NAME_LEN + 1)).is_err());
    }

    #[test]
    fn event_status_parses_case_insensitively() {
        assert_eq!("success".parse::<EventStatus>().unwrap(), EventStatus::Success);
        assert_eq!(" LOG ".parse::<EventStatus>().unwrap(), EventStatus::Log);
        let err = "DONE".parse::<EventStatus>().unwrap_err();
        assert!(matches!(err, LedgerError::Validation(_)));
    }

    #[test]
    fn module_status_rejects_unknown() {
        assert_eq!("remove".parse::<ModuleStatus>().unwrap(), ModuleStatus::Remove);
        assert!("UPGRADE".parse::<ModuleStatus>().is_err());
    }

    #[test]
    fn statuses_serialize_uppercase() {
        let yaml = serde_yaml::to_string(&EventStatus::Skipped).expect("serialize");
        assert_eq!(yaml.trim(), "SKIPPED");
        let yaml = serde_yaml::to_string(&ModuleStatus::Add).expect("serialize");
        assert_eq!(yaml.trim(), "ADD");
    }

    #[test]
    fn new_deploy_starts_with_single_started_event() {
        let now = Utc::now();
        let deploy = Deploy::new(ProjectName::from("shop"), input("acme"), now);
        assert_eq!(deploy.events.len(), 1);
        assert_eq!(deploy.events[0].status, EventStatus::Started);
        assert_eq!(deploy.timestamp, now);
    }

    #[test]
    fn deploy_ids_are_unique() {
        let a = DeployId::new();
        let b = DeployId::new();
        assert_ne!(a, b);
        assert_eq!(a.to_string().parse::<DeployId>().unwrap(), a);
    }

    #[test]
    fn record_event_on_unknown_deploy_fails() {
        let mut project = Project::new(ProjectName::from("shop"), "", "", Utc::now());
        let err = project
            .record_event(&DeployId::new(), EventStatus::Log, "x", Utc::now())
            .unwrap_err();
        assert!(matches!(err, LedgerError::NotFound { .. }));
    }

    #[test]
    fn newest_first_reverses_chronology() {
        let mut project = Project::new(ProjectName::from("shop"), "", "", Utc::now());
        let first = project.record_deploy(input("acme"), Utc::now());
        let second = project.record_deploy(input("acme"), Utc::now());
        let ids: Vec<_> = project.deploys_newest_first().map(|d| d.id).collect();
        assert_eq!(ids, vec![second.id, first.id]);
    }
}
