//! The active-project session.
//!
//! `deploylog project use <name>` records a default project in
//! `<home>/.deploylog/session.yaml`. The session is loaded once in `main`
//! and handed to each command; `--project` overrides it per invocation.

use std::path::Path;

use anyhow::{anyhow, Context, Result};
use serde::{Deserialize, Serialize};

use deploylog_core::ProjectName;
use deploylog_daemon::paths::session_path;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Session {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub project: Option<ProjectName>,
}

impl Session {
    /// Load the saved session; a missing file is an empty session.
    pub fn load(home: &Path) -> Result<Self> {
        let path = session_path(home);
        if !path.exists() {
            return Ok(Self::default());
        }
        let contents = std::fs::read_to_string(&path)
            .with_context(|| format!("failed to read {}", path.display()))?;
        serde_yaml::from_str(&contents)
            .with_context(|| format!("failed to parse session at {}", path.display()))
    }

    /// Atomically write the session next to the project documents.
    pub fn save(&self, home: &Path) -> Result<()> {
        let path = session_path(home);
        if let Some(dir) = path.parent() {
            std::fs::create_dir_all(dir)
                .with_context(|| format!("failed to create {}", dir.display()))?;
        }
        let tmp = path.with_extension("yaml.tmp");
        let yaml = serde_yaml::to_string(self).context("failed to serialize session")?;
        std::fs::write(&tmp, yaml).with_context(|| format!("failed to write {}", tmp.display()))?;
        std::fs::rename(&tmp, &path)
            .with_context(|| format!("failed to write {}", path.display()))?;
        Ok(())
    }

    /// The project a command should act on: the explicit override if given,
    /// otherwise the session's project.
    pub fn resolve_project(&self, explicit: Option<&str>) -> Result<ProjectName> {
        match (explicit, &self.project) {
            (Some(name), _) => Ok(ProjectName::from(name)),
            (None, Some(name)) => Ok(name.clone()),
            (None, None) => Err(anyhow!(
                "No project selected. Pass --project <name> or run `deploylog project use <name>`."
            )),
        }
    }
}
