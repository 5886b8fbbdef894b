//! The in-memory aggregate of every project and its deploy history.
//!
//! [`Ledger`] is a plain value: it performs no locking and no I/O. Callers
//! that share it across tasks are responsible for funnelling mutations
//! through one writer (see `deploylog-daemon`'s `Store`).
//!
//! Writes are staged: `stage_project`, `stage_deploy` and `stage_event`
//! check the request against the current state and return the next version
//! of the affected project without touching the ledger. The caller persists
//! that version and only then installs it with [`Ledger::commit`].
//! `delete_project` is the one direct mutation.

use std::collections::HashMap;

use chrono::{DateTime, Utc};

use crate::error::LedgerError;
use crate::inventory;
use crate::types::{
    Deploy, DeployId, DeployInput, Event, EventStatus, Project, ProjectName, ResponseModule,
};

/// Page size of `list_deploys` when the caller gives none.
pub const DEFAULT_MAX_DEPLOYS: usize = 10;

#[derive(Debug, Clone, Default)]
pub struct Ledger {
    projects: HashMap<ProjectName, Project>,
    /// Project names, most recently created first.
    order: Vec<ProjectName>,
}

impl Ledger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Rebuild a ledger from persisted projects. Creation order is recovered
    /// from `created_at`, ties broken by name. If a name appears twice the
    /// most recently created project wins.
    pub fn from_projects(projects: impl IntoIterator<Item = Project>) -> Self {
        let mut projects: Vec<Project> = projects.into_iter().collect();
        projects.sort_by(|a, b| {
            b.created_at
                .cmp(&a.created_at)
                .then_with(|| a.name.cmp(&b.name))
        });

        let mut ledger = Self::new();
        for project in projects {
            if ledger.contains(&project.name) {
                continue;
            }
            ledger.order.push(project.name.clone());
            ledger.projects.insert(project.name.clone(), project);
        }
        ledger
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    pub fn contains(&self, name: &ProjectName) -> bool {
        self.projects.contains_key(name)
    }

    // -----------------------------------------------------------------------
    // Project registry
    // -----------------------------------------------------------------------

    /// A new, empty project named `name`, not yet committed.
    ///
    /// Fails with `Validation` if the name cannot be stored and with
    /// `DuplicateEntity` if it is taken (exact, case-sensitive).
    pub fn stage_project(
        &self,
        name: ProjectName,
        description: impl Into<String>,
        repository_url: impl Into<String>,
        now: DateTime<Utc>,
    ) -> Result<Project, LedgerError> {
        let name = ProjectName::parse(name.0)?;
        if self.contains(&name) {
            return Err(LedgerError::DuplicateEntity(name));
        }
        Ok(Project::new(name, description, repository_url, now))
    }

    pub fn project(&self, name: &ProjectName) -> Result<&Project, LedgerError> {
        self.projects
            .get(name)
            .ok_or_else(|| LedgerError::project_not_found(name))
    }

    /// All projects, most recently created first.
    pub fn projects(&self) -> Vec<&Project> {
        self.order
            .iter()
            .filter_map(|name| self.projects.get(name))
            .collect()
    }

    /// Remove a project together with everything it owns.
    pub fn delete_project(&mut self, name: &ProjectName) -> Result<Project, LedgerError> {
        let removed = self
            .projects
            .remove(name)
            .ok_or_else(|| LedgerError::project_not_found(name))?;
        self.order.retain(|n| n != name);
        Ok(removed)
    }

    /// Install `project` as the current version of its name. A new name is
    /// placed at the head of the creation order.
    pub fn commit(&mut self, project: Project) {
        if !self.projects.contains_key(&project.name) {
            self.order.insert(0, project.name.clone());
        }
        self.projects.insert(project.name.clone(), project);
    }

    // -----------------------------------------------------------------------
    // Deploy ledger
    // -----------------------------------------------------------------------

    /// The next version of `project` with a deploy appended, plus that
    /// deploy. The project is resolved before the input is looked at, so an
    /// unknown project is always `NotFound`.
    pub fn stage_deploy(
        &self,
        project: &ProjectName,
        input: DeployInput,
        now: DateTime<Utc>,
    ) -> Result<(Project, Deploy), LedgerError> {
        let mut next = self.project(project)?.clone();
        validate_deploy_input(&input)?;
        let deploy = next.record_deploy(input, now);
        Ok((next, deploy))
    }

    /// The next version of `project` with an event appended to `deploy_id`,
    /// plus that event.
    pub fn stage_event(
        &self,
        project: &ProjectName,
        deploy_id: &DeployId,
        status: EventStatus,
        description: impl Into<String>,
        now: DateTime<Utc>,
    ) -> Result<(Project, Event), LedgerError> {
        let mut next = self.project(project)?.clone();
        let event = next.record_event(deploy_id, status, description, now)?;
        Ok((next, event))
    }

    pub fn deploy(&self, project: &ProjectName, id: &DeployId) -> Result<&Deploy, LedgerError> {
        self.project(project)?
            .deploy(id)
            .ok_or_else(|| LedgerError::deploy_not_found(project, id))
    }

    /// The `max` most recent deploys, newest first. `None` means
    /// [`DEFAULT_MAX_DEPLOYS`]; never pads beyond what exists.
    pub fn list_deploys(
        &self,
        project: &ProjectName,
        max: Option<usize>,
    ) -> Result<Vec<&Deploy>, LedgerError> {
        let max = max.unwrap_or(DEFAULT_MAX_DEPLOYS);
        Ok(self.project(project)?.deploys_newest_first().take(max).collect())
    }

    /// Distinct clients, ordered by the recency of their newest deploy.
    pub fn list_clients(&self, project: &ProjectName) -> Result<Vec<String>, LedgerError> {
        let mut clients: Vec<String> = Vec::new();
        for deploy in self.project(project)?.deploys_newest_first() {
            if !clients.iter().any(|c| c == &deploy.client) {
                clients.push(deploy.client.clone());
            }
        }
        Ok(clients)
    }

    /// Modules currently installed for `client`.
    pub fn modules(
        &self,
        project: &ProjectName,
        client: &str,
    ) -> Result<Vec<ResponseModule>, LedgerError> {
        Ok(inventory::current(self.project(project)?, client))
    }

    /// Modules installed for `client` right after deploy `as_of`.
    pub fn modules_as_of(
        &self,
        project: &ProjectName,
        client: &str,
        as_of: &DeployId,
    ) -> Result<Vec<ResponseModule>, LedgerError> {
        inventory::as_of(self.project(project)?, client, as_of)
    }
}

/// Reject deploy input that could never be queried back meaningfully.
fn validate_deploy_input(input: &DeployInput) -> Result<(), LedgerError> {
    if input.client.trim().is_empty() {
        return Err(LedgerError::Validation("deploy client must not be empty".into()));
    }
    if let Some(position) = input.modules.iter().position(|m| m.name.trim().is_empty()) {
        return Err(LedgerError::Validation(format!(
            "module change #{} has an empty name",
            position + 1
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn name(s: &str) -> ProjectName {
        ProjectName::from(s)
    }

    fn input(client: &str) -> DeployInput {
        DeployInput {
            user: "ci".into(),
            version: "1.0".into(),
            client: client.into(),
            ..DeployInput::default()
        }
    }

    fn create(ledger: &mut Ledger, n: &str) {
        let project = ledger
            .stage_project(name(n), "", "", Utc::now())
            .expect("stage project");
        ledger.commit(project);
    }

    fn deploy(ledger: &mut Ledger, n: &str, client: &str) -> Deploy {
        let (next, deploy) = ledger
            .stage_deploy(&name(n), input(client), Utc::now())
            .expect("stage deploy");
        ledger.commit(next);
        deploy
    }

    #[test]
    fn duplicate_stage_is_rejected() {
        let mut ledger = Ledger::new();
        create(&mut ledger, "shop");
        let err = ledger
            .stage_project(name("shop"), "other", "", Utc::now())
            .unwrap_err();
        assert_eq!(err, LedgerError::DuplicateEntity(name("shop")));
        assert_eq!(ledger.len(), 1);
        assert_eq!(ledger.project(&name("shop")).unwrap().description, "");
    }

    #[test]
    fn names_are_case_sensitive() {
        let mut ledger = Ledger::new();
        create(&mut ledger, "shop");
        create(&mut ledger, "Shop");
        assert_eq!(ledger.len(), 2);
    }

    #[test]
    fn invalid_names_never_stage() {
        let ledger = Ledger::new();
        for bad in ["", ".hidden", "a/b", "spaced name"] {
            assert!(
                matches!(
                    ledger.stage_project(name(bad), "", "", Utc::now()),
                    Err(LedgerError::Validation(_))
                ),
                "{bad:?}"
            );
        }
    }

    #[test]
    fn staging_does_not_mutate() {
        let mut ledger = Ledger::new();
        ledger
            .stage_project(name("shop"), "", "", Utc::now())
            .expect("stage");
        assert!(ledger.is_empty());

        create(&mut ledger, "shop");
        ledger
            .stage_deploy(&name("shop"), input("acme"), Utc::now())
            .expect("stage");
        assert!(ledger.project(&name("shop")).unwrap().deploys.is_empty());
    }

    #[test]
    fn projects_listed_newest_first() {
        let mut ledger = Ledger::new();
        for n in ["a", "b", "c"] {
            create(&mut ledger, n);
        }
        let names: Vec<_> = ledger.projects().iter().map(|p| p.name.0.clone()).collect();
        assert_eq!(names, vec!["c", "b", "a"]);
    }

    #[test]
    fn from_projects_recovers_creation_order() {
        let older = Project::new(name("old"), "", "", Utc::now() - chrono::Duration::hours(1));
        let newer = Project::new(name("new"), "", "", Utc::now());
        let ledger = Ledger::from_projects(vec![older, newer]);
        let names: Vec<_> = ledger.projects().iter().map(|p| p.name.0.clone()).collect();
        assert_eq!(names, vec!["new", "old"]);
    }

    #[test]
    fn from_projects_keeps_one_entry_per_name() {
        let older = Project::new(name("shop"), "old", "", Utc::now() - chrono::Duration::hours(1));
        let newer = Project::new(name("shop"), "new", "", Utc::now());
        let ledger = Ledger::from_projects(vec![older, newer]);
        assert_eq!(ledger.len(), 1);
        let projects = ledger.projects();
        assert_eq!(projects.len(), 1);
        assert_eq!(projects[0].description, "new");
    }

    #[test]
    fn delete_cascades_and_reports_missing() {
        let mut ledger = Ledger::new();
        create(&mut ledger, "shop");
        let deploy = deploy(&mut ledger, "shop", "acme");
        let removed = ledger.delete_project(&name("shop")).expect("delete");
        assert_eq!(removed.deploys.len(), 1);
        assert!(ledger.project(&name("shop")).is_err());
        assert!(ledger.deploy(&name("shop"), &deploy.id).is_err());
        assert!(ledger.projects().is_empty());
        assert!(matches!(
            ledger.delete_project(&name("shop")),
            Err(LedgerError::NotFound { .. })
        ));
    }

    #[test]
    fn events_append_in_call_order() {
        let mut ledger = Ledger::new();
        create(&mut ledger, "shop");
        let deploy = deploy(&mut ledger, "shop", "acme");
        for status in [EventStatus::Log, EventStatus::Log, EventStatus::Success] {
            let (next, _) = ledger
                .stage_event(&name("shop"), &deploy.id, status, "step", Utc::now())
                .expect("event");
            ledger.commit(next);
        }
        let stored = ledger.deploy(&name("shop"), &deploy.id).expect("get");
        let statuses: Vec<_> = stored.events.iter().map(|e| e.status).collect();
        assert_eq!(
            statuses,
            vec![
                EventStatus::Started,
                EventStatus::Log,
                EventStatus::Log,
                EventStatus::Success
            ]
        );
    }

    #[test]
    fn deploy_lookup_is_scoped_to_project() {
        let mut ledger = Ledger::new();
        create(&mut ledger, "a");
        create(&mut ledger, "b");
        let deploy = deploy(&mut ledger, "a", "acme");
        assert!(ledger.deploy(&name("b"), &deploy.id).is_err());
        assert!(ledger
            .stage_event(&name("b"), &deploy.id, EventStatus::Log, "", Utc::now())
            .is_err());
    }

    #[test]
    fn list_deploys_defaults_and_clamps() {
        let mut ledger = Ledger::new();
        create(&mut ledger, "shop");
        let ids: Vec<_> = (0..12)
            .map(|_| deploy(&mut ledger, "shop", "acme").id)
            .collect();
        let page = ledger.list_deploys(&name("shop"), None).expect("list");
        assert_eq!(page.len(), DEFAULT_MAX_DEPLOYS);
        assert_eq!(page[0].id, ids[11]);
        assert_eq!(ledger.list_deploys(&name("shop"), Some(50)).unwrap().len(), 12);
        assert!(ledger.list_deploys(&name("shop"), Some(0)).unwrap().is_empty());
    }

    #[test]
    fn clients_ordered_by_recency_without_duplicates() {
        let mut ledger = Ledger::new();
        create(&mut ledger, "shop");
        for client in ["acme", "globex", "acme", "initech"] {
            deploy(&mut ledger, "shop", client);
        }
        assert_eq!(
            ledger.list_clients(&name("shop")).unwrap(),
            vec!["initech", "acme", "globex"]
        );
    }

    #[test]
    fn empty_client_rejected_on_known_project() {
        let mut ledger = Ledger::new();
        create(&mut ledger, "shop");
        let err = ledger
            .stage_deploy(&name("shop"), input("  "), Utc::now())
            .unwrap_err();
        assert!(matches!(err, LedgerError::Validation(_)));
    }

    #[test]
    fn unknown_project_wins_over_invalid_input() {
        let ledger = Ledger::new();
        let err = ledger
            .stage_deploy(&name("ghost"), input("  "), Utc::now())
            .unwrap_err();
        assert!(matches!(err, LedgerError::NotFound { .. }), "got {err:?}");
    }

    #[test]
    fn modules_on_unknown_project_is_not_found_but_unknown_client_is_empty() {
        let mut ledger = Ledger::new();
        assert!(ledger.modules(&name("shop"), "acme").is_err());
        create(&mut ledger, "shop");
        assert!(ledger.modules(&name("shop"), "acme").unwrap().is_empty());
    }
}
