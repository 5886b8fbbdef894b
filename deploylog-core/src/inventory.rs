//! Module inventory reduction.
//!
//! The ledger keeps no inventory table. What is installed for a client is
//! derived on demand by folding that client's module changes in
//! chronological order: oldest deploy first, and within a deploy in the
//! order the changes were recorded. The fold is keyed on module name alone,
//! so any later change to a name replaces the earlier one whatever its
//! version. Names whose final change is `REMOVE` drop out of the result.

use std::collections::BTreeMap;

use crate::error::LedgerError;
use crate::types::{Deploy, DeployId, ModuleChange, ModuleStatus, Project, ResponseModule};

/// Fold a chronological change sequence into the surviving inventory,
/// sorted by module name.
pub fn reduce<'a, I>(changes: I) -> Vec<ResponseModule>
where
    I: IntoIterator<Item = &'a ModuleChange>,
{
    let mut latest: BTreeMap<&str, &ModuleChange> = BTreeMap::new();
    for change in changes {
        latest.insert(change.name.as_str(), change);
    }

    latest
        .into_values()
        .filter(|change| change.status == ModuleStatus::Add)
        .map(|change| ResponseModule {
            name: change.name.clone(),
            version: change.version.clone(),
            status: ModuleStatus::Add,
        })
        .collect()
}

/// Every module change recorded for `client`, oldest first.
pub fn client_history<'a>(
    deploys: &'a [Deploy],
    client: &'a str,
) -> impl Iterator<Item = &'a ModuleChange> + 'a {
    deploys
        .iter()
        .filter(move |deploy| deploy.client == client)
        .flat_map(|deploy| deploy.modules.iter())
}

/// Current inventory of `client` within `project`. Unknown clients yield an
/// empty inventory.
pub fn current(project: &Project, client: &str) -> Vec<ResponseModule> {
    reduce(client_history(&project.deploys, client))
}

/// Inventory of `client` as it stood right after deploy `as_of` was recorded.
pub fn as_of(
    project: &Project,
    client: &str,
    as_of: &DeployId,
) -> Result<Vec<ResponseModule>, LedgerError> {
    let cut = project
        .deploys
        .iter()
        .position(|deploy| &deploy.id == as_of)
        .ok_or_else(|| LedgerError::deploy_not_found(&project.name, as_of))?;
    Ok(reduce(client_history(&project.deploys[..=cut], client)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{DeployInput, ProjectName};
    use chrono::Utc;

    fn project_with(changes: Vec<(&str, Vec<ModuleChange>)>) -> Project {
        let mut project = Project::new(ProjectName::from("shop"), "", "", Utc::now());
        for (client, modules) in changes {
            project.record_deploy(
                DeployInput {
                    user: "ci".into(),
                    version: "1".into(),
                    client: client.into(),
                    modules,
                    ..DeployInput::default()
                },
                Utc::now(),
            );
        }
        project
    }

    #[test]
    fn add_remove_add_keeps_latest_version() {
        let project = project_with(vec![
            ("acme", vec![ModuleChange::add("ModuleX", "v0.1")]),
            ("acme", vec![ModuleChange::remove("ModuleX", "v0.1")]),
            ("acme", vec![ModuleChange::add("ModuleX", "v0.2")]),
        ]);
        assert_eq!(
            current(&project, "acme"),
            vec![ResponseModule {
                name: "ModuleX".into(),
                version: "v0.2".into(),
                status: ModuleStatus::Add,
            }]
        );
    }

    #[test]
    fn later_add_supersedes_other_version() {
        let changes = [ModuleChange::add("auth", "1.0"), ModuleChange::add("auth", "2.0")];
        let inventory = reduce(changes.iter());
        assert_eq!(inventory.len(), 1);
        assert_eq!(inventory[0].version, "2.0");
    }

    #[test]
    fn remove_of_any_version_drops_module() {
        let changes = [ModuleChange::add("auth", "1.0"), ModuleChange::remove("auth", "0.9")];
        assert!(reduce(changes.iter()).is_empty());
    }

    #[test]
    fn order_within_single_deploy_is_respected() {
        let project = project_with(vec![(
            "acme",
            vec![
                ModuleChange::remove("billing", "1"),
                ModuleChange::add("billing", "2"),
            ],
        )]);
        assert_eq!(current(&project, "acme")[0].version, "2");
    }

    #[test]
    fn other_clients_do_not_leak_in() {
        let project = project_with(vec![
            ("acme", vec![ModuleChange::add("search", "1")]),
            ("globex", vec![ModuleChange::remove("search", "1")]),
        ]);
        assert_eq!(current(&project, "acme").len(), 1);
        assert!(current(&project, "globex").is_empty());
        assert!(current(&project, "initech").is_empty());
    }

    #[test]
    fn as_of_truncates_history_at_deploy() {
        let project = project_with(vec![
            ("acme", vec![ModuleChange::add("search", "1")]),
            ("acme", vec![ModuleChange::remove("search", "1")]),
        ]);
        let first = project.deploys[0].id;
        let at_first = as_of(&project, "acme", &first).expect("as_of");
        assert_eq!(at_first.len(), 1);
        let second = project.deploys[1].id;
        assert!(as_of(&project, "acme", &second).expect("as_of").is_empty());
    }

    #[test]
    fn as_of_unknown_deploy_is_not_found() {
        let project = project_with(vec![]);
        let err = as_of(&project, "acme", &DeployId::new()).unwrap_err();
        assert!(matches!(err, LedgerError::NotFound { .. }));
    }

    #[test]
    fn inventory_is_sorted_by_name() {
        let changes = [
            ModuleChange::add("zeta", "1"),
            ModuleChange::add("alpha", "1"),
            ModuleChange::add("mid", "1"),
        ];
        let names: Vec<_> = reduce(changes.iter()).into_iter().map(|m| m.name).collect();
        assert_eq!(names, vec!["alpha", "mid", "zeta"]);
    }
}
