//! Per-project YAML documents.
//!
//! # Storage layout
//!
//! ```text
//! <home>/.deploylog/
//!   projects/
//!     <project_name>.yaml   (one document per project, mode 0600)
//! ```
//!
//! A document holds the whole aggregate: the project, its deploys, and their
//! events and module changes. Deleting the file is the cascade delete.
//!
//! All functions take an explicit `home`; tests always pass a `TempDir`.

use std::path::{Path, PathBuf};

use crate::error::{io_err, StorageError};
use crate::types::{Project, ProjectName};

pub const ROOT_DIR: &str = ".deploylog";
pub const PROJECTS_DIR: &str = "projects";

// ---------------------------------------------------------------------------
// 1. Path helpers
// ---------------------------------------------------------------------------

/// `<home>/.deploylog/`
pub fn root_at(home: &Path) -> PathBuf {
    home.join(ROOT_DIR)
}

/// `<home>/.deploylog/projects/` (pure, no I/O).
pub fn projects_dir_at(home: &Path) -> PathBuf {
    root_at(home).join(PROJECTS_DIR)
}

/// `<home>/.deploylog/projects/<project>.yaml` (pure, no I/O).
pub fn project_path_at(home: &Path, project: &ProjectName) -> PathBuf {
    projects_dir_at(home).join(format!("{}.yaml", project.0))
}

/// Create `<home>/.deploylog/projects/` (mode `0700`) if absent.
pub fn ensure_projects_dir_at(home: &Path) -> Result<PathBuf, StorageError> {
    let dir = projects_dir_at(home);
    if !dir.exists() {
        std::fs::create_dir_all(&dir).map_err(|e| io_err(&dir, e))?;
        set_dir_permissions(&dir)?;
    }
    Ok(dir)
}

/// The current user's home directory.
pub fn home() -> Result<PathBuf, StorageError> {
    dirs::home_dir().ok_or(StorageError::HomeNotFound)
}

// ---------------------------------------------------------------------------
// 2. Load
// ---------------------------------------------------------------------------

/// Load every project document, sorted by project name.
///
/// Skips anything that is not a `.yaml` file, including `.yaml.tmp`
/// leftovers from an interrupted save.
pub fn load_all_at(home: &Path) -> Result<Vec<Project>, StorageError> {
    let dir = projects_dir_at(home);
    if !dir.exists() {
        return Ok(vec![]);
    }

    let mut entries: Vec<_> = std::fs::read_dir(&dir)
        .map_err(|e| io_err(&dir, e))?
        .filter_map(|e| e.ok())
        .filter(|e| e.file_type().map(|t| t.is_file()).unwrap_or(false))
        .filter(|e| {
            e.path()
                .extension()
                .and_then(|ext| ext.to_str())
                .map(|ext| ext == "yaml")
                .unwrap_or(false)
        })
        .collect();
    entries.sort_by_key(|e| e.file_name());

    entries
        .into_iter()
        .map(|entry| read_document(&entry.path()))
        .collect()
}

fn read_document(path: &Path) -> Result<Project, StorageError> {
    let contents = std::fs::read_to_string(path).map_err(|e| io_err(path, e))?;
    serde_yaml::from_str(&contents).map_err(|source| StorageError::Parse {
        path: path.to_path_buf(),
        source,
    })
}

// ---------------------------------------------------------------------------
// 3. Save (atomic)
// ---------------------------------------------------------------------------

/// Atomically write a project document.
///
/// Write flow: serialize → `.yaml.tmp` sibling → `chmod 0600` → `rename`.
/// The `.tmp` lives in the same directory as the target, so the rename never
/// crosses filesystems.
pub fn save_project_at(home: &Path, project: &Project) -> Result<(), StorageError> {
    ensure_projects_dir_at(home)?;
    let path = project_path_at(home, &project.name);
    let tmp_path = path.with_file_name(format!("{}.yaml.tmp", project.name.0));

    let yaml = serde_yaml::to_string(project)?;
    std::fs::write(&tmp_path, yaml).map_err(|e| io_err(&tmp_path, e))?;
    set_file_permissions(&tmp_path)?;
    std::fs::rename(&tmp_path, &path).map_err(|e| io_err(&path, e))?;
    Ok(())
}

// ---------------------------------------------------------------------------
// 4. Delete
// ---------------------------------------------------------------------------

/// Remove a project document. Returns `false` if there was nothing to remove.
pub fn delete_project_at(home: &Path, project: &ProjectName) -> Result<bool, StorageError> {
    let path = project_path_at(home, project);
    match std::fs::remove_file(&path) {
        Ok(()) => Ok(true),
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(false),
        Err(err) => Err(io_err(&path, err)),
    }
}

// ---------------------------------------------------------------------------
// Private helpers
// ---------------------------------------------------------------------------

#[cfg(unix)]
fn set_dir_permissions(path: &Path) -> Result<(), StorageError> {
    use std::os::unix::fs::PermissionsExt;
    std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o700))
        .map_err(|e| io_err(path, e))
}
#[cfg(not(unix))]
fn set_dir_permissions(_path: &Path) -> Result<(), StorageError> {
    Ok(())
}

#[cfg(unix)]
fn set_file_permissions(path: &Path) -> Result<(), StorageError> {
    use std::os::unix::fs::PermissionsExt;
    std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o600))
        .map_err(|e| io_err(path, e))
}
#[cfg(not(unix))]
fn set_file_permissions(_path: &Path) -> Result<(), StorageError> {
    Ok(())
}

// ---------------------------------------------------------------------------
// Unit tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use tempfile::TempDir;

    fn proj() -> ProjectName {
        ProjectName::from("billing")
    }

    #[test]
    fn project_path_is_correct() {
        let home = TempDir::new().expect("tempdir");
        let path = project_path_at(home.path(), &proj());
        assert!(path.ends_with(".deploylog/projects/billing.yaml"));
    }

    #[test]
    fn projects_dir_created_with_perms() {
        let home = TempDir::new().expect("tempdir");
        let dir = ensure_projects_dir_at(home.path()).expect("ensure");
        assert!(dir.exists());
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let mode = std::fs::metadata(&dir).unwrap().permissions().mode() & 0o777;
            assert_eq!(mode, 0o700);
        }
    }

    #[test]
    fn load_all_empty_when_no_directory() {
        let home = TempDir::new().expect("tempdir");
        assert!(load_all_at(home.path()).expect("load").is_empty());
    }

    #[test]
    fn delete_missing_reports_false() {
        let home = TempDir::new().expect("tempdir");
        assert!(!delete_project_at(home.path(), &proj()).expect("delete"));
    }

    #[test]
    fn save_then_delete_removes_document() {
        let home = TempDir::new().expect("tempdir");
        let project = Project::new(proj(), "", "", Utc::now());
        save_project_at(home.path(), &project).expect("save");
        assert!(delete_project_at(home.path(), &proj()).expect("delete"));
        assert!(!project_path_at(home.path(), &proj()).exists());
    }

    #[test]
    fn home_not_found_error_message() {
        assert!(StorageError::HomeNotFound.to_string().contains("home directory"));
    }
}
