use std::path::{Path, PathBuf};
use std::time::Duration;

use deploylog_core::storage;

pub const DAEMON_SOCKET: &str = "daemon.sock";
pub const SESSION_FILE: &str = "session.yaml";

pub const DEFAULT_WRITE_TIMEOUT: Duration = Duration::from_secs(5);
pub const DEFAULT_QUEUE_DEPTH: usize = 64;

pub fn deploylog_root(home: &Path) -> PathBuf {
    storage::root_at(home)
}

pub fn projects_root(home: &Path) -> PathBuf {
    storage::projects_dir_at(home)
}

pub fn socket_path(home: &Path) -> PathBuf {
    deploylog_root(home).join(DAEMON_SOCKET)
}

pub fn session_path(home: &Path) -> PathBuf {
    deploylog_root(home).join(SESSION_FILE)
}
