//! deploylog core library: entity model, project registry and deploy ledger,
//! module inventory reduction, and on-disk persistence.
//!
//! - [`types`]: newtypes and domain structs
//! - [`error`]: [`LedgerError`] and [`StorageError`]
//! - [`ledger`]: the in-memory aggregate of all projects
//! - [`inventory`]: folds module-change history into current inventory
//! - [`storage`]: load / save / delete project documents

pub mod error;
pub mod inventory;
pub mod ledger;
pub mod storage;
pub mod types;

pub use error::{Entity, LedgerError, StorageError};
pub use ledger::{Ledger, DEFAULT_MAX_DEPLOYS};
pub use types::{
    Commit, Deploy, DeployId, DeployInput, Event, EventStatus, ModuleChange, ModuleStatus,
    Project, ProjectName, ResponseModule,
};
