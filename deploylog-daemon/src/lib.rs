//! deploylog daemon: the write-serializing store, its runtime, and the
//! newline-delimited JSON socket protocol in front of it.

pub mod config;
mod error;
pub mod paths;
pub mod protocol;
mod runtime;
pub mod store;

pub use config::{DaemonConfig, LogFormat};
pub use error::{DaemonError, ErrorKind, StoreError};
pub use protocol::{
    call, request_status, request_stop, send_request, DaemonRequest, DaemonResponse,
    DeployRequest, ModuleChangeRequest,
};
pub use runtime::{dispatch, run, start_blocking};
pub use store::Store;
