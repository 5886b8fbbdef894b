use std::io::{BufRead, BufReader, Write};
use std::os::unix::net::UnixStream;
use std::path::Path;
use std::thread::sleep;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use deploylog_core::{Commit, DeployInput, LedgerError, ModuleChange};

use crate::error::{io_err, DaemonError, ErrorKind};
use crate::paths::socket_path;

/// JSON newline-delimited request.
///
/// Status fields travel as plain strings and are only turned into the
/// closed enums once they reach the daemon.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "cmd", rename_all = "snake_case")]
pub enum DaemonRequest {
    CreateProject {
        name: String,
        #[serde(default)]
        description: String,
        #[serde(default)]
        repository_url: String,
    },
    ListProjects,
    GetProject {
        name: String,
    },
    DeleteProject {
        name: String,
    },
    AddDeploy {
        project: String,
        deploy: DeployRequest,
    },
    AddEvent {
        project: String,
        deploy_id: String,
        status: String,
        #[serde(default)]
        description: String,
    },
    GetDeploy {
        project: String,
        deploy_id: String,
    },
    ListDeploys {
        project: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        max: Option<usize>,
    },
    ListClients {
        project: String,
    },
    GetModules {
        project: String,
        client: String,
    },
    GetModulesAsOf {
        project: String,
        client: String,
        deploy_id: String,
    },
    Status,
    Stop,
}

impl DaemonRequest {
    /// The `cmd` tag, for logging.
    pub fn name(&self) -> &'static str {
        match self {
            DaemonRequest::CreateProject { .. } => "create_project",
            DaemonRequest::ListProjects => "list_projects",
            DaemonRequest::GetProject { .. } => "get_project",
            DaemonRequest::DeleteProject { .. } => "delete_project",
            DaemonRequest::AddDeploy { .. } => "add_deploy",
            DaemonRequest::AddEvent { .. } => "add_event",
            DaemonRequest::GetDeploy { .. } => "get_deploy",
            DaemonRequest::ListDeploys { .. } => "list_deploys",
            DaemonRequest::ListClients { .. } => "list_clients",
            DaemonRequest::GetModules { .. } => "get_modules",
            DaemonRequest::GetModulesAsOf { .. } => "get_modules_as_of",
            DaemonRequest::Status => "status",
            DaemonRequest::Stop => "stop",
        }
    }
}

/// Deploy fields as they arrive on the wire.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct DeployRequest {
    pub user: String,
    #[serde(default)]
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
    pub modules: Vec<ModuleChangeRequest>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub config: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModuleChangeRequest {
    pub name: String,
    pub version: String,
    pub status: String,
}

impl DeployRequest {
    /// Validate open-string statuses into a typed [`DeployInput`].
    pub fn into_input(self) -> Result<DeployInput, LedgerError> {
        let modules = self
            .modules
            .into_iter()
            .map(|m| -> Result<ModuleChange, LedgerError> {
                Ok(ModuleChange {
                    status: m.status.parse()?,
                    name: m.name,
                    version: m.version,
                })
            })
            .collect::<Result<Vec<_>, _>>()?;

        Ok(DeployInput {
            user: self.user,
            commit: self.commit,
            description: self.description,
            changelog_url: self.changelog_url,
            version: self.version,
            automatic: self.automatic,
            client: self.client,
            modules,
            config: self.config,
        })
    }
}

/// JSON newline-delimited response.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DaemonResponse {
    pub ok: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub kind: Option<ErrorKind>,
}

impl DaemonResponse {
    pub fn ok(data: Value) -> Self {
        Self {
            ok: true,
            data: Some(data),
            error: None,
            kind: None,
        }
    }

    pub fn error(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            ok: false,
            data: None,
            error: Some(message.into()),
            kind: Some(kind),
        }
    }
}

/// Send one JSON request to the daemon socket and return one response.
pub fn send_request(home: &Path, request: &DaemonRequest) -> Result<DaemonResponse, DaemonError> {
    let socket = socket_path(home);
    if !socket.exists() {
        return Err(DaemonError::DaemonNotRunning { socket });
    }

    let mut stream = UnixStream::connect(&socket).map_err(|err| {
        if matches!(
            err.kind(),
            std::io::ErrorKind::NotFound
                | std::io::ErrorKind::ConnectionRefused
                | std::io::ErrorKind::ConnectionReset
        ) {
            DaemonError::DaemonNotRunning {
                socket: socket.clone(),
            }
        } else {
            io_err(&socket, err)
        }
    })?;

    let payload = serde_json::to_string(request)?;
    stream
        .write_all(payload.as_bytes())
        .map_err(|e| io_err(&socket, e))?;
    stream.write_all(b"\n").map_err(|e| io_err(&socket, e))?;
    stream.flush().map_err(|e| io_err(&socket, e))?;

    let mut reader = BufReader::new(stream);
    let mut line = String::new();
    let read = reader
        .read_line(&mut line)
        .map_err(|e| io_err(&socket, e))?;
    if read == 0 {
        return Err(DaemonError::Protocol(
            "daemon closed connection before responding".to_string(),
        ));
    }

    let response: DaemonResponse = serde_json::from_str(line.trim_end())?;
    Ok(response)
}

/// Send a request and unwrap its payload, turning a failure response into
/// [`DaemonError::Remote`].
pub fn call(home: &Path, request: &DaemonRequest) -> Result<Value, DaemonError> {
    response_into_data(send_request(home, request)?)
}

/// `status`, retried briefly while the daemon is still binding its socket.
pub fn request_status(home: &Path) -> Result<Value, DaemonError> {
    let mut last_not_running: Option<DaemonError> = None;
    for attempt in 0..5 {
        match call(home, &DaemonRequest::Status) {
            Ok(data) => return Ok(data),
            Err(err @ DaemonError::DaemonNotRunning { .. }) => {
                last_not_running = Some(err);
                if attempt < 4 {
                    sleep(Duration::from_millis(100));
                    continue;
                }
            }
            Err(err) => return Err(err),
        }
    }

    Err(last_not_running.unwrap_or_else(|| {
        DaemonError::Protocol("daemon status retry loop exited unexpectedly".to_string())
    }))
}

pub fn request_stop(home: &Path) -> Result<(), DaemonError> {
    call(home, &DaemonRequest::Stop).map(|_| ())
}

fn response_into_data(response: DaemonResponse) -> Result<Value, DaemonError> {
    if response.ok {
        Ok(response.data.unwrap_or(Value::Null))
    } else {
        Err(DaemonError::Remote {
            kind: response.kind.unwrap_or(ErrorKind::Internal),
            message: response
                .error
                .unwrap_or_else(|| "unknown daemon error".to_string()),
        })
    }
}
