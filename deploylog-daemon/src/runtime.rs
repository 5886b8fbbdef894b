use std::fs;
use std::io::ErrorKind as IoErrorKind;
use std::os::unix::net::UnixStream as StdUnixStream;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde_json::{json, Value};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::unix::OwnedWriteHalf;
use tokio::net::{UnixListener, UnixStream};
use tokio::sync::broadcast;
use tokio::task::JoinError;

use deploylog_core::{DeployId, EventStatus, LedgerError, ProjectName};

use crate::config::{DaemonConfig, LogFormat};
use crate::error::{io_err, DaemonError, ErrorKind, StoreError};
use crate::paths::{projects_root, socket_path};
use crate::protocol::{DaemonRequest, DaemonResponse};
use crate::store::Store;

/// Start the daemon runtime and block the current thread until it exits.
pub fn start_blocking(config: DaemonConfig) -> Result<(), DaemonError> {
    init_tracing(config.log_format);
    tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .map_err(|e| io_err("tokio-runtime", e))?
        .block_on(run(config))
}

/// State shared by every socket connection.
struct Server {
    home: PathBuf,
    store: Store,
    shutdown: broadcast::Sender<()>,
    started_at: DateTime<Utc>,
}

/// Run the daemon runtime: open the store, serve the socket, and wait for
/// ctrl-c or a `stop` request.
pub async fn run(config: DaemonConfig) -> Result<(), DaemonError> {
    deploylog_core::storage::ensure_projects_dir_at(&config.home).map_err(StoreError::from)?;

    let store = Store::open(&config).await?;
    let (shutdown, _) = broadcast::channel::<()>(16);
    let server = Arc::new(Server {
        home: config.home.clone(),
        store,
        shutdown: shutdown.clone(),
        started_at: Utc::now(),
    });

    let serve = {
        let server = Arc::clone(&server);
        tokio::spawn(async move {
            let result = serve_socket(server.clone()).await;
            let _ = server.shutdown.send(());
            result
        })
    };
    let signals = tokio::spawn(wait_for_ctrl_c(shutdown));

    let (serve, signals) = tokio::join!(serve, signals);
    flatten_join("socket server", serve)?;
    flatten_join("signal handler", signals)?;
    tracing::info!("daemon stopped");
    Ok(())
}

async fn wait_for_ctrl_c(shutdown: broadcast::Sender<()>) -> Result<(), DaemonError> {
    let mut stopped = shutdown.subscribe();
    tokio::select! {
        _ = stopped.recv() => Ok(()),
        signal = tokio::signal::ctrl_c() => {
            signal.map_err(|err| DaemonError::Protocol(format!("ctrl-c handler failed: {err}")))?;
            tracing::info!("received ctrl-c, shutting down daemon");
            let _ = shutdown.send(());
            Ok(())
        }
    }
}

async fn serve_socket(server: Arc<Server>) -> Result<(), DaemonError> {
    let socket = socket_path(&server.home);
    prepare_socket_for_bind(&socket)?;

    let listener = UnixListener::bind(&socket).map_err(|e| io_err(&socket, e))?;
    set_socket_permissions(&socket)?;
    tracing::info!(socket = %socket.display(), "daemon listening");

    let mut stopped = server.shutdown.subscribe();
    let outcome = loop {
        tokio::select! {
            _ = stopped.recv() => break Ok(()),
            accepted = listener.accept() => {
                let stream = match accepted {
                    Ok((stream, _)) => stream,
                    Err(err) => break Err(io_err(&socket, err)),
                };
                let server = Arc::clone(&server);
                tokio::spawn(async move {
                    if let Err(err) = serve_connection(stream, &server).await {
                        tracing::error!(error = %err, "socket client error");
                    }
                });
            }
        }
    };

    if let Err(err) = fs::remove_file(&socket) {
        if err.kind() != IoErrorKind::NotFound {
            tracing::warn!(socket = %socket.display(), error = %err, "failed to remove socket");
        }
    }
    outcome
}

/// Answer newline-delimited requests on one connection until the peer hangs
/// up or asks the daemon to stop.
async fn serve_connection(stream: UnixStream, server: &Server) -> Result<(), DaemonError> {
    let (reader, mut writer) = stream.into_split();
    let mut lines = BufReader::new(reader).lines();

    while let Some(line) = lines
        .next_line()
        .await
        .map_err(|e| io_err("daemon socket read", e))?
    {
        if line.trim().is_empty() {
            continue;
        }

        let request = match serde_json::from_str::<DaemonRequest>(&line) {
            Ok(request) => request,
            Err(err) => {
                let response = DaemonResponse::error(
                    ErrorKind::Validation,
                    format!("invalid request JSON: {err}"),
                );
                write_response(&mut writer, &response).await?;
                continue;
            }
        };
        tracing::debug!(cmd = request.name(), "request");

        match request {
            DaemonRequest::Stop => {
                write_response(&mut writer, &DaemonResponse::ok(json!({ "stopping": true })))
                    .await?;
                let _ = server.shutdown.send(());
                return Ok(());
            }
            DaemonRequest::Status => {
                let status = build_status_payload(server).await;
                write_response(&mut writer, &DaemonResponse::ok(status)).await?;
            }
            other => {
                let response = match dispatch(&server.store, other).await {
                    Ok(data) => DaemonResponse::ok(data),
                    Err(err) => DaemonResponse::error(err.kind(), err.public_message()),
                };
                write_response(&mut writer, &response).await?;
            }
        }
    }

    Ok(())
}

/// Map one store request onto the matching [`Store`] operation.
///
/// `status` and `stop` concern the runtime, not the store, and are
/// rejected here.
pub async fn dispatch(store: &Store, request: DaemonRequest) -> Result<Value, StoreError> {
    match request {
        DaemonRequest::CreateProject {
            name,
            description,
            repository_url,
        } => {
            let project = store
                .create_project(ProjectName::from(name), description, repository_url)
                .await?;
            Ok(json!(project))
        }
        DaemonRequest::ListProjects => Ok(json!(store.list_projects().await)),
        DaemonRequest::GetProject { name } => {
            Ok(json!(store.get_project(&ProjectName::from(name)).await?))
        }
        DaemonRequest::DeleteProject { name } => {
            Ok(json!(store.delete_project(ProjectName::from(name)).await?))
        }
        DaemonRequest::AddDeploy { project, deploy } => {
            let input = deploy.into_input()?;
            Ok(json!(store.add_deploy(ProjectName::from(project), input).await?))
        }
        DaemonRequest::AddEvent {
            project,
            deploy_id,
            status,
            description,
        } => {
            let deploy_id = DeployId::from_str(&deploy_id)?;
            let status = EventStatus::from_str(&status)?;
            let event = store
                .add_event(ProjectName::from(project), deploy_id, status, description)
                .await?;
            Ok(json!(event))
        }
        DaemonRequest::GetDeploy { project, deploy_id } => {
            let deploy_id = DeployId::from_str(&deploy_id)?;
            Ok(json!(
                store
                    .get_deploy(&ProjectName::from(project), &deploy_id)
                    .await?
            ))
        }
        DaemonRequest::ListDeploys { project, max } => Ok(json!(
            store.list_deploys(&ProjectName::from(project), max).await?
        )),
        DaemonRequest::ListClients { project } => Ok(json!(
            store.list_clients(&ProjectName::from(project)).await?
        )),
        DaemonRequest::GetModules { project, client } => Ok(json!(
            store
                .get_modules(&ProjectName::from(project), &client)
                .await?
        )),
        DaemonRequest::GetModulesAsOf {
            project,
            client,
            deploy_id,
        } => {
            let deploy_id = DeployId::from_str(&deploy_id)?;
            Ok(json!(
                store
                    .get_modules_as_of(&ProjectName::from(project), &client, &deploy_id)
                    .await?
            ))
        }
        DaemonRequest::Status | DaemonRequest::Stop => Err(StoreError::Ledger(
            LedgerError::Validation("not a store operation".to_string()),
        )),
    }
}

async fn build_status_payload(server: &Server) -> Value {
    let projects: Vec<Value> = server
        .store
        .list_projects()
        .await
        .into_iter()
        .map(|project| {
            json!({
                "name": project.name,
                "deploys": project.deploys.len(),
                "last_deploy_at": project.deploys.last().map(|d| d.timestamp),
            })
        })
        .collect();

    json!({
        "running": true,
        "version": env!("CARGO_PKG_VERSION"),
        "started_at": server.started_at,
        "uptime_secs": (Utc::now() - server.started_at).num_seconds().max(0),
        "projects": projects,
        "socket": socket_path(&server.home).display().to_string(),
        "projects_root": projects_root(&server.home).display().to_string(),
    })
}

fn prepare_socket_for_bind(socket: &Path) -> Result<(), DaemonError> {
    if !socket.exists() {
        return Ok(());
    }

    match StdUnixStream::connect(socket) {
        Ok(_) => {
            return Err(DaemonError::Protocol(format!(
                "daemon socket already in use: {}",
                socket.display()
            )));
        }
        Err(err) => {
            tracing::warn!(
                socket = %socket.display(),
                error = %err,
                "removing stale daemon socket before bind",
            );
        }
    }

    match fs::remove_file(socket) {
        Ok(()) => Ok(()),
        Err(err) if err.kind() == IoErrorKind::NotFound => Ok(()),
        Err(err) => Err(io_err(socket, err)),
    }
}

async fn write_response(
    writer: &mut OwnedWriteHalf,
    response: &DaemonResponse,
) -> Result<(), DaemonError> {
    let mut frame = serde_json::to_vec(response)?;
    frame.push(b'\n');
    writer
        .write_all(&frame)
        .await
        .map_err(|e| io_err("daemon socket write", e))?;
    writer
        .flush()
        .await
        .map_err(|e| io_err("daemon socket flush", e))
}

fn flatten_join(
    task: &str,
    joined: Result<Result<(), DaemonError>, JoinError>,
) -> Result<(), DaemonError> {
    joined.map_err(|err| DaemonError::Protocol(format!("{task} task failed: {err}")))?
}

fn init_tracing(format: LogFormat) {
    use tracing_subscriber::{fmt, EnvFilter};

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = match format {
        LogFormat::Text => fmt().with_env_filter(filter).with_target(false).try_init(),
        LogFormat::Json => fmt().with_env_filter(filter).json().try_init(),
    };
}

#[cfg(unix)]
fn set_socket_permissions(path: &Path) -> Result<(), DaemonError> {
    use std::os::unix::fs::PermissionsExt;
    fs::set_permissions(path, fs::Permissions::from_mode(0o600)).map_err(|e| io_err(path, e))
}

#[cfg(not(unix))]
fn set_socket_permissions(_path: &Path) -> Result<(), DaemonError> {
    Ok(())
}
