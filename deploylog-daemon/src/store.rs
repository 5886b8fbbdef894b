//! Aggregate store with a single write path.
//!
//! Every mutation is sent as a [`WriteJob`] to one writer task, which runs
//! jobs strictly one at a time: check against the current snapshot, build
//! the next version of the affected project, persist it, and only then
//! swap it into the snapshot. A uniqueness or existence check can therefore
//! never be invalidated between check and write, and a failed persist
//! leaves both memory and disk as they were.
//!
//! Reads never enter the queue. They take a read guard on the snapshot,
//! which the writer holds exclusively only for the final swap.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::sync::{mpsc, oneshot, RwLock};

use deploylog_core::{
    storage, Deploy, DeployId, DeployInput, Event, EventStatus, Ledger, Project, ProjectName,
    ResponseModule,
};

use crate::config::DaemonConfig;
use crate::error::StoreError;

type Reply<T> = oneshot::Sender<Result<T, StoreError>>;

enum WriteJob {
    CreateProject {
        name: ProjectName,
        description: String,
        repository_url: String,
        respond_to: Reply<Project>,
    },
    DeleteProject {
        name: ProjectName,
        respond_to: Reply<Project>,
    },
    AddDeploy {
        project: ProjectName,
        input: DeployInput,
        respond_to: Reply<Deploy>,
    },
    AddEvent {
        project: ProjectName,
        deploy_id: DeployId,
        status: EventStatus,
        description: String,
        respond_to: Reply<Event>,
    },
}

/// Where committed projects are written.
#[derive(Debug, Clone)]
enum Backing {
    Disk(PathBuf),
    Memory,
}

impl Backing {
    async fn save(&self, project: &Project) -> Result<(), StoreError> {
        let Backing::Disk(home) = self else {
            return Ok(());
        };
        let home = home.clone();
        let project = project.clone();
        tokio::task::spawn_blocking(move || storage::save_project_at(&home, &project))
            .await
            .map_err(|err| StoreError::Join(format!("save join error: {err}")))??;
        Ok(())
    }

    async fn delete(&self, name: &ProjectName) -> Result<(), StoreError> {
        let Backing::Disk(home) = self else {
            return Ok(());
        };
        let home = home.clone();
        let name = name.clone();
        tokio::task::spawn_blocking(move || storage::delete_project_at(&home, &name))
            .await
            .map_err(|err| StoreError::Join(format!("delete join error: {err}")))??;
        Ok(())
    }
}

/// Cloneable handle to the store. The writer task stops once every handle
/// has been dropped and the queue has drained.
#[derive(Clone)]
pub struct Store {
    snapshot: Arc<RwLock<Ledger>>,
    writes: mpsc::Sender<WriteJob>,
    write_timeout: Duration,
}

impl Store {
    /// Load every persisted project under `config.home` and start the writer.
    pub async fn open(config: &DaemonConfig) -> Result<Self, StoreError> {
        let home = config.home.clone();
        let projects = tokio::task::spawn_blocking(move || storage::load_all_at(&home))
            .await
            .map_err(|err| StoreError::Join(format!("load join error: {err}")))??;
        let documents = projects.len();
        let ledger = Ledger::from_projects(projects);
        if ledger.len() < documents {
            tracing::warn!(
                documents,
                projects = ledger.len(),
                "documents share a project name, keeping the newest of each",
            );
        }
        tracing::info!(
            projects = ledger.len(),
            home = %config.home.display(),
            "store opened",
        );
        Ok(Self::start(ledger, Backing::Disk(config.home.clone()), config))
    }

    /// A store that keeps everything in memory.
    pub fn in_memory(config: &DaemonConfig) -> Self {
        Self::start(Ledger::new(), Backing::Memory, config)
    }

    fn start(ledger: Ledger, backing: Backing, config: &DaemonConfig) -> Self {
        let snapshot = Arc::new(RwLock::new(ledger));
        let (writes, rx) = mpsc::channel::<WriteJob>(config.queue_depth);
        tokio::spawn(writer_task(snapshot.clone(), backing, rx));
        Self {
            snapshot,
            writes,
            write_timeout: config.write_timeout,
        }
    }

    // -----------------------------------------------------------------------
    // Mutations
    // -----------------------------------------------------------------------

    pub async fn create_project(
        &self,
        name: ProjectName,
        description: impl Into<String>,
        repository_url: impl Into<String>,
    ) -> Result<Project, StoreError> {
        let (respond_to, rx) = oneshot::channel();
        let job = WriteJob::CreateProject {
            name,
            description: description.into(),
            repository_url: repository_url.into(),
            respond_to,
        };
        self.submit(job, rx).await
    }

    pub async fn delete_project(&self, name: ProjectName) -> Result<Project, StoreError> {
        let (respond_to, rx) = oneshot::channel();
        self.submit(WriteJob::DeleteProject { name, respond_to }, rx)
            .await
    }

    pub async fn add_deploy(
        &self,
        project: ProjectName,
        input: DeployInput,
    ) -> Result<Deploy, StoreError> {
        let (respond_to, rx) = oneshot::channel();
        let job = WriteJob::AddDeploy {
            project,
            input,
            respond_to,
        };
        self.submit(job, rx).await
    }

    pub async fn add_event(
        &self,
        project: ProjectName,
        deploy_id: DeployId,
        status: EventStatus,
        description: impl Into<String>,
    ) -> Result<Event, StoreError> {
        let (respond_to, rx) = oneshot::channel();
        let job = WriteJob::AddEvent {
            project,
            deploy_id,
            status,
            description: description.into(),
            respond_to,
        };
        self.submit(job, rx).await
    }

    /// Queue a job and wait for its reply, bounded by `write_timeout`.
    /// A job that was already queued still runs to completion after the
    /// caller gives up.
    async fn submit<T>(
        &self,
        job: WriteJob,
        rx: oneshot::Receiver<Result<T, StoreError>>,
    ) -> Result<T, StoreError> {
        let exchange = async {
            self.writes
                .send(job)
                .await
                .map_err(|_| StoreError::ChannelClosed("write queue"))?;
            rx.await
                .map_err(|_| StoreError::ChannelClosed("write reply"))?
        };

        match tokio::time::timeout(self.write_timeout, exchange).await {
            Ok(result) => result,
            Err(_) => {
                tracing::error!(
                    timeout_ms = self.write_timeout.as_millis() as u64,
                    "mutation timed out waiting for the writer",
                );
                Err(StoreError::Timeout(self.write_timeout))
            }
        }
    }

    // -----------------------------------------------------------------------
    // Reads
    // -----------------------------------------------------------------------

    /// All projects, most recently created first.
    pub async fn list_projects(&self) -> Vec<Project> {
        let ledger = self.snapshot.read().await;
        ledger.projects().into_iter().cloned().collect()
    }

    pub async fn get_project(&self, name: &ProjectName) -> Result<Project, StoreError> {
        Ok(self.snapshot.read().await.project(name)?.clone())
    }

    pub async fn get_deploy(
        &self,
        project: &ProjectName,
        id: &DeployId,
    ) -> Result<Deploy, StoreError> {
        Ok(self.snapshot.read().await.deploy(project, id)?.clone())
    }

    pub async fn list_deploys(
        &self,
        project: &ProjectName,
        max: Option<usize>,
    ) -> Result<Vec<Deploy>, StoreError> {
        let ledger = self.snapshot.read().await;
        let deploys = ledger.list_deploys(project, max)?;
        Ok(deploys.into_iter().cloned().collect())
    }

    pub async fn list_clients(&self, project: &ProjectName) -> Result<Vec<String>, StoreError> {
        Ok(self.snapshot.read().await.list_clients(project)?)
    }

    pub async fn get_modules(
        &self,
        project: &ProjectName,
        client: &str,
    ) -> Result<Vec<ResponseModule>, StoreError> {
        Ok(self.snapshot.read().await.modules(project, client)?)
    }

    pub async fn get_modules_as_of(
        &self,
        project: &ProjectName,
        client: &str,
        as_of: &DeployId,
    ) -> Result<Vec<ResponseModule>, StoreError> {
        Ok(self
            .snapshot
            .read()
            .await
            .modules_as_of(project, client, as_of)?)
    }
}

// ---------------------------------------------------------------------------
// Writer
// ---------------------------------------------------------------------------

async fn writer_task(
    snapshot: Arc<RwLock<Ledger>>,
    backing: Backing,
    mut rx: mpsc::Receiver<WriteJob>,
) {
    while let Some(job) = rx.recv().await {
        match job {
            WriteJob::CreateProject {
                name,
                description,
                repository_url,
                respond_to,
            } => {
                let result =
                    create_project(&snapshot, &backing, name, description, repository_url).await;
                match &result {
                    Ok(project) => tracing::info!(project = %project.name, "project created"),
                    Err(err) => log_rejection("create_project", err),
                }
                let _ = respond_to.send(result);
            }
            WriteJob::DeleteProject { name, respond_to } => {
                let result = delete_project(&snapshot, &backing, name).await;
                match &result {
                    Ok(project) => tracing::info!(
                        project = %project.name,
                        deploys = project.deploys.len(),
                        "project deleted",
                    ),
                    Err(err) => log_rejection("delete_project", err),
                }
                let _ = respond_to.send(result);
            }
            WriteJob::AddDeploy {
                project,
                input,
                respond_to,
            } => {
                let result = add_deploy(&snapshot, &backing, project, input).await;
                match &result {
                    Ok(deploy) => tracing::info!(
                        project = %deploy.project_name,
                        deploy = %deploy.id,
                        client = %deploy.client,
                        modules = deploy.modules.len(),
                        "deploy recorded",
                    ),
                    Err(err) => log_rejection("add_deploy", err),
                }
                let _ = respond_to.send(result);
            }
            WriteJob::AddEvent {
                project,
                deploy_id,
                status,
                description,
                respond_to,
            } => {
                let result =
                    add_event(&snapshot, &backing, &project, deploy_id, status, description).await;
                match &result {
                    Ok(event) => tracing::info!(
                        project = %project,
                        deploy = %deploy_id,
                        status = %event.status,
                        "event recorded",
                    ),
                    Err(err) => log_rejection("add_event", err),
                }
                let _ = respond_to.send(result);
            }
        }
    }
    tracing::debug!("store writer stopped");
}

fn log_rejection(operation: &'static str, err: &StoreError) {
    match err {
        StoreError::Ledger(_) => tracing::warn!(operation, error = %err, "mutation rejected"),
        _ => tracing::error!(operation, error = %err, "mutation failed"),
    }
}

async fn create_project(
    snapshot: &RwLock<Ledger>,
    backing: &Backing,
    name: ProjectName,
    description: String,
    repository_url: String,
) -> Result<Project, StoreError> {
    let project = snapshot
        .read()
        .await
        .stage_project(name, description, repository_url, Utc::now())?;
    backing.save(&project).await?;
    snapshot.write().await.commit(project.clone());
    Ok(project)
}

async fn delete_project(
    snapshot: &RwLock<Ledger>,
    backing: &Backing,
    name: ProjectName,
) -> Result<Project, StoreError> {
    snapshot.read().await.project(&name)?;
    backing.delete(&name).await?;
    Ok(snapshot.write().await.delete_project(&name)?)
}

async fn add_deploy(
    snapshot: &RwLock<Ledger>,
    backing: &Backing,
    project: ProjectName,
    input: DeployInput,
) -> Result<Deploy, StoreError> {
    let (next, deploy) = snapshot
        .read()
        .await
        .stage_deploy(&project, input, Utc::now())?;
    backing.save(&next).await?;
    snapshot.write().await.commit(next);
    Ok(deploy)
}

async fn add_event(
    snapshot: &RwLock<Ledger>,
    backing: &Backing,
    project: &ProjectName,
    deploy_id: DeployId,
    status: EventStatus,
    description: String,
) -> Result<Event, StoreError> {
    let (next, event) = snapshot
        .read()
        .await
        .stage_event(project, &deploy_id, status, description, Utc::now())?;
    backing.save(&next).await?;
    snapshot.write().await.commit(next);
    Ok(event)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
