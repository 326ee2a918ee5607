use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use clap::{Args as ClapArgs, Parser, Subcommand, ValueEnum};
use tracing_subscriber::EnvFilter;

use batchgate::api::{self, ApiState};
use batchgate::config::{ApiConfig, ExecutorConfig, ServerConfig, WorkerCommand, WORKER_SUBCOMMAND};
use batchgate::envelope::Envelope;
use batchgate::error::{ClusterError, Result as ClusterResult};
use batchgate::model::{Entity, JobId};
use batchgate::projection::{Projector, DEFAULT_PREFIX};
use batchgate::scheduler::{
    HostAction, JobFilter, JobSignal, QueueAction, SchedulerFactory, StateFile, SubmitRequest,
};
use batchgate::shutdown::install_shutdown_handler;
use batchgate::worker::{
    NoDrop, Operation, OutputStream, PrivilegeDrop, PrivilegedExecutor, Setuid, SystemUsers,
    WorkerRuntime,
};

#[derive(Parser, Debug)]
#[command(name = "batchgate")]
#[command(version)]
#[command(about = "Privilege-separated gateway to a batch scheduler's cluster state")]
#[command(propagate_version = true)]
struct Args {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Start the JSON API server
    Serve(ServeArgs),

    /// Run one unit of work read from stdin (started by the executor)
    #[command(hide = true)]
    Worker(BackendArgs),

    /// Perform one privileged operation as a user and print the envelope
    Run {
        #[command(flatten)]
        backend: BackendArgs,

        /// User to act as
        #[arg(long = "as", value_name = "USER")]
        user: String,

        /// Seconds to wait for the worker's result
        #[arg(long, default_value = "30")]
        timeout_secs: u64,

        #[command(subcommand)]
        operation: OperationCommand,
    },

    /// Print a projection of cluster state
    Show {
        #[command(flatten)]
        backend: BackendArgs,

        /// Act as this user when reading
        #[arg(long = "as", value_name = "USER")]
        user: Option<String>,

        #[command(subcommand)]
        target: ShowTarget,
    },
}

// =============================================================================
// Arguments
// =============================================================================

#[derive(ClapArgs, Debug, Clone)]
struct BackendArgs {
    /// JSON cluster state file
    #[arg(long)]
    state_file: PathBuf,

    /// Prefix for locators in projections
    #[arg(long, default_value = DEFAULT_PREFIX)]
    url_prefix: String,

    /// Keep the current identity in workers (single-user development only)
    #[arg(long)]
    no_drop_privileges: bool,
}

impl BackendArgs {
    /// The command line a worker for this backend is started with.
    fn worker_command(&self) -> WorkerCommand {
        WorkerCommand::default()
            .with_arg("--state-file")
            .with_arg(self.state_file.display().to_string())
            .with_arg("--url-prefix")
            .with_arg(self.url_prefix.as_str())
    }

    fn executor_config(&self, timeout: Duration) -> ExecutorConfig {
        ExecutorConfig::default()
            .with_timeout(timeout)
            .with_worker(self.worker_command())
            .with_drop_privileges(!self.no_drop_privileges)
    }
}

#[derive(ClapArgs, Debug)]
struct ServeArgs {
    #[command(flatten)]
    backend: BackendArgs,

    /// Address to listen on
    #[arg(long, default_value = "127.0.0.1:8080")]
    listen: SocketAddr,

    /// Request header carrying the authenticated user name
    #[arg(long, default_value = "x-remote-user")]
    identity_header: String,

    /// Seconds to wait for a worker's result
    #[arg(long, default_value = "30")]
    timeout_secs: u64,
}

#[derive(ClapArgs, Debug)]
struct JobArgs {
    job_id: u64,

    #[arg(default_value = "0")]
    array_index: u32,
}

impl JobArgs {
    fn id(&self) -> JobId {
        JobId::new(self.job_id, self.array_index)
    }
}

#[derive(ValueEnum, Debug, Clone, Copy)]
enum QueueActionArg {
    Open,
    Close,
    Activate,
    Inactivate,
}

impl From<QueueActionArg> for QueueAction {
    fn from(arg: QueueActionArg) -> Self {
        match arg {
            QueueActionArg::Open => QueueAction::Open,
            QueueActionArg::Close => QueueAction::Close,
            QueueActionArg::Activate => QueueAction::Activate,
            QueueActionArg::Inactivate => QueueAction::Inactivate,
        }
    }
}

#[derive(ValueEnum, Debug, Clone, Copy)]
enum HostActionArg {
    Open,
    Close,
}

impl From<HostActionArg> for HostAction {
    fn from(arg: HostActionArg) -> Self {
        match arg {
            HostActionArg::Open => HostAction::Open,
            HostActionArg::Close => HostAction::Close,
        }
    }
}

#[derive(Subcommand, Debug)]
enum OperationCommand {
    /// Kill a job
    Kill(JobArgs),
    /// Suspend a job
    Suspend(JobArgs),
    /// Resume a suspended job
    Resume(JobArgs),
    /// Put a job back in its queue
    Requeue {
        #[command(flatten)]
        job: JobArgs,
        /// Requeue held instead of pending
        #[arg(long)]
        hold: bool,
    },
    /// Submit a job from a JSON object of submission fields
    Submit { request: String },
    /// Print a job's output stream
    Output(JobArgs),
    /// Print a job's error stream
    Error(JobArgs),
    /// Open, close, activate or inactivate a queue
    Queue { name: String, action: QueueActionArg },
    /// Open or close a host
    Host { name: String, action: HostActionArg },
}

impl OperationCommand {
    fn into_operation(self) -> ClusterResult<Operation> {
        let operation = match self {
            OperationCommand::Kill(job) => Operation::SignalJob {
                job: job.id(),
                signal: JobSignal::Kill,
            },
            OperationCommand::Suspend(job) => Operation::SignalJob {
                job: job.id(),
                signal: JobSignal::Suspend,
            },
            OperationCommand::Resume(job) => Operation::SignalJob {
                job: job.id(),
                signal: JobSignal::Resume,
            },
            OperationCommand::Requeue { job, hold } => Operation::RequeueJob { job: job.id(), hold },
            OperationCommand::Submit { request } => {
                let fields = serde_json::from_str(&request).map_err(|e| {
                    ClusterError::job_submit(format!("Submission is not a JSON object: {e}"))
                })?;
                Operation::SubmitJob {
                    request: SubmitRequest::from_fields(fields)?,
                }
            }
            OperationCommand::Output(job) => Operation::ReadJobOutput {
                job: job.id(),
                stream: OutputStream::Output,
            },
            OperationCommand::Error(job) => Operation::ReadJobOutput {
                job: job.id(),
                stream: OutputStream::Error,
            },
            OperationCommand::Queue { name, action } => Operation::ControlQueue {
                queue: name,
                action: action.into(),
            },
            OperationCommand::Host { name, action } => Operation::ControlHost {
                host: name,
                action: action.into(),
            },
        };
        Ok(operation)
    }
}

#[derive(Subcommand, Debug)]
enum ShowTarget {
    Cluster,
    Hosts,
    Host { name: String },
    Queues,
    Queue { name: String },
    Users,
    User { name: String },
    /// Jobs that have not finished
    Jobs,
    Job(JobArgs),
}

// =============================================================================
// Command Handlers
// =============================================================================

fn init_tracing() {
    // stdout belongs to the worker channel and to printed envelopes.
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();
}

fn privileges(no_drop_privileges: bool) -> Arc<dyn PrivilegeDrop> {
    if no_drop_privileges {
        Arc::new(NoDrop)
    } else {
        Arc::new(Setuid)
    }
}

fn print_envelope(envelope: &Envelope) -> Result<(), Box<dyn std::error::Error>> {
    println!("{}", serde_json::to_string_pretty(envelope)?);
    if !envelope.is_ok() {
        std::process::exit(1);
    }
    Ok(())
}

async fn run_server(args: ServeArgs) -> Result<(), Box<dyn std::error::Error>> {
    let config = ServerConfig::new(args.backend.state_file.clone())
        .with_api(
            ApiConfig::new(args.listen)
                .with_url_prefix(args.backend.url_prefix.as_str())
                .with_identity_header(args.identity_header.as_str()),
        )
        .with_executor(
            args.backend
                .executor_config(Duration::from_secs(args.timeout_secs)),
        );

    tracing::info!(
        state_file = %config.state_file.display(),
        drop_privileges = config.executor.drop_privileges,
        timeout_secs = config.executor.timeout.as_secs(),
        "Starting batchgate"
    );

    let schedulers: Arc<dyn SchedulerFactory> = Arc::new(StateFile::new(config.state_file.clone()));
    let executor = PrivilegedExecutor::from_config(&config.executor, Arc::new(SystemUsers));
    let state = ApiState::new(schedulers, Arc::new(executor), &config.api)?;

    let shutdown_token = install_shutdown_handler()?;
    let listener = tokio::net::TcpListener::bind(config.api.listen_addr).await?;
    api::serve(listener, state, &config.api.url_prefix, async move {
        shutdown_token.cancelled().await;
    })
    .await?;

    tracing::info!("Server stopped");
    Ok(())
}

fn run_worker(args: BackendArgs) -> Result<(), Box<dyn std::error::Error>> {
    let runtime = WorkerRuntime::new(
        Arc::new(StateFile::new(args.state_file)),
        privileges(args.no_drop_privileges),
        Projector::with_prefix(args.url_prefix),
    );
    runtime.serve_one(std::io::stdin().lock(), std::io::stdout().lock())?;
    Ok(())
}

async fn run_operation(
    backend: BackendArgs,
    user: String,
    timeout: Duration,
    operation: OperationCommand,
) -> Result<(), Box<dyn std::error::Error>> {
    let result = match operation.into_operation() {
        Ok(operation) => {
            let executor = PrivilegedExecutor::from_config(
                &backend.executor_config(timeout),
                Arc::new(SystemUsers),
            );
            executor.execute(&user, operation).await
        }
        Err(e) => Err(e),
    };
    print_envelope(&Envelope::from_result(result))
}

fn show(
    backend: BackendArgs,
    user: Option<String>,
    target: ShowTarget,
) -> Result<(), Box<dyn std::error::Error>> {
    let projector = Projector::with_prefix(backend.url_prefix.as_str());
    let result = StateFile::new(backend.state_file)
        .connect(user.as_deref())
        .and_then(|scheduler| -> ClusterResult<serde_json::Value> {
            let projected = match target {
                ShowTarget::Cluster => projector.project(Entity::Cluster(scheduler.cluster()?.as_ref())),
                ShowTarget::Hosts => {
                    let hosts = scheduler.hosts()?;
                    projector.project_all(hosts.iter().map(|host| Entity::Host(host.as_ref())))
                }
                ShowTarget::Host { name } => {
                    projector.project(Entity::Host(scheduler.host(&name)?.as_ref()))
                }
                ShowTarget::Queues => {
                    let queues = scheduler.queues()?;
                    projector.project_all(queues.iter().map(|queue| Entity::Queue(queue.as_ref())))
                }
                ShowTarget::Queue { name } => {
                    projector.project(Entity::Queue(scheduler.queue(&name)?.as_ref()))
                }
                ShowTarget::Users => {
                    let users = scheduler.users()?;
                    projector.project_all(users.iter().map(|user| Entity::User(user.as_ref())))
                }
                ShowTarget::User { name } => {
                    projector.project(Entity::User(scheduler.user(&name)?.as_ref()))
                }
                ShowTarget::Jobs => {
                    let jobs = scheduler.jobs(&JobFilter::new())?;
                    projector.project_all(jobs.iter().map(|job| Entity::Job(job.as_ref())))
                }
                ShowTarget::Job(job) => {
                    projector.project(Entity::Job(scheduler.job(job.id())?.as_ref()))
                }
            };
            Ok(projected?)
        });
    print_envelope(&Envelope::from_result(result))
}

// =============================================================================
// Main Entry Point
// =============================================================================

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();
    init_tracing();

    match args.command {
        // Workers stay single-threaded so the identity drop covers the whole process.
        Commands::Worker(backend) => {
            tracing::debug!(subcommand = WORKER_SUBCOMMAND, "Worker started");
            run_worker(backend)
        }
        Commands::Show {
            backend,
            user,
            target,
        } => show(backend, user, target),
        Commands::Serve(serve_args) => block_on(run_server(serve_args)),
        Commands::Run {
            backend,
            user,
            timeout_secs,
            operation,
        } => block_on(run_operation(
            backend,
            user,
            Duration::from_secs(timeout_secs),
            operation,
        )),
    }
}

fn block_on<F>(future: F) -> Result<(), Box<dyn std::error::Error>>
where
    F: std::future::Future<Output = Result<(), Box<dyn std::error::Error>>>,
{
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()?;
    runtime.block_on(future)
}
