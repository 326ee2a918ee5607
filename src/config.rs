use std::net::{Ipv4Addr, SocketAddr};
use std::path::PathBuf;
use std::time::Duration;

/// Name of the hidden CLI subcommand that runs one unit of work.
pub const WORKER_SUBCOMMAND: &str = "worker";

/// Worker flag that keeps the worker's identity.
pub const NO_DROP_PRIVILEGES_FLAG: &str = "--no-drop-privileges";

/// The program started for each privileged operation.
///
/// The worker reads one work unit as JSON on stdin and answers with exactly
/// one message on stdout.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkerCommand {
    pub program: PathBuf,
    pub args: Vec<String>,
}

impl WorkerCommand {
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
        }
    }

    pub fn with_arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }
}

impl Default for WorkerCommand {
    /// This executable, started with the worker subcommand.
    fn default() -> Self {
        let program = std::env::current_exe().unwrap_or_else(|_| PathBuf::from("batchgate"));
        Self::new(program).with_arg(WORKER_SUBCOMMAND)
    }
}

/// Configuration for the privilege-separated executor.
#[derive(Debug, Clone)]
pub struct ExecutorConfig {
    /// Upper bound on the wait for a worker's result, including its start-up.
    pub timeout: Duration,
    pub worker: WorkerCommand,
    /// Change the worker's identity to the acting user before it touches the
    /// scheduler. Only disable this for single-user development setups.
    pub drop_privileges: bool,
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(30),
            worker: WorkerCommand::default(),
            drop_privileges: true,
        }
    }
}

impl ExecutorConfig {
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_worker(mut self, worker: WorkerCommand) -> Self {
        self.worker = worker;
        self
    }

    pub fn with_drop_privileges(mut self, drop_privileges: bool) -> Self {
        self.drop_privileges = drop_privileges;
        self
    }

    /// The worker command line, carrying [`NO_DROP_PRIVILEGES_FLAG`] when
    /// privileges are kept.
    pub fn worker_command(&self) -> WorkerCommand {
        let flagged = self.worker.args.iter().any(|arg| arg == NO_DROP_PRIVILEGES_FLAG);
        if self.drop_privileges || flagged {
            self.worker.clone()
        } else {
            self.worker.clone().with_arg(NO_DROP_PRIVILEGES_FLAG)
        }
    }
}

/// Configuration for the HTTP API.
#[derive(Debug, Clone)]
pub struct ApiConfig {
    pub listen_addr: SocketAddr,
    /// Prefix for every route and every locator in projections.
    pub url_prefix: String,
    /// Request header carrying the authenticated user name, set by the
    /// proxy in front of the server.
    pub identity_header: String,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            listen_addr: SocketAddr::from((Ipv4Addr::LOCALHOST, 8080)),
            url_prefix: "/olw".to_string(),
            identity_header: "x-remote-user".to_string(),
        }
    }
}

impl ApiConfig {
    pub fn new(listen_addr: SocketAddr) -> Self {
        Self {
            listen_addr,
            ..Default::default()
        }
    }

    pub fn with_url_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.url_prefix = prefix.into();
        self
    }

    pub fn with_identity_header(mut self, header: impl Into<String>) -> Self {
        self.identity_header = header.into();
        self
    }
}

#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub api: ApiConfig,
    pub executor: ExecutorConfig,
    /// JSON cluster state backing the scheduler.
    pub state_file: PathBuf,
}

impl ServerConfig {
    pub fn new(state_file: impl Into<PathBuf>) -> Self {
        Self {
            api: ApiConfig::default(),
            executor: ExecutorConfig::default(),
            state_file: state_file.into(),
        }
    }

    pub fn with_api(mut self, api: ApiConfig) -> Self {
        self.api = api;
        self
    }

    pub fn with_executor(mut self, executor: ExecutorConfig) -> Self {
        self.executor = executor;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn executor_config_default() {
        let cfg = ExecutorConfig::default();
        assert_eq!(cfg.timeout, Duration::from_secs(30));
        assert!(cfg.drop_privileges);
        assert_eq!(cfg.worker.args, vec![WORKER_SUBCOMMAND.to_string()]);
    }

    #[test]
    fn executor_config_builders() {
        let cfg = ExecutorConfig::default()
            .with_timeout(Duration::from_millis(250))
            .with_drop_privileges(false)
            .with_worker(WorkerCommand::new("sh").with_arg("-c").with_arg("cat"));
        assert_eq!(cfg.timeout, Duration::from_millis(250));
        assert!(!cfg.drop_privileges);
        assert_eq!(cfg.worker.program, PathBuf::from("sh"));
        assert_eq!(cfg.worker.args, vec!["-c", "cat"]);
    }

    #[test]
    fn kept_privileges_reach_the_worker() {
        let worker = WorkerCommand::new("batchgate").with_arg(WORKER_SUBCOMMAND);
        let cfg = ExecutorConfig::default().with_worker(worker.clone());
        assert_eq!(cfg.worker_command(), worker);

        let cfg = cfg.with_drop_privileges(false);
        assert_eq!(
            cfg.worker_command().args,
            vec![WORKER_SUBCOMMAND, NO_DROP_PRIVILEGES_FLAG]
        );
        // Already present: not repeated.
        let cfg = cfg.clone().with_worker(cfg.worker_command());
        assert_eq!(cfg.worker_command().args.len(), 2);
    }

    #[test]
    fn api_config_default() {
        let cfg = ApiConfig::default();
        assert_eq!(cfg.listen_addr.to_string(), "127.0.0.1:8080");
        assert_eq!(cfg.url_prefix, "/olw");
        assert_eq!(cfg.identity_header, "x-remote-user");
    }

    #[test]
    fn api_config_new() {
        let addr: SocketAddr = "10.0.0.1:9000".parse().unwrap();
        let cfg = ApiConfig::new(addr).with_url_prefix("/cluster");
        assert_eq!(cfg.listen_addr, addr);
        assert_eq!(cfg.url_prefix, "/cluster");
        assert_eq!(cfg.identity_header, "x-remote-user");
    }

    #[test]
    fn server_config_new() {
        let cfg = ServerConfig::new("/var/lib/batchgate/cluster.json");
        assert_eq!(cfg.state_file, PathBuf::from("/var/lib/batchgate/cluster.json"));
        assert_eq!(cfg.api.url_prefix, "/olw");
        assert!(cfg.executor.drop_privileges);
    }
}
