//! Server lifecycle - starting and stopping the application under test.
//!
//! One [`ServerHandle`] lives for the whole run: it is created in run-level
//! setup before any scenario and closed in run-level teardown after the
//! last one. Scenarios only ever see it by reference.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::net::TcpListener;
use std::path::PathBuf;
use std::process::Stdio;
use std::time::Duration;
use tokio::net::TcpStream;
use tokio::process::{Child, Command};
use tokio::time::{sleep, Instant};
use tracing::{debug, info, warn};
use url::Url;

use crate::result::{ProbeError, ProbeResult};

/// Port the todo application listens on
pub const DEFAULT_PORT: u16 = 7659;

/// Default timeout for server startup (30 seconds)
pub const DEFAULT_STARTUP_TIMEOUT_MS: u64 = 30_000;

const STARTUP_POLL: Duration = Duration::from_millis(100);

/// Host and port of a listening server
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Endpoint {
    /// Host name or address
    pub host: String,
    /// TCP port
    pub port: u16,
}

impl Default for Endpoint {
    fn default() -> Self {
        Self::new("localhost", DEFAULT_PORT)
    }
}

impl Endpoint {
    /// Create a new endpoint
    #[must_use]
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
        }
    }

    /// Extract the endpoint from a base URL such as `http://host[:port][/path]`
    ///
    /// Without an explicit port the scheme's default is used. IPv6 hosts
    /// keep their brackets so [`Endpoint::address`] stays connectable.
    ///
    /// # Errors
    ///
    /// Returns [`ProbeError::Config`] if the URL does not parse or names no
    /// host or port.
    pub fn from_base_url(url: &str) -> ProbeResult<Self> {
        let parsed = Url::parse(url)
            .map_err(|e| ProbeError::config(format!("bad base URL '{url}': {e}")))?;
        let host = parsed
            .host_str()
            .filter(|host| !host.is_empty())
            .ok_or_else(|| ProbeError::config(format!("no host in base URL '{url}'")))?;
        let port = parsed
            .port_or_known_default()
            .ok_or_else(|| ProbeError::config(format!("no port for base URL '{url}'")))?;
        Ok(Self::new(host, port))
    }

    /// `host:port` form
    #[must_use]
    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.host, self.port)
    }
}

/// Configuration for spawning the application server
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Executable to run
    pub program: PathBuf,
    /// Arguments passed to the executable
    pub args: Vec<String>,
    /// Endpoint the server binds
    pub endpoint: Endpoint,
    /// Timeout for the endpoint to start accepting connections
    pub startup_timeout_ms: u64,
}

impl ServerConfig {
    /// Create a config for `program` on the default endpoint
    #[must_use]
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            endpoint: Endpoint::default(),
            startup_timeout_ms: DEFAULT_STARTUP_TIMEOUT_MS,
        }
    }

    /// Set arguments
    #[must_use]
    pub fn with_args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args = args.into_iter().map(Into::into).collect();
        self
    }

    /// Set endpoint
    #[must_use]
    pub fn with_endpoint(mut self, endpoint: Endpoint) -> Self {
        self.endpoint = endpoint;
        self
    }

    /// Set startup timeout
    #[must_use]
    pub const fn with_startup_timeout(mut self, timeout_ms: u64) -> Self {
        self.startup_timeout_ms = timeout_ms;
        self
    }
}

/// Lifecycle state of a server handle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ServerState {
    /// Accepting connections
    Running,
    /// Released
    Closed,
}

/// Handle to the running application
#[derive(Debug)]
pub struct ServerHandle {
    child: Option<Child>,
    endpoint: Endpoint,
    state: ServerState,
}

impl ServerHandle {
    /// Spawn the server and wait until its endpoint accepts connections
    ///
    /// # Errors
    ///
    /// Returns [`ProbeError::PortInUse`] if the endpoint is already bound,
    /// and [`ProbeError::ServerStartup`] if the process cannot be spawned,
    /// exits early, or does not listen within the startup timeout.
    pub async fn start(config: &ServerConfig) -> ProbeResult<Self> {
        ensure_port_free(&config.endpoint)?;

        info!(
            endpoint = %config.endpoint,
            program = %config.program.display(),
            "starting application server"
        );

        let mut child = Command::new(&config.program)
            .args(&config.args)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::inherit())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| ProbeError::ServerStartup {
                message: format!("failed to spawn {}: {e}", config.program.display()),
            })?;

        let start = Instant::now();
        let deadline = start + Duration::from_millis(config.startup_timeout_ms);
        loop {
            if let Some(status) = child.try_wait()? {
                return Err(ProbeError::ServerStartup {
                    message: format!("server exited during startup ({status})"),
                });
            }
            if TcpStream::connect(config.endpoint.address()).await.is_ok() {
                break;
            }
            if Instant::now() >= deadline {
                if let Err(e) = child.kill().await {
                    warn!(error = %e, "failed to kill server after startup timeout");
                }
                return Err(ProbeError::ServerStartup {
                    message: format!(
                        "{} not accepting connections after {}ms",
                        config.endpoint, config.startup_timeout_ms
                    ),
                });
            }
            sleep(STARTUP_POLL).await;
        }

        info!(
            endpoint = %config.endpoint,
            elapsed_ms = start.elapsed().as_millis() as u64,
            "application server is up"
        );
        Ok(Self {
            child: Some(child),
            endpoint: config.endpoint.clone(),
            state: ServerState::Running,
        })
    }

    /// Use a server started outside the harness
    ///
    /// Closing an attached handle releases nothing but the handle itself.
    ///
    /// # Errors
    ///
    /// Returns [`ProbeError::ServerStartup`] if nothing listens on `endpoint`.
    pub async fn attach(endpoint: Endpoint) -> ProbeResult<Self> {
        TcpStream::connect(endpoint.address())
            .await
            .map_err(|e| ProbeError::ServerStartup {
                message: format!("nothing listening on {endpoint}: {e}"),
            })?;
        info!(%endpoint, "attached to running application server");
        Ok(Self {
            child: None,
            endpoint,
            state: ServerState::Running,
        })
    }

    /// Endpoint the server listens on
    #[must_use]
    pub const fn endpoint(&self) -> &Endpoint {
        &self.endpoint
    }

    /// Root URL of the server
    #[must_use]
    pub fn base_url(&self) -> String {
        format!("http://{}", self.endpoint)
    }

    /// Current lifecycle state
    #[must_use]
    pub const fn state(&self) -> ServerState {
        self.state
    }

    /// Stop the server and release its resources
    ///
    /// # Errors
    ///
    /// Returns [`ProbeError::Io`] if the process cannot be killed or reaped.
    pub async fn close(&mut self) -> ProbeResult<()> {
        if let Some(mut child) = self.child.take() {
            info!(endpoint = %self.endpoint, pid = ?child.id(), "stopping application server");
            if child.try_wait()?.is_none() {
                child.kill().await?;
            }
        }
        self.state = ServerState::Closed;
        Ok(())
    }
}

impl Drop for ServerHandle {
    fn drop(&mut self) {
        if let Some(child) = self.child.as_mut() {
            debug!(endpoint = %self.endpoint, "server handle dropped while running");
            let _ = child.start_kill();
        }
    }
}

/// Fail if something already holds the endpoint
fn ensure_port_free(endpoint: &Endpoint) -> ProbeResult<()> {
    match TcpListener::bind(endpoint.address()) {
        Ok(listener) => {
            drop(listener);
            Ok(())
        }
        Err(e) if e.kind() == std::io::ErrorKind::AddrInUse => Err(ProbeError::PortInUse {
            endpoint: endpoint.to_string(),
        }),
        Err(e) => Err(ProbeError::ServerStartup {
            message: format!("cannot bind {endpoint}: {e}"),
        }),
    }
}
