//! Containers for the live cache servers.
//!
//! Pure functions build command arguments and test environments; the async
//! functions drive Docker or Podman.

use std::time::Duration;

use tokio::net::TcpStream;
use tokio::process::Command;

use super::error::{IntegrationError, Result};

/// Remote backend exercised by the integration run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum Backend {
    Redis,
    Memcached,
}

/// Container runtime (Docker or Podman).
#[derive(Debug, Clone, Copy, Default)]
pub enum ContainerRuntime {
    #[default]
    Docker,
    Podman,
}

/// Specification for a container.
#[derive(Debug, Clone)]
pub struct ContainerSpec {
    pub name: &'static str,
    pub image: &'static str,
    pub port: u16,
    pub command: Option<&'static str>,
    pub health_check: HealthCheck,
}

/// Health check strategy for a container.
#[derive(Debug, Clone)]
pub enum HealthCheck {
    /// `redis-cli ping` inside the container.
    RedisPing,
    /// The mapped port accepts TCP connections.
    TcpConnect,
}

/// Redis container specification.
pub const REDIS_SPEC: ContainerSpec = ContainerSpec {
    name: "cachehelper-redis",
    image: "redis:7-alpine",
    port: 6379,
    command: None,
    health_check: HealthCheck::RedisPing,
};

/// Memcached container specification.
pub const MEMCACHED_SPEC: ContainerSpec = ContainerSpec {
    name: "cachehelper-memcached",
    image: "memcached:1.6-alpine",
    port: 11211,
    command: Some("memcached -m 64"),
    health_check: HealthCheck::TcpConnect,
};

impl Backend {
    pub fn spec(self) -> &'static ContainerSpec {
        match self {
            Backend::Redis => &REDIS_SPEC,
            Backend::Memcached => &MEMCACHED_SPEC,
        }
    }
}

/// Builds arguments for `docker run` / `podman run`.
pub fn container_run_args(spec: &ContainerSpec) -> Vec<String> {
    let mut args = vec![
        "run".to_string(),
        "--name".to_string(),
        spec.name.to_string(),
        "-d".to_string(),
        "-p".to_string(),
        format!("{}:{}", spec.port, spec.port),
        spec.image.to_string(),
    ];

    if let Some(cmd) = spec.command {
        args.extend(cmd.split_whitespace().map(String::from));
    }

    args
}

/// Environment variables the live tests read to find their servers.
pub fn test_environment(backends: &[Backend]) -> Vec<(&'static str, String)> {
    backends
        .iter()
        .map(|backend| match backend {
            Backend::Redis => ("REDIS_URL", format!("redis://localhost:{}", REDIS_SPEC.port)),
            Backend::Memcached => (
                "MEMCACHED_URL",
                format!("memcache://127.0.0.1:{}", MEMCACHED_SPEC.port),
            ),
        })
        .collect()
}

/// Returns the command name for the container runtime.
pub fn runtime_command(runtime: ContainerRuntime) -> &'static str {
    match runtime {
        ContainerRuntime::Docker => "docker",
        ContainerRuntime::Podman => "podman",
    }
}

/// Detects which container runtime is available, Docker first.
pub async fn detect_runtime() -> Result<ContainerRuntime> {
    for runtime in [ContainerRuntime::Docker, ContainerRuntime::Podman] {
        let output = Command::new(runtime_command(runtime))
            .arg("--version")
            .output()
            .await;

        if matches!(output, Ok(ref output) if output.status.success()) {
            return Ok(runtime);
        }
    }

    Err(IntegrationError::RuntimeNotFound(
        "Neither docker nor podman found in PATH".to_string(),
    ))
}

/// Returns whether a container with this name is running.
pub async fn is_running(runtime: ContainerRuntime, name: &str) -> Result<bool> {
    let output = Command::new(runtime_command(runtime))
        .args(["ps", "-q", "-f", &format!("name={name}")])
        .output()
        .await?;

    Ok(!String::from_utf8_lossy(&output.stdout).trim().is_empty())
}

/// Stops and removes a container.
///
/// Errors are ignored since the container might not exist.
pub async fn stop_container(runtime: ContainerRuntime, name: &str) {
    let cmd = runtime_command(runtime);

    let _ = Command::new(cmd).args(["stop", name]).output().await;
    let _ = Command::new(cmd).args(["rm", name]).output().await;
}

/// Starts a container, replacing any stopped one with the same name.
pub async fn start_container(runtime: ContainerRuntime, spec: &ContainerSpec) -> Result<()> {
    stop_container(runtime, spec.name).await;

    let output = Command::new(runtime_command(runtime))
        .args(container_run_args(spec))
        .output()
        .await?;

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        return Err(IntegrationError::ContainerFailed(format!(
            "Failed to start container '{}': {}",
            spec.name, stderr
        )));
    }

    Ok(())
}

/// Polls the container's health check until it passes or `timeout` elapses.
pub async fn wait_for_health(
    runtime: ContainerRuntime,
    spec: &ContainerSpec,
    timeout: Duration,
) -> Result<()> {
    let start = std::time::Instant::now();
    let poll_interval = Duration::from_millis(500);

    while start.elapsed() < timeout {
        let healthy = match spec.health_check {
            HealthCheck::RedisPing => check_redis_health(runtime, spec.name).await,
            HealthCheck::TcpConnect => check_tcp_health(spec.port).await,
        };

        if healthy {
            return Ok(());
        }

        tokio::time::sleep(poll_interval).await;
    }

    Err(IntegrationError::ContainerNotHealthy {
        name: spec.name.to_string(),
        timeout_secs: timeout.as_secs(),
    })
}

async fn check_redis_health(runtime: ContainerRuntime, name: &str) -> bool {
    let output = Command::new(runtime_command(runtime))
        .args(["exec", name, "redis-cli", "ping"])
        .output()
        .await;

    match output {
        Ok(output) => {
            output.status.success() && String::from_utf8_lossy(&output.stdout).trim() == "PONG"
        }
        Err(_) => false,
    }
}

async fn check_tcp_health(port: u16) -> bool {
    let connect = TcpStream::connect(("127.0.0.1", port));
    matches!(
        tokio::time::timeout(Duration::from_secs(2), connect).await,
        Ok(Ok(_))
    )
}
