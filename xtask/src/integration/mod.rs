//! Integration test infrastructure.
//!
//! Starts Redis and Memcached containers and runs the cachehelper test suite
//! against them. The live tests skip themselves when a server is missing,
//! so this is the way to actually exercise them.
//!
//! # Usage
//!
//! ```bash
//! # Run against both Redis and Memcached (requires Docker or Podman)
//! cargo xtask integration
//!
//! # Run against Redis only
//! cargo xtask integration --backend redis
//!
//! # Skip container management (assumes services are already running)
//! cargo xtask integration --no-docker
//! ```

mod containers;
pub mod error;

pub use error::{IntegrationError, Result};

use std::time::Duration;

use containers::{
    detect_runtime, is_running, start_container, stop_container, test_environment,
    wait_for_health, Backend, ContainerRuntime,
};

use crate::prelude::*;

/// Integration test command.
#[derive(Debug, clap::Parser)]
#[command(long_about = "Run the test suite against live cache servers.

This command manages Docker/Podman containers for Redis and Memcached,
runs `cargo test -p cachehelper` with REDIS_URL and MEMCACHED_URL pointing
at them, and stops the containers afterward.")]
pub struct IntegrationCommand {
    /// Backends to test against (default: all).
    #[arg(long = "backend", value_enum)]
    pub backends: Vec<Backend>,

    /// Skip container management (assume services are already running).
    #[arg(long)]
    pub no_docker: bool,

    /// Keep containers running after tests complete.
    #[arg(long)]
    pub keep_containers: bool,

    /// Timeout in seconds for container health checks.
    #[arg(long, default_value = "30")]
    pub health_timeout: u64,
}

impl IntegrationCommand {
    fn selected_backends(&self) -> Vec<Backend> {
        if self.backends.is_empty() {
            vec![Backend::Redis, Backend::Memcached]
        } else {
            self.backends.clone()
        }
    }
}

/// Main entry point for integration command.
pub async fn run(command: IntegrationCommand, global: crate::Global) -> Result<()> {
    let backends = command.selected_backends();

    if !global.is_silent() {
        aprintln!("{}", p_b("Integration Tests"));
        aprintln!();
        aprintln!("{} {:?}", p_b("Backends:"), backends);
        aprintln!();
    }

    let runtime = if command.no_docker {
        if !global.is_silent() {
            aprintln!("{} Skipping container management (--no-docker)", p_y("⚠️"));
        }
        None
    } else {
        Some(detect_runtime().await?)
    };

    // Only containers we started are stopped afterwards
    let mut started = Vec::new();
    if let Some(rt) = runtime {
        for backend in &backends {
            if ensure_container(*backend, rt, command.health_timeout, &global).await? {
                started.push(*backend);
            }
        }
    }

    let passed = run_tests(&backends, &global).await;

    if let Some(rt) = runtime {
        if command.keep_containers {
            if !started.is_empty() && !global.is_silent() {
                aprintln!("{} Containers left running (--keep-containers)", p_y("⚠️"));
            }
        } else {
            for backend in &started {
                stop_container(rt, backend.spec().name).await;
            }
        }
    }

    aprintln!();
    if passed? {
        aprintln!("{} {}", p_g("✅"), p_g("All integration tests passed!"));
        Ok(())
    } else {
        aprintln!("{} {}", p_r("❌"), p_r("Some integration tests failed"));
        Err(IntegrationError::TestFailed(
            "cargo test -p cachehelper failed".to_string(),
        ))
    }
}

/// Starts the container for a backend unless it is already running.
///
/// Returns whether this call started it.
async fn ensure_container(
    backend: Backend,
    runtime: ContainerRuntime,
    timeout_secs: u64,
    global: &crate::Global,
) -> Result<bool> {
    let spec = backend.spec();

    if is_running(runtime, spec.name).await? {
        if !global.is_silent() {
            aprintln!("{} {} already running", p_y("⚠️"), spec.name);
        }
        return Ok(false);
    }

    if !global.is_silent() {
        aprintln!("{} Starting {}...", p_b("🐳"), spec.name);
    }
    start_container(runtime, spec).await?;

    if !global.is_silent() {
        aprintln!(
            "{} Waiting for {} health (max {}s)...",
            p_b("⏳"),
            spec.name,
            timeout_secs
        );
    }
    wait_for_health(runtime, spec, Duration::from_secs(timeout_secs)).await?;

    if !global.is_silent() {
        aprintln!("{} {} is ready", p_g("✅"), spec.name);
    }
    Ok(true)
}

/// Runs the cachehelper tests with the live server environment.
async fn run_tests(backends: &[Backend], global: &crate::Global) -> Result<bool> {
    if !global.is_silent() {
        aprintln!("{} {}", p_b("🔧"), p_b("Running cachehelper tests..."));
    }

    let status = tokio::process::Command::new("cargo")
        .args(["test", "-p", "cachehelper"])
        .envs(test_environment(backends))
        .status()
        .await?;

    Ok(status.success())
}
