/*
Copyright 2024-2025 The Spice.ai OSS Authors

Licensed under the Apache License, Version 2.0 (the "License");
you may not use this file except in compliance with the License.
You may obtain a copy of the License at

     https://www.apache.org/licenses/LICENSE-2.0

Unless required by applicable law or agreed to in writing, software
distributed under the License is distributed on an "AS IS" BASIS,
WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
See the License for the specific language governing permissions and
limitations under the License.
*/

use std::{
    ffi::OsStr,
    io::Read,
    process::{Child, Command, Stdio},
    time::{Duration, Instant},
};

use snafu::prelude::*;
use sysinfo::{Pid, ProcessesToUpdate, System};

use super::{
    Kubectl, PortForwardExitedSnafu, PortForwardNotReadySnafu, PortInUseSnafu, Result,
    SpawnPortForwardSnafu, StopPortForwardSnafu,
};
use crate::utils::wait_until_true;

const READY_TIMEOUT: Duration = Duration::from_secs(10);
const STOP_TIMEOUT: Duration = Duration::from_secs(5);
const RECLAIM_PAUSE: Duration = Duration::from_secs(1);
const POLL_INTERVAL: Duration = Duration::from_millis(100);

/// The process currently listening on a local port.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PortOwner {
    pub pid: u32,
    pub is_kubectl_port_forward: bool,
}

/// Look up the process holding `port` with `lsof`, then inspect its command line.
///
/// Returns `None` when the port is free or `lsof` is unavailable.
#[must_use]
pub fn port_owner(port: u16) -> Option<PortOwner> {
    let output = Command::new("lsof")
        .args(["-ti", &format!(":{port}")])
        .output()
        .ok()?;
    if !output.status.success() {
        return None;
    }
    let pid: u32 = String::from_utf8_lossy(&output.stdout)
        .lines()
        .find_map(|line| line.trim().parse().ok())?;

    let mut system = System::new();
    let sys_pid = Pid::from_u32(pid);
    system.refresh_processes(ProcessesToUpdate::Some(&[sys_pid]), true);
    let is_kubectl_port_forward = system
        .process(sys_pid)
        .is_some_and(|process| is_port_forward_command(process.cmd()));

    Some(PortOwner {
        pid,
        is_kubectl_port_forward,
    })
}

fn is_port_forward_command<S: AsRef<OsStr>>(cmd: &[S]) -> bool {
    let args: Vec<String> = cmd
        .iter()
        .map(|arg| arg.as_ref().to_string_lossy().into_owned())
        .collect();
    args.iter().any(|arg| arg.ends_with("kubectl"))
        && args.iter().any(|arg| arg == "port-forward")
}

#[cfg(not(target_os = "windows"))]
fn terminate(pid: u32) -> std::io::Result<()> {
    let pid_i32 = i32::try_from(pid)
        .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidInput, e))?;
    nix::sys::signal::kill(
        nix::unistd::Pid::from_raw(pid_i32),
        nix::sys::signal::Signal::SIGTERM,
    )
    .map_err(std::io::Error::from)
}

#[cfg(target_os = "windows")]
fn terminate(pid: u32) -> std::io::Result<()> {
    let mut system = System::new();
    let sys_pid = Pid::from_u32(pid);
    system.refresh_processes(ProcessesToUpdate::Some(&[sys_pid]), true);
    match system.process(sys_pid) {
        Some(process) if process.kill() => Ok(()),
        _ => Err(std::io::Error::other(format!("unable to kill process {pid}"))),
    }
}

/// Parameters for forwarding a local port to a service port.
#[derive(Debug, Clone)]
pub struct ForwardRequest {
    pub service: String,
    pub local_port: u16,
    pub remote_port: u16,
    /// Terminate a foreign process holding `local_port` instead of aborting.
    pub reclaim_port: bool,
}

/// A `kubectl port-forward` child owned by this process.
pub struct PortForward {
    child: Child,
    local_port: u16,
    stopped: bool,
}

impl PortForward {
    /// Establish a forward for `request`, reusing an existing `kubectl port-forward` on the port.
    ///
    /// # Errors
    ///
    /// - If the port is held by another process and `reclaim_port` is not set
    /// - If `kubectl port-forward` fails to start, exits early or is not ready within 10 seconds
    pub async fn establish(kubectl: &Kubectl, request: &ForwardRequest) -> Result<ForwardedPort> {
        let port = request.local_port;
        if let Some(owner) = port_owner(port) {
            if owner.is_kubectl_port_forward {
                tracing::info!(port, pid = owner.pid, "reusing existing kubectl port-forward");
                return Ok(ForwardedPort::Reused {
                    pid: owner.pid,
                    local_port: port,
                });
            }

            ensure!(
                request.reclaim_port,
                PortInUseSnafu {
                    port,
                    pid: owner.pid
                }
            );
            tracing::warn!(port, pid = owner.pid, "terminating process holding the local port");
            terminate(owner.pid).context(super::ReclaimPortSnafu {
                port,
                pid: owner.pid,
            })?;
            tokio::time::sleep(RECLAIM_PAUSE).await;
        }

        let forward = Self::spawn(kubectl, request)?;
        let forward = forward.wait_for_ready(READY_TIMEOUT).await?;
        Ok(ForwardedPort::Owned(forward))
    }

    fn spawn(kubectl: &Kubectl, request: &ForwardRequest) -> Result<Self> {
        tracing::info!(
            namespace = kubectl.namespace(),
            service = %request.service,
            local_port = request.local_port,
            remote_port = request.remote_port,
            "starting kubectl port-forward"
        );
        let child = Command::new("kubectl")
            .args(["port-forward", "-n", kubectl.namespace()])
            .arg(format!("service/{}", request.service))
            .arg(format!("{}:{}", request.local_port, request.remote_port))
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .spawn()
            .context(SpawnPortForwardSnafu)?;
        Ok(Self {
            child,
            local_port: request.local_port,
            stopped: false,
        })
    }

    async fn wait_for_ready(mut self, timeout: Duration) -> Result<Self> {
        let deadline = Instant::now() + timeout;
        loop {
            if let Ok(Some(_)) = self.child.try_wait() {
                self.stopped = true;
                return PortForwardExitedSnafu {
                    stderr: self.read_stderr(),
                }
                .fail();
            }

            if tokio::net::TcpStream::connect(("127.0.0.1", self.local_port))
                .await
                .is_ok()
            {
                tracing::info!(port = self.local_port, "port-forward ready");
                return Ok(self);
            }

            if Instant::now() >= deadline {
                return PortForwardNotReadySnafu {
                    port: self.local_port,
                    seconds: timeout.as_secs(),
                }
                .fail();
            }
            tokio::time::sleep(POLL_INTERVAL).await;
        }
    }

    fn read_stderr(&mut self) -> String {
        let mut stderr = String::new();
        if let Some(mut pipe) = self.child.stderr.take() {
            let _ = pipe.read_to_string(&mut stderr);
        }
        stderr.trim().to_string()
    }

    #[must_use]
    pub fn local_port(&self) -> u16 {
        self.local_port
    }

    /// Send SIGTERM, wait up to 5 seconds, then kill.
    ///
    /// # Errors
    ///
    /// - If the child cannot be signalled, killed or reaped
    pub async fn stop(&mut self) -> Result<()> {
        if self.stopped {
            return Ok(());
        }
        self.stopped = true;

        if let Ok(Some(_)) = self.child.try_wait() {
            return Ok(());
        }
        if let Err(e) = terminate(self.child.id()) {
            tracing::debug!(error = %e, "SIGTERM to port-forward failed");
        }

        let child = &mut self.child;
        let exited = wait_until_true(STOP_TIMEOUT, || {
            let exited = matches!(child.try_wait(), Ok(Some(_)));
            async move { exited }
        })
        .await;
        if exited {
            tracing::debug!(port = self.local_port, "port-forward stopped");
            return Ok(());
        }

        tracing::warn!(port = self.local_port, "port-forward did not exit, killing it");
        self.child.kill().context(StopPortForwardSnafu)?;
        self.child.wait().context(StopPortForwardSnafu)?;
        Ok(())
    }
}

impl Drop for PortForward {
    fn drop(&mut self) {
        if self.stopped {
            return;
        }
        match self.child.kill() {
            Ok(()) => {
                let _ = self.child.wait();
            }
            Err(e) => eprintln!("Failed to kill kubectl port-forward: {e}"),
        }
    }
}

/// How the local port reaches the service for the duration of a run.
pub enum ForwardedPort {
    /// A port-forward started by this process; torn down on shutdown.
    Owned(PortForward),
    /// An existing `kubectl port-forward` that is left running.
    Reused { pid: u32, local_port: u16 },
    /// No forwarding; the listener is reached directly.
    Unmanaged { local_port: u16 },
}

impl ForwardedPort {
    #[must_use]
    pub fn local_port(&self) -> u16 {
        match self {
            Self::Owned(forward) => forward.local_port(),
            Self::Reused { local_port, .. } | Self::Unmanaged { local_port } => *local_port,
        }
    }

    /// Stop an owned port-forward. Reused and unmanaged ports are left alone.
    pub async fn shutdown(&mut self) -> Result<()> {
        match self {
            Self::Owned(forward) => forward.stop().await,
            Self::Reused { .. } | Self::Unmanaged { .. } => Ok(()),
        }
    }
}

impl std::fmt::Display for ForwardedPort {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Owned(forward) => write!(
                f,
                "kubectl port-forward on localhost:{} (pid {})",
                forward.local_port,
                forward.child.id()
            ),
            Self::Reused { pid, local_port } => write!(
                f,
                "existing kubectl port-forward on localhost:{local_port} (pid {pid})"
            ),
            Self::Unmanaged { local_port } => write!(f, "localhost:{local_port}"),
        }
    }
}
