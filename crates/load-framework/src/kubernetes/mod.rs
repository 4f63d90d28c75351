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

use std::process::{Command, Output};

use snafu::prelude::*;

mod port_forward;
pub use port_forward::{port_owner, ForwardRequest, ForwardedPort, PortForward, PortOwner};

/// Label carried by the MTA pods of the Helm release.
pub const POD_SELECTOR: &str = "app.kubernetes.io/name=kumomta";

#[derive(Debug, Snafu)]
pub enum Error {
    #[snafu(display("kubectl is not installed or is not in the PATH: {source}"))]
    KubectlUnavailable { source: std::io::Error },

    #[snafu(display("kubectl is not usable: {stderr}"))]
    KubectlFailed { stderr: String },

    #[snafu(display("Service {service} does not exist in namespace {namespace}"))]
    ServiceNotFound { service: String, namespace: String },

    #[snafu(display(
        "Port {port} is in use by another process (PID {pid}). Use another local port or pass --reclaim-port"
    ))]
    PortInUse { port: u16, pid: u32 },

    #[snafu(display("Unable to stop process {pid} holding port {port}: {source}"))]
    ReclaimPort {
        port: u16,
        pid: u32,
        source: std::io::Error,
    },

    #[snafu(display("Unable to start kubectl port-forward: {source}"))]
    SpawnPortForward { source: std::io::Error },

    #[snafu(display("kubectl port-forward exited early: {stderr}"))]
    PortForwardExited { stderr: String },

    #[snafu(display("Local port {port} did not accept connections within {seconds} seconds"))]
    PortForwardNotReady { port: u16, seconds: u64 },

    #[snafu(display("Unable to stop kubectl port-forward: {source}"))]
    StopPortForward { source: std::io::Error },
}

pub type Result<T, E = Error> = std::result::Result<T, E>;

/// Thin wrapper over the `kubectl` CLI, scoped to one namespace.
#[derive(Debug, Clone)]
pub struct Kubectl {
    namespace: String,
}

impl Kubectl {
    #[must_use]
    pub fn new(namespace: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
        }
    }

    #[must_use]
    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    /// Fails when `kubectl` cannot be executed at all.
    pub fn ensure_available() -> Result<()> {
        let output = Command::new("kubectl")
            .args(["version", "--client"])
            .output()
            .context(KubectlUnavailableSnafu)?;
        ensure!(
            output.status.success(),
            KubectlFailedSnafu {
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            }
        );
        Ok(())
    }

    fn run(&self, args: &[&str]) -> Result<Output> {
        Command::new("kubectl")
            .args(args)
            .args(["-n", self.namespace.as_str()])
            .output()
            .context(KubectlUnavailableSnafu)
    }

    /// Resolve the MTA service: the exact `service` name first, then `release` or
    /// `<release>-kumomta` among the services of the namespace.
    pub fn find_service(&self, service: &str, release: &str) -> Result<String> {
        if self.run(&["get", "service", service])?.status.success() {
            return Ok(service.to_string());
        }

        let output = self.run(&[
            "get",
            "services",
            "-o",
            "jsonpath={.items[*].metadata.name}",
        ])?;
        if output.status.success() {
            let names = String::from_utf8_lossy(&output.stdout);
            if let Some(found) = match_service(&names, release) {
                tracing::debug!(service = %found, "resolved service from release name");
                return Ok(found);
            }
        }

        ServiceNotFoundSnafu {
            service,
            namespace: self.namespace.clone(),
        }
        .fail()
    }

    /// The first pod matching `selector`, if any.
    #[must_use]
    pub fn first_pod(&self, selector: &str) -> Option<String> {
        let output = self
            .run(&[
                "get",
                "pods",
                "-l",
                selector,
                "-o",
                "jsonpath={.items[0].metadata.name}",
            ])
            .ok()?;
        let name = String::from_utf8_lossy(&output.stdout).trim().to_string();
        (output.status.success() && !name.is_empty()).then_some(name)
    }

    /// Whether any of `needles` appears, case-insensitively, in the last `tail` log lines of `pod`.
    #[must_use]
    pub fn logs_contain_any(&self, pod: &str, tail: usize, needles: &[&str]) -> bool {
        let tail = format!("--tail={tail}");
        let Ok(output) = self.run(&["logs", pod, tail.as_str()]) else {
            return false;
        };
        let logs = String::from_utf8_lossy(&output.stdout).to_lowercase();
        needles
            .iter()
            .any(|needle| logs.contains(&needle.to_lowercase()))
    }
}

fn match_service(names: &str, release: &str) -> Option<String> {
    let suffixed = format!("{release}-kumomta");
    names
        .split_whitespace()
        .find(|name| *name == release || *name == suffixed)
        .map(ToString::to_string)
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_match_service_by_release() {
        assert_eq!(
            match_service("postgres kumomta-kumomta redis", "kumomta"),
            Some("kumomta-kumomta".to_string())
        );
        assert_eq!(
            match_service("mta kumomta", "kumomta"),
            Some("kumomta".to_string())
        );
        assert_eq!(match_service("postgres redis", "kumomta"), None);
        assert_eq!(match_service("", "kumomta"), None);
    }

    #[test]
    fn test_errors_render_for_operators() {
        let err = Error::ServiceNotFound {
            service: "mta".to_string(),
            namespace: "mail".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "Service mta does not exist in namespace mail"
        );
        let err = Error::PortInUse { port: 8000, pid: 42 };
        assert!(err.to_string().contains("--reclaim-port"));
    }
}
