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

use std::{future::Future, path::Path, sync::Arc};

use load_framework::{
    anyhow::{self, Context},
    harness::LoadTest,
    kubernetes::{ForwardRequest, ForwardedPort, Kubectl, PortForward, POD_SELECTOR},
    metrics::AggregateReport,
    serde_json,
    transport::Transport,
    TransportKind,
};
use tokio::sync::watch;

use crate::{args::CommonArgs, commands::util::Color, with_color};

pub(crate) mod http;
pub(crate) mod smtp;
pub(crate) mod util;

/// Exit code reported when the run is interrupted by a signal.
pub(crate) const INTERRUPTED_EXIT_CODE: u8 = 130;

/// A resolved service, ready to be port-forwarded.
pub(crate) struct Discovered {
    pub(crate) kubectl: Kubectl,
    pub(crate) service: String,
}

/// Latches once a shutdown signal arrives. Listening starts as soon as it is installed.
#[derive(Clone)]
pub(crate) struct Interrupt {
    received: watch::Receiver<bool>,
}

impl Interrupt {
    /// Listen for Ctrl+C and SIGTERM for the rest of the process.
    pub(crate) fn install() -> Self {
        Self::from_signal(shutdown_signal())
    }

    fn from_signal(signal: impl Future<Output = ()> + Send + 'static) -> Self {
        let (tx, rx) = watch::channel(false);
        tokio::spawn(async move {
            signal.await;
            let _ = tx.send(true);
        });
        Self { received: rx }
    }

    /// Resolves once the signal has been received, immediately if it already was.
    pub(crate) async fn received(&mut self) {
        let closed = self.received.wait_for(|received| *received).await.is_err();
        if closed {
            std::future::pending::<()>().await;
        }
    }
}

/// The shared flow of a load test against one MTA listener.
pub(crate) struct LoadRun<'a> {
    kind: TransportKind,
    common: &'a CommonArgs,
    remote_port: u16,
    local_port: u16,
    interrupt: Interrupt,
}

impl<'a> LoadRun<'a> {
    pub(crate) fn new(
        kind: TransportKind,
        common: &'a CommonArgs,
        remote_port: u16,
        local_port: u16,
        interrupt: Interrupt,
    ) -> Self {
        Self {
            kind,
            common,
            remote_port,
            local_port,
            interrupt,
        }
    }

    pub(crate) fn print_banner(&self) {
        println!(
            "{}",
            with_color!(Color::Blue, "{} Performance Test", self.kind)
        );
        println!("{}", "=".repeat(50));
        println!("Service:     {}", self.common.service_name());
        println!("Namespace:   {}", self.common.namespace);
        println!("Local port:  {}", self.local_port);
        println!("Messages:    {}", self.common.count);
        println!("Concurrency: {}", self.common.concurrency);
        println!("{}", "=".repeat(50));
    }

    /// Check kubectl and resolve the service. `None` when port-forwarding is skipped.
    pub(crate) fn discover(&self) -> anyhow::Result<Option<Discovered>> {
        if self.common.skip_port_forward {
            tracing::info!(port = self.local_port, "skipping port-forward");
            return Ok(None);
        }

        Kubectl::ensure_available()?;
        let kubectl = Kubectl::new(self.common.namespace.clone());
        let service =
            kubectl.find_service(self.common.service_name(), &self.common.release_name)?;
        println!("Found service {service} in namespace {}", kubectl.namespace());
        Ok(Some(Discovered { kubectl, service }))
    }

    async fn forward(&self, discovered: Option<&Discovered>) -> anyhow::Result<ForwardedPort> {
        let Some(discovered) = discovered else {
            return Ok(ForwardedPort::Unmanaged {
                local_port: self.local_port,
            });
        };

        let forwarded = PortForward::establish(
            &discovered.kubectl,
            &ForwardRequest {
                service: discovered.service.clone(),
                local_port: self.local_port,
                remote_port: self.remote_port,
                reclaim_port: self.common.reclaim_port,
            },
        )
        .await?;
        println!("Using {forwarded}");
        Ok(forwarded)
    }

    /// Forward the port, connect a transport to it, probe, run the harness and report.
    ///
    /// Every step races the interrupt. The forwarded port is shut down on every path,
    /// a forward still being established is killed when its future is dropped.
    /// Returns the process exit code.
    pub(crate) async fn execute<F>(
        &self,
        discovered: Option<&Discovered>,
        connect: F,
    ) -> anyhow::Result<u8>
    where
        F: FnOnce(u16) -> anyhow::Result<Arc<dyn Transport>>,
    {
        let mut interrupt = self.interrupt.clone();
        let mut forwarded = tokio::select! {
            forwarded = self.forward(discovered) => forwarded?,
            () = interrupt.received() => {
                print_interrupted();
                return Ok(INTERRUPTED_EXIT_CODE);
            }
        };

        let result = match connect(forwarded.local_port()) {
            Ok(transport) => self.run_test(transport, &mut interrupt).await,
            Err(e) => Err(e),
        };
        if let Err(e) = forwarded.shutdown().await {
            tracing::warn!(error = %e, "failed to stop port-forward");
        }
        result
    }

    async fn run_test(
        &self,
        transport: Arc<dyn Transport>,
        interrupt: &mut Interrupt,
    ) -> anyhow::Result<u8> {
        let probe = tokio::select! {
            probe = transport.probe() => probe,
            () = interrupt.received() => {
                print_interrupted();
                return Ok(INTERRUPTED_EXIT_CODE);
            }
        };
        if let Err(e) = probe {
            println!(
                "{}",
                with_color!(Color::Yellow, "Warning: listener is not reachable yet: {}", e)
            );
        }

        println!(
            "Sending {} messages with {} concurrent workers...",
            self.common.count, self.common.concurrency
        );
        let test = LoadTest::new(
            format!("{} load", self.kind),
            transport,
            self.common.count.get(),
        )
        .with_concurrency(self.common.concurrency.get())
        .with_progress_bars(!self.common.disable_progress_bars)
        .start()?;

        let abandon = test.abandon_handle();
        let test = tokio::select! {
            completed = test.wait() => completed?,
            () = interrupt.received() => {
                abandon.abandon();
                print_interrupted();
                return Ok(INTERRUPTED_EXIT_CODE);
            }
        };

        let report = test.report();
        println!();
        println!("{test}");
        println!("{report}");

        if let Some(path) = &self.common.json_output {
            write_json_export(path, &serde_json::to_string_pretty(&test.export(&report))?)?;
            println!("Results written to {}", path.display());
        }

        self.print_verdict(&report);
        Ok(report.exit_code())
    }
    fn print_verdict(&self, report: &AggregateReport) {
        if report.passed() {
            println!(
                "{}",
                with_color!(Color::Green, "All {} messages sent successfully", report.total)
            );
            return;
        }

        println!(
            "{}",
            with_color!(
                Color::RedBold,
                "{} of {} messages failed",
                report.fail_count,
                report.total
            )
        );
        println!("Check the MTA logs for details:");
        println!("  {}", log_hint(&self.common.namespace));
    }
}

fn print_interrupted() {
    println!(
        "{}",
        with_color!(Color::Yellow, "Interrupted, abandoning in-flight messages")
    );
}

fn log_hint(namespace: &str) -> String {
    format!("kubectl logs -n {namespace} -l {POD_SELECTOR} --tail=100")
}

fn write_json_export(path: &Path, json: &str) -> anyhow::Result<()> {
    std::fs::write(path, json)
        .with_context(|| format!("Failed to write results to {}", path.display()))
}

/// Resolves on Ctrl+C or SIGTERM. A handler that cannot be installed never resolves.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::warn!(error = %e, "failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::warn!(error = %e, "failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => tracing::info!("received Ctrl+C, shutting down"),
        () = terminate => tracing::info!("received SIGTERM, shutting down"),
    }
}
