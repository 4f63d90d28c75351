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

use std::{num::NonZeroUsize, path::PathBuf};

use clap::{Parser, Subcommand};

mod http;
pub use http::HttpArgs;

mod smtp;
pub use smtp::SmtpArgs;

#[derive(Subcommand)]
pub enum Commands {
    /// Inject messages through the MTA's HTTP injection API
    Http(HttpArgs),
    /// Send messages to the MTA's SMTP listener
    Smtp(SmtpArgs),
}

/// Arguments common to every [`Commands`] variant.
#[derive(Parser, Debug, Clone)]
pub struct CommonArgs {
    /// The number of messages to send
    #[arg(env = "NUM_MESSAGES", default_value = "50")]
    pub(crate) count: NonZeroUsize,

    /// The maximum number of messages in flight at once
    #[arg(env = "MAX_THREADS", default_value = "5")]
    pub(crate) concurrency: NonZeroUsize,

    /// The Kubernetes namespace the MTA is deployed in
    #[arg(long, env = "NAMESPACE", default_value = "kumomta")]
    pub(crate) namespace: String,

    /// The Helm release name of the MTA
    #[arg(long, env = "RELEASE_NAME", default_value = "kumomta")]
    pub(crate) release_name: String,

    /// The service to forward to. Defaults to the release name
    #[arg(long, env = "SERVICE_NAME")]
    pub(crate) service_name: Option<String>,

    /// Whether to disable progress bars, for CI or non-interactive environments
    #[arg(long)]
    pub(crate) disable_progress_bars: bool,

    /// Target an already reachable listener on localhost instead of running kubectl port-forward
    #[arg(long)]
    pub(crate) skip_port_forward: bool,

    /// Terminate a process that already holds the local port instead of aborting
    #[arg(long)]
    pub(crate) reclaim_port: bool,

    /// Write the report and every outcome record to this path as JSON
    #[arg(long)]
    pub(crate) json_output: Option<PathBuf>,
}

impl CommonArgs {
    pub(crate) fn service_name(&self) -> &str {
        self.service_name.as_deref().unwrap_or(&self.release_name)
    }
}
