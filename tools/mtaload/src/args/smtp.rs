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

use clap::Parser;

use super::CommonArgs;

#[derive(Parser, Debug, Clone)]
pub struct SmtpArgs {
    #[clap(flatten)]
    pub(crate) common: CommonArgs,

    /// The SMTP listener port of the service
    #[arg(long, env = "SMTP_PORT", default_value = "2500")]
    pub(crate) smtp_port: u16,

    /// The local port forwarded to the SMTP listener
    #[arg(long, env = "LOCAL_SMTP_PORT", default_value = "2500")]
    pub(crate) local_smtp_port: u16,
}
