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
use load_framework::transport::http::Credentials;

use super::CommonArgs;

#[derive(Parser, Debug, Clone)]
pub struct HttpArgs {
    #[clap(flatten)]
    pub(crate) common: CommonArgs,

    /// The HTTP listener port of the service
    #[arg(long, env = "HTTP_PORT", default_value = "8000")]
    pub(crate) http_port: u16,

    /// The local port forwarded to the HTTP listener
    #[arg(long, env = "LOCAL_HTTP_PORT", default_value = "8000")]
    pub(crate) local_http_port: u16,

    /// The HTTP Basic username for the injection API
    #[arg(long, env = "HTTP_USER", default_value = "user1")]
    pub(crate) http_user: String,

    /// The HTTP Basic password for the injection API
    #[arg(
        long,
        env = "HTTP_PASSWORD",
        default_value = "default-password",
        hide_env_values = true
    )]
    pub(crate) http_password: String,
}

impl HttpArgs {
    pub(crate) fn credentials(&self) -> Credentials {
        Credentials {
            username: self.http_user.clone(),
            password: self.http_password.clone(),
        }
    }
}
