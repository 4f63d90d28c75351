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

use std::sync::Arc;

use load_framework::{
    anyhow,
    transport::{http::HttpInjector, Transport},
    TransportKind,
};

use super::{Interrupt, LoadRun};
use crate::args::HttpArgs;

pub(crate) async fn run(args: &HttpArgs) -> anyhow::Result<u8> {
    let load_run = LoadRun::new(
        TransportKind::Http,
        &args.common,
        args.http_port,
        args.local_http_port,
        Interrupt::install(),
    );
    load_run.print_banner();

    let discovered = load_run.discover()?;
    load_run
        .execute(discovered.as_ref(), |local_port| {
            let injector = HttpInjector::new(
                format!("http://localhost:{local_port}"),
                args.credentials(),
            )?;
            println!("Injection endpoint: {}", injector.inject_url());
            Ok(Arc::new(injector) as Arc<dyn Transport>)
        })
        .await
}
