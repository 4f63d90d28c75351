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
    kubernetes::POD_SELECTOR,
    transport::{smtp::SmtpSender, Transport},
    TransportKind,
};

use super::{util::Color, Discovered, Interrupt, LoadRun};
use crate::{args::SmtpArgs, with_color};

const LISTENER_LOG_LINES: usize = 500;
const LISTENER_STARTED_MARKERS: [&str; 2] = ["start_esmtp_listener", "listening"];

pub(crate) async fn run(args: &SmtpArgs) -> anyhow::Result<u8> {
    let load_run = LoadRun::new(
        TransportKind::Smtp,
        &args.common,
        args.smtp_port,
        args.local_smtp_port,
        Interrupt::install(),
    );
    load_run.print_banner();

    let discovered = load_run.discover()?;
    if let Some(discovered) = &discovered {
        report_listener_status(discovered);
    }
    load_run
        .execute(discovered.as_ref(), |local_port| {
            Ok(Arc::new(SmtpSender::to_listener("localhost", local_port)) as Arc<dyn Transport>)
        })
        .await
}

/// Look for the listener start-up line in the MTA logs. Informational only.
fn report_listener_status(discovered: &Discovered) {
    let Some(pod) = discovered.kubectl.first_pod(POD_SELECTOR) else {
        println!(
            "{}",
            with_color!(Color::Yellow, "Warning: no MTA pod found to check the SMTP listener")
        );
        return;
    };

    if discovered
        .kubectl
        .logs_contain_any(&pod, LISTENER_LOG_LINES, &LISTENER_STARTED_MARKERS)
    {
        println!("SMTP listener is running in pod {pod}");
    } else {
        println!(
            "{}",
            with_color!(
                Color::Yellow,
                "Warning: no SMTP listener start-up found in the last {} log lines of {}",
                LISTENER_LOG_LINES,
                pod
            )
        );
    }
}
