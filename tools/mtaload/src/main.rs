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

use std::process::ExitCode;

use clap::Parser;
use load_framework::anyhow;
use tracing_subscriber::EnvFilter;

mod args;
mod commands;

use args::Commands;
use commands::util::Color;

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    subcommand: Commands,
}

fn init_tracing() {
    let filter = EnvFilter::try_from_env("MTALOAD_LOG")
        .unwrap_or_else(|_| EnvFilter::new("mtaload=INFO,load_framework=INFO,WARN"));

    let subscriber = tracing_subscriber::FmtSubscriber::builder()
        .with_env_filter(filter)
        .with_ansi(true)
        .finish();
    let _ = tracing::subscriber::set_global_default(subscriber);
}

async fn dispatch(cli: Cli) -> anyhow::Result<u8> {
    match cli.subcommand {
        Commands::Http(args) => commands::http::run(&args).await,
        Commands::Smtp(args) => commands::smtp::run(&args).await,
    }
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_tracing();

    let runtime = match tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
    {
        Ok(runtime) => runtime,
        Err(e) => {
            eprintln!("{}", with_color!(Color::RedBold, "Error: {}", e));
            return ExitCode::FAILURE;
        }
    };

    let code = match runtime.block_on(dispatch(cli)) {
        Ok(code) => code,
        Err(e) => {
            eprintln!("{}", with_color!(Color::RedBold, "Error: {:#}", e));
            1
        }
    };

    // Blocking SMTP sessions abandoned on interrupt must not hold up exit.
    runtime.shutdown_background();
    ExitCode::from(code)
}
