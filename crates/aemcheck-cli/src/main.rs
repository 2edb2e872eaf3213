mod cli;
mod commands;
mod output;

use std::process::ExitCode;
use std::sync::Arc;

use anyhow::Result;
use clap::Parser;
use cli::{Cli, Command};
use output::ConsoleSink;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<ExitCode> {
    let cli = Cli::parse();

    if cli.log_json {
        tracing_subscriber::fmt()
            .json()
            .with_env_filter(EnvFilter::from_default_env())
            .with_writer(std::io::stderr)
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(EnvFilter::from_default_env())
            .with_target(false)
            .with_writer(std::io::stderr)
            .init();
    }

    let settings = commands::settings(cli.config.as_deref())?;
    let console = Arc::new(ConsoleSink::new(cli.verbose));
    let sink = console.clone();
    let azure = cli.azure;

    let passed = match cli.command {
        Command::Sla { vm } => commands::sla(&azure, settings, sink, vm).await?,
        Command::Verify { vm, account, os_type, timeout_minutes, deployment_id, host } => {
            commands::verify(&azure, settings, sink, vm, account, os_type, timeout_minutes, deployment_id, host)
                .await?
        }
        Command::WaitTable { account, table, discover: _, filter, timeout_minutes } => {
            commands::wait_table(&azure, settings, sink, account, table, filter, timeout_minutes).await?
        }
        Command::AuditWad { file } => commands::audit_wad(&settings, sink, file)?,
        Command::AuditStorage { account } => commands::audit_storage(&azure, settings, sink, account).await?,
        Command::CheckExtension {
            vm,
            view,
            extension_type,
            publisher,
            properties,
            key,
            label,
            expected,
            exists,
        } => commands::check_extension(
            sink,
            vm,
            view,
            extension_type,
            publisher,
            properties,
            key,
            label,
            expected,
            exists,
        )?,
    };

    if passed && !console.failed() {
        Ok(ExitCode::SUCCESS)
    } else {
        Ok(ExitCode::FAILURE)
    }
}
