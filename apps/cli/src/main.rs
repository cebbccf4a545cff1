//! Gatehouse authorization command-line composition root.

#![forbid(unsafe_code)]

mod cli_config;
mod command;
mod demo_seed;
mod runtime;

use clap::Parser;
use gatehouse_core::{AppError, AppResult};
use tracing::info;

use crate::cli_config::{CliConfig, init_tracing};
use crate::command::{Cli, Command};
use crate::runtime::{Runtime, build_runtime, connect_and_migrate};

#[tokio::main]
async fn main() -> Result<(), AppError> {
    dotenvy::dotenv().ok();
    init_tracing();

    let command = Cli::parse().command;
    let config = CliConfig::load()?;

    if command.is_migrate() {
        let database_url = config.database_url.as_deref().ok_or_else(|| {
            AppError::Validation("DATABASE_URL is required for migrate".to_owned())
        })?;
        connect_and_migrate(database_url).await?;
        info!("database migrations applied successfully");
        return Ok(());
    }

    let runtime = build_runtime(&config).await?;
    if !runtime.persistent && command != Command::Seed {
        demo_seed::run(&runtime.admin).await?;
    }

    execute(&runtime, command).await
}

async fn execute(runtime: &Runtime, command: Command) -> AppResult<()> {
    match command {
        Command::Migrate => Ok(()),
        Command::Seed => {
            let seeded = demo_seed::run(&runtime.admin).await?;
            println!("{}", if seeded { "seeded" } else { "already seeded" });
            Ok(())
        }
        Command::Check(check) => {
            let decision = runtime
                .authorization
                .has_permission(
                    &check.user_id,
                    &check.resource,
                    check.action,
                    &check.access_context(),
                )
                .await;
            print_json(&decision)?;

            match decision.failure() {
                Some(failure) => Err(failure.clone()),
                None => Ok(()),
            }
        }
        Command::Effective {
            user_id,
            scope,
            scope_id,
        } => {
            let permissions = runtime
                .authorization
                .get_effective_permissions(&user_id, scope, scope_id.as_deref())
                .await?;
            print_json(&permissions)
        }
        Command::InvalidateRole { role_id } => {
            let report = runtime.invalidation.invalidate_role(role_id).await?;
            println!(
                "evicted {} role entries and {} user entries",
                report.roles_evicted, report.users_evicted
            );
            Ok(())
        }
        Command::InvalidateUser { user_id } => {
            runtime.invalidation.invalidate_user(&user_id).await?;
            println!("evicted cached permissions for user '{user_id}'");
            Ok(())
        }
    }
}

fn print_json(value: &impl serde::Serialize) -> AppResult<()> {
    let rendered = serde_json::to_string_pretty(value)
        .map_err(|error| AppError::Internal(format!("failed to render output: {error}")))?;
    println!("{rendered}");
    Ok(())
}
