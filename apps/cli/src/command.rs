use std::str::FromStr;

use clap::{Args, Parser, Subcommand};
use gatehouse_core::RoleId;
use gatehouse_domain::{AccessContext, AssignmentScope, PermissionAction};
use serde_json::{Map, Value};

/// Gatehouse authorization decision core.
#[derive(Debug, Parser)]
#[command(name = "gatehouse-cli")]
#[command(version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

/// One-shot operation requested on the command line.
#[derive(Debug, Clone, PartialEq, Subcommand)]
pub enum Command {
    /// Apply database migrations and exit
    Migrate,
    /// Create the demo roles, permissions and assignments
    Seed,
    /// Decide whether a user may perform an action on a resource
    Check(CheckArgs),
    /// List the effective permissions of a user
    Effective {
        /// User to resolve
        user_id: String,

        /// Narrow the query to one assignment scope
        #[arg(long, value_parser = parse_scope)]
        scope: Option<AssignmentScope>,

        /// Narrow the scoped query to one scope instance
        #[arg(long, requires = "scope")]
        scope_id: Option<String>,
    },
    /// Evict a role, its descendants and their users from the cache
    InvalidateRole {
        /// Role id (UUID)
        #[arg(value_parser = parse_role_id)]
        role_id: RoleId,
    },
    /// Evict every cached query of one user
    InvalidateUser {
        /// User to evict
        user_id: String,
    },
}

impl Command {
    /// Returns whether the command only touches the database schema.
    pub fn is_migrate(&self) -> bool {
        matches!(self, Self::Migrate)
    }
}

/// Arguments of `check`.
#[derive(Debug, Clone, PartialEq, Args)]
pub struct CheckArgs {
    /// User to check
    pub user_id: String,

    /// Resource namespace, e.g. `invoice`
    pub resource: String,

    /// Action: create, read, update, delete, execute or manage
    #[arg(value_parser = parse_action)]
    pub action: PermissionAction,

    /// Context attributes as a JSON object
    #[arg(long, value_parser = parse_context)]
    pub context: Option<Map<String, Value>>,

    /// Concrete resource instance
    #[arg(long)]
    pub resource_id: Option<String>,

    /// Require the user to own `--resource-id`
    #[arg(long, requires = "resource_id")]
    pub require_ownership: bool,
}

impl CheckArgs {
    /// Builds the access context presented with the check.
    pub fn access_context(&self) -> AccessContext {
        let context = AccessContext::from_attributes(self.context.clone().unwrap_or_default());
        match (&self.resource_id, self.require_ownership) {
            (Some(resource_id), true) => context.require_ownership_of(resource_id.clone()),
            (Some(resource_id), false) => context.with_resource_id(resource_id.clone()),
            (None, _) => context,
        }
    }
}

fn parse_action(raw: &str) -> Result<PermissionAction, String> {
    PermissionAction::from_str(raw).map_err(|error| error.to_string())
}

fn parse_scope(raw: &str) -> Result<AssignmentScope, String> {
    AssignmentScope::from_str(raw).map_err(|error| error.to_string())
}

fn parse_role_id(raw: &str) -> Result<RoleId, String> {
    RoleId::from_str(raw).map_err(|error| error.to_string())
}

fn parse_context(raw: &str) -> Result<Map<String, Value>, String> {
    serde_json::from_str(raw).map_err(|error| format!("context must be a JSON object: {error}"))
}
