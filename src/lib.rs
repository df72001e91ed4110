pub mod application;
pub mod domain;
pub mod infrastructure;

use application::commands::{
    add_filter_node_impl, create_goal_impl, deactivate_goal_impl, delete_filter_node_impl,
    edit_goal_impl, goal_types_impl, list_goals_impl, parse_category_field, refresh_goals_impl,
    set_filter_field_impl, show_filter_impl, watch_impl, AppState, GoalChanges,
};
use clap::{Parser, Subcommand};
use domain::models::GoalId;
use infrastructure::error::InfraError;
use serde::Serialize;
use std::path::PathBuf;
use std::process::ExitCode;
use tracing::info;

const DEFAULT_WORKSPACE_DIR: &str = ".goaltracker";

#[derive(Parser, Debug)]
#[command(name = "goaltracker", version, about = "Time goals measured against ActivityWatch")]
pub struct Cli {
    /// Workspace holding config/ and state/. Defaults to ~/.goaltracker.
    #[arg(long, env = "GOALTRACKER_HOME", global = true)]
    workspace: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// List active goals with progress.
    Goals,
    /// List supported goal types.
    Types,
    /// Create a goal.
    Add {
        #[arg(long)]
        name: String,
        #[arg(long)]
        target: f64,
        #[arg(long = "type", default_value = "daily")]
        goal_type: String,
        /// RFC 3339 start, custom goals only.
        #[arg(long)]
        begin: Option<String>,
        /// RFC 3339 end, custom goals only.
        #[arg(long)]
        end: Option<String>,
    },
    /// Change fields of a goal.
    Edit {
        id: GoalId,
        #[arg(long)]
        name: Option<String>,
        #[arg(long)]
        target: Option<f64>,
        #[arg(long = "type")]
        goal_type: Option<String>,
        #[arg(long)]
        begin: Option<String>,
        #[arg(long)]
        end: Option<String>,
    },
    /// Hide a goal from listings and refreshes.
    Deactivate { id: GoalId },
    /// Inspect or edit a goal's category filter.
    Filter {
        #[command(subcommand)]
        action: FilterCommand,
    },
    /// Refresh one goal, or every active goal.
    Refresh { id: Option<GoalId> },
    /// Refresh active goals on the configured cadence until Ctrl-C.
    Watch,
}

#[derive(Subcommand, Debug)]
enum FilterCommand {
    Show {
        id: GoalId,
    },
    /// Append a placeholder category at the top level or under PARENT.
    Add {
        id: GoalId,
        #[arg(long)]
        parent: Option<String>,
    },
    Delete {
        id: GoalId,
        path: String,
    },
    /// Set label, ignore-case or pattern of the category at PATH.
    Set {
        id: GoalId,
        path: String,
        field: String,
        value: String,
    },
}

fn default_workspace() -> PathBuf {
    std::env::var_os("HOME")
        .or_else(|| std::env::var_os("USERPROFILE"))
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("."))
        .join(DEFAULT_WORKSPACE_DIR)
}

pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "goaltracker=info".into()),
        )
        .with_writer(std::io::stderr)
        .try_init();
}

fn print_json<T: Serialize>(value: &T) -> Result<(), InfraError> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

async fn dispatch(state: &AppState, command: Command) -> Result<(), String> {
    match command {
        Command::Goals => list_goals_impl(state)
            .and_then(|goals| print_json(&goals))
            .map_err(|error| state.command_error("goals", &error)),
        Command::Types => goal_types_impl(state)
            .and_then(|types| print_json(&types))
            .map_err(|error| state.command_error("types", &error)),
        Command::Add {
            name,
            target,
            goal_type,
            begin,
            end,
        } => create_goal_impl(state, name, target, goal_type, begin, end)
            .and_then(|goal| print_json(&goal))
            .map_err(|error| state.command_error("add", &error)),
        Command::Edit {
            id,
            name,
            target,
            goal_type,
            begin,
            end,
        } => {
            let changes = GoalChanges {
                name,
                target,
                goal_type,
                begin_date: begin,
                end_date: end,
            };
            edit_goal_impl(state, id, changes)
                .and_then(|goal| print_json(&goal))
                .map_err(|error| state.command_error("edit", &error))
        }
        Command::Deactivate { id } => deactivate_goal_impl(state, id)
            .and_then(|()| print_json(&serde_json::json!({ "deactivated": id })))
            .map_err(|error| state.command_error("deactivate", &error)),
        Command::Filter { action } => dispatch_filter(state, action),
        Command::Refresh { id } => refresh_goals_impl(state, id)
            .await
            .and_then(|reports| print_json(&reports))
            .map_err(|error| state.command_error("refresh", &error)),
        Command::Watch => {
            let shutdown = async {
                if let Err(error) = tokio::signal::ctrl_c().await {
                    tracing::warn!(%error, "ctrl-c handler unavailable; stopping");
                }
            };
            watch_impl(state, shutdown)
                .await
                .map(|cycles| info!(cycles, "watch finished"))
                .map_err(|error| state.command_error("watch", &error))
        }
    }
}

fn dispatch_filter(state: &AppState, action: FilterCommand) -> Result<(), String> {
    match action {
        FilterCommand::Show { id } => show_filter_impl(state, id)
            .and_then(|nodes| print_json(&nodes))
            .map_err(|error| state.command_error("filter show", &error)),
        FilterCommand::Add { id, parent } => add_filter_node_impl(state, id, parent)
            .and_then(|position| print_json(&serde_json::json!({ "position": position })))
            .map_err(|error| state.command_error("filter add", &error)),
        FilterCommand::Delete { id, path } => delete_filter_node_impl(state, id, path)
            .and_then(|removed| print_json(&serde_json::json!({ "removed": removed })))
            .map_err(|error| state.command_error("filter delete", &error)),
        FilterCommand::Set {
            id,
            path,
            field,
            value,
        } => parse_category_field(&field, &value)
            .and_then(|field| set_filter_field_impl(state, id, path, field))
            .and_then(|updated| print_json(&serde_json::json!({ "updated": updated })))
            .map_err(|error| state.command_error("filter set", &error)),
    }
}

pub async fn run() -> ExitCode {
    init_tracing();
    let cli = Cli::parse();
    let workspace = cli.workspace.unwrap_or_else(default_workspace);

    let state = match AppState::new(workspace) {
        Ok(state) => state,
        Err(error) => {
            tracing::error!(%error, "failed to prepare workspace");
            eprintln!("{error}");
            return ExitCode::FAILURE;
        }
    };

    match dispatch(&state, cli.command).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(message) => {
            eprintln!("{message}");
            ExitCode::FAILURE
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cli_parses_nested_filter_commands() {
        let cli = Cli::try_parse_from([
            "goaltracker",
            "--workspace",
            "/tmp/goals",
            "filter",
            "set",
            "3",
            "0.1",
            "ignore-case",
            "true",
        ])
        .expect("parse");

        assert_eq!(cli.workspace, Some(PathBuf::from("/tmp/goals")));
        match cli.command {
            Command::Filter {
                action:
                    FilterCommand::Set {
                        id,
                        path,
                        field,
                        value,
                    },
            } => {
                assert_eq!(id, 3);
                assert_eq!(path, "0.1");
                assert_eq!(field, "ignore-case");
                assert_eq!(value, "true");
            }
            other => panic!("unexpected command: {other:?}"),
        }
    }

    #[test]
    fn cli_defaults_goal_type_to_daily() {
        let cli = Cli::try_parse_from(["goaltracker", "add", "--name", "Read", "--target", "2"])
            .expect("parse");
        match cli.command {
            Command::Add { goal_type, begin, .. } => {
                assert_eq!(goal_type, "daily");
                assert_eq!(begin, None);
            }
            other => panic!("unexpected command: {other:?}"),
        }
    }
}
