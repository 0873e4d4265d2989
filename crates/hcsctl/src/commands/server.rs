//! Server commands
//!
//! Lifecycle actions submit the vendor action and then follow the returned
//! job with a spinner, unless `--no-wait` is given.

use crate::cli::{OutputFormat, ServerCommands};
use crate::commands::job::{outcome_json, wait_with_progress};
use crate::error::{HcsCtlError, Result as CliResult};
use crate::output;
use hcsctl_core::client::job_id_of;
use hcsctl_core::resources::Server;
use hcsctl_core::{Action, HcsClient, StopMode};
use serde_json::{Value, json};
use tracing::info;

pub async fn handle_server_command(
    server_cmd: &ServerCommands,
    client: &HcsClient,
    region: Option<&str>,
    output_format: OutputFormat,
) -> CliResult<()> {
    match server_cmd {
        ServerCommands::List => {
            let servers = client.list_servers(region).await?;
            let format = output_format.resolve(output::OutputFormat::Table);
            if format == output::OutputFormat::Table {
                let rows: Vec<Value> = servers.iter().map(summary_row).collect();
                output::print_output(rows, format)?;
            } else {
                output::print_output(&servers, format)?;
            }
            Ok(())
        }
        ServerCommands::Get { id } => {
            let server = client
                .find_server(region, id)
                .await?
                .ok_or_else(|| HcsCtlError::NotFound {
                    message: format!("server '{}'", id),
                })?;
            output::print_output(&server, output_format.resolve(output::OutputFormat::Json))?;
            Ok(())
        }
        ServerCommands::Start { ids, no_wait } => {
            let action = Action::StartServers {
                server_ids: ids.clone(),
            };
            run_action(client, region, &action, *no_wait, output_format).await
        }
        ServerCommands::Stop {
            ids,
            force,
            no_wait,
        } => {
            let action = Action::StopServers {
                server_ids: ids.clone(),
                mode: StopMode::from_force(*force),
            };
            run_action(client, region, &action, *no_wait, output_format).await
        }
        ServerCommands::Reboot {
            ids,
            force,
            no_wait,
        } => {
            let action = Action::RebootServers {
                server_ids: ids.clone(),
                mode: StopMode::from_force(*force),
            };
            run_action(client, region, &action, *no_wait, output_format).await
        }
        ServerCommands::Resize {
            id,
            flavor,
            no_wait,
        } => {
            let action = Action::ResizeServer {
                server_id: id.clone(),
                flavor_ref: flavor.clone(),
            };
            run_action(client, region, &action, *no_wait, output_format).await
        }
        ServerCommands::Delete {
            ids,
            delete_volumes,
        } => {
            info!("Deleting {} server(s)", ids.len());
            let result = client.delete_servers(region, ids, *delete_volumes).await?;
            output::print_output(result, output_format.resolve(output::OutputFormat::Json))?;
            Ok(())
        }
    }
}

async fn run_action(
    client: &HcsClient,
    region: Option<&str>,
    action: &Action,
    no_wait: bool,
    output_format: OutputFormat,
) -> CliResult<()> {
    info!("Submitting {}", action.name());
    let accepted = client.submit(action, region).await?;
    let format = output_format.resolve(output::OutputFormat::Json);

    let job_id = match job_id_of(&accepted) {
        Some(job_id) if !no_wait => job_id,
        _ => {
            output::print_output(accepted, format)?;
            return Ok(());
        }
    };

    let poller = match action.poll_ceiling() {
        Some((interval, timeout)) => client.poller().with_ceiling(interval, timeout),
        None => client.poller(),
    };
    let outcome = wait_with_progress(client, action.product(), region, &job_id, poller).await?;
    output::print_output(outcome_json(&outcome), format)?;
    Ok(())
}

fn summary_row(server: &Server) -> Value {
    json!({
        "id": server.id,
        "name": server.name,
        "status": server.status,
        "flavor": server.flavor.as_ref().map(|f| f.id.clone()).unwrap_or_default(),
        "availability_zone": server.availability_zone.clone().unwrap_or_default(),
        "created": server.created.clone().unwrap_or_default(),
    })
}
