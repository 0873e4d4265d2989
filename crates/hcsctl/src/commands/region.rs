use crate::cli::{OutputFormat, RegionCommands};
use crate::error::Result as CliResult;
use crate::output;
use hcsctl_core::HcsClient;
use hcsctl_core::resources::Region;
use serde_json::{Value, json};

pub async fn handle_region_command(
    region_cmd: &RegionCommands,
    client: &HcsClient,
    output_format: OutputFormat,
) -> CliResult<()> {
    match region_cmd {
        RegionCommands::List { refresh } => {
            let regions = if *refresh {
                client.refresh_regions().await?
            } else {
                client.regions().await?
            };

            let format = output_format.resolve(output::OutputFormat::Table);
            if format == output::OutputFormat::Table {
                // served from the cache filled above
                let active = client.effective_region(None).await.ok();
                let rows: Vec<Value> = regions
                    .iter()
                    .map(|r| row(r, active.as_deref()))
                    .collect();
                output::print_output(rows, format)?;
            } else {
                output::print_output(&regions, format)?;
            }
            Ok(())
        }
    }
}

fn row(region: &Region, default_region: Option<&str>) -> Value {
    json!({
        "id": region.id,
        "name": region.display_name(),
        "type": region.region_type.clone().unwrap_or_default(),
        "default": default_region == Some(region.id.as_str()),
    })
}
