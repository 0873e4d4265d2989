use anyhow::Result;
use clap::Parser;
use hcsctl_core::HcsClient;
use hcsctl_core::config::Config;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod cli;
mod commands;
mod connection;
mod error;
mod output;

use cli::{Cli, Commands};
use connection::{ClientOptions, ConnectionManager};
use error::HcsCtlError;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize tracing based on verbosity level
    init_tracing(cli.verbose);

    // Load configuration from specified path or default location
    let (config, config_path) = if let Some(config_file) = &cli.config_file {
        let path = std::path::PathBuf::from(config_file);
        debug!("Loading config from explicit path: {:?}", path);
        let config = Config::load_from_path(&path)?;
        (config, Some(path))
    } else {
        debug!("Loading config from default location");
        (Config::load()?, None)
    };
    let conn_mgr = ConnectionManager::with_config_path(config, config_path);

    let cancel = CancellationToken::new();
    spawn_ctrl_c_handler(cancel.clone());

    if let Err(e) = execute_command(&cli, &conn_mgr, cancel).await {
        e.print_diagnostic();
        std::process::exit(e.exit_code());
    }

    Ok(())
}

fn init_tracing(verbose: u8) {
    // Check for RUST_LOG env var first, then fall back to verbosity flag
    let filter = if std::env::var("RUST_LOG").is_ok() {
        tracing_subscriber::EnvFilter::from_default_env()
    } else {
        let level = match verbose {
            0 => "hcsctl=warn,hcsctl_core=warn",
            1 => "hcsctl=info,hcsctl_core=info",
            2 => "hcsctl=debug,hcsctl_core=debug",
            _ => "hcsctl=trace,hcsctl_core=trace",
        };
        tracing_subscriber::EnvFilter::new(level)
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(std::io::stderr)
                .with_target(true)
                .with_thread_ids(false)
                .with_thread_names(false)
                .compact(),
        )
        .init();

    debug!("Tracing initialized with verbosity level: {}", verbose);
}

/// Cancel in-flight work on the first Ctrl-C
fn spawn_ctrl_c_handler(cancel: CancellationToken) {
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupted, cancelling");
            cancel.cancel();
        }
    });
}

async fn execute_command(
    cli: &Cli,
    conn_mgr: &ConnectionManager,
    cancel: CancellationToken,
) -> Result<(), HcsCtlError> {
    // Log command execution with sanitized parameters
    info!("Command: {}", format_command(&cli.command));

    let start = std::time::Instant::now();
    let result = match &cli.command {
        Commands::Version => {
            debug!("Showing version information");
            match cli.output {
                cli::OutputFormat::Json | cli::OutputFormat::Yaml => {
                    let output_data = serde_json::json!({
                        "version": env!("CARGO_PKG_VERSION"),
                        "name": env!("CARGO_PKG_NAME"),
                    });
                    output::print_output(
                        &output_data,
                        cli.output.resolve(output::OutputFormat::Json),
                    )?;
                }
                _ => {
                    println!("hcsctl {}", env!("CARGO_PKG_VERSION"));
                }
            }
            Ok(())
        }

        Commands::Profile(profile_cmd) => {
            debug!("Executing profile command");
            commands::profile::handle_profile_command(profile_cmd, conn_mgr, cli.output).await
        }

        Commands::Api {
            product,
            method,
            path,
            data,
            params,
            all,
            items_key,
            wait,
            api_version,
        } => {
            info!(
                "API call: {} {} {} ({})",
                product,
                method,
                path,
                if data.is_some() { "with data" } else { "no data" }
            );
            let client = create_client(cli, conn_mgr, cancel)?;
            commands::api::handle_api_command(
                &client,
                commands::api::ApiCommandParams {
                    product,
                    method: *method,
                    path,
                    data: data.as_deref(),
                    params,
                    all: *all,
                    items_key: items_key.as_deref(),
                    wait: *wait,
                    api_version: api_version.as_deref(),
                    region: cli.region.as_deref(),
                    output_format: cli.output,
                },
            )
            .await
        }

        Commands::Region(region_cmd) => {
            let client = create_client(cli, conn_mgr, cancel)?;
            commands::region::handle_region_command(region_cmd, &client, cli.output).await
        }

        Commands::Server(server_cmd) => {
            let client = create_client(cli, conn_mgr, cancel)?;
            commands::server::handle_server_command(
                server_cmd,
                &client,
                cli.region.as_deref(),
                cli.output,
            )
            .await
        }

        Commands::Job(job_cmd) => {
            let client = create_client(cli, conn_mgr, cancel)?;
            commands::job::handle_job_command(job_cmd, &client, cli.region.as_deref(), cli.output)
                .await
        }
    };

    let duration = start.elapsed();
    match &result {
        Ok(_) => info!("Command completed successfully in {:?}", duration),
        Err(e) => error!("Command failed after {:?}: {}", duration, e),
    }

    result
}

fn create_client(
    cli: &Cli,
    conn_mgr: &ConnectionManager,
    cancel: CancellationToken,
) -> Result<HcsClient, HcsCtlError> {
    let options = ClientOptions {
        region: cli.region.clone(),
        read_only: cli.read_only,
        retry_attempts: cli.retry_attempts,
    };
    conn_mgr.create_client(cli.profile.as_deref(), &options, cancel)
}

/// Format command for human-readable logging (without sensitive data)
fn format_command(command: &Commands) -> String {
    match command {
        Commands::Version => "version".to_string(),
        Commands::Profile(cmd) => {
            use cli::ProfileCommands::*;
            match cmd {
                List => "profile list".to_string(),
                Path => "profile path".to_string(),
                Show { name } => format!("profile show {}", name.as_deref().unwrap_or("")),
                Set { name, .. } => format!("profile set {} [credentials redacted]", name),
                Remove { name } => format!("profile remove {}", name),
                Default { name } => format!("profile default {}", name),
            }
        }
        Commands::Api {
            product,
            method,
            path,
            ..
        } => format!("api {} {} {}", product, method, path),
        Commands::Region(cmd) => format!("region {:?}", cmd),
        Commands::Server(cmd) => format!("server {:?}", cmd),
        Commands::Job(cmd) => format!("job {:?}", cmd),
    }
}
