//! CLI structure and command definitions
//!
//! Two layers sit on top of the dispatch library:
//! 1. Raw API access (`api`), any product and path
//! 2. Resource commands (`server`, `region`, `job`) with typed output

use clap::{Parser, Subcommand};
use hcsctl_core::Method;

/// Command-line access to HCS-style private cloud APIs
#[derive(Parser, Debug)]
#[command(name = "hcsctl")]
#[command(version, about = "Command-line access to HCS-style private cloud APIs")]
#[command(long_about = "
Command-line access to HCS-style private cloud APIs

Requests are signed with the profile's access key or a password token, routed
to the product endpoint for the selected region, paged through to the end and,
for mutating calls, followed until their asynchronous job finishes.

EXAMPLES:
    # Set up an access-key profile
    hcsctl profile set prod --auth-url hcs.example.com --access-key AK --secret-key SK \\
        --project-id 0123456789abcdef --default-region region-1

    # List every server in the default region
    hcsctl server list

    # Stop two servers and wait for the job
    hcsctl server stop srv-1 srv-2 --force

    # Direct API access, every page
    hcsctl api vpc get vpcs --all

    # Refuse anything but reads
    hcsctl --read-only api ecs post cloudservers/action --data @stop.json

For more help on a specific command, run:
    hcsctl <command> --help
")]
pub struct Cli {
    /// Profile to use for this command
    #[arg(long, short, global = true, env = "HCSCTL_PROFILE")]
    pub profile: Option<String>,

    /// Path to alternate configuration file
    #[arg(long, global = true, env = "HCSCTL_CONFIG_FILE")]
    pub config_file: Option<String>,

    /// Output format
    #[arg(long, short = 'o', global = true, value_enum, default_value = "auto")]
    pub output: OutputFormat,

    /// Enable verbose logging
    #[arg(long, short, global = true, action = clap::ArgAction::Count)]
    pub verbose: u8,

    /// Region to use instead of the profile's
    #[arg(long, short = 'r', global = true)]
    pub region: Option<String>,

    /// Refuse every mutating request, whatever the profile says
    #[arg(long, global = true)]
    pub read_only: bool,

    /// Override retry attempts for transient failures
    #[arg(long, global = true)]
    pub retry_attempts: Option<u32>,

    #[command(subcommand)]
    pub command: Commands,
}

/// Output format options
#[derive(Debug, Clone, Copy, clap::ValueEnum, PartialEq, Eq)]
pub enum OutputFormat {
    /// Table for listings, JSON for everything else
    Auto,
    /// JSON output
    Json,
    /// YAML output
    Yaml,
    /// Human-readable table format
    Table,
}

impl OutputFormat {
    /// Concrete format, with `Auto` resolved to `auto`
    pub fn resolve(self, auto: crate::output::OutputFormat) -> crate::output::OutputFormat {
        match self {
            OutputFormat::Auto => auto,
            OutputFormat::Json => crate::output::OutputFormat::Json,
            OutputFormat::Yaml => crate::output::OutputFormat::Yaml,
            OutputFormat::Table => crate::output::OutputFormat::Table,
        }
    }
}

/// Top-level commands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Raw API access - signed calls to any product path
    #[command(name = "api")]
    #[command(after_help = "EXAMPLES:
    # One page of VPCs
    hcsctl api vpc get vpcs

    # Every server, across pages
    hcsctl api ecs get cloudservers/detail --api-version v1 --all --items-key servers

    # Filter with query parameters
    hcsctl api vpc get subnets --param vpc_id=vpc-1 --all

    # Start a server and wait for the job
    hcsctl api ecs post cloudservers/action --api-version v1 \\
        --data '{\"os-start\": {\"servers\": [{\"id\": \"srv-1\"}]}}' --wait

    # Body from a file
    hcsctl api rds post instances --data @instance.json --wait
")]
    Api {
        /// Product to call (ecs, evs, vpc, ims, rds, dcs, elb, nat, iam)
        product: String,

        /// HTTP method (get, post, put, patch, delete)
        #[arg(value_parser = parse_http_method)]
        method: HttpMethod,

        /// Resource path below the project, e.g. cloudservers/detail
        path: String,

        /// Request body (JSON string or @file)
        #[arg(long)]
        data: Option<String>,

        /// Query parameter as key=value, repeatable
        #[arg(long = "param", value_name = "KEY=VALUE")]
        params: Vec<String>,

        /// Walk every page and print the collected items
        #[arg(long)]
        all: bool,

        /// Field holding the items on each page (first array field when omitted)
        #[arg(long, requires = "all")]
        items_key: Option<String>,

        /// Wait for the job the call returns
        #[arg(long, conflicts_with = "all")]
        wait: bool,

        /// API version segment instead of the product default
        #[arg(long)]
        api_version: Option<String>,
    },

    /// Profile management
    #[command(subcommand, visible_alias = "prof")]
    #[command(after_help = "EXAMPLES:
    # Access-key profile
    hcsctl profile set prod --auth-url hcs.example.com --access-key AK --secret-key SK

    # Password profile with a read-only guard
    hcsctl profile set audit --auth-url hcs.example.com --username ops --password PW \\
        --domain ops-domain --read-only

    # Point a product at a private endpoint
    hcsctl profile set lab --auth-url lab.local --access-key AK --secret-key SK \\
        --endpoint ecs=https://ecs.lab.local

    # List all profiles
    hcsctl profile list
")]
    Profile(ProfileCommands),

    /// Regions visible to the identity service
    #[command(subcommand)]
    Region(RegionCommands),

    /// Elastic cloud servers
    #[command(subcommand, visible_alias = "srv")]
    Server(ServerCommands),

    /// Asynchronous vendor jobs
    #[command(subcommand)]
    Job(JobCommands),

    /// Version information
    #[command(visible_alias = "ver")]
    Version,
}

/// HTTP methods accepted by `api`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HttpMethod {
    Get,
    Post,
    Put,
    Patch,
    Delete,
}

/// Parse HTTP method case-insensitively
fn parse_http_method(s: &str) -> Result<HttpMethod, String> {
    match s.to_lowercase().as_str() {
        "get" => Ok(HttpMethod::Get),
        "post" => Ok(HttpMethod::Post),
        "put" => Ok(HttpMethod::Put),
        "patch" => Ok(HttpMethod::Patch),
        "delete" => Ok(HttpMethod::Delete),
        _ => Err(format!(
            "invalid HTTP method: {} (valid: get, post, put, patch, delete)",
            s
        )),
    }
}

impl From<HttpMethod> for Method {
    fn from(method: HttpMethod) -> Self {
        match method {
            HttpMethod::Get => Method::GET,
            HttpMethod::Post => Method::POST,
            HttpMethod::Put => Method::PUT,
            HttpMethod::Patch => Method::PATCH,
            HttpMethod::Delete => Method::DELETE,
        }
    }
}

impl std::fmt::Display for HttpMethod {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            HttpMethod::Get => write!(f, "GET"),
            HttpMethod::Post => write!(f, "POST"),
            HttpMethod::Put => write!(f, "PUT"),
            HttpMethod::Patch => write!(f, "PATCH"),
            HttpMethod::Delete => write!(f, "DELETE"),
        }
    }
}

/// Profile management commands
#[derive(Subcommand, Debug)]
pub enum ProfileCommands {
    /// List all configured profiles
    #[command(visible_alias = "ls")]
    List,

    /// Show the path to the configuration file
    Path,

    /// Show details of a specific profile, secrets masked
    #[command(visible_alias = "get")]
    Show {
        /// Profile name (default profile when omitted)
        name: Option<String>,
    },

    /// Create or replace a profile
    #[command(visible_alias = "add")]
    Set {
        /// Profile name
        name: String,

        /// Identity domain the product hosts are derived from, e.g. hcs.example.com
        #[arg(long)]
        auth_url: String,

        /// Access key (access-key authentication)
        #[arg(long, requires = "secret_key", conflicts_with_all = ["username", "password"])]
        access_key: Option<String>,

        /// Secret key (access-key authentication)
        #[arg(long, requires = "access_key")]
        secret_key: Option<String>,

        /// IAM user (password authentication)
        #[arg(long, requires_all = ["password", "domain"])]
        username: Option<String>,

        /// IAM password (password authentication)
        #[arg(long, requires = "username")]
        password: Option<String>,

        /// IAM domain the user belongs to (password authentication)
        #[arg(long, requires = "username")]
        domain: Option<String>,

        /// Project scoped requests are sent to
        #[arg(long)]
        project_id: Option<String>,

        /// Domain id for global services such as IAM
        #[arg(long)]
        domain_id: Option<String>,

        /// Default region
        #[arg(long = "default-region")]
        default_region: Option<String>,

        /// Refuse every mutating request made with this profile
        #[arg(long)]
        read_only: bool,

        /// Endpoint override as product=url, repeatable
        #[arg(long = "endpoint", value_name = "PRODUCT=URL")]
        endpoints: Vec<String>,

        /// Store secrets in the OS keyring instead of the config file
        #[cfg(feature = "secure-storage")]
        #[arg(long)]
        use_keyring: bool,

        /// Make this the default profile
        #[arg(long)]
        default: bool,
    },

    /// Remove a profile
    #[command(visible_alias = "rm")]
    Remove {
        /// Profile name
        name: String,
    },

    /// Set the default profile
    Default {
        /// Profile name
        name: String,
    },
}

/// Region commands
#[derive(Subcommand, Debug)]
pub enum RegionCommands {
    /// List regions
    #[command(visible_alias = "ls")]
    List {
        /// Skip the cached list and ask the identity service again
        #[arg(long)]
        refresh: bool,
    },
}

/// Server commands
#[derive(Subcommand, Debug)]
pub enum ServerCommands {
    /// List servers
    #[command(visible_alias = "ls")]
    List,

    /// Show one server
    Get {
        /// Server ID
        id: String,
    },

    /// Start servers
    Start {
        /// Server IDs
        #[arg(required = true)]
        ids: Vec<String>,

        /// Return once the request is accepted instead of waiting for the job
        #[arg(long)]
        no_wait: bool,
    },

    /// Stop servers
    Stop {
        /// Server IDs
        #[arg(required = true)]
        ids: Vec<String>,

        /// Hard stop instead of a graceful shutdown
        #[arg(long)]
        force: bool,

        /// Return once the request is accepted instead of waiting for the job
        #[arg(long)]
        no_wait: bool,
    },

    /// Reboot servers
    Reboot {
        /// Server IDs
        #[arg(required = true)]
        ids: Vec<String>,

        /// Hard reboot instead of a graceful one
        #[arg(long)]
        force: bool,

        /// Return once the request is accepted instead of waiting for the job
        #[arg(long)]
        no_wait: bool,
    },

    /// Change a server's flavor
    Resize {
        /// Server ID
        id: String,

        /// Target flavor
        #[arg(long)]
        flavor: String,

        /// Return once the request is accepted instead of waiting for the job
        #[arg(long)]
        no_wait: bool,
    },

    /// Delete servers
    Delete {
        /// Server IDs
        #[arg(required = true)]
        ids: Vec<String>,

        /// Delete attached data volumes too
        #[arg(long)]
        delete_volumes: bool,
    },
}

/// Job commands
#[derive(Subcommand, Debug)]
pub enum JobCommands {
    /// Wait for a job to finish
    Wait {
        /// Product that issued the job (ecs, evs, rds, ...)
        product: String,

        /// Job ID
        job_id: String,

        /// Give up after this many seconds (profile setting when omitted)
        #[arg(long)]
        timeout: Option<u64>,

        /// Seconds between status checks (profile setting when omitted)
        #[arg(long)]
        interval: Option<u64>,
    },
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_http_method() {
        assert_eq!(parse_http_method("GET"), Ok(HttpMethod::Get));
        assert_eq!(parse_http_method("patch"), Ok(HttpMethod::Patch));
        assert!(parse_http_method("head").is_err());
        assert_eq!(Method::from(HttpMethod::Delete), Method::DELETE);
    }

    #[test]
    fn test_api_args() {
        let cli = Cli::try_parse_from([
            "hcsctl",
            "--read-only",
            "api",
            "vpc",
            "get",
            "subnets",
            "--param",
            "vpc_id=v1",
            "--all",
            "--items-key",
            "subnets",
        ])
        .unwrap();
        assert!(cli.read_only);
        match cli.command {
            Commands::Api {
                product,
                params,
                all,
                items_key,
                ..
            } => {
                assert_eq!(product, "vpc");
                assert_eq!(params, vec!["vpc_id=v1".to_string()]);
                assert!(all);
                assert_eq!(items_key.as_deref(), Some("subnets"));
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_wait_conflicts_with_all() {
        let result = Cli::try_parse_from(["hcsctl", "api", "ecs", "post", "x", "--all", "--wait"]);
        assert!(result.is_err());
    }
}
