//! Profile management command implementations

use crate::cli::{OutputFormat, ProfileCommands};
use crate::connection::ConnectionManager;
use crate::error::{HcsCtlError, Result as CliResult};
use crate::output;
use hcsctl_core::config::{CredentialStore, Profile, ProfileCredentials, SecretRef};
use serde_json::{Value, json};
use std::collections::HashMap;
use tracing::{debug, trace, warn};

/// Arguments of `profile set`, borrowed from the parsed command line
pub struct SetArgs<'a> {
    pub name: &'a str,
    pub auth_url: &'a str,
    pub access_key: Option<&'a str>,
    pub secret_key: Option<&'a str>,
    pub username: Option<&'a str>,
    pub password: Option<&'a str>,
    pub domain: Option<&'a str>,
    pub project_id: Option<&'a str>,
    pub domain_id: Option<&'a str>,
    pub region: Option<&'a str>,
    pub read_only: bool,
    pub endpoints: &'a [String],
    pub use_keyring: bool,
    pub make_default: bool,
}

/// Handle profile management commands
pub async fn handle_profile_command(
    profile_cmd: &ProfileCommands,
    conn_mgr: &ConnectionManager,
    output_format: OutputFormat,
) -> CliResult<()> {
    use ProfileCommands::*;

    match profile_cmd {
        List => handle_list(conn_mgr, output_format),
        Path => handle_path(conn_mgr, output_format),
        Show { name } => handle_show(conn_mgr, name.as_deref(), output_format),
        Set {
            name,
            auth_url,
            access_key,
            secret_key,
            username,
            password,
            domain,
            project_id,
            domain_id,
            default_region,
            read_only,
            endpoints,
            #[cfg(feature = "secure-storage")]
            use_keyring,
            default,
        } => {
            #[cfg(feature = "secure-storage")]
            let use_keyring = *use_keyring;
            #[cfg(not(feature = "secure-storage"))]
            let use_keyring = false;

            handle_set(
                conn_mgr,
                SetArgs {
                    name,
                    auth_url,
                    access_key: access_key.as_deref(),
                    secret_key: secret_key.as_deref(),
                    username: username.as_deref(),
                    password: password.as_deref(),
                    domain: domain.as_deref(),
                    project_id: project_id.as_deref(),
                    domain_id: domain_id.as_deref(),
                    region: default_region.as_deref(),
                    read_only: *read_only,
                    endpoints,
                    use_keyring,
                    make_default: *default,
                },
            )
        }
        Remove { name } => handle_remove(conn_mgr, name),
        Default { name } => handle_default(conn_mgr, name),
    }
}

fn handle_list(conn_mgr: &ConnectionManager, output_format: OutputFormat) -> CliResult<()> {
    debug!("Listing all configured profiles");
    let profiles = conn_mgr.config.list_profiles();
    trace!("Found {} profiles", profiles.len());

    let rows: Vec<Value> = profiles
        .iter()
        .map(|(name, profile)| {
            json!({
                "name": name,
                "default": conn_mgr.config.default_profile.as_deref() == Some(name.as_str()),
                "auth": profile.auth_kind(),
                "auth_url": profile.auth_url,
                "project_id": profile.project_id.clone().unwrap_or_default(),
                "region": profile.region.clone().unwrap_or_default(),
                "read_only": profile.read_only,
            })
        })
        .collect();

    let format = output_format.resolve(output::OutputFormat::Table);
    if rows.is_empty() && format == output::OutputFormat::Table {
        println!("No profiles configured.");
        println!("Create one with: hcsctl profile set <name> --auth-url <url> ...");
        return Ok(());
    }
    output::print_output(rows, format)?;
    Ok(())
}

fn handle_path(conn_mgr: &ConnectionManager, output_format: OutputFormat) -> CliResult<()> {
    let config_path = conn_mgr.config_file()?;

    match output_format {
        OutputFormat::Json | OutputFormat::Yaml => {
            let output_data = json!({ "config_path": config_path.display().to_string() });
            output::print_output(&output_data, output_format.resolve(output::OutputFormat::Json))?;
        }
        _ => {
            println!("{}", config_path.display());
        }
    }
    Ok(())
}

fn handle_show(
    conn_mgr: &ConnectionManager,
    name: Option<&str>,
    output_format: OutputFormat,
) -> CliResult<()> {
    let name = conn_mgr.config.resolve_profile(name)?;
    let profile = conn_mgr.config.profile(&name)?;
    let is_default = conn_mgr.config.default_profile.as_deref() == Some(name.as_str());

    let data = describe(&name, profile, is_default);
    output::print_output(&data, output_format.resolve(output::OutputFormat::Table))?;
    Ok(())
}

/// Profile as shown to the user, secrets masked
fn describe(name: &str, profile: &Profile, is_default: bool) -> Value {
    let mut data = json!({
        "name": name,
        "default": is_default,
        "auth_url": profile.auth_url,
        "auth": profile.auth_kind(),
        "read_only": profile.read_only,
    });

    match &profile.credentials {
        ProfileCredentials::AccessKey {
            access_key,
            secret_key,
        } => {
            data["access_key"] = json!(preview(access_key));
            data["secret_key"] = json!(mask(secret_key));
        }
        ProfileCredentials::Password {
            username,
            password,
            domain,
        } => {
            data["username"] = json!(username);
            data["password"] = json!(mask(password));
            data["domain"] = json!(domain);
        }
    }

    if let Some(project) = &profile.project_id {
        data["project_id"] = json!(project);
    }
    if let Some(domain_id) = &profile.domain_id {
        data["domain_id"] = json!(domain_id);
    }
    if let Some(region) = &profile.region {
        data["region"] = json!(region);
    }
    if !profile.endpoints.is_empty() {
        data["endpoints"] = json!(profile.endpoints);
    }
    if let Some(proxy) = &profile.proxy {
        data["proxy"] = json!(proxy);
    }
    data
}

fn preview(value: &str) -> String {
    if value.starts_with("keyring:") {
        return value.to_string();
    }
    format!("{}...", value.chars().take(8).collect::<String>())
}

fn mask(value: &str) -> String {
    if value.starts_with("keyring:") {
        value.to_string()
    } else {
        "********".to_string()
    }
}

fn handle_set(conn_mgr: &ConnectionManager, args: SetArgs<'_>) -> CliResult<()> {
    debug!("Setting profile: {}", args.name);

    let credentials = match (
        args.access_key,
        args.secret_key,
        args.username,
        args.password,
        args.domain,
    ) {
        (Some(ak), Some(sk), None, None, _) => ProfileCredentials::AccessKey {
            access_key: store_secret(args.use_keyring, args.name, "access-key", ak)?,
            secret_key: store_secret(args.use_keyring, args.name, "secret-key", sk)?,
        },
        (None, None, Some(user), Some(pw), Some(domain)) => ProfileCredentials::Password {
            username: user.to_string(),
            password: store_secret(args.use_keyring, args.name, "password", pw)?,
            domain: domain.to_string(),
        },
        _ => {
            return Err(HcsCtlError::InvalidInput {
                message: "give either --access-key and --secret-key, or --username, --password and --domain"
                    .to_string(),
            });
        }
    };

    let endpoints = parse_endpoints(args.endpoints)?;

    let mut profile = match conn_mgr.config.profiles.get(args.name) {
        // Keep settings the command line cannot express
        Some(existing) => Profile {
            credentials,
            ..existing.clone()
        },
        None => match credentials {
            ProfileCredentials::AccessKey {
                access_key,
                secret_key,
            } => Profile::access_key(args.auth_url, access_key, secret_key),
            ProfileCredentials::Password {
                username,
                password,
                domain,
            } => Profile::password(args.auth_url, username, password, domain),
        },
    };
    profile.auth_url = args.auth_url.to_string();
    profile.read_only = args.read_only;
    if let Some(project) = args.project_id {
        profile.project_id = Some(project.to_string());
    }
    if let Some(domain_id) = args.domain_id {
        profile.domain_id = Some(domain_id.to_string());
    }
    if let Some(region) = args.region {
        profile.region = Some(region.to_string());
    }
    profile.endpoints.extend(endpoints);

    let mut updated = conn_mgr.clone();
    updated.config.set_profile(args.name.to_string(), profile);
    if args.make_default {
        updated.config.default_profile = Some(args.name.to_string());
    }
    updated.save_config()?;

    println!("Profile '{}' saved successfully to:", args.name);
    println!("  {}", updated.config_file()?.display());
    if updated.config.profiles.len() == 1 && updated.config.default_profile.is_none() {
        println!();
        println!("Tip: Set as default with:");
        println!("  hcsctl profile default {}", args.name);
    }
    Ok(())
}

/// Keyring reference when requested, the plain value otherwise
fn store_secret(use_keyring: bool, profile: &str, field: &str, value: &str) -> CliResult<String> {
    Ok(secret_store(use_keyring).store(profile, field, value)?)
}

#[cfg(feature = "secure-storage")]
fn secret_store(use_keyring: bool) -> CredentialStore {
    if use_keyring {
        CredentialStore::keyring()
    } else {
        CredentialStore::inline()
    }
}

#[cfg(not(feature = "secure-storage"))]
fn secret_store(_use_keyring: bool) -> CredentialStore {
    CredentialStore::inline()
}

fn parse_endpoints(entries: &[String]) -> CliResult<HashMap<String, String>> {
    entries
        .iter()
        .map(|entry| match entry.split_once('=') {
            Some((product, url)) if !product.is_empty() && !url.is_empty() => {
                Ok((product.to_lowercase(), url.to_string()))
            }
            _ => Err(HcsCtlError::InvalidInput {
                message: format!("endpoint '{}' is not product=url", entry),
            }),
        })
        .collect()
}

fn handle_remove(conn_mgr: &ConnectionManager, name: &str) -> CliResult<()> {
    debug!("Removing profile: {}", name);

    let Some(profile) = conn_mgr.config.profiles.get(name) else {
        return Err(HcsCtlError::ProfileNotFound { name: name.into() });
    };
    let keyring_refs: Vec<String> = profile
        .secret_fields()
        .into_iter()
        .filter(|value| SecretRef::parse(value).is_keyring())
        .map(str::to_string)
        .collect();

    let mut updated = conn_mgr.clone();
    let was_default = updated.config.default_profile.as_deref() == Some(name);
    updated.config.remove_profile(name);
    updated.save_config()?;

    let store = CredentialStore::default();
    for reference in &keyring_refs {
        if let Err(e) = store.forget(reference) {
            warn!("Could not remove {} from the keyring: {}", reference, e);
        }
    }

    if was_default {
        println!("Default profile cleared.");
    }
    println!("Profile '{}' removed successfully.", name);
    Ok(())
}

fn handle_default(conn_mgr: &ConnectionManager, name: &str) -> CliResult<()> {
    debug!("Setting default profile: {}", name);

    if !conn_mgr.config.profiles.contains_key(name) {
        return Err(HcsCtlError::ProfileNotFound { name: name.into() });
    }

    let mut updated = conn_mgr.clone();
    updated.config.default_profile = Some(name.to_string());
    updated.save_config()?;

    println!("Default profile set to '{}'.", name);
    Ok(())
}
