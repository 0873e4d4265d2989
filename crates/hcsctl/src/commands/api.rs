//! Raw API access commands for direct REST endpoint calls

use crate::cli::{HttpMethod, OutputFormat};
use crate::error::{HcsCtlError, Result as CliResult};
use crate::output::{self, print_output};
use anyhow::Context;
use hcsctl_core::{ApiRequest, Call, HcsClient, Payload};
use serde_json::Value;
use tracing::debug;

/// Parameters for API command execution
pub struct ApiCommandParams<'a> {
    pub product: &'a str,
    pub method: HttpMethod,
    pub path: &'a str,
    pub data: Option<&'a str>,
    pub params: &'a [String],
    pub all: bool,
    pub items_key: Option<&'a str>,
    pub wait: bool,
    pub api_version: Option<&'a str>,
    pub region: Option<&'a str>,
    pub output_format: OutputFormat,
}

/// Handle raw API commands
pub async fn handle_api_command(client: &HcsClient, params: ApiCommandParams<'_>) -> CliResult<()> {
    let call = build_call(&params)?;
    debug!(
        "Dispatching {} {} {}",
        params.product, params.method, params.path
    );

    let payload = client.dispatch(call).await?;
    let auto = match payload {
        Payload::Collection(_) => output::OutputFormat::Table,
        Payload::Object(_) | Payload::Job(_) => output::OutputFormat::Json,
    };
    print_output(payload.into_value(), params.output_format.resolve(auto))?;
    Ok(())
}

fn build_call(params: &ApiCommandParams<'_>) -> CliResult<Call> {
    let mut request = ApiRequest::new(params.method.into(), params.product, params.path)
        .maybe_region(params.region);
    if let Some(version) = params.api_version {
        request = request.version(version);
    }
    for param in params.params {
        let (key, value) = parse_param(param)?;
        request = request.query(key, value);
    }
    if let Some(data) = params.data {
        request = request.json(parse_body(data)?);
    }

    let call = if params.all {
        Call::collection(request, params.items_key.map(String::from))
    } else {
        Call::object(request)
    };
    Ok(if params.wait { call.wait() } else { call })
}

fn parse_param(param: &str) -> CliResult<(&str, &str)> {
    match param.split_once('=') {
        Some((key, value)) if !key.is_empty() => Ok((key, value)),
        _ => Err(HcsCtlError::InvalidInput {
            message: format!("query parameter '{}' is not key=value", param),
        }),
    }
}

/// JSON body from a string or `@file`
pub fn parse_body(data: &str) -> CliResult<Value> {
    if let Some(file_path) = data.strip_prefix('@') {
        let content = std::fs::read_to_string(file_path).map_err(|e| HcsCtlError::FileError {
            path: file_path.to_string(),
            message: e.to_string(),
        })?;
        let value = serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse JSON from file: {}", file_path))
            .map_err(|e| HcsCtlError::InvalidInput {
                message: format!("{:#}", e),
            })?;
        Ok(value)
    } else {
        serde_json::from_str(data).map_err(|e| HcsCtlError::InvalidInput {
            message: format!("Failed to parse JSON from data parameter: {}", e),
        })
    }
}
