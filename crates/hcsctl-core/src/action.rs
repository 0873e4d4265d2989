//! Typed vendor actions
//!
//! Each variant carries exactly the fields its vendor call needs. Calls with
//! no dedicated variant go through [`Action::Raw`].

use reqwest::Method;
use serde_json::{Value, json};
use std::time::Duration;

use crate::error::{CoreError, Result};
use crate::job::JobPoller;
use crate::request::ApiRequest;

/// How a server is stopped or rebooted
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum StopMode {
    #[default]
    Soft,
    Hard,
}

impl StopMode {
    pub fn from_force(force: bool) -> Self {
        if force { StopMode::Hard } else { StopMode::Soft }
    }

    fn as_vendor(&self) -> &'static str {
        match self {
            StopMode::Soft => "SOFT",
            StopMode::Hard => "HARD",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Action {
    StartServers {
        server_ids: Vec<String>,
    },
    StopServers {
        server_ids: Vec<String>,
        mode: StopMode,
    },
    RebootServers {
        server_ids: Vec<String>,
        mode: StopMode,
    },
    ResizeServer {
        server_id: String,
        flavor_ref: String,
    },
    AttachVolume {
        server_id: String,
        volume_id: String,
        /// e.g. `/dev/vdb`; the stack picks one when absent
        device: Option<String>,
    },
    DetachVolume {
        server_id: String,
        volume_id: String,
    },
    /// Any other call, payload passed through untouched
    Raw {
        product: String,
        version: Option<String>,
        method: Method,
        resource: String,
        payload: Option<Value>,
    },
}

impl Action {
    /// Short name for logs and errors
    pub fn name(&self) -> &'static str {
        match self {
            Action::StartServers { .. } => "start-servers",
            Action::StopServers { .. } => "stop-servers",
            Action::RebootServers { .. } => "reboot-servers",
            Action::ResizeServer { .. } => "resize-server",
            Action::AttachVolume { .. } => "attach-volume",
            Action::DetachVolume { .. } => "detach-volume",
            Action::Raw { .. } => "raw",
        }
    }

    pub fn product(&self) -> &str {
        match self {
            Action::Raw { product, .. } => product,
            _ => "ecs",
        }
    }

    /// Poll interval and timeout for this action's job, when it differs from
    /// the client default
    pub fn poll_ceiling(&self) -> Option<(Duration, Duration)> {
        match self {
            Action::AttachVolume { .. } | Action::DetachVolume { .. } => {
                Some((JobPoller::ATTACH_INTERVAL, JobPoller::ATTACH_TIMEOUT))
            }
            _ => None,
        }
    }

    pub fn to_request(&self) -> Result<ApiRequest> {
        let request = match self {
            Action::StartServers { server_ids } => batch(
                self.name(),
                server_ids,
                |servers| json!({"os-start": {"servers": servers}}),
            )?,
            Action::StopServers { server_ids, mode } => batch(self.name(), server_ids, |servers| {
                json!({"os-stop": {"type": mode.as_vendor(), "servers": servers}})
            })?,
            Action::RebootServers { server_ids, mode } => {
                batch(self.name(), server_ids, |servers| {
                    json!({"reboot": {"type": mode.as_vendor(), "servers": servers}})
                })?
            }
            Action::ResizeServer {
                server_id,
                flavor_ref,
            } => {
                require(self.name(), "server id", server_id)?;
                require(self.name(), "flavor", flavor_ref)?;
                ApiRequest::post("ecs", format!("cloudservers/{}/resize", server_id))
                    .version("v1.1")
                    .json(json!({"resize": {"flavorRef": flavor_ref}}))
            }
            Action::AttachVolume {
                server_id,
                volume_id,
                device,
            } => {
                require(self.name(), "server id", server_id)?;
                require(self.name(), "volume id", volume_id)?;
                let mut attachment = json!({"volumeId": volume_id});
                if let Some(device) = device {
                    attachment["device"] = json!(device);
                }
                ApiRequest::post("ecs", format!("cloudservers/{}/attachvolume", server_id))
                    .version("v1")
                    .json(json!({"volumeAttachment": attachment}))
            }
            Action::DetachVolume {
                server_id,
                volume_id,
            } => {
                require(self.name(), "server id", server_id)?;
                require(self.name(), "volume id", volume_id)?;
                ApiRequest::delete(
                    "ecs",
                    format!("cloudservers/{}/detachvolume/{}", server_id, volume_id),
                )
                .version("v1")
            }
            Action::Raw {
                product,
                version,
                method,
                resource,
                payload,
            } => {
                require(self.name(), "product", product)?;
                let mut request = ApiRequest::new(method.clone(), product, resource);
                if let Some(version) = version {
                    request = request.version(version);
                }
                if let Some(payload) = payload {
                    request = request.json(payload.clone());
                }
                request
            }
        };
        Ok(request)
    }
}

fn batch(action: &str, server_ids: &[String], body: impl Fn(Value) -> Value) -> Result<ApiRequest> {
    if server_ids.is_empty() {
        return Err(CoreError::Configuration(format!(
            "{} needs at least one server id",
            action
        )));
    }
    for id in server_ids {
        require(action, "server id", id)?;
    }
    let servers: Vec<Value> = server_ids.iter().map(|id| json!({"id": id})).collect();
    Ok(ApiRequest::post("ecs", "cloudservers/action")
        .version("v1")
        .json(body(Value::Array(servers))))
}

fn require(action: &str, field: &str, value: &str) -> Result<()> {
    if value.trim().is_empty() {
        return Err(CoreError::Configuration(format!(
            "{} needs a non-empty {}",
            action, field
        )));
    }
    Ok(())
}
