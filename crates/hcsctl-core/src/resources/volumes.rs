//! Elastic volumes

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::action::Action;
use crate::client::HcsClient;
use crate::error::{Result, ResultExt};
use crate::request::ApiRequest;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Volume {
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub status: String,
    /// GiB
    #[serde(default)]
    pub size: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub volume_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub availability_zone: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub attachments: Vec<VolumeAttachment>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VolumeAttachment {
    pub server_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub device: Option<String>,
}

impl HcsClient {
    pub async fn list_volumes(&self, region: Option<&str>) -> Result<Vec<Volume>> {
        let request = ApiRequest::get("evs", "cloudvolumes/detail").maybe_region(region);
        self.list_as(&request, Some("volumes")).await
    }

    pub async fn find_volume(&self, region: Option<&str>, id: &str) -> Result<Option<Volume>> {
        let request =
            ApiRequest::get("evs", format!("cloudvolumes/{}", id)).maybe_region(region);
        self.get_as(&request).await.ignore_not_found()
    }

    /// Attach and wait for the attach job
    pub async fn attach_volume(
        &self,
        region: Option<&str>,
        server_id: &str,
        volume_id: &str,
        device: Option<&str>,
    ) -> Result<Value> {
        let action = Action::AttachVolume {
            server_id: server_id.to_string(),
            volume_id: volume_id.to_string(),
            device: device.map(str::to_string),
        };
        self.perform(&action, region).await
    }

    pub async fn detach_volume(
        &self,
        region: Option<&str>,
        server_id: &str,
        volume_id: &str,
    ) -> Result<Value> {
        let action = Action::DetachVolume {
            server_id: server_id.to_string(),
            volume_id: volume_id.to_string(),
        };
        self.perform(&action, region).await
    }
}
