//! Elastic cloud servers

use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use std::collections::HashMap;

use crate::client::HcsClient;
use crate::error::{Result, ResultExt};
use crate::request::ApiRequest;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Server {
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub status: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub flavor: Option<Flavor>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created: Option<String>,
    #[serde(default, skip_serializing_if = "Value::is_null")]
    pub addresses: Value,
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub metadata: HashMap<String, String>,
    #[serde(
        rename = "OS-EXT-AZ:availability_zone",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub availability_zone: Option<String>,
    #[serde(
        rename = "os-extended-volumes:volumes_attached",
        default,
        skip_serializing_if = "Vec::is_empty"
    )]
    pub volumes_attached: Vec<AttachedVolume>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Flavor {
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttachedVolume {
    pub id: String,
}

impl HcsClient {
    pub async fn list_servers(&self, region: Option<&str>) -> Result<Vec<Server>> {
        let request = ApiRequest::get("ecs", "cloudservers/detail")
            .version("v1")
            .maybe_region(region);
        self.list_as(&request, Some("servers")).await
    }

    pub async fn get_server(&self, region: Option<&str>, id: &str) -> Result<Server> {
        let request = ApiRequest::get("ecs", format!("cloudservers/{}", id))
            .version("v1")
            .maybe_region(region);
        self.get_as(&request).await
    }

    /// `None` when the server does not exist
    pub async fn find_server(&self, region: Option<&str>, id: &str) -> Result<Option<Server>> {
        self.get_server(region, id).await.ignore_not_found()
    }

    /// Delete servers, waiting for the job. Public IPs and data volumes are
    /// kept unless `delete_volumes` is set.
    pub async fn delete_servers(
        &self,
        region: Option<&str>,
        ids: &[String],
        delete_volumes: bool,
    ) -> Result<Value> {
        let servers: Vec<Value> = ids.iter().map(|id| json!({"id": id})).collect();
        let request = ApiRequest::post("ecs", "cloudservers/delete")
            .version("v1")
            .maybe_region(region)
            .json(json!({
                "servers": servers,
                "delete_publicip": false,
                "delete_volume": delete_volumes,
            }));
        self.create(&request).await
    }
}
