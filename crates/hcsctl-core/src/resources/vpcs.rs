//! Virtual private clouds and their subnets

use serde::{Deserialize, Serialize};

use crate::client::HcsClient;
use crate::error::{Result, ResultExt};
use crate::request::ApiRequest;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Vpc {
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub cidr: String,
    #[serde(default)]
    pub status: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Subnet {
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub cidr: String,
    #[serde(default)]
    pub gateway_ip: String,
    #[serde(default)]
    pub vpc_id: String,
    #[serde(default)]
    pub status: String,
}

impl HcsClient {
    pub async fn list_vpcs(&self, region: Option<&str>) -> Result<Vec<Vpc>> {
        let request = ApiRequest::get("vpc", "vpcs").maybe_region(region);
        self.list_as(&request, Some("vpcs")).await
    }

    pub async fn find_vpc(&self, region: Option<&str>, id: &str) -> Result<Option<Vpc>> {
        let request = ApiRequest::get("vpc", format!("vpcs/{}", id)).maybe_region(region);
        self.get_as(&request).await.ignore_not_found()
    }

    /// Subnets, optionally only those of one VPC
    pub async fn list_subnets(
        &self,
        region: Option<&str>,
        vpc_id: Option<&str>,
    ) -> Result<Vec<Subnet>> {
        let mut request = ApiRequest::get("vpc", "subnets").maybe_region(region);
        if let Some(vpc_id) = vpc_id {
            request = request.query("vpc_id", vpc_id);
        }
        self.list_as(&request, Some("subnets")).await
    }
}
