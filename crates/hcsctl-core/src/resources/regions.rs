//! Regions known to the stack's identity service

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::debug;

use crate::client::HcsClient;
use crate::endpoint::PageStyle;
use crate::error::{CoreError, Result};
use crate::paginate::Paginator;
use crate::request::ApiRequest;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Region {
    pub id: String,
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub region_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent_region_id: Option<String>,
    /// locale -> display name
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub locales: BTreeMap<String, String>,
}

impl Region {
    /// English display name, falling back to the id
    pub fn display_name(&self) -> &str {
        self.locales
            .get("en-us")
            .or_else(|| self.locales.values().next())
            .map(String::as_str)
            .unwrap_or(&self.id)
    }
}

impl HcsClient {
    /// Regions of the stack, fetched once per client
    pub async fn regions(&self) -> Result<Vec<Region>> {
        if let Some(regions) = self.regions_cache().read().await.as_ref() {
            return Ok(regions.clone());
        }
        let mut cache = self.regions_cache().write().await;
        if let Some(regions) = cache.as_ref() {
            return Ok(regions.clone());
        }
        let regions = self.fetch_regions().await?;
        debug!(count = regions.len(), "Cached region list");
        *cache = Some(regions.clone());
        Ok(regions)
    }

    /// Drop the cached list and fetch it again
    pub async fn refresh_regions(&self) -> Result<Vec<Region>> {
        let regions = self.fetch_regions().await?;
        *self.regions_cache().write().await = Some(regions.clone());
        Ok(regions)
    }

    async fn fetch_regions(&self) -> Result<Vec<Region>> {
        let items = Paginator::new(self, PageStyle::Single, 0)
            .items_key("regions")
            .collect(&ApiRequest::get("iam", "regions"), self.cancellation_token())
            .await?;
        items
            .into_iter()
            .map(|item| serde_json::from_value(item).map_err(CoreError::from))
            .collect()
    }

    /// Region to use for a call: the explicit one, the profile default, or
    /// the last region the stack lists
    pub async fn effective_region(&self, explicit: Option<&str>) -> Result<String> {
        if let Some(region) = explicit.or(self.default_region()) {
            return Ok(region.to_string());
        }
        self.regions()
            .await?
            .last()
            .map(|r| r.id.clone())
            .ok_or_else(|| {
                CoreError::Configuration(
                    "no region configured and the stack lists none".to_string(),
                )
            })
    }
}
