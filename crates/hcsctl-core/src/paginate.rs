//! Transparent pagination
//!
//! A [`Paginator`] drives one list endpoint until it is exhausted and returns
//! every item in server order. Any failing page aborts the whole listing.
//!
//! Stop rules, in order:
//! - the body reports a total (`count`, `total`, `total_count`) and that many
//!   items have been collected
//! - the page is empty
//! - offset and page-number styles: the page is shorter than the page size
//! - marker style: no next marker
//!
//! A marker that was already sent in the same listing is a protocol error.

use async_trait::async_trait;
use serde_json::Value;
use std::collections::HashSet;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::endpoint::PageStyle;
use crate::error::{CoreError, Result};
use crate::request::ApiRequest;

/// Fields that carry paging metadata rather than items
const PAGING_FIELDS: &[&str] = &["links", "page_info"];

/// Where a next marker may be found, as JSON pointers
const MARKER_POINTERS: &[&str] = &[
    "/next_marker",
    "/nextMarker",
    "/marker",
    "/page_info/next_marker",
];

const TOTAL_FIELDS: &[&str] = &["count", "total", "total_count"];

/// Upper bound on pages per listing, catches servers that ignore the cursor
const MAX_PAGES: usize = 10_000;

/// Anything that can fetch one page of JSON
#[async_trait]
pub trait PageSource: Send + Sync {
    async fn fetch_page(&self, request: &ApiRequest, cancel: &CancellationToken) -> Result<Value>;
}

/// Position within a listing
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Cursor {
    Start,
    Offset(u64),
    Page(u64),
    Marker(String),
}

/// Paging state for one listing
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageState {
    pub style: PageStyle,
    pub cursor: Cursor,
    pub page_size: u32,
}

impl PageState {
    /// Initial state, honouring a cursor the caller already put in the query
    pub fn start(style: PageStyle, page_size: u32, request: &ApiRequest) -> Self {
        let cursor = match style {
            PageStyle::OffsetLimit => Cursor::Offset(
                request
                    .query_value("offset")
                    .and_then(|v| v.parse().ok())
                    .unwrap_or(0),
            ),
            PageStyle::PageNumber => Cursor::Page(
                request
                    .query_value("offset")
                    .and_then(|v| v.parse().ok())
                    .filter(|p| *p > 0)
                    .unwrap_or(1),
            ),
            PageStyle::Marker => match request.query_value("marker") {
                Some(marker) if !marker.is_empty() => Cursor::Marker(marker.to_string()),
                _ => Cursor::Start,
            },
            PageStyle::Single => Cursor::Start,
        };
        let page_size = request
            .query_value("limit")
            .and_then(|v| v.parse().ok())
            .unwrap_or(page_size);
        Self {
            style,
            cursor,
            page_size,
        }
    }

    /// Write the cursor and page size into the request query
    pub fn apply(&self, request: &mut ApiRequest) {
        if self.style == PageStyle::Single {
            return;
        }
        if self.page_size > 0 {
            request.set_query("limit", self.page_size);
        }
        match &self.cursor {
            Cursor::Start => request.remove_query("marker"),
            Cursor::Offset(offset) | Cursor::Page(offset) => request.set_query("offset", offset),
            Cursor::Marker(marker) => request.set_query("marker", marker),
        }
    }
}

/// Drives a [`PageSource`] through every page of a listing
pub struct Paginator<'a, S: PageSource + ?Sized> {
    source: &'a S,
    style: PageStyle,
    page_size: u32,
    items_key: Option<String>,
}

impl<'a, S: PageSource + ?Sized> Paginator<'a, S> {
    pub fn new(source: &'a S, style: PageStyle, page_size: u32) -> Self {
        Self {
            source,
            style,
            page_size,
            items_key: None,
        }
    }

    /// Take items from this top-level field instead of guessing
    pub fn items_key(mut self, key: impl Into<String>) -> Self {
        self.items_key = Some(key.into());
        self
    }

    /// Fetch every page and concatenate the items
    pub async fn collect(
        &self,
        request: &ApiRequest,
        cancel: &CancellationToken,
    ) -> Result<Vec<Value>> {
        let mut state = PageState::start(self.style, self.page_size, request);
        let mut request = request.clone();
        let mut items = Vec::new();
        let mut seen_markers = HashSet::new();
        if let Cursor::Marker(marker) = &state.cursor {
            seen_markers.insert(marker.clone());
        }

        for page_no in 1..=MAX_PAGES {
            state.apply(&mut request);
            let page = self.source.fetch_page(&request, cancel).await?;
            let page_items = extract_items(&page, self.items_key.as_deref());
            let fetched = page_items.len();
            items.extend(page_items);

            debug!(
                product = %request.product,
                resource = %request.resource,
                page = page_no,
                fetched,
                collected = items.len(),
                "Fetched page"
            );

            if let Some(total) = extract_total(&page)
                && items.len() as u64 >= total
            {
                return Ok(items);
            }
            if fetched == 0 {
                return Ok(items);
            }

            let short_page = (fetched as u64) < u64::from(state.page_size);
            state.cursor = match (&state.cursor, state.style) {
                (_, PageStyle::Single) => return Ok(items),
                (Cursor::Offset(offset), PageStyle::OffsetLimit) => {
                    if short_page {
                        return Ok(items);
                    }
                    Cursor::Offset(offset + fetched as u64)
                }
                (Cursor::Page(page), PageStyle::PageNumber) => {
                    if short_page {
                        return Ok(items);
                    }
                    Cursor::Page(page + 1)
                }
                (_, PageStyle::Marker) => match extract_marker(&page) {
                    None => return Ok(items),
                    Some(marker) => {
                        if !seen_markers.insert(marker.clone()) {
                            return Err(CoreError::Protocol {
                                product: request.product.clone(),
                                message: format!(
                                    "listing {} returned marker '{}' twice",
                                    request.resource, marker
                                ),
                            });
                        }
                        Cursor::Marker(marker)
                    }
                },
                (cursor, style) => {
                    return Err(CoreError::Protocol {
                        product: request.product.clone(),
                        message: format!("cursor {:?} does not fit {} paging", cursor, style),
                    });
                }
            };
        }

        Err(CoreError::Protocol {
            product: request.product.clone(),
            message: format!(
                "listing {} did not end after {} pages",
                request.resource, MAX_PAGES
            ),
        })
    }
}

/// Items of one page: the named field, a bare array, or the first array field
/// that is not paging metadata
pub fn extract_items(page: &Value, items_key: Option<&str>) -> Vec<Value> {
    let array = match (page, items_key) {
        (Value::Array(items), _) => Some(items),
        (Value::Object(map), Some(key)) => map.get(key).and_then(Value::as_array),
        (Value::Object(map), None) => map
            .iter()
            .filter(|(k, _)| !PAGING_FIELDS.contains(&k.as_str()))
            .find_map(|(_, v)| v.as_array()),
        _ => None,
    };
    array.cloned().unwrap_or_default()
}

/// Total item count reported by the server, if any
pub fn extract_total(page: &Value) -> Option<u64> {
    TOTAL_FIELDS.iter().find_map(|field| match page.get(field)? {
        Value::Number(n) => n.as_u64(),
        Value::String(s) => s.parse().ok(),
        _ => None,
    })
}

/// Next marker, or `None` when the listing is done
pub fn extract_marker(page: &Value) -> Option<String> {
    let direct = MARKER_POINTERS
        .iter()
        .find_map(|pointer| page.pointer(pointer).and_then(Value::as_str));
    let marker = direct.map(str::to_string).or_else(|| next_link_marker(page))?;
    (!marker.is_empty()).then_some(marker)
}

/// Marker carried in the query of a `links` next URL
fn next_link_marker(page: &Value) -> Option<String> {
    let links = page.get("links")?;
    let href = match links {
        Value::Object(map) => map.get("next").and_then(Value::as_str),
        Value::Array(list) => list
            .iter()
            .find(|l| l.get("rel").and_then(Value::as_str) == Some("next"))
            .and_then(|l| l.get("href"))
            .and_then(Value::as_str),
        _ => None,
    }?;
    let url = url::Url::parse(href).ok()?;
    url.query_pairs()
        .find(|(k, _)| k == "marker")
        .map(|(_, v)| v.into_owned())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_extract_items() {
        let page = json!({"links": [{"rel": "next"}], "servers": [{"id": "a"}], "count": 1});
        assert_eq!(extract_items(&page, None), vec![json!({"id": "a"})]);
        assert_eq!(extract_items(&page, Some("volumes")), Vec::<Value>::new());
        assert_eq!(extract_items(&json!([1, 2]), None), vec![json!(1), json!(2)]);
    }

    #[test]
    fn test_extract_total() {
        assert_eq!(extract_total(&json!({"count": 7})), Some(7));
        assert_eq!(extract_total(&json!({"total_count": "12"})), Some(12));
        assert_eq!(extract_total(&json!({"servers": []})), None);
    }

    #[test]
    fn test_extract_marker() {
        assert_eq!(extract_marker(&json!({"next_marker": "m1"})), Some("m1".to_string()));
        assert_eq!(
            extract_marker(&json!({"page_info": {"next_marker": "m2"}})),
            Some("m2".to_string())
        );
        assert_eq!(extract_marker(&json!({"next_marker": ""})), None);
        assert_eq!(extract_marker(&json!({"vpcs": []})), None);
        assert_eq!(
            extract_marker(&json!({"links": {"next": "https://vpc.r.example.com/v1/p/vpcs?limit=2&marker=m3"}})),
            Some("m3".to_string())
        );
    }

    #[test]
    fn test_page_state_respects_caller_query() {
        let req = ApiRequest::get("evs", "cloudvolumes")
            .query("offset", 100)
            .query("limit", 10);
        let state = PageState::start(PageStyle::OffsetLimit, 50, &req);
        assert_eq!(state.cursor, Cursor::Offset(100));
        assert_eq!(state.page_size, 10);

        let state = PageState::start(PageStyle::PageNumber, 50, &ApiRequest::get("ecs", "x"));
        assert_eq!(state.cursor, Cursor::Page(1));
    }

    #[test]
    fn test_single_style_leaves_query_alone() {
        let mut req = ApiRequest::get("iam", "regions");
        PageState::start(PageStyle::Single, 0, &req).apply(&mut req);
        assert!(req.query.is_empty());
    }
}
