//! Listing behaviour against a mock vendor endpoint

use hcsctl_core::config::RetryConfig;
use hcsctl_core::{ApiRequest, CoreError, Credentials, HcsClient, PageStyle};
use pretty_assertions::assert_eq;
use serde_json::{Value, json};
use wiremock::matchers::{header, header_exists, method, path, query_param, query_param_is_missing};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn client(server: &MockServer) -> HcsClient {
    let credentials = Credentials::access_key("AKTEST", "SKTEST", "hcs.example.com")
        .unwrap()
        .with_project("proj");
    let mut builder = HcsClient::builder(credentials)
        .region("region-1")
        .retry(RetryConfig {
            max_attempts: 3,
            backoff_ms: 1,
            max_backoff_ms: 5,
        });
    for product in ["ecs", "evs", "vpc", "iam"] {
        builder = builder.endpoint(product, server.uri());
    }
    builder.build().unwrap()
}

fn named(prefix: &str, count: usize) -> Vec<Value> {
    (0..count)
        .map(|i| json!({"id": format!("{}-{}", prefix, i)}))
        .collect()
}

// ---------------------------------------------------------------------------
// Marker style
// ---------------------------------------------------------------------------

#[tokio::test]
async fn marker_listing_follows_next_marker_until_empty() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/v1/proj/vpcs"))
        .and(query_param_is_missing("marker"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "vpcs": [{"id": "A"}, {"id": "B"}],
            "next_marker": "m1"
        })))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/v1/proj/vpcs"))
        .and(query_param("marker", "m1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "vpcs": [{"id": "C"}],
            "next_marker": ""
        })))
        .expect(1)
        .mount(&server)
        .await;

    let items = client(&server)
        .list(&ApiRequest::get("vpc", "vpcs"), None)
        .await
        .unwrap();

    let ids: Vec<&str> = items.iter().filter_map(|v| v["id"].as_str()).collect();
    assert_eq!(ids, vec!["A", "B", "C"]);
    assert_eq!(server.received_requests().await.unwrap().len(), 2);
}

#[tokio::test]
async fn repeated_marker_is_a_protocol_error() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/v1/proj/vpcs"))
        .and(query_param_is_missing("marker"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(json!({"vpcs": [{"id": "A"}], "next_marker": "m1"})),
        )
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/v1/proj/vpcs"))
        .and(query_param("marker", "m1"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(json!({"vpcs": [{"id": "B"}], "next_marker": "m1"})),
        )
        .expect(1)
        .mount(&server)
        .await;

    let err = client(&server)
        .list(&ApiRequest::get("vpc", "vpcs"), Some("vpcs"))
        .await
        .unwrap_err();

    assert!(matches!(err, CoreError::Protocol { .. }), "got {:?}", err);
}

#[tokio::test]
async fn typed_vpc_listing() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/v1/proj/vpcs"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "vpcs": [{"id": "vpc-1", "name": "prod", "cidr": "10.0.0.0/16", "status": "OK"}]
        })))
        .mount(&server)
        .await;

    let vpcs = client(&server).list_vpcs(None).await.unwrap();
    assert_eq!(vpcs.len(), 1);
    assert_eq!(vpcs[0].cidr, "10.0.0.0/16");
}

// ---------------------------------------------------------------------------
// Offset style
// ---------------------------------------------------------------------------

#[tokio::test]
async fn offset_listing_stops_on_short_page() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/v2/proj/cloudvolumes/detail"))
        .and(query_param("offset", "0"))
        .and(query_param("limit", "50"))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(json!({"volumes": named("vol", 50)})),
        )
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/v2/proj/cloudvolumes/detail"))
        .and(query_param("offset", "50"))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(json!({"volumes": named("late", 10)})),
        )
        .expect(1)
        .mount(&server)
        .await;

    let volumes = client(&server).list_volumes(None).await.unwrap();

    assert_eq!(volumes.len(), 60);
    assert_eq!(volumes[0].id, "vol-0");
    assert_eq!(volumes[59].id, "late-9");
    assert_eq!(server.received_requests().await.unwrap().len(), 2);
}

#[tokio::test]
async fn reported_total_ends_listing() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/v2/proj/cloudvolumes/detail"))
        .and(query_param("offset", "0"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(json!({"volumes": named("a", 2), "count": 4})),
        )
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/v2/proj/cloudvolumes/detail"))
        .and(query_param("offset", "2"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(json!({"volumes": named("b", 2), "count": 4})),
        )
        .mount(&server)
        .await;

    let request = ApiRequest::get("evs", "cloudvolumes/detail").query("limit", 2);
    let items = client(&server).list(&request, Some("volumes")).await.unwrap();

    assert_eq!(items.len(), 4);
    assert_eq!(server.received_requests().await.unwrap().len(), 2);
}

#[tokio::test]
async fn failing_page_discards_partial_results() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/v2/proj/cloudvolumes/detail"))
        .and(query_param("offset", "0"))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(json!({"volumes": named("a", 50)})),
        )
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/v2/proj/cloudvolumes/detail"))
        .and(query_param("offset", "50"))
        .respond_with(ResponseTemplate::new(400).set_body_json(json!({
            "error": {"code": "EVS.0001", "message": "bad offset"}
        })))
        .mount(&server)
        .await;

    let err = client(&server).list_volumes(None).await.unwrap_err();
    match err {
        CoreError::Api { classification, .. } => {
            assert_eq!(classification.http_status, 400);
            assert_eq!(classification.vendor_code.as_deref(), Some("EVS.0001"));
        }
        other => panic!("expected Api error, got {:?}", other),
    }
}

// ---------------------------------------------------------------------------
// Page-number style
// ---------------------------------------------------------------------------

#[tokio::test]
async fn page_number_listing_of_servers() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/v1/proj/cloudservers/detail"))
        .and(query_param("offset", "1"))
        .and(query_param("limit", "50"))
        .and(header("x-project-id", "proj"))
        .and(header_exists("authorization"))
        .and(header_exists("x-sdk-date"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(json!({"servers": named("srv", 50), "count": 53})),
        )
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/v1/proj/cloudservers/detail"))
        .and(query_param("offset", "2"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(json!({"servers": named("more", 3), "count": 53})),
        )
        .expect(1)
        .mount(&server)
        .await;

    let servers = client(&server).list_servers(None).await.unwrap();
    assert_eq!(servers.len(), 53);
    assert_eq!(servers[52].id, "more-2");
}

#[tokio::test]
async fn profile_pagination_override_changes_style() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/v1/proj/vpcs"))
        .and(query_param("offset", "0"))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(json!({"vpcs": named("v", 3)})),
        )
        .expect(1)
        .mount(&server)
        .await;

    let credentials = Credentials::access_key("AKTEST", "SKTEST", "hcs.example.com")
        .unwrap()
        .with_project("proj");
    let client = HcsClient::builder(credentials)
        .region("region-1")
        .endpoint("vpc", server.uri())
        .pagination("vpc", PageStyle::OffsetLimit)
        .build()
        .unwrap();

    let vpcs = client.list_vpcs(None).await.unwrap();
    assert_eq!(vpcs.len(), 3);
}

// ---------------------------------------------------------------------------
// Single style
// ---------------------------------------------------------------------------

#[tokio::test]
async fn regions_are_fetched_once_without_project_header() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/v3/regions"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "regions": [
                {"id": "region-1", "locales": {"en-us": "Region One"}},
                {"id": "region-2"}
            ],
            "links": {"self": "https://iam.example.com/v3/regions"}
        })))
        .expect(1)
        .mount(&server)
        .await;

    let client = client(&server);
    let first = client.regions().await.unwrap();
    let second = client.regions().await.unwrap();

    assert_eq!(first, second);
    assert_eq!(first.len(), 2);
    assert_eq!(first[0].display_name(), "Region One");

    let requests = server.received_requests().await.unwrap();
    assert_eq!(requests.len(), 1);
    assert!(requests[0].headers.get("x-project-id").is_none());
    assert!(requests[0].url.query().is_none());
}
