//! Transport, authentication and job behaviour through `HcsClient`

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use hcsctl_core::config::{PollConfig, RetryConfig};
use hcsctl_core::{
    Action, ApiRequest, Call, CoreError, Credentials, HcsClient, HcsClientBuilder, JobStatus,
    JobStatusCheck, Payload, StopMode,
};
use reqwest::Method;
use serde_json::json;
use tokio_util::sync::CancellationToken;
use wiremock::matchers::{body_partial_json, header, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn fast_retry() -> RetryConfig {
    RetryConfig {
        max_attempts: 3,
        backoff_ms: 1,
        max_backoff_ms: 5,
    }
}

fn builder(server: &MockServer, credentials: Credentials) -> HcsClientBuilder {
    let mut builder = HcsClient::builder(credentials.with_project("proj"))
        .region("region-1")
        .retry(fast_retry())
        .poll(PollConfig {
            interval_secs: 0,
            timeout_secs: 60,
        });
    for product in ["ecs", "evs", "rds", "iam"] {
        builder = builder.endpoint(product, server.uri());
    }
    builder
}

fn ak_client(server: &MockServer) -> HcsClient {
    let credentials = Credentials::access_key("AKTEST", "SKTEST", "hcs.example.com").unwrap();
    builder(server, credentials).build().unwrap()
}

fn token_client(server: &MockServer) -> HcsClient {
    let credentials = Credentials::password("admin", "secret", "corp", "hcs.example.com").unwrap();
    builder(server, credentials).build().unwrap()
}

async fn mount_token(server: &MockServer, expected_fetches: u64) {
    Mock::given(method("POST"))
        .and(path("/v3/auth/tokens"))
        .and(body_partial_json(json!({"auth": {"scope": {"project": {"id": "proj"}}}})))
        .respond_with(
            ResponseTemplate::new(201)
                .insert_header("X-Subject-Token", "tok-1")
                .set_body_json(json!({"token": {"expires_at": "2999-01-01T00:00:00Z"}})),
        )
        .expect(expected_fetches)
        .mount(server)
        .await;
}

// ---------------------------------------------------------------------------
// Read-only guard
// ---------------------------------------------------------------------------

#[tokio::test]
async fn read_only_client_rejects_mutations_locally() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/v1/proj/cloudservers/srv-1"))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(json!({"server": {"id": "srv-1"}})),
        )
        .mount(&server)
        .await;

    let credentials = Credentials::access_key("AKTEST", "SKTEST", "hcs.example.com").unwrap();
    let client = builder(&server, credentials).read_only(true).build().unwrap();

    for verb in [Method::POST, Method::PUT, Method::PATCH, Method::DELETE] {
        let request = ApiRequest::new(verb.clone(), "ecs", "cloudservers/srv-1").version("v1");
        let err = client.request(&request).await.unwrap_err();
        assert!(
            matches!(err, CoreError::ReadOnlyViolation { method: ref refused, .. } if refused == verb.as_str()),
            "{} should be refused, got {:?}",
            verb,
            err
        );
    }
    assert!(server.received_requests().await.unwrap().is_empty());

    let server_info = client.get_server(None, "srv-1").await.unwrap();
    assert_eq!(server_info.id, "srv-1");
    assert_eq!(server.received_requests().await.unwrap().len(), 1);
}

#[tokio::test]
async fn read_only_client_refuses_actions() {
    let server = MockServer::start().await;
    let credentials = Credentials::access_key("AKTEST", "SKTEST", "hcs.example.com").unwrap();
    let client = builder(&server, credentials).read_only(true).build().unwrap();

    let action = Action::StopServers {
        server_ids: vec!["srv-1".to_string()],
        mode: StopMode::Soft,
    };
    let err = client.perform(&action, None).await.unwrap_err();
    assert!(matches!(err, CoreError::ReadOnlyViolation { .. }));
    assert!(server.received_requests().await.unwrap().is_empty());
}

// ---------------------------------------------------------------------------
// Retries and classification
// ---------------------------------------------------------------------------

#[tokio::test]
async fn server_errors_are_retried_up_to_the_ceiling() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/v1/proj/cloudservers/srv-1"))
        .respond_with(ResponseTemplate::new(503).set_body_string("busy"))
        .expect(3)
        .mount(&server)
        .await;

    let err = ak_client(&server).get_server(None, "srv-1").await.unwrap_err();
    assert!(err.is_server_error(), "got {:?}", err);
}

#[tokio::test]
async fn client_errors_are_not_retried() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/proj/cloudservers/action"))
        .respond_with(ResponseTemplate::new(400).set_body_json(json!({
            "error": {"code": "Ecs.0005", "message": "invalid request"}
        })))
        .expect(1)
        .mount(&server)
        .await;

    let action = Action::StartServers {
        server_ids: vec!["srv-1".to_string()],
    };
    let err = ak_client(&server).perform(&action, None).await.unwrap_err();
    assert!(!err.is_retryable());
    assert!(err.to_string().contains("Ecs.0005") || err.to_string().contains("invalid request"));
}

#[tokio::test]
async fn rate_limit_is_retried_then_succeeds() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/v1/proj/cloudservers/srv-1"))
        .respond_with(ResponseTemplate::new(429))
        .up_to_n_times(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/v1/proj/cloudservers/srv-1"))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(json!({"server": {"id": "srv-1"}})),
        )
        .mount(&server)
        .await;

    let found = ak_client(&server).get_server(None, "srv-1").await.unwrap();
    assert_eq!(found.id, "srv-1");
    assert_eq!(server.received_requests().await.unwrap().len(), 2);
}

#[tokio::test]
async fn vendor_not_found_code_overrides_status() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/v1/proj/cloudservers/gone"))
        .respond_with(ResponseTemplate::new(400).set_body_json(json!({
            "error": {"code": "Ecs.0114", "message": "instance does not exist"}
        })))
        .expect(2)
        .mount(&server)
        .await;

    let client = ak_client(&server);
    let err = client.get_server(None, "gone").await.unwrap_err();
    assert!(err.is_not_found(), "got {:?}", err);

    assert_eq!(client.find_server(None, "gone").await.unwrap(), None);
}

#[tokio::test]
async fn unknown_product_is_a_configuration_error() {
    let server = MockServer::start().await;
    let err = ak_client(&server)
        .request(&ApiRequest::get("nosuch", "things"))
        .await
        .unwrap_err();
    assert!(matches!(err, CoreError::Configuration(_)));
    assert!(server.received_requests().await.unwrap().is_empty());
}

#[tokio::test]
async fn missing_region_is_a_configuration_error() {
    let credentials = Credentials::access_key("AKTEST", "SKTEST", "hcs.example.com").unwrap();
    let client = HcsClient::builder(credentials).build().unwrap();
    let err = client
        .request(&ApiRequest::get("ecs", "cloudservers/detail"))
        .await
        .unwrap_err();
    assert!(matches!(err, CoreError::Configuration(_)));
}

#[tokio::test]
async fn mutating_body_is_sent_as_json() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1.1/proj/cloudservers/srv-1/resize"))
        .and(header("content-type", "application/json"))
        .and(body_partial_json(json!({"resize": {"flavorRef": "s3.xlarge.2"}})))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"accepted": true})))
        .expect(1)
        .mount(&server)
        .await;

    let action = Action::ResizeServer {
        server_id: "srv-1".to_string(),
        flavor_ref: "s3.xlarge.2".to_string(),
    };
    let body = ak_client(&server).perform(&action, None).await.unwrap();
    assert_eq!(body, json!({"accepted": true}));
}

// ---------------------------------------------------------------------------
// Token authentication
// ---------------------------------------------------------------------------

#[tokio::test]
async fn token_is_refreshed_once_on_401() {
    let server = MockServer::start().await;
    mount_token(&server, 2).await;
    Mock::given(method("GET"))
        .and(path("/v1/proj/cloudservers/srv-1"))
        .and(header("x-auth-token", "tok-1"))
        .respond_with(ResponseTemplate::new(401))
        .up_to_n_times(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/v1/proj/cloudservers/srv-1"))
        .and(header("x-auth-token", "tok-1"))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(json!({"server": {"id": "srv-1"}})),
        )
        .mount(&server)
        .await;

    let found = token_client(&server).get_server(None, "srv-1").await.unwrap();
    assert_eq!(found.id, "srv-1");
}

#[tokio::test]
async fn second_401_is_an_auth_error() {
    let server = MockServer::start().await;
    mount_token(&server, 2).await;
    Mock::given(method("GET"))
        .and(path("/v1/proj/cloudservers/srv-1"))
        .respond_with(ResponseTemplate::new(401))
        .expect(2)
        .mount(&server)
        .await;

    let err = token_client(&server)
        .get_server(None, "srv-1")
        .await
        .unwrap_err();
    assert!(matches!(err, CoreError::Auth { .. }), "got {:?}", err);
    assert!(err.is_unauthorized());
}

#[tokio::test]
async fn token_exchange_is_retried_on_server_error() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v3/auth/tokens"))
        .respond_with(ResponseTemplate::new(503).set_body_string("identity busy"))
        .up_to_n_times(1)
        .expect(1)
        .mount(&server)
        .await;
    mount_token(&server, 1).await;
    Mock::given(method("GET"))
        .and(path("/v1/proj/cloudservers/srv-1"))
        .and(header("x-auth-token", "tok-1"))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(json!({"server": {"id": "srv-1"}})),
        )
        .expect(1)
        .mount(&server)
        .await;

    let found = token_client(&server).get_server(None, "srv-1").await.unwrap();
    assert_eq!(found.id, "srv-1");
}

#[tokio::test]
async fn token_exchange_failures_share_the_attempt_ceiling() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v3/auth/tokens"))
        .respond_with(ResponseTemplate::new(503))
        .expect(3)
        .mount(&server)
        .await;

    let err = token_client(&server)
        .get_server(None, "srv-1")
        .await
        .unwrap_err();
    assert!(err.is_server_error(), "got {:?}", err);
}

#[tokio::test]
async fn access_key_401_is_not_retried() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/v1/proj/cloudservers/srv-1"))
        .respond_with(ResponseTemplate::new(401))
        .expect(1)
        .mount(&server)
        .await;

    let err = ak_client(&server).get_server(None, "srv-1").await.unwrap_err();
    assert!(matches!(err, CoreError::Auth { .. }));
}

// ---------------------------------------------------------------------------
// Jobs
// ---------------------------------------------------------------------------

#[tokio::test]
async fn mutating_call_waits_for_returned_job() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/proj/cloudservers/delete"))
        .and(body_partial_json(json!({"servers": [{"id": "srv-1"}], "delete_volume": false})))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"job_id": "job-1"})))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/v1/proj/jobs/job-1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"status": "RUNNING"})))
        .up_to_n_times(2)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/v1/proj/jobs/job-1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "status": "SUCCESS",
            "entities": {"sub_jobs_total": 1}
        })))
        .expect(1)
        .mount(&server)
        .await;

    let result = ak_client(&server)
        .delete_servers(None, &["srv-1".to_string()], false)
        .await
        .unwrap();
    assert_eq!(result["status"], "SUCCESS");
    assert_eq!(result["entities"]["sub_jobs_total"], 1);
}

#[tokio::test]
async fn failing_status_checks_use_one_retry_budget() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/proj/cloudservers/delete"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"job_id": "j1"})))
        .expect(1)
        .mount(&server)
        .await;
    // three attempts in total, not three per poller retry
    Mock::given(method("GET"))
        .and(path("/v1/proj/jobs/j1"))
        .respond_with(ResponseTemplate::new(503))
        .expect(3)
        .mount(&server)
        .await;

    let err = ak_client(&server)
        .delete_servers(None, &["srv-1".to_string()], false)
        .await
        .unwrap_err();
    assert!(err.is_server_error(), "got {:?}", err);
}

#[tokio::test]
async fn failed_job_surfaces_vendor_reason() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/proj/cloudservers/action"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"job_id": "job-2"})))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/v1/proj/jobs/job-2"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "status": "FAIL",
            "fail_reason": "Ecs.0319 server is locked"
        })))
        .mount(&server)
        .await;

    let action = Action::RebootServers {
        server_ids: vec!["srv-1".to_string()],
        mode: StopMode::Hard,
    };
    let err = ak_client(&server).perform(&action, None).await.unwrap_err();
    match err {
        CoreError::JobFailed { job_id, reason } => {
            assert_eq!(job_id, "job-2");
            assert!(reason.contains("locked"));
        }
        other => panic!("expected JobFailed, got {:?}", other),
    }
}

#[tokio::test]
async fn rds_jobs_use_their_own_endpoint() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v3/proj/instances/db-1/action"))
        .respond_with(ResponseTemplate::new(202).set_body_json(json!({"job_id": "rds-job"})))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/v3/proj/jobs"))
        .and(query_param("id", "rds-job"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "job": {"id": "rds-job", "status": "Completed"}
        })))
        .expect(1)
        .mount(&server)
        .await;

    let action = Action::Raw {
        product: "rds".to_string(),
        version: None,
        method: Method::POST,
        resource: "instances/db-1/action".to_string(),
        payload: Some(json!({"restart": {}})),
    };
    let result = ak_client(&server).perform(&action, None).await.unwrap();
    assert_eq!(result["status"], "Completed");
}

#[tokio::test]
async fn dispatch_returns_job_payload() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v2/proj/cloudvolumes"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"job_id": "evs-job"})))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/v1/proj/jobs/evs-job"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"status": "SUCCESS"})))
        .mount(&server)
        .await;

    let request = ApiRequest::post("evs", "cloudvolumes").json(json!({"volume": {"size": 10}}));
    let payload = ak_client(&server)
        .dispatch(Call::object(request).wait())
        .await
        .unwrap();
    match payload {
        Payload::Job(outcome) => {
            assert_eq!(outcome.job_id, "evs-job");
            assert_eq!(outcome.polls, 1);
        }
        other => panic!("expected a job payload, got {:?}", other),
    }
}

struct AlwaysDone;

#[async_trait]
impl JobStatusCheck for AlwaysDone {
    async fn check(
        &self,
        _job_id: &str,
        _cancel: &CancellationToken,
    ) -> hcsctl_core::Result<JobStatus> {
        Ok(JobStatus::from_vendor("SUCCESS", json!({"custom": true}), None))
    }
}

#[tokio::test]
async fn dispatch_uses_caller_checker() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v2/proj/cloudservers"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"job_id": "j-custom"})))
        .mount(&server)
        .await;

    let request = ApiRequest::post("ecs", "cloudservers").json(json!({"server": {}}));
    let payload = ak_client(&server)
        .dispatch(Call::object(request).checker(Arc::new(AlwaysDone)))
        .await
        .unwrap();
    assert_eq!(payload.into_value()["result"], json!({"custom": true}));
    assert_eq!(server.received_requests().await.unwrap().len(), 1);
}

#[tokio::test]
async fn cancellation_aborts_job_wait() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/v1/proj/jobs/slow"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"status": "RUNNING"})))
        .mount(&server)
        .await;

    let cancel = CancellationToken::new();
    let client = ak_client(&server).with_cancellation(cancel.clone());
    let poller = hcsctl_core::JobPoller::new(Duration::from_secs(30), Duration::from_secs(600));

    let trigger = cancel.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(100)).await;
        trigger.cancel();
    });

    let started = std::time::Instant::now();
    let err = client
        .wait_job("ecs", None, "slow", &poller)
        .await
        .unwrap_err();
    assert!(matches!(err, CoreError::Cancelled));
    assert!(started.elapsed() < Duration::from_secs(10));
}

// ---------------------------------------------------------------------------
// Resource adapters
// ---------------------------------------------------------------------------

#[tokio::test]
async fn attach_volume_follows_the_attach_job() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/proj/cloudservers/srv-1/attachvolume"))
        .and(body_partial_json(json!({
            "volumeAttachment": {"volumeId": "vol-1", "device": "/dev/vdb"}
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"job_id": "att-1"})))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/v1/proj/jobs/att-1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"status": "SUCCESS"})))
        .expect(1)
        .mount(&server)
        .await;

    let result = ak_client(&server)
        .attach_volume(None, "srv-1", "vol-1", Some("/dev/vdb"))
        .await
        .unwrap();
    assert_eq!(result["status"], "SUCCESS");
}

#[tokio::test]
async fn detach_volume_is_a_delete() {
    let server = MockServer::start().await;
    Mock::given(method("DELETE"))
        .and(path("/v1/proj/cloudservers/srv-1/detachvolume/vol-1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"job_id": "det-1"})))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/v1/proj/jobs/det-1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"status": "SUCCESS"})))
        .expect(1)
        .mount(&server)
        .await;

    ak_client(&server)
        .detach_volume(None, "srv-1", "vol-1")
        .await
        .unwrap();
}

#[tokio::test]
async fn missing_volume_is_none() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/v2/proj/cloudvolumes/gone"))
        .respond_with(ResponseTemplate::new(404).set_body_json(json!({
            "itemNotFound": {"code": 404, "message": "Volume gone could not be found."}
        })))
        .expect(1)
        .mount(&server)
        .await;

    let volume = ak_client(&server).find_volume(None, "gone").await.unwrap();
    assert!(volume.is_none());
}

#[tokio::test]
async fn vpc_lookups_use_the_vpc_product() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/v1/proj/vpcs/vpc-1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "vpc": {"id": "vpc-1", "name": "core", "cidr": "10.0.0.0/16", "status": "OK"}
        })))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/v1/proj/subnets"))
        .and(query_param("vpc_id", "vpc-1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "subnets": [{"id": "sub-1", "cidr": "10.0.1.0/24", "vpc_id": "vpc-1"}]
        })))
        .expect(1)
        .mount(&server)
        .await;

    let credentials = Credentials::access_key("AKTEST", "SKTEST", "hcs.example.com").unwrap();
    let client = builder(&server, credentials)
        .endpoint("vpc", server.uri())
        .build()
        .unwrap();

    let vpc = client.find_vpc(None, "vpc-1").await.unwrap().unwrap();
    assert_eq!(vpc.cidr, "10.0.0.0/16");

    let subnets = client.list_subnets(None, Some("vpc-1")).await.unwrap();
    assert_eq!(subnets.len(), 1);
    assert_eq!(subnets[0].vpc_id, "vpc-1");
}

// ---------------------------------------------------------------------------
// Network failures
// ---------------------------------------------------------------------------

fn client_for(base_url: String) -> HcsClient {
    let credentials = Credentials::access_key("AKTEST", "SKTEST", "hcs.example.com").unwrap();
    HcsClient::builder(credentials.with_project("proj"))
        .region("region-1")
        .retry(fast_retry())
        .endpoint("ecs", base_url)
        .build()
        .unwrap()
}

#[tokio::test]
async fn dropped_connections_are_retried_up_to_the_ceiling() {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tokio::io::AsyncReadExt;

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let accepted = Arc::new(AtomicUsize::new(0));
    let counter = accepted.clone();
    tokio::spawn(async move {
        while let Ok((mut socket, _)) = listener.accept().await {
            counter.fetch_add(1, Ordering::SeqCst);
            // read the request, then hang up without answering
            let mut buf = [0u8; 4096];
            let _ = socket.read(&mut buf).await;
            drop(socket);
        }
    });

    let err = client_for(format!("http://{}", addr))
        .get_server(None, "srv-1")
        .await
        .unwrap_err();
    assert!(matches!(err, CoreError::Network { .. }), "got {:?}", err);
    assert!(err.is_retryable());
    assert_eq!(accepted.load(Ordering::SeqCst), 3);
}

#[tokio::test]
async fn refused_connection_surfaces_as_network_error() {
    let addr = {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        listener.local_addr().unwrap()
    };

    let err = client_for(format!("http://{}", addr))
        .get_server(None, "srv-1")
        .await
        .unwrap_err();
    assert!(matches!(err, CoreError::Network { .. }), "got {:?}", err);
}
