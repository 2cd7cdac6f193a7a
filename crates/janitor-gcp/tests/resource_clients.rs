//! Resource clients against a mock Google API

mod common;

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use common::client;
use janitor_core::{
    ChangeRequest, Correction, CorrectionPublisher, DnsProvider, Error, RecordType, ResourceRecordSet,
};
use janitor_gcp::{
    CloudDnsChangePublisher, CloudDnsClient, ComputeClient, CorrectionMessage, PubsubPublisher,
    ResourceManagerClient,
};
use serde_json::{json, Value};
use wiremock::matchers::{body_json, method, path, query_param, query_param_is_missing};
use wiremock::{Mock, MockServer, ResponseTemplate};

const RRSETS: &str = "/dns/v1/projects/infra/managedZones/prod/rrsets";
const CHANGES: &str = "/dns/v1/projects/infra/managedZones/prod/changes";

fn rrset(name: &str, record_type: RecordType, rrdatas: &[&str]) -> ResourceRecordSet {
    ResourceRecordSet::new(name, record_type, 300, rrdatas.iter().map(|s| s.to_string()).collect())
        .unwrap()
}

fn dns(server: &MockServer) -> CloudDnsClient {
    CloudDnsClient::new(client(2).api, "infra", "v1").with_base_url(format!("{}/dns/v1", server.uri()))
}

#[tokio::test]
async fn cloud_dns_lists_every_page() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path(RRSETS))
        .and(query_param("fields", "rrsets(name,type,ttl,rrdatas),nextPageToken"))
        .and(query_param_is_missing("pageToken"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "rrsets": [
                {"name": "example.com.", "type": "NS", "ttl": 21600, "rrdatas": ["ns1.example.net."]},
                {"name": "api.example.com.", "type": "A", "ttl": 300, "rrdatas": ["1.2.3.4"]}
            ],
            "nextPageToken": "p2"
        })))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path(RRSETS))
        .and(query_param("pageToken", "p2"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "rrsets": [{"name": "www.example.com.", "type": "CNAME", "ttl": 300, "rrdatas": ["api.example.com."]}]
        })))
        .mount(&server)
        .await;

    let records = dns(&server)
        .fetch_records(&ChangeRequest::all("prod"))
        .await
        .unwrap();

    assert_eq!(records.len(), 3);
    assert_eq!(records[1], rrset("api.example.com.", RecordType::A, &["1.2.3.4"]));
    assert_eq!(records[2].record_type, RecordType::Cname);
}

#[tokio::test]
async fn cloud_dns_filters_by_name() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path(RRSETS))
        .and(query_param("name", "api.example.com."))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "rrsets": [
                {"name": "api.example.com.", "type": "A", "ttl": 300, "rrdatas": ["1.2.3.4"]},
                {"name": "api.example.com.", "type": "TXT", "ttl": 300, "rrdatas": ["\"hello\""]}
            ]
        })))
        .expect(1)
        .mount(&server)
        .await;

    let request = ChangeRequest::record("prod", "API.example.com").unwrap();
    let records = dns(&server).fetch_records(&request).await.unwrap();
    assert_eq!(records.len(), 2);
}

#[tokio::test]
async fn cloud_dns_unknown_zone_is_api_error() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(404).set_body_string("managed zone not found"))
        .mount(&server)
        .await;

    let err = dns(&server)
        .fetch_records(&ChangeRequest::all("prod"))
        .await
        .unwrap_err();
    assert!(matches!(err, Error::Api { status: 404, .. }), "{:?}", err);
}

#[tokio::test]
async fn cloud_dns_applies_changes() {
    let server = MockServer::start().await;
    let correction = Correction {
        additions: vec![rrset("api.example.com.", RecordType::A, &["1.2.3.4"])],
        deletions: vec![rrset("old.example.com.", RecordType::A, &["5.6.7.8"])],
    };
    Mock::given(method("POST"))
        .and(path(CHANGES))
        .and(body_json(json!({
            "additions": [{"name": "api.example.com.", "type": "A", "ttl": 300, "rrdatas": ["1.2.3.4"]}],
            "deletions": [{"name": "old.example.com.", "type": "A", "ttl": 300, "rrdatas": ["5.6.7.8"]}]
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"id": "42", "status": "pending"})))
        .expect(1)
        .mount(&server)
        .await;

    let id = dns(&server).apply_changes("prod", &correction).await.unwrap();
    assert_eq!(id.as_deref(), Some("42"));
}

#[tokio::test]
async fn empty_correction_sends_nothing() {
    let server = MockServer::start().await;
    let client = dns(&server);

    assert_eq!(client.apply_changes("prod", &Correction::default()).await.unwrap(), None);

    let publisher = CloudDnsChangePublisher::new(client);
    publisher
        .publish(&ChangeRequest::all("prod"), &Correction::default())
        .await
        .unwrap();

    assert!(server.received_requests().await.unwrap().is_empty());
}

#[tokio::test]
async fn rejected_change_is_retryable_publish_failure() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path(CHANGES))
        .respond_with(ResponseTemplate::new(409).set_body_string("conflict"))
        .mount(&server)
        .await;

    let publisher = CloudDnsChangePublisher::new(dns(&server));
    let correction = Correction {
        additions: vec![rrset("api.example.com.", RecordType::A, &["1.2.3.4"])],
        deletions: vec![],
    };
    let err = publisher
        .publish(&ChangeRequest::all("prod"), &correction)
        .await
        .unwrap_err();

    assert!(matches!(err, Error::Publish(_)), "{:?}", err);
    assert!(err.is_retryable());
}

fn instance(name: &str, internal: &str, external: &str, extra: Value) -> Value {
    let mut value = json!({
        "name": name,
        "networkInterfaces": [{"networkIP": internal, "accessConfigs": [{"natIP": external}]}]
    });
    if let (Some(target), Value::Object(fields)) = (value.as_object_mut(), extra) {
        target.extend(fields);
    }
    value
}

#[tokio::test]
async fn compute_lists_instances_across_zones_and_pages() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/compute/v1/projects/infra/aggregated/instances"))
        .and(query_param("maxResults", "500"))
        .and(query_param("filter", "status = RUNNING"))
        .and(query_param_is_missing("pageToken"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "items": {
                "zones/us-central1-a": {"instances": [
                    instance("web-1", "10.0.0.2", "34.0.0.2", json!({})),
                    instance("web-2", "10.0.0.3", "34.0.0.3",
                        json!({"tags": {"items": ["http", "no-dns"]}}))
                ]},
                "zones/us-central1-b": {"warning": {"code": "NO_RESULTS_ON_PAGE"}}
            },
            "nextPageToken": "more"
        })))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/compute/v1/projects/infra/aggregated/instances"))
        .and(query_param("pageToken", "more"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "items": {
                "zones/europe-west1-b": {"instances": [
                    instance("db-1", "10.1.0.2", "35.0.0.2",
                        json!({"metadata": {"items": [{"key": "janitor", "value": "ignore"}]}})),
                    instance("db-2", "10.1.0.3", "35.0.0.3",
                        json!({"metadata": {"items": [{"key": "janitor", "value": "keep"}]}})),
                    {"name": "no-nat", "networkInterfaces": [{"networkIP": "10.1.0.4"}]}
                ]}
            }
        })))
        .mount(&server)
        .await;

    let compute = ComputeClient::new(client(1).api)
        .with_base_url(format!("{}/compute/v1", server.uri()))
        .with_blacklisted_tags(["no-dns"])
        .with_blacklisted_metadata([("janitor", "ignore")]);

    let instances = compute
        .list_instances("infra", Some("status = RUNNING"))
        .await
        .unwrap();

    let names: Vec<&str> = instances.iter().map(|i| i.hostname.as_str()).collect();
    assert_eq!(names, vec!["web-1", "db-2"]);
    assert_eq!(instances[1].internal_ip.to_string(), "10.1.0.3");
    assert_eq!(instances[1].external_ip.to_string(), "35.0.0.3");
}

#[tokio::test]
async fn resource_manager_keeps_active_projects() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/v1/projects"))
        .and(query_param("pageSize", "1000"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "projects": [
                {"projectId": "infra-prod", "lifecycleState": "ACTIVE"},
                {"projectId": "infra-old", "lifecycleState": "DELETE_REQUESTED"},
                {"projectId": "infra-dev", "lifecycleState": "active"}
            ]
        })))
        .mount(&server)
        .await;

    let crm = ResourceManagerClient::new(client(1).api).with_base_url(format!("{}/v1", server.uri()));
    let projects = crm.list_active_projects(1000).await.unwrap();

    let ids: Vec<&str> = projects.iter().map(|p| p.project_id.as_str()).collect();
    assert_eq!(ids, vec!["infra-prod", "infra-dev"]);
}

#[tokio::test]
async fn pubsub_publishes_encoded_correction() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/projects/infra/topics/dns-changes:publish"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"messageIds": ["1"]})))
        .expect(1)
        .mount(&server)
        .await;

    let publisher = PubsubPublisher::new(client(1).api, "infra", "dns-changes")
        .with_base_url(format!("{}/v1", server.uri()));
    let correction = Correction {
        additions: vec![rrset("api.example.com.", RecordType::A, &["1.2.3.4"])],
        deletions: vec![],
    };
    let request = ChangeRequest::record("prod", "api.example.com.").unwrap();
    publisher.publish(&request, &correction).await.unwrap();

    let requests = server.received_requests().await.unwrap();
    let body: Value = serde_json::from_slice(&requests[0].body).unwrap();
    let data = body["messages"][0]["data"].as_str().unwrap();
    let message: CorrectionMessage = serde_json::from_slice(&BASE64.decode(data).unwrap()).unwrap();

    assert_eq!(message.zone, "prod");
    assert_eq!(message.scope, "api.example.com.");
    assert_eq!(message.additions, correction.additions);
    assert!(message.deletions.is_empty());
}
