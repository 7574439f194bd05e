//! HTTP behaviour of the DigitalOcean gateway against a stub API.

use std::net::Ipv4Addr;

use cloud_shepard::{
    CloudGateway, DigitalOceanError, DigitalOceanGateway, InstanceId, InstanceSpec, InstanceStatus,
};
use rstest::{fixture, rstest};
use serde_json::json;
use wiremock::matchers::{body_partial_json, header, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

const TOKEN: &str = "do-token";

#[fixture]
fn spec() -> InstanceSpec {
    InstanceSpec::builder()
        .name("lab")
        .region("lon1")
        .size("512mb")
        .image("ubuntu-15-10-x64")
        .ssh_keys(vec![String::from("3b:16:bf")])
        .build()
        .expect("valid spec")
}

fn gateway(server: &MockServer) -> DigitalOceanGateway {
    DigitalOceanGateway::with_api_base(TOKEN, server.uri()).expect("gateway builds")
}

#[rstest]
#[tokio::test]
async fn list_follows_next_page_links() {
    let server = MockServer::start().await;
    let next = format!("{}/droplets?name=lab&page=2&per_page=200", server.uri());
    Mock::given(method("GET"))
        .and(path("/droplets"))
        .and(query_param("name", "lab"))
        .and(query_param("page", "1"))
        .and(header("authorization", "Bearer do-token"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "droplets": [{
                "id": 101,
                "name": "lab",
                "status": "active",
                "networks": {"v4": [
                    {"ip_address": "10.131.0.2", "type": "private"},
                    {"ip_address": "203.0.113.10", "type": "public"}
                ]}
            }],
            "links": {"pages": {"next": next}}
        })))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/droplets"))
        .and(query_param("page", "2"))
        .and(header("authorization", "Bearer do-token"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "droplets": [{"id": 102, "name": "lab", "status": "off", "networks": {"v4": []}}],
            "links": {}
        })))
        .expect(1)
        .mount(&server)
        .await;

    let instances = gateway(&server).list("lab").await.expect("listing succeeds");

    assert_eq!(instances.len(), 2);
    let first = instances.first().expect("first droplet");
    assert_eq!(first.id.as_str(), "101");
    assert_eq!(first.address, Some(Ipv4Addr::new(203, 0, 113, 10)));
    let second = instances.get(1).expect("second droplet");
    assert_eq!(second.status, InstanceStatus::Other(String::from("off")));
    assert_eq!(second.address, None);

    let rendered = serde_json::to_value(&instances).expect("listing serialises");
    assert_eq!(rendered.pointer("/0/status"), Some(&json!("active")));
    assert_eq!(rendered.pointer("/1/status"), Some(&json!("off")));
}

#[rstest]
#[tokio::test]
async fn create_posts_payload_and_returns_handle(spec: InstanceSpec) {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/droplets"))
        .and(header("authorization", "Bearer do-token"))
        .and(body_partial_json(json!({
            "name": "lab",
            "region": "lon1",
            "size": "512mb",
            "ssh_keys": ["3b:16:bf"]
        })))
        .respond_with(ResponseTemplate::new(202).set_body_json(json!({
            "droplet": {"id": 3_164_494, "name": "lab", "status": "new"}
        })))
        .expect(1)
        .mount(&server)
        .await;

    let handle = gateway(&server).create(&spec).await.expect("create accepted");

    assert_eq!(handle.id.as_str(), "3164494");
    assert_eq!(handle.name, "lab");
}

#[rstest]
#[tokio::test]
async fn rejected_create_decodes_api_error(spec: InstanceSpec) {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/droplets"))
        .respond_with(ResponseTemplate::new(422).set_body_json(json!({
            "id": "unprocessable_entity",
            "message": "You specified an invalid size for Droplet creation."
        })))
        .mount(&server)
        .await;

    let err = gateway(&server)
        .create(&spec)
        .await
        .expect_err("provider rejects size");

    match err {
        DigitalOceanError::Api {
            status,
            id,
            message,
        } => {
            assert_eq!(status, 422);
            assert_eq!(id, "unprocessable_entity");
            assert!(message.contains("invalid size"), "{message}");
        }
        other => panic!("expected api error, got {other:?}"),
    }
}

#[rstest]
#[tokio::test]
async fn delete_treats_missing_droplet_as_gone() {
    let server = MockServer::start().await;
    Mock::given(method("DELETE"))
        .and(path("/droplets/42"))
        .and(header("authorization", "Bearer do-token"))
        .respond_with(ResponseTemplate::new(404).set_body_json(json!({
            "id": "not_found",
            "message": "The resource you were accessing could not be found."
        })))
        .expect(1)
        .mount(&server)
        .await;

    gateway(&server)
        .delete(&InstanceId::from("42"))
        .await
        .expect("404 counts as deleted");
}

#[rstest]
#[tokio::test]
async fn delete_surfaces_server_errors() {
    let server = MockServer::start().await;
    Mock::given(method("DELETE"))
        .and(path("/droplets/42"))
        .respond_with(ResponseTemplate::new(500).set_body_string("upstream unavailable"))
        .mount(&server)
        .await;

    let err = gateway(&server)
        .delete(&InstanceId::from("42"))
        .await
        .expect_err("server error propagates");

    assert!(
        matches!(
            err,
            DigitalOceanError::Api { status: 500, ref id, ref message }
                if id == "unknown" && message == "upstream unavailable"
        ),
        "{err:?}"
    );
}
