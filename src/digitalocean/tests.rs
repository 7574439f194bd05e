use std::net::Ipv4Addr;

use reqwest::StatusCode;
use rstest::rstest;
use serde_json::json;

use super::types::{Droplet, DropletPage, map_status};
use super::*;
use crate::gateway::InstanceStatus;

fn droplet(value: serde_json::Value) -> Droplet {
    serde_json::from_value(value).expect("droplet payload decodes")
}

#[rstest]
#[case("new", InstanceStatus::Pending)]
#[case("active", InstanceStatus::Active)]
#[case("off", InstanceStatus::Other(String::from("off")))]
#[case("archive", InstanceStatus::Other(String::from("archive")))]
fn maps_provider_status(#[case] raw: &str, #[case] expected: InstanceStatus) {
    assert_eq!(map_status(raw), expected);
}

#[rstest]
#[case(InstanceStatus::Pending, "pending")]
#[case(InstanceStatus::Active, "active")]
#[case(InstanceStatus::Other(String::from("off")), "off")]
fn status_serialises_as_plain_text(#[case] status: InstanceStatus, #[case] expected: &str) {
    assert_eq!(serde_json::to_value(&status).expect("status serialises"), json!(expected));
}

#[rstest]
fn prefers_public_address() {
    let instance = Instance::from(droplet(json!({
        "id": 3164494,
        "name": "cloud_shepard",
        "status": "active",
        "networks": {"v4": [
            {"ip_address": "10.128.0.4", "type": "private"},
            {"ip_address": "104.131.186.241", "type": "public"}
        ]}
    })));

    assert_eq!(instance.id.as_str(), "3164494");
    assert_eq!(instance.status, InstanceStatus::Active);
    assert_eq!(instance.address, Some(Ipv4Addr::new(104, 131, 186, 241)));
}

#[rstest]
fn falls_back_to_first_address() {
    let instance = Instance::from(droplet(json!({
        "id": 1,
        "name": "cloud_shepard",
        "status": "active",
        "networks": {"v4": [{"ip_address": "10.0.0.9", "type": "private"}]}
    })));

    assert_eq!(instance.address, Some(Ipv4Addr::new(10, 0, 0, 9)));
}

#[rstest]
fn new_droplets_have_no_address() {
    let instance = Instance::from(droplet(json!({
        "id": 2,
        "name": "cloud_shepard",
        "status": "new",
        "networks": {"v4": []}
    })));

    assert_eq!(instance.status, InstanceStatus::Pending);
    assert_eq!(instance.address, None);
}

#[rstest]
fn create_payload_matches_api_shape() {
    let spec = InstanceSpec::builder()
        .name("cloud_shepard")
        .region("lon1")
        .size("512mb")
        .image("ubuntu-15-10-x64")
        .ssh_keys(vec![String::from("aa:bb")])
        .build()
        .expect("spec builds");

    let payload = serde_json::to_value(types::CreateDropletRequest::from(&spec))
        .expect("payload serialises");

    assert_eq!(
        payload,
        json!({
            "name": "cloud_shepard",
            "region": "lon1",
            "size": "512mb",
            "image": "ubuntu-15-10-x64",
            "ssh_keys": ["aa:bb"],
            "backups": false,
            "ipv6": false,
            "private_networking": false,
            "tags": []
        })
    );
}

#[rstest]
fn pagination_stops_without_next_link() {
    let last: DropletPage =
        serde_json::from_value(json!({"droplets": [], "links": {}})).expect("page decodes");
    let middle: DropletPage = serde_json::from_value(json!({
        "droplets": [],
        "links": {"pages": {"next": "https://api.digitalocean.com/v2/droplets?page=2"}}
    }))
    .expect("page decodes");

    assert_eq!(last.next_page(), None);
    assert_eq!(
        middle.next_page(),
        Some("https://api.digitalocean.com/v2/droplets?page=2")
    );
}

#[rstest]
fn api_errors_decode_structured_bodies() {
    let err = api_error(
        StatusCode::UNPROCESSABLE_ENTITY,
        br#"{"id":"unprocessable_entity","message":"Region is not available"}"#,
    );

    assert_eq!(
        err,
        DigitalOceanError::Api {
            status: 422,
            id: String::from("unprocessable_entity"),
            message: String::from("Region is not available"),
        }
    );
}

#[rstest]
fn api_errors_fall_back_to_raw_body() {
    let err = api_error(StatusCode::BAD_GATEWAY, b"upstream down\n");

    assert_eq!(
        err,
        DigitalOceanError::Api {
            status: 502,
            id: String::from("unknown"),
            message: String::from("upstream down"),
        }
    );
}

#[rstest]
#[case("", "https://api.digitalocean.com/v2")]
#[case("token", " ")]
fn blank_settings_are_rejected(#[case] key: &str, #[case] base: &str) {
    let err = DigitalOceanGateway::with_api_base(key, base).expect_err("blank value");
    assert!(matches!(err, DigitalOceanError::Config(_)));
}

#[rstest]
fn trailing_slash_is_trimmed_from_base() {
    let gateway = DigitalOceanGateway::with_api_base("token", "http://127.0.0.1:9/v2/")
        .expect("gateway builds");
    assert_eq!(gateway.droplets_url(), "http://127.0.0.1:9/v2/droplets");
}
